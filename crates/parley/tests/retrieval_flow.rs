mod common;

use anyhow::Result;

use common::{agent, frames, harness, plain_agent};
use parley::orchestrator::{FileUpload, Turn};
use parley::protocol::EventKind;
use parley::providers::configs::RetrievalProfile;
use parley::providers::mock::{AdapterCall, MockAdapter, MockStep};
use parley::retrieval::FileStatus;

fn short_reply() -> Vec<MockStep> {
    vec![
        MockStep::started("vendor-1"),
        MockStep::text("msg_1", "Noted."),
        MockStep::done(3),
    ]
}

fn knowledge(context_ids: &[&str], top_k: usize) -> RetrievalProfile {
    RetrievalProfile {
        enabled: true,
        context_ids: context_ids.iter().map(|id| id.to_string()).collect(),
        top_k,
    }
}

#[tokio::test]
async fn test_agent_knowledge_is_spliced_ahead_of_prompt() -> Result<()> {
    let h = harness(MockAdapter::new(vec![short_reply()]));
    let retrieval = h.orchestrator.retrieval();
    retrieval.store().create_context(Some("kb"));
    retrieval
        .ingest_document(
            "kb",
            "handbook.txt",
            "Cats sleep all day\nDogs bark at night\nParking is behind the office",
        )
        .await?;

    let turn = h
        .orchestrator
        .start_conversation(agent(knowledge(&["kb"], 1)), Turn::new("Where is parking?"))
        .await?;
    frames(turn).await;

    let AdapterCall::Start(request) = &h.adapter.calls()[0] else {
        panic!("expected a start call");
    };
    assert_eq!(request.prompt, "Where is parking?");
    let context = request.context.as_deref().unwrap();
    assert!(context.starts_with("Use the following excerpts"));
    assert!(context.contains("[1] parking is behind the office"));
    assert!(!context.contains("cats"));
    Ok(())
}

#[tokio::test]
async fn test_retrieval_disabled_sends_no_context() -> Result<()> {
    let h = harness(MockAdapter::new(vec![short_reply()]));
    h.orchestrator.retrieval().store().create_context(Some("kb"));

    let turn = h
        .orchestrator
        .start_conversation(plain_agent(), Turn::new("Where is parking?"))
        .await?;
    frames(turn).await;

    let AdapterCall::Start(request) = &h.adapter.calls()[0] else {
        panic!("expected a start call");
    };
    assert_eq!(request.context, None);
    Ok(())
}

#[tokio::test]
async fn test_missing_knowledge_context_fails_the_turn() -> Result<()> {
    let h = harness(MockAdapter::new(vec![short_reply()]));
    let turn = h
        .orchestrator
        .start_conversation(agent(knowledge(&["absent"], 2)), Turn::new("hi"))
        .await?;
    let frames = frames(turn).await;

    assert_eq!(frames.len(), 1);
    assert!(frames[0].error_message().unwrap().contains("not found"));
    assert!(h.adapter.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_files_with_first_turn_create_context_before_content() -> Result<()> {
    let h = harness(MockAdapter::new(vec![short_reply()]));
    let turn = Turn::new("What do dogs do?").with_files(vec![
        FileUpload::new("pets.txt", "Dogs bark at night\nCats sleep all day"),
        FileUpload::new("lot.txt", "Parking is behind the office"),
    ]);

    let stream = h
        .orchestrator
        .start_conversation(agent(knowledge(&[], 1)), turn)
        .await?;
    let id = stream.conversation_id.clone();
    let frames = frames(stream).await;

    let kinds: Vec<_> = frames.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::VectorStoreCreated,
            EventKind::VectorStoreFileUploaded,
            EventKind::VectorStoreFileUploaded,
            EventKind::VectorStoreFilesProcessed,
            EventKind::ConversationStarted,
            EventKind::MessageDelta,
            EventKind::MessageEnded,
        ]
    );
    assert_eq!(frames[1].payload["fileName"], "pets.txt");

    let conversation = h.orchestrator.conversation(&id).await?;
    let context_id = conversation.vector_store_id.clone().unwrap();
    assert_eq!(frames[0].payload["vectorStoreId"], context_id.as_str());
    assert_eq!(frames[3].payload["files"].as_array().unwrap().len(), 2);

    let AdapterCall::Start(request) = &h.adapter.calls()[0] else {
        panic!("expected a start call");
    };
    assert!(request
        .context
        .as_deref()
        .unwrap()
        .contains("dogs bark at night"));

    let files = h.orchestrator.retrieval().store().list_files(&context_id)?;
    assert!(files.iter().all(|f| f.status == FileStatus::Ready));
    Ok(())
}

#[tokio::test]
async fn test_upload_reuses_context_and_remove_file() -> Result<()> {
    let h = harness(MockAdapter::new(vec![short_reply()]));
    let first = h
        .orchestrator
        .start_conversation(plain_agent(), Turn::new("hello"))
        .await?;
    let id = first.conversation_id.clone();
    frames(first).await;

    let upload = frames(
        h.orchestrator
            .upload_files(&id, vec![FileUpload::new("a.txt", "Cats\nDogs")])
            .await?,
    )
    .await;
    assert_eq!(upload[0].kind, EventKind::VectorStoreCreated);
    assert_eq!(upload.last().unwrap().kind, EventKind::VectorStoreFilesProcessed);
    let first_file = upload[1].payload["fileId"].as_str().unwrap().to_string();

    let again = frames(
        h.orchestrator
            .upload_files(&id, vec![FileUpload::new("b.txt", "Parking")])
            .await?,
    )
    .await;
    let kinds: Vec<_> = again.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::VectorStoreFileUploaded,
            EventKind::VectorStoreFilesProcessed
        ]
    );

    let context_id = h
        .orchestrator
        .conversation(&id)
        .await?
        .vector_store_id
        .unwrap();
    let store = h.orchestrator.retrieval().store();
    assert_eq!(store.chunk_count(&context_id)?, 3);

    let removed = h.orchestrator.remove_conversation_file(&id, &first_file).await?;
    assert_eq!(removed, 2);
    assert_eq!(store.chunk_count(&context_id)?, 1);
    assert!(h
        .orchestrator
        .remove_conversation_file(&id, &first_file)
        .await
        .unwrap_err()
        .is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_delete_conversation_drops_its_context() -> Result<()> {
    let h = harness(MockAdapter::default());
    h.adapter.push_stream(short_reply());
    let stream = h
        .orchestrator
        .start_conversation(
            plain_agent(),
            Turn::new("hi").with_files(vec![FileUpload::new("a.txt", "cats")]),
        )
        .await?;
    let id = stream.conversation_id.clone();
    frames(stream).await;

    let context_id = h
        .orchestrator
        .conversation(&id)
        .await?
        .vector_store_id
        .unwrap();
    h.orchestrator.delete_conversation(&id).await?;

    assert!(h.orchestrator.conversation(&id).await.unwrap_err().is_not_found());
    assert!(!h.orchestrator.retrieval().store().contains(&context_id));
    Ok(())
}

#[tokio::test]
async fn test_turn_survives_its_context_being_deleted() -> Result<()> {
    let h = harness(MockAdapter::new(vec![short_reply(), short_reply()]));
    let first = h
        .orchestrator
        .start_conversation(plain_agent(), Turn::new("hello"))
        .await?;
    let id = first.conversation_id.clone();
    frames(first).await;
    frames(
        h.orchestrator
            .upload_files(&id, vec![FileUpload::new("a.txt", "Cats")])
            .await?,
    )
    .await;

    let context_id = h
        .orchestrator
        .conversation(&id)
        .await?
        .vector_store_id
        .unwrap();
    h.orchestrator.retrieval().store().delete_context(&context_id)?;

    let turn = h
        .orchestrator
        .continue_conversation(&id, agent(knowledge(&[], 2)), Turn::new("Any cats?"))
        .await?;
    let frames_seen = frames(turn).await;
    assert_eq!(frames_seen.last().unwrap().kind, EventKind::MessageEnded);
    assert!(!frames_seen.iter().any(|f| f.kind == EventKind::Error));

    let AdapterCall::Append(handle, request) = &h.adapter.calls()[1] else {
        panic!("expected an append call");
    };
    assert_eq!(handle, "vendor-1");
    assert_eq!(request.context, None);

    let upload = frames(
        h.orchestrator
            .upload_files(&id, vec![FileUpload::new("b.txt", "Dogs")])
            .await?,
    )
    .await;
    assert_eq!(upload[0].kind, EventKind::VectorStoreCreated);
    Ok(())
}
