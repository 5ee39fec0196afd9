use crate::error::ApiError;
use crate::routes::FilesRequest;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use parley::retrieval::FileRecord;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
struct CreateContextRequest {
    #[serde(default)]
    id: Option<String>,
}

async fn create_context(
    State(state): State<AppState>,
    Json(request): Json<CreateContextRequest>,
) -> (StatusCode, Json<Value>) {
    let handle = state
        .orchestrator
        .retrieval()
        .store()
        .create_context(request.id.as_deref());
    let status = if handle.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({ "id": handle.id, "created": handle.created })),
    )
}

async fn delete_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.orchestrator.retrieval().store().delete_context(&id)?;
    info!("Deleted knowledge context {}", id);
    Ok(Json(json!({ "status": "deleted" })))
}

/// Ingest each document in turn, stopping at the first failure
async fn ingest_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FilesRequest>,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    let retrieval = state.orchestrator.retrieval();
    let mut records = Vec::with_capacity(request.files.len());
    for file in request.files {
        records.push(
            retrieval
                .ingest_document(&id, &file.name, &file.content)
                .await?,
        );
    }
    Ok(Json(records))
}

async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    Ok(Json(state.orchestrator.retrieval().store().list_files(&id)?))
}

async fn remove_file(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let removed = state
        .orchestrator
        .retrieval()
        .store()
        .remove_file(&id, &file_id)?;
    Ok(Json(json!({ "fileId": file_id, "removedChunks": removed })))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/contexts", post(create_context))
        .route("/contexts/:id", delete(delete_context))
        .route("/contexts/:id/files", post(ingest_files).get(list_files))
        .route("/contexts/:id/files/:file_id", delete(remove_file))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_json, empty_request, json_request, state};
    use parley::providers::mock::MockAdapter;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_create_context_is_idempotent() {
        let app = routes(state(MockAdapter::default()));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/contexts", json!({"id": "handbook"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            body_json(response).await,
            json!({"id": "handbook", "created": true})
        );

        let response = app
            .clone()
            .oneshot(json_request("POST", "/contexts", json!({"id": "handbook"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["created"], false);

        let response = app
            .oneshot(json_request("POST", "/contexts", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(body_json(response).await["id"]
            .as_str()
            .unwrap()
            .starts_with("vs_"));
    }

    #[tokio::test]
    async fn test_ingest_list_and_remove_files() {
        let app = routes(state(MockAdapter::default()));
        app.clone()
            .oneshot(json_request("POST", "/contexts", json!({"id": "kb"})))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/contexts/kb/files",
                json!({"files": [
                    {"name": "a.txt", "content": "alpha\nbeta\ngamma"},
                    {"name": "b.txt", "content": "delta"}
                ]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let records = body_json(response).await;
        assert_eq!(records[0]["name"], "a.txt");
        assert_eq!(records[0]["status"], "ready");
        assert_eq!(records[0]["byteSize"], 16);
        let file_id = records[0]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/contexts/kb/files"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/contexts/kb/files/{}", file_id)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["removedChunks"], 3);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/contexts/kb/files"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", "/contexts/kb"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(empty_request("GET", "/contexts/kb/files"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_context_is_not_found() {
        let app = routes(state(MockAdapter::default()));
        let response = app
            .oneshot(json_request(
                "POST",
                "/contexts/missing/files",
                json!({"files": [{"name": "a.txt", "content": "alpha"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("missing"));
    }
}
