use crate::error::ApiError;
use crate::routes::FilesRequest;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use http::header;
use parley::models::conversation::Conversation;
use parley::orchestrator::{Turn, TurnStream};
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio_stream::wrappers::ReceiverStream;

/// Streams encoded frames to the client as `text/event-stream`
pub struct SseResponse {
    rx: ReceiverStream<Bytes>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<Bytes>) -> Self {
        Self { rx }
    }
}

impl From<TurnStream> for SseResponse {
    fn from(turn: TurnStream) -> Self {
        Self::new(turn.frames)
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx).map(|opt| opt.map(Ok))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

async fn start_conversation(
    State(state): State<AppState>,
    Json(turn): Json<Turn>,
) -> Result<SseResponse, ApiError> {
    let stream = state
        .orchestrator
        .start_conversation(state.agent.clone(), turn)
        .await?;
    Ok(stream.into())
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(turn): Json<Turn>,
) -> Result<SseResponse, ApiError> {
    let stream = state
        .orchestrator
        .continue_conversation(&id, state.agent.clone(), turn)
        .await?;
    Ok(stream.into())
}

async fn upload_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FilesRequest>,
) -> Result<SseResponse, ApiError> {
    let stream = state.orchestrator.upload_files(&id, request.files).await?;
    Ok(stream.into())
}

async fn remove_file(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let removed = state
        .orchestrator
        .remove_conversation_file(&id, &file_id)
        .await?;
    Ok(Json(json!({ "fileId": file_id, "removedChunks": removed })))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.orchestrator.conversation(&id).await?))
}

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(state.orchestrator.conversations().await?))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.orchestrator.delete_conversation(&id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/conversations",
            post(start_conversation).get(list_conversations),
        )
        .route(
            "/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/conversations/:id/messages", post(send_message))
        .route("/conversations/:id/files", post(upload_files))
        .route("/conversations/:id/files/:file_id", delete(remove_file))
        .with_state(state)
}
