pub mod contexts;
pub mod conversations;

use axum::Router;
use parley::orchestrator::FileUpload;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FilesRequest {
    pub files: Vec<FileUpload>,
}

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(conversations::routes(state.clone()))
        .merge(contexts::routes(state))
}
