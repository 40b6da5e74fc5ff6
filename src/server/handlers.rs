//! Request handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};

use crate::chat::ChatError;
use crate::models::{Article, ChatRequest, ChatResponse, SearchDownloadRequest};
use crate::server::{ApiError, SharedState};

/// `POST /api/v1/search_download_articles/`
pub async fn search_download_articles(
    State(state): State<SharedState>,
    payload: Result<Json<SearchDownloadRequest>, JsonRejection>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let Json(request) = payload?;
    request.validate().map_err(ApiError::Unprocessable)?;

    let articles = state
        .pipeline
        .run(&request.query, request.max_articles)
        .await
        .map_err(|e| ApiError::Internal(format!("Error searching and downloading articles: {}", e)))?;

    Ok(Json(articles))
}

/// `POST /api/v1/chat/`
pub async fn chat(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;

    let reply = state
        .chat
        .chat(&request.system_message, &request.user_message)
        .await
        .map_err(|e| match e {
            ChatError::Validation(msg) => ApiError::Unprocessable(msg),
            other => ApiError::Internal(format!("Error processing chat request: {}", other)),
        })?;

    Ok(Json(ChatResponse::new(reply)))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}
