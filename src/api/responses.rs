//! Wire-shape types for the external HTTP contract (spec §6).
//!
//! Kept deliberately thin: [`crate::aggregator::SearchResponse`] already
//! carries the real data; these types are the serde boundary plus the
//! `AggregatorError -> {code, message}` mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::aggregator::SearchResponse;
use crate::error::AggregatorError;
use crate::model::GroupedView;
use crate::model::SearchResult;

/// Success body: `{ total, results?, merged_by_type? }`.
#[derive(Debug, Serialize)]
pub struct SearchSuccessResponse {
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_by_type: Option<GroupedView>,
}

impl From<SearchResponse> for SearchSuccessResponse {
    fn from(resp: SearchResponse) -> Self {
        SearchSuccessResponse {
            total: resp.total,
            results: resp.results,
            merged_by_type: resp.merged_by_type,
        }
    }
}

impl IntoResponse for SearchSuccessResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Error body: `{ code, message }`. `code` is 400 for bad requests, 500 for
/// everything else the pipeline surfaces as fatal (spec §6).
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
}

impl AggregatorError {
    /// Raw message text for the `{code, message}` body, without the
    /// thiserror variant prefix `to_string()` would add.
    pub fn message(&self) -> String {
        match self {
            AggregatorError::BadRequest(msg) => msg.clone(),
            AggregatorError::SourceFailure { plugin, cause } => {
                format!("{plugin}: {cause}")
            }
            AggregatorError::DeadlineExceeded => "deadline exceeded".to_string(),
            AggregatorError::CacheIo(e) => e.to_string(),
            AggregatorError::CacheCorruption(msg) => msg.clone(),
            AggregatorError::Saturation(e) => e.to_string(),
            AggregatorError::Fatal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AggregatorError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            code: self.code(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

/// `GET /api/health` body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub channels: Vec<String>,
    pub plugins: Vec<String>,
    pub plugin_count: usize,
    pub plugins_enabled: bool,
    pub active_background_tasks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_message_has_no_prefix() {
        let err = AggregatorError::BadRequest("关键词不能为空".to_string());
        assert_eq!(err.message(), "关键词不能为空");
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn fatal_maps_to_500() {
        let err = AggregatorError::Fatal("all sources failed".to_string());
        assert_eq!(err.code(), 500);
    }
}
