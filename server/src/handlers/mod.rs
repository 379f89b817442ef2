//! API handlers for the oracle server

use axum::Json;

use crate::models::ApiMessage;

pub const API_MESSAGE: &str = "An API for use with your Dapp!";

/// Liveness acknowledgement for `GET /api`
pub async fn api_info() -> Json<ApiMessage> {
    Json(ApiMessage {
        message: API_MESSAGE.to_string(),
    })
}
