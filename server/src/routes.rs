//! Route definitions for the oracle server

use axum::{routing::get, Router};

use crate::handlers::api_info;

pub fn api_routes() -> Router {
    Router::new().route("/api", get(api_info))
}
