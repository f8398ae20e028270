use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
};

use crate::params::RequestParameters;
use crate::AppState;

#[axum::debug_handler]
pub async fn transform_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    app_state
        .darkroom
        .serve_transformed(&path, RequestParameters::new(query), accept)
        .await
}
