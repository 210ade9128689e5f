//! Aggregated container metrics

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState, types::MetricsResponse};

/// GET /api/v1/metrics
///
/// One entry per base name, the same view the stream pushes
pub async fn get_metrics(State(state): State<ApiState>) -> ApiResult<Json<MetricsResponse>> {
    let metrics = state.storage.get_aggregated_metrics().await?;

    Ok(Json(MetricsResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        count: metrics.len(),
        metrics,
    }))
}
