use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{resolve_user, Identity};
use crate::error::ApiError;
use crate::models::{CyclePrediction, CycleStats, CycleSummary};
use crate::prediction;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionQuery {
    pub user_id: Option<String>,
    /// Overrides the server's date, for clients in other timezones.
    pub today: Option<NaiveDate>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    pub prediction: CyclePrediction,
    pub summary: CycleSummary,
    pub stats: CycleStats,
}

pub async fn get_prediction(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Query(query): Query<PredictionQuery>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let user = resolve_user(identity.as_deref(), query.user_id.as_deref())?;

    let observations = state
        .observations
        .list_for_user(&user, None)
        .await
        .map_err(ApiError::store("Failed to fetch period data"))?;
    let typical_cycle_length = state
        .settings
        .cycle_settings(&user)
        .await
        .map_err(ApiError::store("Failed to fetch cycle settings"))?
        .and_then(|s| s.typical_cycle_length);

    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    let prediction = prediction::predict(&observations, typical_cycle_length, today);
    let summary = prediction::summarize(&prediction, today);
    let stats = prediction::cycle_stats(&observations);

    tracing::debug!(
        user = %user,
        observations = observations.len(),
        next = %prediction.next_period_prediction,
        "🔮 Prediction computed"
    );

    Ok(Json(PredictionResponse {
        prediction,
        summary,
        stats,
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/period-data/prediction", get(get_prediction))
        .with_state(state)
}
