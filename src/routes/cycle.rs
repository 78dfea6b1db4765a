use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{resolve_user, Identity};
use crate::error::ApiError;
use crate::models::{parse_day, tag_set, CycleObservation, CycleSettings, Flow, NewObservation, UserRef};
use crate::AppState;

const DEFAULT_LIST_LIMIT: i64 = 30;
const MAX_LIST_LIMIT: i64 = 365;
const CYCLE_LENGTH_RANGE: std::ops::RangeInclusive<i64> = 15..=60;
const PERIOD_LENGTH_RANGE: std::ops::RangeInclusive<i64> = 1..=15;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationBody {
    pub user_id: Option<String>,
    pub date: Option<String>,
    #[serde(default)]
    pub period_start: bool,
    #[serde(default)]
    pub period_end: bool,
    pub flow: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub mood: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousCycleBody {
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub typical_cycle_length: Option<i64>,
    pub typical_period_length: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBody {
    pub user_id: Option<String>,
    pub typical_cycle_length: Option<i64>,
    pub typical_period_length: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub user_id: UserRef,
    pub typical_cycle_length: Option<i64>,
    pub typical_period_length: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SettingsView {
    fn unset(user_id: UserRef) -> Self {
        Self {
            user_id,
            typical_cycle_length: None,
            typical_period_length: None,
            updated_at: None,
        }
    }
}

impl From<CycleSettings> for SettingsView {
    fn from(s: CycleSettings) -> Self {
        Self {
            user_id: s.user_id,
            typical_cycle_length: s.typical_cycle_length,
            typical_period_length: s.typical_period_length,
            updated_at: Some(s.updated_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousCycleResponse {
    pub start: CycleObservation,
    pub end: Option<CycleObservation>,
    pub settings: SettingsView,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/period-data", get(list_period_data).post(save_period_data))
        .route("/api/period-data/previous-cycle", post(save_previous_cycle))
        .route("/api/period-data/settings", get(get_settings).put(put_settings))
        .with_state(state)
}

fn required_day(raw: Option<&str>, field: &str) -> Result<NaiveDate, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{field} is required")))?;
    parse_day(raw).ok_or_else(|| ApiError::validation(format!("Invalid {field}: {raw}")))
}

fn parse_flow(raw: Option<&str>) -> Result<Option<Flow>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Flow::parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::validation(format!("Invalid flow: {value}"))),
    }
}

fn check_range(
    value: Option<i64>,
    range: &std::ops::RangeInclusive<i64>,
    field: &str,
) -> Result<Option<i64>, ApiError> {
    match value {
        Some(v) if !range.contains(&v) => Err(ApiError::validation(format!(
            "{field} must be between {} and {}",
            range.start(),
            range.end()
        ))),
        _ => Ok(value),
    }
}

async fn list_period_data(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CycleObservation>>, ApiError> {
    let user = resolve_user(identity.as_deref(), query.user_id.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(ApiError::validation(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }

    let observations = state
        .observations
        .list_for_user(&user, Some(limit))
        .await
        .map_err(ApiError::store("Failed to fetch period data"))?;

    Ok(Json(observations))
}

async fn save_period_data(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(body): Json<ObservationBody>,
) -> Result<(StatusCode, Json<CycleObservation>), ApiError> {
    let user = resolve_user(identity.as_deref(), body.user_id.as_deref())?;
    let date = required_day(body.date.as_deref(), "date")?;

    let observation = NewObservation {
        user_id: user,
        date,
        period_start: body.period_start,
        period_end: body.period_end,
        flow: parse_flow(body.flow.as_deref())?,
        symptoms: tag_set(body.symptoms),
        mood: tag_set(body.mood),
        notes: body.notes.trim().to_string(),
    };

    let stored = state
        .observations
        .upsert(observation)
        .await
        .map_err(ApiError::store("Failed to save period data"))?;

    tracing::info!(user = %stored.user_id, date = %stored.date, "📅 Period data saved");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Onboarding: records the last known period and the user's typical lengths.
async fn save_previous_cycle(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(body): Json<PreviousCycleBody>,
) -> Result<(StatusCode, Json<PreviousCycleResponse>), ApiError> {
    let user = resolve_user(identity.as_deref(), body.user_id.as_deref())?;
    let start_date = required_day(body.start_date.as_deref(), "startDate")?;
    let end_date = match body.end_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(_) => Some(required_day(body.end_date.as_deref(), "endDate")?),
    };
    if end_date.is_some_and(|end| end < start_date) {
        return Err(ApiError::validation("endDate must not be before startDate"));
    }
    let cycle_length = check_range(body.typical_cycle_length, &CYCLE_LENGTH_RANGE, "typicalCycleLength")?;
    let period_length =
        check_range(body.typical_period_length, &PERIOD_LENGTH_RANGE, "typicalPeriodLength")?;

    let mut start = NewObservation::new(user.clone(), start_date);
    start.period_start = true;
    start.flow = Some(Flow::Medium);
    start.symptoms = tag_set(body.symptoms);
    start.notes = "Initial period start data".to_string();
    let start = state
        .observations
        .upsert(start)
        .await
        .map_err(ApiError::store("Failed to save period data"))?;

    let end = match end_date {
        Some(end_date) => {
            let mut end = NewObservation::new(user.clone(), end_date);
            end.period_end = true;
            end.flow = Some(Flow::Light);
            end.notes = "Initial period end data".to_string();
            Some(
                state
                    .observations
                    .upsert(end)
                    .await
                    .map_err(ApiError::store("Failed to save period data"))?,
            )
        }
        None => None,
    };

    let settings = if cycle_length.is_some() || period_length.is_some() {
        merge_settings(&state, &user, cycle_length, period_length).await?
    } else {
        current_settings(&state, &user).await?
    };

    tracing::info!(user = %user, start = %start_date, "🩸 Previous cycle recorded");
    Ok((
        StatusCode::CREATED,
        Json(PreviousCycleResponse { start, end, settings }),
    ))
}

async fn current_settings(state: &AppState, user: &UserRef) -> Result<SettingsView, ApiError> {
    let settings = state
        .settings
        .cycle_settings(user)
        .await
        .map_err(ApiError::store("Failed to fetch cycle settings"))?;
    Ok(settings
        .map(SettingsView::from)
        .unwrap_or_else(|| SettingsView::unset(user.clone())))
}

/// Lengths left out of a request keep their stored value.
async fn merge_settings(
    state: &AppState,
    user: &UserRef,
    cycle_length: Option<i64>,
    period_length: Option<i64>,
) -> Result<SettingsView, ApiError> {
    let existing = state
        .settings
        .cycle_settings(user)
        .await
        .map_err(ApiError::store("Failed to fetch cycle settings"))?;
    let (stored_cycle, stored_period) = existing
        .map(|s| (s.typical_cycle_length, s.typical_period_length))
        .unwrap_or_default();

    let saved = state
        .settings
        .save_cycle_settings(user, cycle_length.or(stored_cycle), period_length.or(stored_period))
        .await
        .map_err(ApiError::store("Failed to save cycle settings"))?;
    Ok(saved.into())
}

async fn get_settings(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Query(query): Query<super::UserQuery>,
) -> Result<Json<SettingsView>, ApiError> {
    let user = resolve_user(identity.as_deref(), query.user_id.as_deref())?;
    Ok(Json(current_settings(&state, &user).await?))
}

async fn put_settings(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(body): Json<SettingsBody>,
) -> Result<Json<SettingsView>, ApiError> {
    let user = resolve_user(identity.as_deref(), body.user_id.as_deref())?;
    let cycle_length = check_range(body.typical_cycle_length, &CYCLE_LENGTH_RANGE, "typicalCycleLength")?;
    let period_length =
        check_range(body.typical_period_length, &PERIOD_LENGTH_RANGE, "typicalPeriodLength")?;

    Ok(Json(merge_settings(&state, &user, cycle_length, period_length).await?))
}
