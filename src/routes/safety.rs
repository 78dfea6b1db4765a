use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{resolve_user, Identity};
use crate::error::ApiError;
use crate::models::{AlertType, EmergencyContact, Location, NewAlert, NewContact, SafetyAlert};
use crate::AppState;

use super::UserQuery;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactBody {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub relationship: Option<String>,
    #[serde(alias = "phone")]
    pub phone_number: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub is_emergency_contact: bool,
}

/// Accepts both `{lat, lng}` and `{latitude, longitude}`.
#[derive(Deserialize, Default)]
pub struct LocationBody {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertBody {
    pub user_id: Option<String>,
    pub timestamp: Option<String>,
    pub location: Option<LocationBody>,
    pub alert_type: Option<String>,
    #[serde(default)]
    pub contacts_notified: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertRequest {
    pub alert: AlertBody,
    #[serde(default = "send_email_default")]
    pub send_email: bool,
}

fn send_email_default() -> bool {
    true
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/safety/contacts", get(list_contacts).post(create_contact))
        .route("/api/safety/contacts/:id", delete(delete_contact))
        .route("/api/safety/alerts", get(list_alerts).post(create_alert))
        .with_state(state)
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{field} is required")))
}

impl LocationBody {
    /// Both coordinates or neither; a half-filled location is rejected.
    fn into_location(self) -> Result<Option<Location>, ApiError> {
        let latitude = self.latitude.or(self.lat);
        let longitude = self.longitude.or(self.lng);

        match (latitude, longitude) {
            (None, None) => Ok(None),
            (Some(latitude), Some(longitude)) => {
                if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                    return Err(ApiError::validation("Location coordinates out of range"));
                }
                Ok(Some(Location {
                    latitude,
                    longitude,
                    address: self
                        .address
                        .map(|a| a.trim().to_string())
                        .filter(|a| !a.is_empty()),
                }))
            }
            _ => Err(ApiError::validation(
                "Location needs both latitude and longitude",
            )),
        }
    }
}

impl AlertBody {
    fn into_new_alert(self, identity: Option<&Identity>) -> Result<NewAlert, ApiError> {
        let user_id = resolve_user(identity, self.user_id.as_deref())?;
        let alert_type = match self.alert_type.as_deref().map(str::trim) {
            None | Some("") => return Err(ApiError::validation("alertType is required")),
            Some(raw) => AlertType::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("Invalid alertType: {raw}")))?,
        };
        let timestamp = match self.timestamp.as_deref().map(str::trim) {
            None | Some("") => Utc::now(),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| ApiError::validation(format!("Invalid timestamp: {raw}")))?,
        };
        let location = self
            .location
            .map(LocationBody::into_location)
            .transpose()?
            .flatten();

        Ok(NewAlert {
            user_id,
            timestamp,
            location,
            alert_type,
            contacts_notified: self.contacts_notified,
            notes: self.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        })
    }
}

async fn list_contacts(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<EmergencyContact>>, ApiError> {
    let user = resolve_user(identity.as_deref(), query.user_id.as_deref())?;
    let contacts = state
        .contacts
        .list_for_user(&user)
        .await
        .map_err(ApiError::store("Failed to fetch safety contacts"))?;
    Ok(Json(contacts))
}

async fn create_contact(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(body): Json<ContactBody>,
) -> Result<(StatusCode, Json<EmergencyContact>), ApiError> {
    let user = resolve_user(identity.as_deref(), body.user_id.as_deref())?;
    let email = required_text(body.email, "email")?;
    if !email.contains('@') {
        return Err(ApiError::validation(format!("Invalid email: {email}")));
    }

    let contact = NewContact {
        user_id: user,
        name: required_text(body.name, "name")?,
        relationship: required_text(body.relationship, "relationship")?,
        phone_number: required_text(body.phone_number, "phoneNumber")?,
        email,
        is_emergency_contact: body.is_emergency_contact,
    };

    let stored = state
        .contacts
        .insert(contact)
        .await
        .map_err(ApiError::store("Failed to create safety contact"))?;

    tracing::info!(user = %stored.user_id, contact_id = %stored.id, "👥 Safety contact created");
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn delete_contact(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = resolve_user(identity.as_deref(), query.user_id.as_deref())?;
    let not_found = || ApiError::NotFound("Contact not found".to_string());
    let id = Uuid::parse_str(id.trim()).map_err(|_| not_found())?;

    let deleted = state
        .contacts
        .delete(id, &user)
        .await
        .map_err(ApiError::store("Failed to delete safety contact"))?;
    if !deleted {
        return Err(not_found());
    }

    tracing::info!(user = %user, contact_id = %id, "🗑️ Safety contact deleted");
    Ok(Json(json!({ "message": "Contact deleted successfully" })))
}

async fn list_alerts(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<SafetyAlert>>, ApiError> {
    let user = resolve_user(identity.as_deref(), query.user_id.as_deref())?;
    let alerts = state
        .alerts
        .list_for_user(&user)
        .await
        .map_err(ApiError::store("Failed to fetch safety alerts"))?;
    Ok(Json(alerts))
}

async fn create_alert(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(body): Json<CreateAlertRequest>,
) -> Response {
    tracing::info!("🚨 Safety alert requested");

    let submitted = match body.alert.into_new_alert(identity.as_deref()) {
        Ok(alert) => state
            .dispatcher
            .submit(alert, body.send_email)
            .await
            .map_err(ApiError::store("Failed to create alert")),
        Err(e) => Err(e),
    };

    match submitted {
        Ok(alert) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "Safety alert created successfully",
                "data": alert,
            })),
        )
            .into_response(),
        Err(e) => {
            if let ApiError::Store { source, .. } = &e {
                tracing::error!("❌ Error creating safety alert: {}", source);
            }
            (
                e.status(),
                Json(json!({
                    "success": false,
                    "message": "Failed to create alert",
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
