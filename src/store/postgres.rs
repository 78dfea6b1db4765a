use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{parse_ids, AlertStore, ContactStore, ObservationStore, SettingsStore, UserDirectory};
use crate::error::StoreError;
use crate::models::{
    AlertStatus, AlertType, CycleObservation, CycleSettings, EmergencyContact, Flow, Location,
    NewAlert, NewContact, NewObservation, SafetyAlert, UserProfile, UserRef,
};

/// PostgreSQL-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ObservationRow {
    id: Uuid,
    user_id: String,
    observed_on: NaiveDate,
    period_start: bool,
    period_end: bool,
    flow: Option<String>,
    symptoms: Vec<String>,
    mood: Vec<String>,
    notes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ObservationRow> for CycleObservation {
    type Error = StoreError;

    fn try_from(row: ObservationRow) -> Result<Self, Self::Error> {
        let flow = match row.flow.as_deref() {
            None => None,
            Some(raw) => Some(
                Flow::parse(raw)
                    .ok_or_else(|| StoreError::corrupt("observation", format!("flow {raw:?}")))?,
            ),
        };
        Ok(CycleObservation {
            id: row.id,
            user_id: user_ref("observation", &row.user_id)?,
            date: row.observed_on,
            period_start: row.period_start,
            period_end: row.period_end,
            flow,
            symptoms: row.symptoms,
            mood: row.mood,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    user_id: String,
    typical_cycle_length: Option<i64>,
    typical_period_length: Option<i64>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    user_id: String,
    name: String,
    relationship: String,
    phone_number: String,
    email: String,
    is_emergency_contact: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContactRow> for EmergencyContact {
    type Error = StoreError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        Ok(EmergencyContact {
            id: row.id,
            user_id: user_ref("contact", &row.user_id)?,
            name: row.name,
            relationship: row.relationship,
            phone_number: row.phone_number,
            email: row.email,
            is_emergency_contact: row.is_emergency_contact,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    user_id: String,
    triggered_at: DateTime<Utc>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<String>,
    alert_type: String,
    status: String,
    contacts_notified: Vec<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for SafetyAlert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let alert_type = AlertType::parse(&row.alert_type)
            .ok_or_else(|| StoreError::corrupt("alert", format!("type {:?}", row.alert_type)))?;
        let status = AlertStatus::parse(&row.status)
            .ok_or_else(|| StoreError::corrupt("alert", format!("status {:?}", row.status)))?;
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
                address: row.address,
            }),
            _ => None,
        };
        Ok(SafetyAlert {
            id: row.id,
            user_id: user_ref("alert", &row.user_id)?,
            timestamp: row.triggered_at,
            location,
            alert_type,
            status,
            contacts_notified: row.contacts_notified,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

fn user_ref(entity: &'static str, raw: &str) -> Result<UserRef, StoreError> {
    UserRef::parse(raw).ok_or_else(|| StoreError::corrupt(entity, "blank user_id"))
}

const OBSERVATION_COLUMNS: &str = "id, user_id, observed_on, period_start, period_end, flow, \
     symptoms, mood, notes, created_at, updated_at";

const CONTACT_COLUMNS: &str = "id, user_id, name, relationship, phone_number, email, \
     is_emergency_contact, created_at";

const ALERT_COLUMNS: &str = "id, user_id, triggered_at, latitude, longitude, address, \
     alert_type, status, contacts_notified, notes, created_at";

#[async_trait]
impl ObservationStore for PgStore {
    async fn upsert(&self, observation: NewObservation) -> Result<CycleObservation, StoreError> {
        let now = Utc::now();
        let row: ObservationRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO cycle_observations
                (id, user_id, observed_on, period_start, period_end, flow,
                 symptoms, mood, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            ON CONFLICT (user_id, observed_on) DO UPDATE SET
                period_start = EXCLUDED.period_start,
                period_end = EXCLUDED.period_end,
                flow = EXCLUDED.flow,
                symptoms = EXCLUDED.symptoms,
                mood = EXCLUDED.mood,
                notes = EXCLUDED.notes,
                updated_at = EXCLUDED.updated_at
            RETURNING {OBSERVATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(observation.user_id.as_str())
        .bind(observation.date)
        .bind(observation.period_start)
        .bind(observation.period_end)
        .bind(observation.flow.map(|f| f.as_str()))
        .bind(&observation.symptoms)
        .bind(&observation.mood)
        .bind(&observation.notes)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_for_user(
        &self,
        user: &UserRef,
        limit: Option<i64>,
    ) -> Result<Vec<CycleObservation>, StoreError> {
        let rows: Vec<ObservationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {OBSERVATION_COLUMNS}
            FROM cycle_observations
            WHERE user_id = $1
            ORDER BY observed_on DESC
            LIMIT $2
            "#
        ))
        .bind(user.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn cycle_settings(&self, user: &UserRef) -> Result<Option<CycleSettings>, StoreError> {
        let row: Option<SettingsRow> = sqlx::query_as(
            r#"
            SELECT user_id, typical_cycle_length, typical_period_length, updated_at
            FROM cycle_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(CycleSettings {
                user_id: user_ref("settings", &r.user_id)?,
                typical_cycle_length: r.typical_cycle_length,
                typical_period_length: r.typical_period_length,
                updated_at: r.updated_at,
            })
        })
        .transpose()
    }

    async fn save_cycle_settings(
        &self,
        user: &UserRef,
        typical_cycle_length: Option<i64>,
        typical_period_length: Option<i64>,
    ) -> Result<CycleSettings, StoreError> {
        let row: SettingsRow = sqlx::query_as(
            r#"
            INSERT INTO cycle_settings (user_id, typical_cycle_length, typical_period_length, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                typical_cycle_length = EXCLUDED.typical_cycle_length,
                typical_period_length = EXCLUDED.typical_period_length,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, typical_cycle_length, typical_period_length, updated_at
            "#,
        )
        .bind(user.as_str())
        .bind(typical_cycle_length)
        .bind(typical_period_length)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(CycleSettings {
            user_id: user_ref("settings", &row.user_id)?,
            typical_cycle_length: row.typical_cycle_length,
            typical_period_length: row.typical_period_length,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ContactStore for PgStore {
    async fn insert(&self, contact: NewContact) -> Result<EmergencyContact, StoreError> {
        let row: ContactRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO emergency_contacts
                (id, user_id, name, relationship, phone_number, email, is_emergency_contact, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(contact.user_id.as_str())
        .bind(&contact.name)
        .bind(&contact.relationship)
        .bind(&contact.phone_number)
        .bind(&contact.email)
        .bind(contact.is_emergency_contact)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_for_user(&self, user: &UserRef) -> Result<Vec<EmergencyContact>, StoreError> {
        let rows: Vec<ContactRow> = sqlx::query_as(&format!(
            "SELECT {CONTACT_COLUMNS} FROM emergency_contacts WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete(&self, id: Uuid, owner: &UserRef) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM emergency_contacts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_ids(&self, owner: &UserRef, ids: &[String]) -> Result<Vec<EmergencyContact>, StoreError> {
        let ids = parse_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<ContactRow> = sqlx::query_as(&format!(
            "SELECT {CONTACT_COLUMNS} FROM emergency_contacts WHERE id = ANY($1) AND user_id = $2"
        ))
        .bind(&ids)
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn insert(&self, alert: NewAlert) -> Result<SafetyAlert, StoreError> {
        let (latitude, longitude, address) = match &alert.location {
            Some(l) => (Some(l.latitude), Some(l.longitude), l.address.clone()),
            None => (None, None, None),
        };

        let row: AlertRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO safety_alerts
                (id, user_id, triggered_at, latitude, longitude, address,
                 alert_type, status, contacts_notified, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(alert.user_id.as_str())
        .bind(alert.timestamp)
        .bind(latitude)
        .bind(longitude)
        .bind(address)
        .bind(alert.alert_type.as_str())
        .bind(AlertStatus::Active.as_str())
        .bind(&alert.contacts_notified)
        .bind(&alert.notes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_for_user(&self, user: &UserRef) -> Result<Vec<SafetyAlert>, StoreError> {
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM safety_alerts WHERE user_id = $1 ORDER BY triggered_at DESC"
        ))
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user(&self, identifier: &str) -> Result<Option<UserProfile>, StoreError> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT id::text, name, email
            FROM users
            WHERE email = $1 OR id::text = $1
            ORDER BY (email = $1) DESC
            LIMIT 1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, name, email)| UserProfile { id, name, email }))
    }
}
