//! In-memory store for tests and local runs.
//!
//! Implements every persistence port over plain collections behind a
//! `tokio::sync::RwLock`. Writes can be made to fail on demand so callers can
//! exercise their persistence-failure paths.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{parse_ids, AlertStore, ContactStore, ObservationStore, SettingsStore, UserDirectory};
use crate::error::StoreError;
use crate::models::{
    AlertStatus, CycleObservation, CycleSettings, EmergencyContact, NewAlert, NewContact,
    NewObservation, SafetyAlert, UserProfile, UserRef,
};

#[derive(Default)]
struct Tables {
    observations: HashMap<(UserRef, NaiveDate), CycleObservation>,
    settings: HashMap<UserRef, CycleSettings>,
    contacts: Vec<EmergencyContact>,
    alerts: Vec<SafetyAlert>,
    users: Vec<UserProfile>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: UserProfile) {
        self.tables.write().await.users.push(user);
    }

    /// While set, every write returns [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn upsert(&self, observation: NewObservation) -> Result<CycleObservation, StoreError> {
        self.check_writable()?;
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let key = (observation.user_id.clone(), observation.date);

        let (id, created_at) = tables
            .observations
            .get(&key)
            .map(|existing| (existing.id, existing.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));

        let stored = CycleObservation {
            id,
            user_id: observation.user_id,
            date: observation.date,
            period_start: observation.period_start,
            period_end: observation.period_end,
            flow: observation.flow,
            symptoms: observation.symptoms,
            mood: observation.mood,
            notes: observation.notes,
            created_at,
            updated_at: now,
        };
        tables.observations.insert(key, stored.clone());
        Ok(stored)
    }

    async fn list_for_user(
        &self,
        user: &UserRef,
        limit: Option<i64>,
    ) -> Result<Vec<CycleObservation>, StoreError> {
        let tables = self.tables.read().await;
        let mut found: Vec<CycleObservation> = tables
            .observations
            .values()
            .filter(|o| &o.user_id == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date));
        if let Some(limit) = limit {
            found.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }
        Ok(found)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn cycle_settings(&self, user: &UserRef) -> Result<Option<CycleSettings>, StoreError> {
        Ok(self.tables.read().await.settings.get(user).cloned())
    }

    async fn save_cycle_settings(
        &self,
        user: &UserRef,
        typical_cycle_length: Option<i64>,
        typical_period_length: Option<i64>,
    ) -> Result<CycleSettings, StoreError> {
        self.check_writable()?;
        let settings = CycleSettings {
            user_id: user.clone(),
            typical_cycle_length,
            typical_period_length,
            updated_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .settings
            .insert(user.clone(), settings.clone());
        Ok(settings)
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn insert(&self, contact: NewContact) -> Result<EmergencyContact, StoreError> {
        self.check_writable()?;
        let stored = EmergencyContact {
            id: Uuid::new_v4(),
            user_id: contact.user_id,
            name: contact.name,
            relationship: contact.relationship,
            phone_number: contact.phone_number,
            email: contact.email,
            is_emergency_contact: contact.is_emergency_contact,
            created_at: Utc::now(),
        };
        self.tables.write().await.contacts.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_user(&self, user: &UserRef) -> Result<Vec<EmergencyContact>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .filter(|c| &c.user_id == user)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid, owner: &UserRef) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let before = tables.contacts.len();
        tables
            .contacts
            .retain(|c| !(c.id == id && &c.user_id == owner));
        Ok(tables.contacts.len() < before)
    }

    async fn find_by_ids(&self, owner: &UserRef, ids: &[String]) -> Result<Vec<EmergencyContact>, StoreError> {
        let wanted = parse_ids(ids);
        Ok(self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .filter(|c| &c.user_id == owner && wanted.contains(&c.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert(&self, alert: NewAlert) -> Result<SafetyAlert, StoreError> {
        self.check_writable()?;
        let stored = SafetyAlert {
            id: Uuid::new_v4(),
            user_id: alert.user_id,
            timestamp: alert.timestamp,
            location: alert.location,
            alert_type: alert.alert_type,
            status: AlertStatus::Active,
            contacts_notified: alert.contacts_notified,
            notes: alert.notes,
            created_at: Utc::now(),
        };
        self.tables.write().await.alerts.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_user(&self, user: &UserRef) -> Result<Vec<SafetyAlert>, StoreError> {
        let mut found: Vec<SafetyAlert> = self
            .tables
            .read()
            .await
            .alerts
            .iter()
            .filter(|a| &a.user_id == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(found)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, identifier: &str) -> Result<Option<UserProfile>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.email == identifier)
            .or_else(|| tables.users.iter().find(|u| u.id == identifier))
            .cloned())
    }
}
