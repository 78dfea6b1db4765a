//! Persistence ports.
//!
//! The composition root picks an implementation: [`PgStore`] for a running
//! service, [`MemoryStore`] for tests and local experiments.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CycleObservation, CycleSettings, EmergencyContact, NewAlert, NewContact, NewObservation,
    SafetyAlert, UserProfile, UserRef,
};

#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Insert, or replace the observation already stored for the same user and day.
    async fn upsert(&self, observation: NewObservation) -> Result<CycleObservation, StoreError>;

    /// Newest first. `None` returns the full history.
    async fn list_for_user(
        &self,
        user: &UserRef,
        limit: Option<i64>,
    ) -> Result<Vec<CycleObservation>, StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn cycle_settings(&self, user: &UserRef) -> Result<Option<CycleSettings>, StoreError>;

    /// Replaces both lengths. Callers merge partial updates first.
    async fn save_cycle_settings(
        &self,
        user: &UserRef,
        typical_cycle_length: Option<i64>,
        typical_period_length: Option<i64>,
    ) -> Result<CycleSettings, StoreError>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn insert(&self, contact: NewContact) -> Result<EmergencyContact, StoreError>;

    async fn list_for_user(&self, user: &UserRef) -> Result<Vec<EmergencyContact>, StoreError>;

    /// Deletes only when `owner` owns the contact. Returns whether a row went away.
    async fn delete(&self, id: Uuid, owner: &UserRef) -> Result<bool, StoreError>;

    /// Only `owner`'s contacts are returned. Ids that do not parse, do not
    /// exist or belong to someone else are simply absent from the result.
    async fn find_by_ids(&self, owner: &UserRef, ids: &[String]) -> Result<Vec<EmergencyContact>, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Stores the alert with status `active`.
    async fn insert(&self, alert: NewAlert) -> Result<SafetyAlert, StoreError>;

    /// Newest first by alert timestamp.
    async fn list_for_user(&self, user: &UserRef) -> Result<Vec<SafetyAlert>, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks the identifier up as an email address first, then as a user id.
    async fn find_user(&self, identifier: &str) -> Result<Option<UserProfile>, StoreError>;
}

/// Parses the contact ids that look like ids, dropping the rest.
pub(crate) fn parse_ids(ids: &[String]) -> Vec<Uuid> {
    ids.iter()
        .filter_map(|raw| Uuid::parse_str(raw.trim()).ok())
        .collect()
}
