use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Reference to the user that owns a record.
///
/// Canonically the user's email address; clients have always sent the email
/// as `userId`, and the display-name lookup matches it against the user store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRef(String);

impl UserRef {
    /// Trims the raw value; blank input is not a user reference.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    Light,
    Medium,
    Heavy,
}

impl Flow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::Light => "light",
            Flow::Medium => "medium",
            Flow::Heavy => "heavy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "light" => Some(Flow::Light),
            "medium" => Some(Flow::Medium),
            "heavy" => Some(Flow::Heavy),
            _ => None,
        }
    }
}

/// One tracked day for one user. At most one exists per user and calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleObservation {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: UserRef,
    pub date: NaiveDate,
    pub period_start: bool,
    pub period_end: bool,
    pub flow: Option<Flow>,
    pub symptoms: Vec<String>,
    pub mood: Vec<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated observation write. Saving it replaces whatever the user
/// already logged for `date`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation {
    pub user_id: UserRef,
    pub date: NaiveDate,
    pub period_start: bool,
    pub period_end: bool,
    pub flow: Option<Flow>,
    pub symptoms: Vec<String>,
    pub mood: Vec<String>,
    pub notes: String,
}

impl NewObservation {
    pub fn new(user_id: UserRef, date: NaiveDate) -> Self {
        Self {
            user_id,
            date,
            period_start: false,
            period_end: false,
            flow: None,
            symptoms: Vec::new(),
            mood: Vec::new(),
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSettings {
    pub user_id: UserRef,
    pub typical_cycle_length: Option<i64>,
    pub typical_period_length: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: UserRef,
    pub name: String,
    pub relationship: String,
    pub phone_number: String,
    pub email: String,
    pub is_emergency_contact: bool,
    pub created_at: DateTime<Utc>,
}

impl EmergencyContact {
    /// The address to notify, if it looks deliverable at all.
    pub fn usable_email(&self) -> Option<&str> {
        let email = self.email.trim();
        if email.contains('@') {
            Some(email)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewContact {
    pub user_id: UserRef,
    pub name: String,
    pub relationship: String,
    pub phone_number: String,
    pub email: String,
    pub is_emergency_contact: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    pub fn map_link(&self) -> String {
        format!("https://maps.google.com/?q={},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertType {
    Emergency,
    CheckIn,
    Test,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Emergency => "emergency",
            AlertType::CheckIn => "check-in",
            AlertType::Test => "test",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "emergency" => Some(AlertType::Emergency),
            "check-in" => Some(AlertType::CheckIn),
            "test" => Some(AlertType::Test),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertStatus {
    Active,
    Resolved,
    FalseAlarm,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
            AlertStatus::FalseAlarm => "false-alarm",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(AlertStatus::Active),
            "resolved" => Some(AlertStatus::Resolved),
            "false-alarm" => Some(AlertStatus::FalseAlarm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAlert {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: UserRef,
    pub timestamp: DateTime<Utc>,
    pub location: Option<Location>,
    pub alert_type: AlertType,
    pub status: AlertStatus,
    /// Contact ids the caller asked to notify, as given. Not a delivery record.
    pub contacts_notified: Vec<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub user_id: UserRef,
    pub timestamp: DateTime<Utc>,
    pub location: Option<Location>,
    pub alert_type: AlertType,
    pub contacts_notified: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl UserProfile {
    pub fn display_name(&self) -> Option<&str> {
        [self.name.trim(), self.email.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FertileWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclePrediction {
    pub average_cycle_length: i64,
    pub last_period_start: NaiveDate,
    pub next_period_prediction: NaiveDate,
    pub fertile_window: FertileWindow,
    pub period_days: Vec<NaiveDate>,
    pub fertile_days: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub cycle_day: i64,
    pub days_until_next_period: i64,
    pub in_fertile_window: bool,
    pub cycle_progress: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStats {
    pub period_starts: usize,
    pub cycle_lengths: Vec<i64>,
    pub shortest_cycle: Option<i64>,
    pub longest_cycle: Option<i64>,
}

/// Accepts a plain `YYYY-MM-DD` day or an RFC 3339 timestamp, keeping only the day.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Trims tags, drops blanks and repeats, keeps first-seen order.
pub fn tag_set(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
