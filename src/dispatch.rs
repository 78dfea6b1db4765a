//! Safety alert dispatch.
//!
//! An alert is stored first. Only then are the requested contacts emailed, on
//! a best-effort basis: lookup misses, missing credentials and failed sends
//! are logged and counted in a [`DispatchReport`], never returned to the
//! caller. The stored alert is the result either way.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{EmergencyContact, NewAlert, SafetyAlert, UserRef};
use crate::notify::{EmailMessage, NotifyError, Notifier};
use crate::store::{parse_ids, AlertStore, ContactStore, UserDirectory};

const DEFAULT_NOTES: &str = "No additional details provided.";
const WINDOW_ELAPSED: &str = "dispatch window elapsed";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub sender_name: String,
    pub send_timeout: Duration,
    /// Bound on the whole notification phase for one alert, counted from the
    /// moment the alert is stored. Lookups and verification spend from it too.
    pub window: Duration,
    pub max_concurrency: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            sender_name: "Safety Alert System".to_string(),
            send_timeout: Duration::from_secs(10),
            window: Duration::from_secs(20),
            max_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Disabled,
    MissingCredentials,
    NoContacts,
    VerificationFailed,
    WindowElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent { message_id: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub contact_id: Uuid,
    pub address: String,
    pub status: DeliveryStatus,
}

/// What happened to the notifications for one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub alert_id: Uuid,
    pub requested: usize,
    pub resolved: usize,
    pub missing: usize,
    pub without_email: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: Option<SkipReason>,
    pub outcomes: Vec<RecipientOutcome>,
}

impl DispatchReport {
    fn new(alert: &SafetyAlert) -> Self {
        Self {
            alert_id: alert.id,
            requested: alert.contacts_notified.len(),
            resolved: 0,
            missing: 0,
            without_email: 0,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: None,
            outcomes: Vec::new(),
        }
    }

    fn skip(mut self, reason: SkipReason) -> Self {
        self.skipped = Some(reason);
        self
    }
}

/// Receives the report of every dispatch.
pub trait DispatchObserver: Send + Sync {
    fn record(&self, report: &DispatchReport);
}

/// Writes each report as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn record(&self, report: &DispatchReport) {
        if let Some(reason) = report.skipped {
            tracing::info!(
                alert_id = %report.alert_id,
                requested = report.requested,
                resolved = report.resolved,
                reason = ?reason,
                "Alert notifications skipped"
            );
            return;
        }

        for outcome in &report.outcomes {
            if let DeliveryStatus::Failed { reason } = &outcome.status {
                tracing::warn!(
                    alert_id = %report.alert_id,
                    contact_id = %outcome.contact_id,
                    recipient = %outcome.address,
                    reason = %reason,
                    "❌ Failed to send alert email"
                );
            }
        }

        tracing::info!(
            alert_id = %report.alert_id,
            requested = report.requested,
            resolved = report.resolved,
            missing = report.missing,
            without_email = report.without_email,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "📧 Alert email dispatch complete: {}/{} sent",
            report.succeeded,
            report.attempted
        );
    }
}

pub struct AlertDispatcher {
    alerts: Arc<dyn AlertStore>,
    contacts: Arc<dyn ContactStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Option<Arc<dyn Notifier>>,
    observer: Arc<dyn DispatchObserver>,
    settings: DispatchSettings,
    verified: AtomicBool,
}

impl AlertDispatcher {
    /// `notifier` is `None` when no email credentials are configured.
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        contacts: Arc<dyn ContactStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Option<Arc<dyn Notifier>>,
        observer: Arc<dyn DispatchObserver>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            alerts,
            contacts,
            users,
            notifier,
            observer,
            settings,
            verified: AtomicBool::new(false),
        }
    }

    /// Store the alert, then notify its contacts if `send_email` is set.
    ///
    /// Only a storage failure is an error; nothing is sent in that case.
    pub async fn submit(&self, alert: NewAlert, send_email: bool) -> Result<SafetyAlert, StoreError> {
        let stored = self.alerts.insert(alert).await?;
        tracing::info!(
            alert_id = %stored.id,
            user = %stored.user_id,
            alert_type = stored.alert_type.as_str(),
            "✅ Alert saved"
        );

        let deadline = Instant::now() + self.settings.window;
        let report = self.notify_contacts(&stored, send_email, deadline).await;
        self.observer.record(&report);

        Ok(stored)
    }

    async fn notify_contacts(
        &self,
        alert: &SafetyAlert,
        send_email: bool,
        deadline: Instant,
    ) -> DispatchReport {
        let mut report = DispatchReport::new(alert);

        if !send_email {
            return report.skip(SkipReason::Disabled);
        }
        let Some(notifier) = self.notifier.as_deref() else {
            tracing::warn!(alert_id = %alert.id, "❗ Email credentials missing, not notifying contacts");
            return report.skip(SkipReason::MissingCredentials);
        };

        let lookup = self.contacts.find_by_ids(&alert.user_id, &alert.contacts_notified);
        let contacts = match timeout_at(deadline, lookup).await {
            Ok(Ok(contacts)) => contacts,
            Ok(Err(e)) => {
                tracing::error!(alert_id = %alert.id, "❌ Error fetching contacts: {}", e);
                Vec::new()
            }
            Err(_) => {
                tracing::error!(alert_id = %alert.id, "❌ Contact lookup outlasted the dispatch window");
                return report.skip(SkipReason::WindowElapsed);
            }
        };
        report.resolved = contacts.len();
        report.missing = count_missing(&alert.contacts_notified, &contacts);
        if contacts.is_empty() {
            return report.skip(SkipReason::NoContacts);
        }

        if let Err(e) = self.ensure_verified(notifier, deadline).await {
            tracing::error!(alert_id = %alert.id, "❌ Email verification failed: {}", e);
            return report.skip(SkipReason::VerificationFailed);
        }

        let from = match timeout_at(deadline, self.display_name(&alert.user_id)).await {
            Ok(name) => name,
            Err(_) => alert.user_id.to_string(),
        };

        let (reachable, unreachable): (Vec<&EmergencyContact>, Vec<&EmergencyContact>) =
            contacts.iter().partition(|c| c.usable_email().is_some());
        for contact in &unreachable {
            tracing::info!(contact_id = %contact.id, "⚠️ Contact has no email address");
        }
        report.without_email = unreachable.len();
        report.attempted = reachable.len();

        let messages: Vec<(Uuid, EmailMessage)> = reachable
            .iter()
            .map(|c| {
                (
                    c.id,
                    render_message(alert, c, &from, &self.settings.sender_name, notifier.sender_address()),
                )
            })
            .collect();

        let send_timeout = self.settings.send_timeout;
        let mut outcomes: Vec<RecipientOutcome> = stream::iter(messages)
            .map(|(contact_id, message)| async move {
                let status = match tokio::time::timeout(send_timeout, notifier.send(&message)).await {
                    Ok(Ok(message_id)) => DeliveryStatus::Sent { message_id },
                    Ok(Err(e)) => DeliveryStatus::Failed { reason: e.to_string() },
                    Err(_) => DeliveryStatus::Failed {
                        reason: NotifyError::Timeout(send_timeout).to_string(),
                    },
                };
                RecipientOutcome {
                    contact_id,
                    address: message.to_address,
                    status,
                }
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .take_until(sleep_until(deadline))
            .collect()
            .await;

        let finished: HashSet<Uuid> = outcomes.iter().map(|o| o.contact_id).collect();
        for contact in reachable.iter().filter(|c| !finished.contains(&c.id)) {
            outcomes.push(RecipientOutcome {
                contact_id: contact.id,
                address: contact.email.trim().to_string(),
                status: DeliveryStatus::Failed {
                    reason: WINDOW_ELAPSED.to_string(),
                },
            });
        }

        report.succeeded = outcomes
            .iter()
            .filter(|o| matches!(o.status, DeliveryStatus::Sent { .. }))
            .count();
        report.failed = outcomes.len() - report.succeeded;
        report.outcomes = outcomes;
        report
    }

    /// Verification gets `send_timeout`, cut short by the dispatch deadline.
    async fn ensure_verified(&self, notifier: &dyn Notifier, deadline: Instant) -> Result<(), NotifyError> {
        if self.verified.load(Ordering::Acquire) {
            return Ok(());
        }
        let limit = deadline.min(Instant::now() + self.settings.send_timeout);
        timeout_at(limit, notifier.verify())
            .await
            .map_err(|_| NotifyError::Timeout(self.settings.send_timeout))??;
        self.verified.store(true, Ordering::Release);
        tracing::info!("✅ Email channel verified");
        Ok(())
    }

    /// The alerting user's name, falling back to the raw identifier.
    async fn display_name(&self, user: &UserRef) -> String {
        match self.users.find_user(user.as_str()).await {
            Ok(Some(profile)) => profile
                .display_name()
                .map(str::to_string)
                .unwrap_or_else(|| user.to_string()),
            Ok(None) => {
                tracing::info!(user = %user, "⚠️ User not found, using identifier as name");
                user.to_string()
            }
            Err(e) => {
                tracing::warn!(user = %user, "❌ Error fetching user details: {}", e);
                user.to_string()
            }
        }
    }
}

/// Distinct requested ids that did not resolve to one of the owner's contacts.
fn count_missing(requested: &[String], found: &[EmergencyContact]) -> usize {
    let found: HashSet<Uuid> = found.iter().map(|c| c.id).collect();
    let wanted: HashSet<Uuid> = parse_ids(requested).into_iter().collect();
    let malformed: HashSet<&str> = requested
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| Uuid::parse_str(raw).is_err())
        .collect();

    for id in &malformed {
        tracing::info!(contact_id = %id, "⚠️ Contact not found, skipping");
    }
    let unresolved: Vec<&Uuid> = wanted.difference(&found).collect();
    for id in &unresolved {
        tracing::info!(contact_id = %id, "⚠️ Contact not found, skipping");
    }

    malformed.len() + unresolved.len()
}

fn render_message(
    alert: &SafetyAlert,
    contact: &EmergencyContact,
    from: &str,
    sender_name: &str,
    sender_address: &str,
) -> EmailMessage {
    let address = contact.email.trim().to_string();
    let to_name = match contact.name.trim() {
        "" => address.split('@').next().unwrap_or_default().to_string(),
        name => name.to_string(),
    };
    let notes = alert
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_NOTES);
    let map_link = alert.location.as_ref().map(|l| l.map_link());
    let sent_on = alert.timestamp.format("%B %-d, %Y at %-I:%M %p UTC").to_string();

    let mut text = format!("IMPORTANT SAFETY ALERT\n\nFrom: {from}\nNotes: {notes}\n");
    if let Some(link) = &map_link {
        text.push_str(&format!("Location: {link}\n"));
    }
    text.push_str(&format!(
        "Sent on: {sent_on}\n\n\
         This is an automated safety alert. Please contact emergency services if appropriate.\n\
         Please add {sender_address} to your contacts to ensure you receive future safety alerts.\n"
    ));

    let location_html = map_link
        .map(|link| {
            format!(
                r#"<p><strong>Location:</strong> <a href="{}" target="_blank" style="color: #0275d8;">View on Map</a></p>"#,
                escape_html(&link)
            )
        })
        .unwrap_or_default();
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 5px;">
  <h2 style="color: #d9534f;">Important Safety Alert</h2>
  <p><strong>From:</strong> {from}</p>
  <p><strong>Notes:</strong> {notes}</p>
  {location_html}
  <p><strong>Sent on:</strong> {sent_on}</p>
  <hr style="border: none; border-top: 1px solid #ddd; margin: 20px 0;">
  <p style="font-size: 0.9em; color: #777;">This is an automated safety alert. Please contact emergency services if appropriate.</p>
  <p style="font-size: 0.8em; color: #999;">Please add {sender} to your contacts to ensure you receive future safety alerts.</p>
</div>"#,
        from = escape_html(from),
        notes = escape_html(notes),
        sender = escape_html(sender_address),
    );

    EmailMessage {
        to_address: address,
        to_name,
        sender_name: sender_name.to_string(),
        subject: format!("Important Safety Alert from {from}"),
        text,
        html,
        headers: vec![
            ("X-Priority".to_string(), "1".to_string()),
            ("X-MSMail-Priority".to_string(), "High".to_string()),
            ("Importance".to_string(), "High".to_string()),
            ("Precedence".to_string(), "urgent".to_string()),
            ("X-Safety-Alert-ID".to_string(), alert.id.to_string()),
        ],
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
