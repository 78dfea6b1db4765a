//! Scripted notifier for tests and local runs without an email provider.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{EmailMessage, NotifyError, Notifier};

/// Records every send attempt. Selected recipients can be made to fail or hang,
/// and verification can be made to fail.
pub struct ScriptedNotifier {
    sender: String,
    verify_fails: bool,
    verify_delay: Option<Duration>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    verify_calls: AtomicUsize,
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<EmailMessage>>,
}

impl ScriptedNotifier {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            verify_fails: false,
            verify_delay: None,
            failing: HashSet::new(),
            hanging: HashSet::new(),
            verify_calls: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Behaves like an unreachable provider.
    pub fn unreachable(mut self) -> Self {
        self.verify_fails = true;
        self
    }

    /// Verification succeeds, but only after `delay`.
    pub fn slow_verify(mut self, delay: Duration) -> Self {
        self.verify_delay = Some(delay);
        self
    }

    pub fn failing_for(mut self, address: impl Into<String>) -> Self {
        self.failing.insert(address.into());
        self
    }

    pub fn hanging_for(mut self, address: impl Into<String>) -> Self {
        self.hanging.insert(address.into());
        self
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Recipient addresses in the order sends were attempted.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn delivered(&self) -> Vec<EmailMessage> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn verify(&self) -> Result<(), NotifyError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.verify_delay {
            tokio::time::sleep(delay).await;
        }
        if self.verify_fails {
            return Err(NotifyError::Connection("connection refused".to_string()));
        }
        Ok(())
    }

    async fn send(&self, message: &EmailMessage) -> Result<String, NotifyError> {
        if self.verify_fails {
            return Err(NotifyError::Connection("connection refused".to_string()));
        }
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(message.to_address.clone());
        }
        if self.hanging.contains(&message.to_address) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.contains(&message.to_address) {
            return Err(NotifyError::Rejected {
                status: 422,
                body: format!("mailbox {} unavailable", message.to_address),
            });
        }
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(message.clone());
        }
        Ok(format!("scripted-{}", message.to_address))
    }

    fn sender_address(&self) -> &str {
        &self.sender
    }
}
