//! Outbound notification channel.

mod resend;
mod scripted;

pub use resend::ResendNotifier;
pub use scripted::ScriptedNotifier;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email credentials are not configured")]
    MissingCredentials,

    #[error("email provider rejected the credentials")]
    InvalidCredentials,

    #[error("could not reach email provider: {0}")]
    Connection(String),

    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("email provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// One message to one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to_address: String,
    pub to_name: String,
    /// Display name shown as the sender; the address belongs to the channel.
    pub sender_name: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub headers: Vec<(String, String)>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Checks connectivity and credentials before the first send.
    async fn verify(&self) -> Result<(), NotifyError>;

    /// Returns the provider's message id.
    async fn send(&self, message: &EmailMessage) -> Result<String, NotifyError>;

    /// Address messages are sent from, quoted in message bodies.
    fn sender_address(&self) -> &str;
}
