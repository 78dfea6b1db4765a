//! Resend transactional email adapter.
//!
//! ```ignore
//! let notifier = ResendNotifier::new("re_...", "alerts@shesphere.app", Duration::from_secs(10))?;
//! notifier.verify().await?;
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{EmailMessage, NotifyError, Notifier};

const DEFAULT_API_BASE: &str = "https://api.resend.com";

pub struct ResendNotifier {
    api_key: SecretString,
    from_address: String,
    api_base_url: String,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl ResendNotifier {
    pub fn new(
        api_key: impl Into<String>,
        from_address: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(NotifyError::MissingCredentials);
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Connection(e.to_string()))?;

        Ok(Self {
            api_key: SecretString::new(api_key),
            from_address: from_address.into(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            http_client,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, message: &EmailMessage) -> Value {
        let headers: Map<String, Value> = message
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        json!({
            "from": format!("{} <{}>", message.sender_name, self.from_address),
            "to": [format!("{} <{}>", message.to_name, message.to_address)],
            "subject": message.subject,
            "text": message.text,
            "html": message.html,
            "headers": headers,
        })
    }
}

fn connection_error(e: reqwest::Error) -> NotifyError {
    NotifyError::Connection(e.to_string())
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn verify(&self) -> Result<(), NotifyError> {
        let response = self
            .http_client
            .get(format!("{}/domains", self.api_base_url))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(connection_error)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(NotifyError::InvalidCredentials)
            }
            s => Err(NotifyError::Rejected {
                status: s.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn send(&self, message: &EmailMessage) -> Result<String, NotifyError> {
        let response = self
            .http_client
            .post(format!("{}/emails", self.api_base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(message))
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let sent: SendResponse = response.json().await.map_err(connection_error)?;
        Ok(sent.id)
    }

    fn sender_address(&self) -> &str {
        &self.from_address
    }
}
