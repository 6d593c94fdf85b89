use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drip_core::config::{MailerConfig, MailerProvider};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A fully rendered email ready for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    /// Provider-side dedupe key. The same key within the provider's window
    /// never produces a second delivery.
    pub idempotency_key: Option<String>,
    /// Key/value labels for provider-side analytics.
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message id, stored in the ledger.
    pub id: String,
}

/// Delivery provider seam.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, MailerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Mailer unavailable: {0}")]
    Unavailable(String),
}

/// Resend HTTP API (`POST /emails`).
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ResendTag<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<ResendTag<'a>>,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: String,
}

impl ResendMailer {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    fn name(&self) -> &str {
        "resend"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, MailerError> {
        let url = format!("{}/emails", self.base_url);
        let body = ResendRequest {
            from: &email.from,
            to: [&email.to],
            subject: &email.subject,
            text: &email.text,
            reply_to: email.reply_to.as_deref(),
            tags: email
                .tags
                .iter()
                .map(|(name, value)| ResendTag { name, value })
                .collect(),
        };

        debug!(to = %email.to, subject = %email.subject, "sending email via Resend");

        let mut builder = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        if let Some(key) = &email.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(MailerError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Resend API error");
            return Err(MailerError::Api {
                status,
                message: text,
            });
        }

        let parsed: ResendResponse = resp
            .json()
            .await
            .map_err(|e| MailerError::Parse(e.to_string()))?;
        Ok(DeliveryReceipt { id: parsed.id })
    }
}

/// Logs instead of delivering. Returns a synthetic id so the ledger flow is
/// identical to a real send.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, MailerError> {
        let id = format!("log-{}", Uuid::new_v4());
        info!(
            id = %id,
            to = %email.to,
            subject = %email.subject,
            chars = email.text.len(),
            "email logged, not delivered"
        );
        Ok(DeliveryReceipt { id })
    }
}

/// Build the configured mailer.
pub fn from_config(config: &MailerConfig, timeout: Duration) -> Result<Arc<dyn Mailer>, MailerError> {
    match config.provider {
        MailerProvider::Log => Ok(Arc::new(LogMailer)),
        MailerProvider::Resend => {
            let api_key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| MailerError::Unavailable("mailer.api_key is not set".into()))?;
            Ok(Arc::new(ResendMailer::new(
                api_key,
                config.base_url.clone(),
                timeout,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            from: "GitAuto <info@gitauto.ai>".into(),
            to: "dev@example.com".into(),
            reply_to: None,
            subject: "Hello".into(),
            text: "Body".into(),
            idempotency_key: Some("42/onboarding_setup_pr".into()),
            tags: vec![("email_type".into(), "onboarding_setup_pr".into())],
        }
    }

    fn mailer(base_url: &str) -> ResendMailer {
        ResendMailer::new("re_test_key".into(), base_url.into(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn resend_success_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test_key"))
            .and(header("idempotency-key", "42/onboarding_setup_pr"))
            .and(body_partial_json(serde_json::json!({
                "to": ["dev@example.com"],
                "subject": "Hello",
                "tags": [{"name": "email_type", "value": "onboarding_setup_pr"}]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "re_123"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = mailer(&server.uri()).send(&email()).await.unwrap();
        assert_eq!(receipt.id, "re_123");
    }

    #[tokio::test]
    async fn resend_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let err = mailer(&server.uri()).send(&email()).await.unwrap_err();
        assert!(matches!(
            err,
            MailerError::RateLimited {
                retry_after_ms: 2000
            }
        ));
    }

    #[tokio::test]
    async fn resend_error_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid `to` field"))
            .mount(&server)
            .await;

        let err = mailer(&server.uri()).send(&email()).await.unwrap_err();
        match err {
            MailerError::Api { status, message } => {
                assert_eq!(status, 422);
                assert!(message.contains("invalid"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resend_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = mailer(&server.uri()).send(&email()).await.unwrap_err();
        assert!(matches!(err, MailerError::Parse(_)));
    }

    #[tokio::test]
    async fn log_mailer_returns_synthetic_id() {
        let receipt = LogMailer.send(&email()).await.unwrap();
        assert!(receipt.id.starts_with("log-"));
    }

    #[test]
    fn resend_without_key_is_unavailable() {
        let config = MailerConfig {
            provider: MailerProvider::Resend,
            ..Default::default()
        };
        assert!(matches!(
            from_config(&config, Duration::from_secs(1)),
            Err(MailerError::Unavailable(_))
        ));
        let log = from_config(&MailerConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(log.name(), "log");
    }
}
