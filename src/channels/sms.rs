//! SMS channel — outbound messages via the Twilio REST API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::channels::ChannelSender;
use crate::error::ChannelError;

// ── Configuration ───────────────────────────────────────────────────

/// Twilio sender configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// The number messages are sent from, in E.164 form.
    pub from_number: String,
    /// API origin; overridable so tests can point at a local stub.
    pub api_base: String,
}

impl TwilioConfig {
    /// Build config from environment variables.
    /// Returns `None` if `TWILIO_ACCOUNT_SID` is not set (channel disabled).
    pub fn from_env() -> Option<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok()?;
        let auth_token =
            SecretString::from(std::env::var("TWILIO_AUTH_TOKEN").unwrap_or_default());
        let from_number = std::env::var("TWILIO_FROM_NUMBER").unwrap_or_default();
        let api_base = std::env::var("TWILIO_API_BASE")
            .unwrap_or_else(|_| "https://api.twilio.com".to_string());

        Some(Self {
            account_sid,
            auth_token,
            from_number,
            api_base,
        })
    }
}

// ── Sender ──────────────────────────────────────────────────────────

/// SMS sender backed by Twilio's Messages endpoint.
pub struct TwilioSender {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl TwilioSender {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl ChannelSender for TwilioSender {
    fn name(&self) -> &str {
        "sms"
    }

    async fn send(&self, address: &str, body: &str) -> Result<(), ChannelError> {
        let to = normalize_phone(address);
        if !to.starts_with('+') {
            return Err(ChannelError::InvalidAddress {
                channel: "sms".into(),
                address: address.to_string(),
            });
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&[
                ("To", to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                channel: "sms".into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                channel: "sms".into(),
                reason: format!("Twilio returned {status}: {detail}"),
            });
        }

        debug!(to = %to, "SMS sent");
        Ok(())
    }
}

// ── Phone normalization ─────────────────────────────────────────────

/// Normalize a phone number to E.164.
///
/// Webhook callbacks and hand-entered numbers arrive in several shapes;
/// subscriber identity is keyed on the normalized form.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.len() == 11 && digits.starts_with('1') {
        // Country code present, just missing the +.
        format!("+{digits}")
    } else if digits.len() == 10 {
        // Standard 10-digit US number.
        format!("+1{digits}")
    } else if raw.starts_with('+') {
        raw.to_string()
    } else if raw.starts_with('1') && raw.len() > 10 {
        format!("+{raw}")
    } else {
        // Anything else passes through untouched; providers already send
        // E.164 on the wire.
        raw.to_string()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
