//! Twilio SMS transport.
//!
//! Posts to the Messages resource of the Twilio REST API with HTTP basic
//! auth (account SID and auth token).

use reqwest::Client;
use shiptrack_core::config::SmsConfig;
use shiptrack_core::error::{Result, ShipmentError};
use shiptrack_core::providers::SmsTransport;
use std::time::Duration;

/// SMS transport backed by Twilio.
#[derive(Clone)]
pub struct TwilioSmsTransport {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

impl TwilioSmsTransport {
    /// Create a transport from [`SmsConfig`].
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &SmsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ShipmentError::Notification(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

impl SmsTransport for TwilioSmsTransport {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| ShipmentError::Notification(format!("SMS request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(to = %to, %status, "SMS provider rejected message");
            return Err(ShipmentError::Notification(format!(
                "SMS provider returned {status}: {detail}"
            )));
        }

        tracing::info!(to = %to, "SMS sent");
        Ok(())
    }
}
