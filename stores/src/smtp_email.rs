//! SMTP email transport implementation using Lettre.

use crate::templates;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use shiptrack_core::config::MailConfig;
use shiptrack_core::error::{Result, ShipmentError};
use shiptrack_core::providers::EmailTransport;

/// SMTP email transport using Lettre.
///
/// Sends real emails via SMTP (STARTTLS relay), suitable for production use.
///
/// # Examples
///
/// ```ignore
/// use shiptrack_stores::SmtpEmailTransport;
///
/// let transport = SmtpEmailTransport::from_config(&config.mail)?;
/// transport.send_email("client@example.com", "Hello", "<p>Hi</p>").await?;
/// ```
#[derive(Clone)]
pub struct SmtpEmailTransport {
    /// Async STARTTLS relay.
    mailer: AsyncSmtpTransport<Tokio1Executor>,

    /// Sender email address.
    from_email: String,

    /// Sender display name.
    from_name: String,
}

impl SmtpEmailTransport {
    /// Create a new SMTP email transport.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be configured for `smtp_server`.
    pub fn new(
        smtp_server: &str,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from_email: String,
        from_name: String,
    ) -> Result<Self> {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_server)
            .map_err(|e| ShipmentError::Notification(format!("SMTP relay error: {e}")))?
            .port(smtp_port)
            .credentials(Credentials::new(smtp_username, smtp_password))
            .build();

        Ok(Self {
            mailer,
            from_email,
            from_name,
        })
    }

    /// Create a transport from [`MailConfig`].
    ///
    /// # Errors
    ///
    /// See [`SmtpEmailTransport::new`].
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        Self::new(
            &config.smtp_server,
            config.smtp_port,
            config.username.clone(),
            config.password.clone(),
            config.from_email.clone(),
            config.from_name.clone(),
        )
    }

    /// Build the "From" header.
    fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    fn build_message(&self, to: &str, subject: &str, html_body: String) -> Result<Message> {
        Message::builder()
            .from(
                self.from_header()
                    .parse()
                    .map_err(|e| ShipmentError::Notification(format!("Invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| ShipmentError::Notification(format!("Invalid to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|e| ShipmentError::Notification(format!("Failed to build email: {e}")))
    }
}

impl EmailTransport for SmtpEmailTransport {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let email = self.build_message(to, subject, html_body.to_string())?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| ShipmentError::Notification(format!("Failed to send email: {e}")))?;

        tracing::info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }

    async fn send_templated_email(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<()> {
        let html_body = templates::render(template, context)?;
        self.send_email(to, subject, &html_body).await
    }
}
