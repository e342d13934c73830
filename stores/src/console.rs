//! Console transports for development.
//!
//! Print messages to stdout instead of sending them.

use crate::templates;
use shiptrack_core::error::Result;
use shiptrack_core::providers::{EmailTransport, SmsTransport};
use tracing::info;

const RULE: &str = "══════════════════════════════════════════════════════════════";

/// Console email transport.
///
/// Templated emails are rendered first, so a broken template fails here the
/// same way it would over SMTP.
#[derive(Clone, Debug, Default)]
pub struct ConsoleEmailTransport;

impl ConsoleEmailTransport {
    /// Create a new console email transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EmailTransport for ConsoleEmailTransport {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        info!(to = %to, subject = %subject, "📧 Email (Development Mode)");
        println!("\n╔{RULE}╗");
        println!("║ To: {to:<57}║");
        println!("║ Subject: {subject:<52}║");
        println!("╠{RULE}╣");
        for line in html_body.lines().map(str::trim).filter(|line| !line.is_empty()) {
            println!("║ {line}");
        }
        println!("╚{RULE}╝\n");

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
        info!(to = %to, template = %template, "Rendered email template");
        self.send_email(to, subject, &html_body).await
    }
}

/// Console SMS transport.
#[derive(Clone, Debug, Default)]
pub struct ConsoleSmsTransport;

impl ConsoleSmsTransport {
    /// Create a new console SMS transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SmsTransport for ConsoleSmsTransport {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        info!(to = %to, "📱 SMS (Development Mode)");
        println!("\n╔{RULE}╗");
        println!("║ SMS to: {to:<53}║");
        println!("╠{RULE}╣");
        println!("║ {body}");
        println!("╚{RULE}╝\n");

        Ok(())
    }
}
