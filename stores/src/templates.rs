//! HTML bodies for templated notification emails.
//!
//! Templates are addressed by the names the lifecycle puts on
//! `OutboundMessage::TemplatedEmail`. Context values are HTML-escaped.

use serde_json::Value;
use shiptrack_core::error::{Result, ShipmentError};

/// Render `template` with `context`.
///
/// Missing context keys render as empty strings.
///
/// # Errors
///
/// Returns `ShipmentError::Notification` for an unknown template name.
pub fn render(template: &str, context: &Value) -> Result<String> {
    let field = |key: &str| escape(context.get(key).and_then(Value::as_str).unwrap_or_default());

    let (heading, paragraphs) = match template {
        "mail_placed.html" => (
            "Your shipment has been placed".to_string(),
            vec![
                format!(
                    "{} has placed shipment <strong>{}</strong> for you.",
                    field("seller"),
                    field("shipment_id")
                ),
                format!("It will be delivered by {}.", field("delivery_partner")),
            ],
        ),
        "mail_out_for_delivery.html" => {
            let mut paragraphs = vec![format!(
                "Shipment <strong>{}</strong> from {} is out for delivery with {}.",
                field("shipment_id"),
                field("seller"),
                field("delivery_partner")
            )];
            let code = field("verification_code");
            if code.is_empty() {
                paragraphs.push(
                    "Your verification code has been sent to your phone.".to_string(),
                );
            } else {
                paragraphs.push(format!(
                    "Give this code to the courier on delivery: <strong>{code}</strong>"
                ));
            }
            ("Your shipment is out for delivery".to_string(), paragraphs)
        }
        "mail_delivered.html" => {
            let mut paragraphs = vec![format!(
                "Shipment <strong>{}</strong> from {} has been delivered by {}.",
                field("shipment_id"),
                field("seller"),
                field("delivery_partner")
            )];
            let review_url = field("review_url");
            if !review_url.is_empty() {
                paragraphs.push(format!(
                    "Tell us how it went: <a href=\"{review_url}\">leave a review</a>"
                ));
            }
            ("Your shipment has been delivered".to_string(), paragraphs)
        }
        "mail_cancelled.html" => (
            "Your shipment has been cancelled".to_string(),
            vec![format!(
                "{} has cancelled shipment <strong>{}</strong>.",
                field("seller"),
                field("shipment_id")
            )],
        ),
        "mail_email_verify.html" => {
            let url = field("url");
            (
                format!("Welcome, {}", field("username")),
                vec![
                    format!(
                        "Please verify your email address: <a href=\"{url}\">verify email</a>"
                    ),
                    format!("Or copy and paste this link into your browser:<br>{url}"),
                ],
            )
        }
        other => {
            return Err(ShipmentError::Notification(format!(
                "unknown email template '{other}'"
            )));
        }
    };

    Ok(layout(&heading, &paragraphs))
}

fn layout(heading: &str, paragraphs: &[String]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|paragraph| format!("        <p>{paragraph}</p>\n"))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{heading}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #2563eb;">{heading}</h2>
{body}    </div>
</body>
</html>
"#
    )
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
