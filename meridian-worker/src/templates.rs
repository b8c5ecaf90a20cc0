/// Email rendering
///
/// Every [`Notification`] kind maps to a subject plus an HTML and a plain-text
/// body. Values interpolated into HTML are escaped.

use meridian_shared::notifications::Notification;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats minor units as `NGN 2,500.00`
pub fn format_amount(amount_minor: i64, currency: &str) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    let major = (abs / 100).to_string();
    let minor = abs % 100;

    let mut grouped = String::with_capacity(major.len() + major.len() / 3);
    for (i, c) in major.chars().enumerate() {
        if i > 0 && (major.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{} {}{}.{:02}", currency, sign, grouped, minor)
}

struct Content {
    subject: String,
    paragraphs: Vec<String>,
    action: Option<(&'static str, String)>,
}

fn content(notification: &Notification) -> Content {
    match notification {
        Notification::Welcome { verify_url } => Content {
            subject: "Welcome to Meridian".to_string(),
            paragraphs: vec![
                "Thanks for creating an account.".to_string(),
                "Please confirm your email address to get started. The link expires in 24 hours."
                    .to_string(),
            ],
            action: Some(("Verify email", verify_url.clone())),
        },
        Notification::VerifyEmail { verify_url } => Content {
            subject: "Verify your email address".to_string(),
            paragraphs: vec![
                "Use the link below to confirm your email address. It expires in 24 hours."
                    .to_string(),
            ],
            action: Some(("Verify email", verify_url.clone())),
        },
        Notification::PasswordReset { reset_url } => Content {
            subject: "Reset your password".to_string(),
            paragraphs: vec![
                "We received a request to reset your password. The link expires in 1 hour."
                    .to_string(),
                "If you did not ask for this, you can ignore this email.".to_string(),
            ],
            action: Some(("Reset password", reset_url.clone())),
        },
        Notification::ConsultationReceived { service } => Content {
            subject: "We received your consultation request".to_string(),
            paragraphs: vec![
                format!("Thank you for your interest in {}.", service),
                "A consultant will get back to you within two business days.".to_string(),
            ],
            action: None,
        },
        Notification::EnrollmentConfirmed { course_title } => Content {
            subject: format!("You're enrolled in {}", course_title),
            paragraphs: vec![
                format!("Your enrollment in {} is confirmed.", course_title),
                "Course materials, assignments and live class schedules are now available in your dashboard."
                    .to_string(),
            ],
            action: None,
        },
        Notification::PaymentReceipt {
            reference,
            amount_minor,
            currency,
            description,
        } => Content {
            subject: format!("Payment receipt {}", reference),
            paragraphs: vec![
                format!(
                    "We received your payment of {} for {}.",
                    format_amount(*amount_minor, currency),
                    description
                ),
                format!("Reference: {}", reference),
            ],
            action: None,
        },
        Notification::NewsletterWelcome { unsubscribe_url } => Content {
            subject: "Thanks for subscribing".to_string(),
            paragraphs: vec![
                "You'll now receive our newsletter with insights on strategy, finance and growth."
                    .to_string(),
            ],
            action: Some(("Unsubscribe", unsubscribe_url.clone())),
        },
    }
}

pub fn render(notification: &Notification, recipient_name: Option<&str>) -> RenderedEmail {
    let content = content(notification);
    let greeting = match recipient_name {
        Some(name) if !name.trim().is_empty() => format!("Hello {},", name.trim()),
        _ => "Hello,".to_string(),
    };

    let mut text = format!("{}\n\n", greeting);
    let mut html = format!(
        "<!DOCTYPE html><html><body style=\"font-family: sans-serif; color: #1f2933;\"><p>{}</p>",
        escape(&greeting)
    );

    for paragraph in &content.paragraphs {
        text.push_str(paragraph);
        text.push_str("\n\n");
        html.push_str(&format!("<p>{}</p>", escape(paragraph)));
    }

    if let Some((label, url)) = &content.action {
        text.push_str(&format!("{}: {}\n\n", label, url));
        html.push_str(&format!(
            "<p><a href=\"{}\" style=\"padding: 10px 16px; background: #0b4f6c; color: #ffffff; text-decoration: none;\">{}</a></p>",
            escape(url),
            escape(label)
        ));
    }

    text.push_str("Meridian Consulting\n");
    html.push_str("<p>Meridian Consulting</p></body></html>");

    RenderedEmail {
        subject: content.subject,
        html,
        text,
    }
}
