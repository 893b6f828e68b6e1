//! Account notifications sent on behalf of the auth core.
//!
//! Delivery is best effort: callers dispatch in the background and a failed
//! send is logged, never surfaced to the request that triggered it.

mod email;

pub use email::EmailNotifier;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::db::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Welcome { name: String },
    PasswordReset { reset_url: String },
    PasswordChanged,
    RoleChanged { role: Role },
    AccountSuspended,
    AccountReactivated,
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "Welcome to Disability Support Platform",
            Notification::PasswordReset { .. } => "Password Reset",
            Notification::PasswordChanged => "Your password was changed",
            Notification::RoleChanged { .. } => "Your account role has changed",
            Notification::AccountSuspended => "Your account has been suspended",
            Notification::AccountReactivated => "Your account has been reactivated",
        }
    }

    pub fn text_body(&self) -> String {
        match self {
            Notification::Welcome { name } => format!(
                "Welcome {}!\n\nThank you for joining our platform. We're here to support you.\n\
                 If you have any questions, please don't hesitate to contact us.",
                name
            ),
            Notification::PasswordReset { reset_url } => format!(
                "We received a request to reset your password.\n\n\
                 Open this link to choose a new one: {}\n\n\
                 The link expires in one hour. If you did not ask for this, ignore this email.",
                reset_url
            ),
            Notification::PasswordChanged => {
                "Your password was just changed. If this wasn't you, reset your password \
                 immediately and contact support."
                    .to_string()
            }
            Notification::RoleChanged { role } => {
                format!("An administrator changed your account role to \"{}\".", role)
            }
            Notification::AccountSuspended => {
                "Your account has been suspended. Please contact support for details.".to_string()
            }
            Notification::AccountReactivated => {
                "Your account has been reactivated. You can sign in again.".to_string()
            }
        }
    }

    pub fn html_body(&self) -> String {
        match self {
            Notification::Welcome { name } => format!(
                "<h1>Welcome {}!</h1>\
                 <p>Thank you for joining our platform. We're here to support you.</p>\
                 <p>If you have any questions, please don't hesitate to contact us.</p>",
                html_escape(name)
            ),
            Notification::PasswordReset { reset_url } => format!(
                "<p>We received a request to reset your password.</p>\
                 <p><a href=\"{0}\">Reset your password</a></p>\
                 <p>The link expires in one hour. If you did not ask for this, ignore this email.</p>",
                html_escape(reset_url)
            ),
            other => format!("<p>{}</p>", html_escape(&other.text_body())),
        }
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, to: &str, notification: &Notification) -> Result<()>;
}

/// Send in the background. Failures are logged with the recipient.
pub fn dispatch(notifier: &Arc<dyn Notifier>, to: &str, notification: Notification) {
    let notifier = Arc::clone(notifier);
    let to = to.to_string();
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&to, &notification).await {
            tracing::warn!(
                to = %to,
                subject = notification.subject(),
                error = %e,
                "Failed to send notification"
            );
        }
    });
}
