//! Notification dispatch boundary.
//!
//! Transport (SMTP, SMS gateway) lives outside the engine; the flow only
//! hands a rendered message to this trait and logs failures.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{AuthEvent, AuthMethod, Principal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

/// Message already rendered for one recipient.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        principal: &Principal,
        message: &RenderedMessage,
    ) -> Result<(), anyhow::Error>;
}

/// Render the per-event code message. The template's `{code}` placeholder is
/// substituted; templates without one get the code appended.
pub(crate) fn render_code_message(event: &AuthEvent, code: &str) -> RenderedMessage {
    let template = event
        .method_config
        .message()
        .unwrap_or("Your authentication code is {code}");
    let body = if template.contains("{code}") {
        template.replace("{code}", code)
    } else {
        format!("{}\n{}", template, code)
    };
    RenderedMessage {
        subject: event.method_config.subject().map(str::to_string),
        body,
    }
}

/// Fire-and-forget code delivery. Transport failures are logged, never
/// surfaced to the caller that triggered the send.
pub(crate) fn spawn_code_notification(
    notifier: Arc<dyn Notifier>,
    event: &AuthEvent,
    principal: Principal,
    code: String,
) {
    let channel = match event.auth_method {
        AuthMethod::Email => Channel::Email,
        AuthMethod::Sms => Channel::Sms,
        AuthMethod::Password => return,
    };
    let message = render_code_message(event, &code);
    tokio::spawn(async move {
        if let Err(error) = notifier.send(channel, &principal, &message).await {
            tracing::warn!(
                principal_id = principal.id,
                channel = channel.as_str(),
                error = %error,
                "code notification failed"
            );
        }
    });
}

/// Log-only notifier for development and tests.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(
        &self,
        channel: Channel,
        principal: &Principal,
        message: &RenderedMessage,
    ) -> Result<(), anyhow::Error> {
        // message bodies carry codes, keep them out of info-level logs
        tracing::info!(
            channel = channel.as_str(),
            principal_id = principal.id,
            subject = message.subject.as_deref().unwrap_or(""),
            "notification dispatched"
        );
        tracing::debug!(body = %message.body, "notification body");
        Ok(())
    }
}
