//! Notification service: consumes `notification.send_email` and reports the
//! outcome back onto the bus.
//!
//! A failed send is a handled outcome, not a handler error: the service
//! publishes `notification.failed` and acknowledges, so a bad recipient can
//! never wedge the email queue.

use crate::confirmation;
use chrono::Utc;
use std::sync::Arc;
use streamia_core::envelope::{DomainEvent, EventEnvelope};
use streamia_core::event_bus::{BoxFuture, EventBus};
use streamia_runtime::handler::{HandlerError, SagaRegistry, handler_fn};

/// One email to deliver.
#[derive(Clone, Debug, PartialEq)]
pub struct EmailRequest {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Template name.
    pub template: String,
    /// Template data; shape is template-specific.
    pub data: serde_json::Value,
}

/// Email delivery seam.
///
/// Production wires an SMTP-backed implementation; the demo and tests use
/// [`LoggingMailer`]. The error string ends up in the published
/// `notification.failed` event.
pub trait Mailer: Send + Sync {
    /// Deliver one email.
    fn send(&self, request: EmailRequest) -> BoxFuture<'_, Result<(), String>>;
}

/// A mailer that logs instead of sending. Always succeeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingMailer;

impl Mailer for LoggingMailer {
    fn send(&self, request: EmailRequest) -> BoxFuture<'_, Result<(), String>> {
        Box::pin(async move {
            tracing::info!(
                to = %request.to,
                subject = %request.subject,
                template = %request.template,
                "Would send email"
            );
            Ok(())
        })
    }
}

/// Handlers for the notification service's email queue.
pub fn registry(bus: Arc<dyn EventBus>, mailer: Arc<dyn Mailer>) -> SagaRegistry {
    let mut registry = SagaRegistry::new();

    registry.register(
        "notification.send_email",
        handler_fn(move |envelope: EventEnvelope| {
            let bus = Arc::clone(&bus);
            let mailer = Arc::clone(&mailer);
            async move {
                let DomainEvent::NotificationSendEmail {
                    to,
                    subject,
                    template,
                    data,
                } = &envelope.event
                else {
                    return Err(HandlerError::Other(format!(
                        "unexpected event type {}",
                        envelope.event.event_type()
                    )));
                };

                let request = EmailRequest {
                    to: to.clone(),
                    subject: subject.clone(),
                    template: template.clone(),
                    data: data.clone(),
                };

                let outcome = match mailer.send(request).await {
                    Ok(()) => {
                        tracing::info!(to = %to, template = %template, "Email sent");
                        DomainEvent::NotificationSent {
                            to: to.clone(),
                            template: template.clone(),
                            sent_at: Utc::now(),
                        }
                    }
                    Err(error) => {
                        tracing::error!(to = %to, template = %template, error = %error, "Email failed");
                        DomainEvent::NotificationFailed {
                            to: to.clone(),
                            template: template.clone(),
                            error,
                            failed_at: Utc::now(),
                        }
                    }
                };

                bus.publish(&confirmation(outcome, &envelope)).await?;
                Ok(())
            }
        }),
    );

    registry
}
