//! Error alert mail delivery wired through the tracing subscriber.
//!
//! # Design
//! - `AlertRelay` is created before logging is installed; its layer stays inert
//!   until the application builder attaches a transport.
//! - Events at or above the configured level are rendered with a fixed
//!   plaintext template and queued for a background worker.
//! - Delivery is fire-and-forget: a full queue drops the alert and send
//!   failures are written to stderr, never retried.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::error::{Result, TelemetryError};

const ALERT_QUEUE_CAPACITY: usize = 64;
const SELF_TARGET: &str = module_path!();

/// Parse a level name as written in settings (`ERROR`, `warning`, ...).
#[must_use]
pub fn parse_level(value: &str) -> Option<Level> {
    match value.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" => Some(Level::ERROR),
        _ => None,
    }
}

/// One log event captured for mailing.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    /// Event severity.
    pub level: Level,
    /// Source file that emitted the event.
    pub file: Option<String>,
    /// Source line that emitted the event.
    pub line: Option<u32>,
    /// Module path of the emitting code.
    pub module: Option<String>,
    /// Name of the innermost span; `#[instrument]`ed functions report their own name.
    pub function: Option<String>,
    /// Capture time.
    pub time: DateTime<Utc>,
    /// Formatted message and fields.
    pub message: String,
}

impl AlertRecord {
    /// Render the record with the fixed alert mail template.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "Message type:       {level}\n\
             Location:           {file}:{line}\n\
             Module:             {module}\n\
             Function:           {function}\n\
             Time:               {time}\n\
             \n\
             Message:\n\
             \n\
             {message}\n",
            level = self.level,
            file = self.file.as_deref().unwrap_or("<unknown>"),
            line = self.line.unwrap_or_default(),
            module = self.module.as_deref().unwrap_or("<unknown>"),
            function = self.function.as_deref().unwrap_or("<none>"),
            time = self.time.format("%Y-%m-%d %H:%M:%S,%3f"),
            message = self.message,
        )
    }
}

/// Outbound channel for rendered alerts.
#[async_trait]
pub trait AlertTransport: Send + Sync + 'static {
    /// Deliver one alert.
    async fn send(&self, subject: &str, body: String) -> Result<()>;
}

/// Settings for the SMTP alert transport.
#[derive(Clone)]
pub struct MailAlertConfig {
    /// SMTP relay host.
    pub server: String,
    /// SMTP relay port.
    pub port: u16,
    /// Optional username/password pair.
    pub credentials: Option<(String, String)>,
    /// Sender mailbox.
    pub sender: String,
    /// Recipient mailboxes.
    pub recipients: Vec<String>,
}

impl std::fmt::Debug for MailAlertConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MailAlertConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field(
                "credentials",
                &self.credentials.as_ref().map(|(user, _)| (user, "***")),
            )
            .field("sender", &self.sender)
            .field("recipients", &self.recipients)
            .finish()
    }
}

/// Plain SMTP transport for alert mails.
pub struct SmtpAlertTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipients: Vec<Mailbox>,
}

impl SmtpAlertTransport {
    /// Build the transport; no connection is attempted until the first alert.
    ///
    /// # Errors
    ///
    /// Returns an error when the sender or a recipient is not a valid mailbox or
    /// when no recipient is configured.
    pub fn new(config: &MailAlertConfig) -> Result<Self> {
        let sender = parse_mailbox("DEFAULT_MAIL_SENDER", &config.sender)?;
        let recipients = config
            .recipients
            .iter()
            .map(|recipient| parse_mailbox("ADMINS", recipient))
            .collect::<Result<Vec<_>>>()?;
        if recipients.is_empty() {
            return Err(TelemetryError::MailConfigIncomplete { field: "ADMINS" });
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
            .port(config.port);
        if let Some((username, password)) = &config.credentials {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
            recipients,
        })
    }
}

#[async_trait]
impl AlertTransport for SmtpAlertTransport {
    async fn send(&self, subject: &str, body: String) -> Result<()> {
        let mut message = Message::builder()
            .from(self.sender.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            message = message.to(recipient.clone());
        }
        let message = message
            .body(body)
            .map_err(|source| TelemetryError::MailBuild { source })?;
        self.transport
            .send(message)
            .await
            .map_err(|source| TelemetryError::MailSend { source })?;
        Ok(())
    }
}

fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox> {
    value
        .parse::<Mailbox>()
        .map_err(|source| TelemetryError::InvalidMailbox {
            field,
            value: value.to_string(),
            source,
        })
}

#[derive(Clone)]
struct Attached {
    queue: mpsc::Sender<AlertRecord>,
    min_level: Level,
}

/// Shared handle between the installed tracing layer and the alert worker.
#[derive(Clone, Default)]
pub struct AlertRelay {
    inner: Arc<RwLock<Option<Attached>>>,
}

impl AlertRelay {
    /// Create a detached relay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracing layer that forwards events through this relay.
    #[must_use]
    pub fn layer(&self) -> AlertLayer {
        AlertLayer {
            relay: self.clone(),
        }
    }

    /// Start forwarding events at or above `min_level` to `transport`.
    ///
    /// Replaces any previously attached transport.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn attach(
        &self,
        transport: Arc<dyn AlertTransport>,
        subject: impl Into<String>,
        min_level: Level,
    ) -> Result<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;
        let (queue, receiver) = mpsc::channel(ALERT_QUEUE_CAPACITY);
        runtime.spawn(deliver_alerts(receiver, transport, subject.into()));
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Attached { queue, min_level });
        Ok(())
    }

    /// Stop forwarding events; the worker exits once its queue drains.
    pub fn detach(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether a transport is currently attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Attached> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn deliver_alerts(
    mut receiver: mpsc::Receiver<AlertRecord>,
    transport: Arc<dyn AlertTransport>,
    subject: String,
) {
    while let Some(record) = receiver.recv().await {
        if let Err(err) = transport.send(&subject, record.render()).await {
            eprintln!("failed to deliver error alert: {err}");
        }
    }
}

/// Tracing layer feeding an [`AlertRelay`].
#[derive(Clone)]
pub struct AlertLayer {
    relay: AlertRelay,
}

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(SELF_TARGET) {
            return;
        }
        let Some(attached) = self.relay.current() else {
            return;
        };
        if *metadata.level() > attached.min_level {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let record = AlertRecord {
            level: *metadata.level(),
            file: metadata.file().map(ToString::to_string),
            line: metadata.line(),
            module: metadata.module_path().map(ToString::to_string),
            function: ctx
                .event_span(event)
                .map(|span| span.name().to_string()),
            time: Utc::now(),
            message: visitor.finish(),
        };
        // Full queue: the alert is dropped.
        let _ = attached.queue.try_send(record);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        let mut rendered = self.message;
        for field in self.fields {
            if !rendered.is_empty() {
                rendered.push('\n');
            }
            rendered.push_str(&field);
        }
        rendered
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}: {value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}: {value:?}", field.name()));
        }
    }
}
