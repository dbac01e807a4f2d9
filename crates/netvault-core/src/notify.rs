//! Operator notification delivery.
//!
//! Sinks consume a finished [`Report`]; delivery failures are logged and
//! never invalidate the run that produced the report.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::{EmailSettings, NotificationSettings, SecretProvider, SlackSettings};
use crate::domain::{BackupError, Result};
use crate::obs;
use crate::report::Report;

/// Outbound delivery channel for run reports.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn deliver(&self, report: &Report) -> Result<()>;
}

/// Deliver a report through every sink, logging failures without
/// propagating them.
pub async fn send_all(sinks: &[Box<dyn NotificationSink>], report: &Report) {
    for sink in sinks {
        match sink.deliver(report).await {
            Ok(()) => info!(sink = sink.name(), "notification delivered"),
            Err(error) => obs::emit_notification_error(sink.name(), &error),
        }
    }
}

/// Build the sinks enabled in the settings. A sink whose setup fails
/// (e.g. missing webhook secret) is skipped with a logged warning rather
/// than failing the run.
pub fn sinks_from_settings(
    settings: &NotificationSettings,
    secrets: &dyn SecretProvider,
) -> Vec<Box<dyn NotificationSink>> {
    let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();

    if settings.email.enabled {
        match EmailSink::new(settings.email.clone(), secrets) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(error) => obs::emit_notification_error("email", &error),
        }
    }
    if settings.slack.enabled {
        match SlackSink::new(&settings.slack, secrets) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(error) => obs::emit_notification_error("slack", &error),
        }
    }

    sinks
}

/// SMTP delivery of the rendered text report.
pub struct EmailSink {
    settings: EmailSettings,
    credentials: Option<SmtpCredentials>,
}

impl EmailSink {
    pub fn new(settings: EmailSettings, secrets: &dyn SecretProvider) -> Result<Self> {
        let credentials = match (&settings.username_env, &settings.password_env) {
            (Some(user_env), Some(pass_env)) => Some(SmtpCredentials::new(
                secrets.resolve(user_env)?,
                secrets.resolve(pass_env)?,
            )),
            _ => None,
        };
        Ok(Self {
            settings,
            credentials,
        })
    }

    fn build_message(&self, subject: &str, body: String) -> Result<Message> {
        let from: Mailbox = self
            .settings
            .from_address
            .parse()
            .map_err(|e| BackupError::Config(format!("invalid from_address: {e}")))?;

        let mut builder = Message::builder().from(from).subject(subject);
        for to in &self.settings.to_addresses {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| BackupError::Config(format!("invalid to_address {to}: {e}")))?;
            builder = builder.to(mailbox);
        }

        builder
            .body(body)
            .map_err(|e| BackupError::Config(format!("failed to build email: {e}")))
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.smtp_server)
                .map_err(|e| BackupError::Connection(format!("smtp relay setup failed: {e}")))?
                .port(self.settings.smtp_port);
        if let Some(credentials) = &self.credentials {
            builder = builder.credentials(credentials.clone());
        }
        let transport = builder.build();

        transport
            .send(message)
            .await
            .map_err(|e| BackupError::Connection(format!("smtp send failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, report: &Report) -> Result<()> {
        let subject = format!("Netvault Backup Report - {}", report.status_line());
        let body = format!(
            "{}\n\nThis is an automated message from netvault.\n",
            report.render_text()
        );
        let message = self.build_message(&subject, body)?;
        self.send(message).await
    }
}

/// Slack incoming-webhook delivery of the run summary.
pub struct SlackSink {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackSink {
    pub fn new(settings: &SlackSettings, secrets: &dyn SecretProvider) -> Result<Self> {
        Ok(Self {
            webhook_url: secrets.resolve(&settings.webhook_url_env)?,
            client: reqwest::Client::new(),
        })
    }

    async fn post(&self, payload: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| BackupError::Connection(format!("slack webhook failed: {e}")))?;

        if !response.status().is_success() {
            return Err(BackupError::Connection(format!(
                "slack webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Webhook payload for one report: a colored summary attachment plus the
/// failed-device list when any.
pub fn slack_payload(report: &Report) -> serde_json::Value {
    let color = if report.failed > 0 {
        "#ff9900"
    } else if report.changed > 0 || report.first_snapshot > 0 {
        "#36a64f"
    } else {
        "#808080"
    };

    let mut attachments = vec![serde_json::json!({
        "color": color,
        "title": format!("Netvault Backup Report - {}", report.status_line()),
        "fields": [
            { "title": "Total Devices", "value": report.total_devices.to_string(), "short": true },
            { "title": "Changed", "value": report.changed.to_string(), "short": true },
            { "title": "First Snapshot", "value": report.first_snapshot.to_string(), "short": true },
            { "title": "Failed", "value": report.failed.to_string(), "short": true },
            { "title": "Duration", "value": format!("{:.1}s", report.duration_seconds()), "short": true },
        ],
        "footer": "netvault",
    })];

    if report.failed > 0 {
        let failed_devices: Vec<&str> = report
            .failures
            .iter()
            .map(|f| f.device_name.as_str())
            .collect();
        attachments.push(serde_json::json!({
            "color": "#ff0000",
            "title": "Failed Devices",
            "text": failed_devices.join(", "),
        }));
    }

    serde_json::json!({ "attachments": attachments })
}

#[async_trait]
impl NotificationSink for SlackSink {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, report: &Report) -> Result<()> {
        self.post(slack_payload(report)).await
    }
}
