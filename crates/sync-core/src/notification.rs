use crate::{Error, JobResult, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::env;
use std::fmt::Write;

/// Receives failed jobs
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Called once when a job ends in the failed state
    async fn notify_job_failed(&self, result: &JobResult) -> Result<()>;
}

/// SMTP relay and addresses for failure e-mails
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
}

impl SmtpSettings {
    /// Reads `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
    /// `SMTP_FROM_EMAIL` and `SMTP_TO_EMAILS` (comma separated)
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            env::var(name).map_err(|_| Error::Configuration(format!("{} not set", name)))
        };

        let port = var("SMTP_PORT")?;
        Ok(Self {
            host: var("SMTP_HOST")?,
            port: port.parse().map_err(|_| {
                Error::Configuration(format!("SMTP_PORT '{}' is not a port number", port))
            })?,
            username: var("SMTP_USERNAME")?,
            password: var("SMTP_PASSWORD")?,
            from: parse_mailbox(&var("SMTP_FROM_EMAIL")?)?,
            to: parse_recipients(&var("SMTP_TO_EMAILS")?)?,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid e-mail address '{}': {}", address, e)))
}

fn parse_recipients(list: &str) -> Result<Vec<Mailbox>> {
    let to = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_mailbox)
        .collect::<Result<Vec<_>>>()?;
    if to.is_empty() {
        return Err(Error::Configuration(
            "SMTP_TO_EMAILS must contain at least one address".to_string(),
        ));
    }
    Ok(to)
}

/// Sends one e-mail per failed job to every configured recipient
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: SmtpTransport,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn from_env() -> Result<Self> {
        Self::new(SmtpSettings::from_env()?)
    }

    pub fn new(settings: SmtpSettings) -> Result<Self> {
        let mailer = SmtpTransport::relay(&settings.host)
            .map_err(|e| Error::Connection(format!("SMTP relay {}: {}", settings.host, e)))?
            .port(settings.port)
            .credentials(Credentials::new(settings.username, settings.password))
            .build();

        Ok(Self {
            mailer,
            from: settings.from,
            to: settings.to,
        })
    }

    fn message(&self, result: &JobResult) -> Result<Message> {
        let mut builder = Message::builder().from(self.from.clone()).subject(format!(
            "[Account Sync] Job {} of flow '{}' failed",
            result.job_id, result.flow
        ));
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(failure_report(result))
            .map_err(|e| Error::Configuration(format!("Failed to build e-mail: {}", e)))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify_job_failed(&self, result: &JobResult) -> Result<()> {
        let message = self.message(result)?;
        let mailer = self.mailer.clone();

        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| Error::Generic(anyhow::anyhow!("E-mail task panicked: {}", e)))?
            .map_err(|e| Error::Connection(format!("Failed to send failure e-mail: {}", e)))?;

        tracing::info!(
            "Failure e-mail for job {} sent to {} recipient(s)",
            result.job_id,
            self.to.len()
        );
        Ok(())
    }
}

/// Plain-text report of a failed job
pub fn failure_report(result: &JobResult) -> String {
    let mut body = format!(
        "Flow: {}\nJob: {}\nRecords: {} total, {} succeeded, {} failed, {} filtered\nFinished: {}\n\nFailures:\n",
        result.flow,
        result.job_id,
        result.total,
        result.succeeded,
        result.failed,
        result.filtered,
        result.finished_at.to_rfc3339()
    );
    for failure in &result.failures {
        let record = failure
            .name
            .as_deref()
            .or(failure.record_id.as_deref())
            .unwrap_or("<unnamed>");
        let _ = writeln!(
            body,
            "- #{} {} -> {}: {}",
            failure.index, record, failure.adapter, failure.reason
        );
    }
    body
}

/// Logs failed jobs instead of sending them anywhere
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify_job_failed(&self, result: &JobResult) -> Result<()> {
        tracing::warn!(
            "Job {} of flow '{}' failed with {} failure(s); e-mail notification not configured",
            result.job_id,
            result.flow,
            result.failures.len()
        );
        Ok(())
    }
}
