//! Hand-off of a finished report to the local mail transport.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use log::{debug, error, info};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::configuration::types::DeliveryConfig;
use crate::error_handling::types::DeliveryError;

const BASE64_LINE_LEN: usize = 76;

/// What gets mailed for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReport {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, report: &OutgoingReport) -> Result<(), DeliveryError>;
}

/// Pipes a MIME message to a sendmail-compatible program (`sendmail -t -i`).
pub struct SendmailDelivery {
    config: DeliveryConfig,
}

impl SendmailDelivery {
    pub fn new(config: DeliveryConfig) -> Self {
        Self { config }
    }

    /// Builds a `multipart/mixed` message with the report as the text part
    /// and every attachment base64 encoded.
    pub fn compose(&self, report: &OutgoingReport) -> Result<String, DeliveryError> {
        let boundary = format!("gecko-{}", Uuid::new_v4().simple());
        let mut message = String::new();

        let _ = write!(
            message,
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
            self.config.sender,
            self.config.recipient,
            report.subject.replace(['\r', '\n'], " "),
            Utc::now().to_rfc2822(),
            boundary
        );

        let _ = write!(
            message,
            "--{}\r\nContent-Type: text/plain; charset=utf-8\r\n\
             Content-Transfer-Encoding: 8bit\r\n\r\n{}\r\n",
            boundary,
            report.body.replace("\r\n", "\n").replace('\n', "\r\n")
        );

        for path in &report.attachments {
            message.push_str(&attachment_part(&boundary, path)?);
        }

        let _ = write!(message, "--{}--\r\n", boundary);
        Ok(message)
    }
}

fn attachment_part(boundary: &str, path: &Path) -> Result<String, DeliveryError> {
    let data = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    let encoded = STANDARD.encode(&data);
    let mut part = format!(
        "--{}\r\nContent-Type: {}; name=\"{}\"\r\n\
         Content-Disposition: attachment; filename=\"{}\"\r\n\
         Content-Transfer-Encoding: base64\r\n\r\n",
        boundary, mime, name, name
    );
    for chunk in encoded.as_bytes().chunks(BASE64_LINE_LEN) {
        // base64 output is ASCII
        part.push_str(&String::from_utf8_lossy(chunk));
        part.push_str("\r\n");
    }
    Ok(part)
}

#[async_trait]
impl Deliverer for SendmailDelivery {
    async fn deliver(&self, report: &OutgoingReport) -> Result<(), DeliveryError> {
        let message = self.compose(report)?;
        debug!(
            "Handing {} byte message to {}",
            message.len(),
            self.config.sendmail_path.display()
        );

        let mut child = Command::new(&self.config.sendmail_path)
            .arg("-t")
            .arg("-i")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!(
                    "Cannot start mail transport {}: {}",
                    self.config.sendmail_path.display(),
                    e
                );
                DeliveryError::IoError(e)
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(message.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(DeliveryError::TransportFailed(format!(
                "{} exited with {}: {}",
                self.config.sendmail_path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!("Report mailed to {}", self.config.recipient);
        Ok(())
    }
}
