use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error};
use regex::RegexBuilder;
use serde::Deserialize;

use super::types::*;
use crate::error_handling::types::ConfigError;
use crate::log_scanning::time_window::{
    TimestampRule, DEFAULT_TIMESTAMP_FORMAT, DEFAULT_TIMESTAMP_PATTERN,
};
use crate::screen_capture::grabber::{DEFAULT_VNC_COMMAND, DEFAULT_X11_COMMAND};

/// Longest accepted log lookback: one hundred years.
const MAX_LOOKBACK_HOURS: u64 = 100 * 365 * 24;

/// On-disk layout of the TOML configuration file.
///
/// Only `[report] report_root` is mandatory; every other key has a default.
///
/// ```toml
/// [report]
/// report_root = "/var/log/gecko/reports"
/// recipient = "instrument-master@example.org"
/// email_alerts = true
///
/// [logs]
/// sources = ["/var/log/syslog", "/opt/instrument/logs"]
/// lookback_hours = 24
///
/// [capture]
/// timeout_secs = 15
///
/// [capture.discovery]
/// kind = "vnc"
/// host = "localhost"
/// password = "secret"
/// sessions = [1, 2, 3]
///
/// [science]
/// image_root = "/data/science"
/// extensions = ["fits"]
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    report: ReportSection,
    #[serde(default)]
    logs: LogsSection,
    #[serde(default)]
    capture: CaptureSection,
    #[serde(default)]
    science: ScienceSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReportSection {
    report_root: PathBuf,
    #[serde(default)]
    recipient: String,
    #[serde(default)]
    email_alerts: bool,
    #[serde(default = "default_sendmail_path")]
    sendmail_path: PathBuf,
    #[serde(default = "default_sender")]
    sender: String,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogsSection {
    sources: Vec<PathBuf>,
    suffixes: Vec<String>,
    lookback_hours: u64,
    match_pattern: String,
    timestamp_pattern: String,
    timestamp_format: String,
}

impl Default for LogsSection {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            suffixes: vec![".log".to_string()],
            lookback_hours: 24,
            match_pattern: "error|warning".to_string(),
            timestamp_pattern: DEFAULT_TIMESTAMP_PATTERN.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CaptureSection {
    timeout_secs: u64,
    max_parallel: usize,
    command: Option<Vec<String>>,
    discovery: DiscoverySection,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_parallel: 8,
            command: None,
            discovery: DiscoverySection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum DiscoverySection {
    Vnc {
        #[serde(default = "default_host")]
        host: String,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        sessions: Vec<u32>,
    },
    X11 {
        #[serde(default = "default_socket_dir")]
        socket_dir: PathBuf,
    },
}

impl Default for DiscoverySection {
    fn default() -> Self {
        DiscoverySection::Vnc {
            host: default_host(),
            password: None,
            sessions: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ScienceSection {
    image_root: Option<PathBuf>,
    extensions: Vec<String>,
}

impl Default for ScienceSection {
    fn default() -> Self {
        Self {
            image_root: None,
            extensions: vec!["fits".to_string()],
        }
    }
}

fn default_sendmail_path() -> PathBuf {
    PathBuf::from("/usr/sbin/sendmail")
}

fn default_sender() -> String {
    "gecko-triage@localhost".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_socket_dir() -> PathBuf {
    PathBuf::from("/tmp/.X11-unix")
}

impl TriageConfig {
    /// Reads and validates the configuration file at `path`.
    ///
    /// # Errors
    /// Any problem with the file is fatal for the run: unreadable file, TOML
    /// syntax, or a value that fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            error!("Unable to read configuration {}: {}", path.display(), e);
            ConfigError::IoError(e)
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        let config = file.validate()?;
        debug!("Configuration validated: {:?}", config.report);
        Ok(config)
    }
}

impl ConfigFile {
    fn validate(self) -> Result<TriageConfig, ConfigError> {
        Ok(TriageConfig {
            report: self.report.validate()?,
            logs: self.logs.validate()?,
            capture: self.capture.validate()?,
            science: self.science.validate(),
        })
    }
}

impl ReportSection {
    fn validate(self) -> Result<ReportConfig, ConfigError> {
        if !self.report_root.is_dir() {
            return Err(ConfigError::DirectoryDoesNotExist(format!(
                "report_root {} is not a directory",
                self.report_root.display()
            )));
        }

        let delivery = if self.email_alerts {
            if self.recipient.trim().is_empty() {
                return Err(ConfigError::MissingValue(
                    "report.recipient is required when email_alerts is enabled".to_string(),
                ));
            }
            Some(DeliveryConfig {
                recipient: self.recipient.trim().to_string(),
                sender: self.sender,
                sendmail_path: self.sendmail_path,
            })
        } else {
            None
        };

        Ok(ReportConfig {
            report_root: self.report_root,
            delivery,
        })
    }
}

impl LogsSection {
    fn validate(self) -> Result<LogConfig, ConfigError> {
        if self.lookback_hours == 0 {
            return Err(ConfigError::NotInRange(
                "logs.lookback_hours must be greater than 0".to_string(),
            ));
        }
        let lookback = Some(self.lookback_hours)
            .filter(|hours| *hours <= MAX_LOOKBACK_HOURS)
            .and_then(|hours| i64::try_from(hours).ok())
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                ConfigError::NotInRange(format!(
                    "logs.lookback_hours {} exceeds the maximum of {}",
                    self.lookback_hours, MAX_LOOKBACK_HOURS
                ))
            })?;

        if self.match_pattern.trim().is_empty() {
            return Err(ConfigError::MissingValue("logs.match_pattern".to_string()));
        }
        let match_pattern = RegexBuilder::new(&self.match_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::BadPattern(format!("logs.match_pattern: {}", e)))?;

        if self.timestamp_format.trim().is_empty() {
            return Err(ConfigError::MissingValue("logs.timestamp_format".to_string()));
        }
        let timestamp_rule = TimestampRule::new(&self.timestamp_pattern, &self.timestamp_format)
            .map_err(|e| ConfigError::BadPattern(format!("logs.timestamp_pattern: {}", e)))?;

        Ok(LogConfig {
            sources: self.sources,
            suffixes: self.suffixes,
            lookback,
            match_pattern,
            timestamp_rule,
        })
    }
}

impl CaptureSection {
    fn validate(self) -> Result<CaptureConfig, ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "capture.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::NotInRange(
                "capture.max_parallel must be greater than 0".to_string(),
            ));
        }

        let discovery = match self.discovery {
            DiscoverySection::Vnc {
                host,
                password,
                sessions,
            } => {
                if host.trim().is_empty() {
                    return Err(ConfigError::MissingValue(
                        "capture.discovery.host".to_string(),
                    ));
                }
                let max_session = u32::from(u16::MAX - VNC_BASE_PORT);
                if let Some(bad) = sessions.iter().find(|&&s| s > max_session) {
                    return Err(ConfigError::NotInRange(format!(
                        "VNC session {} exceeds the maximum of {}",
                        bad, max_session
                    )));
                }
                DiscoveryConfig::Vnc {
                    host: host.trim().to_string(),
                    password,
                    sessions,
                }
            }
            DiscoverySection::X11 { socket_dir } => DiscoveryConfig::X11 { socket_dir },
        };

        let command = match self.command {
            Some(command) if command.is_empty() || command[0].trim().is_empty() => {
                return Err(ConfigError::MissingValue(
                    "capture.command must name a program".to_string(),
                ));
            }
            Some(command) => command,
            None => {
                let template: &[&str] = match discovery {
                    DiscoveryConfig::Vnc { .. } => &DEFAULT_VNC_COMMAND,
                    DiscoveryConfig::X11 { .. } => &DEFAULT_X11_COMMAND,
                };
                template.iter().map(|s| s.to_string()).collect()
            }
        };

        Ok(CaptureConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_parallel: self.max_parallel,
            command,
            discovery,
        })
    }
}

impl ScienceSection {
    fn validate(self) -> ScienceConfig {
        let extensions = self
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        ScienceConfig {
            image_root: self.image_root,
            extensions,
        }
    }
}
