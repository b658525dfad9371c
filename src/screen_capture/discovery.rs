use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};

use super::types::Session;
use crate::configuration::types::DiscoveryConfig;
use crate::error_handling::types::CaptureError;

/// Source of the sessions to capture in one run.
///
/// Implementations return sessions ordered by id with no duplicates. An empty
/// list is a valid answer.
pub trait SessionDiscovery: Send + Sync {
    fn discover(&self) -> Result<Vec<Session>, CaptureError>;
}

/// Builds the discovery strategy named by the configuration.
pub fn from_config(config: &DiscoveryConfig) -> Box<dyn SessionDiscovery> {
    match config {
        DiscoveryConfig::Vnc {
            host,
            password,
            sessions,
        } => Box::new(StaticSessionList::vnc(host, password.clone(), sessions)),
        DiscoveryConfig::X11 { socket_dir } => {
            Box::new(DisplaySocketDiscovery::new(socket_dir.clone()))
        }
    }
}

/// Orders sessions by id and keeps the first of each id.
pub(crate) fn normalize(mut sessions: Vec<Session>) -> Vec<Session> {
    sessions.sort_by_key(|s| s.id);
    sessions.dedup_by_key(|s| s.id);
    sessions
}

/// A fixed list of sessions, typically VNC session numbers from the config.
#[derive(Debug, Clone)]
pub struct StaticSessionList {
    sessions: Vec<Session>,
}

impl StaticSessionList {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions: normalize(sessions),
        }
    }

    pub fn vnc(host: &str, password: Option<String>, ids: &[u32]) -> Self {
        let sessions = ids
            .iter()
            .filter_map(|&id| {
                let session = Session::vnc(id, host, password.clone());
                if session.is_none() {
                    warn!("Ignoring VNC session {}: port out of range", id);
                }
                session
            })
            .collect();
        Self::new(sessions)
    }
}

impl SessionDiscovery for StaticSessionList {
    fn discover(&self) -> Result<Vec<Session>, CaptureError> {
        debug!("Static discovery yields {} sessions", self.sessions.len());
        Ok(self.sessions.clone())
    }
}

/// Finds local X displays from the `X<n>` sockets in the X11 socket directory.
#[derive(Debug, Clone)]
pub struct DisplaySocketDiscovery {
    socket_dir: PathBuf,
}

impl DisplaySocketDiscovery {
    pub fn new(socket_dir: PathBuf) -> Self {
        Self { socket_dir }
    }
}

impl SessionDiscovery for DisplaySocketDiscovery {
    fn discover(&self) -> Result<Vec<Session>, CaptureError> {
        let entries = match fs::read_dir(&self.socket_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "X11 socket directory {} does not exist, no displays",
                    self.socket_dir.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(CaptureError::Discovery(format!(
                    "{}: {}",
                    self.socket_dir.display(),
                    e
                )))
            }
        };

        let sessions = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let id = name.to_str()?.strip_prefix('X')?.parse::<u32>().ok()?;
                Some(Session::x11(id))
            })
            .collect();

        Ok(normalize(sessions))
    }
}
