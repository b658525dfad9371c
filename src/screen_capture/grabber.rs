//! Screen-grab delegates.
//!
//! Grabbing itself is left to an external program. [`CommandGrabber`] runs
//! an argv template with these placeholders substituted per session:
//!
//! | placeholder  | value                                         |
//! |--------------|-----------------------------------------------|
//! | `{host}`     | VNC host, `localhost` for local displays       |
//! | `{port}`     | VNC port (`5900 + N`), empty for local displays |
//! | `{display}`  | `host:N` for VNC, `:N` for local displays      |
//! | `{session}`  | session number                                 |
//! | `{password}` | session credential, empty when there is none   |
//! | `{output}`   | screenshot path to write                       |
//!
//! [`VncGrabber`] first checks that a VNC server actually answers, so that a
//! dead session is reported as a network error instead of a tool failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncReadExt;
use tokio::net::{lookup_host, TcpStream};
use tokio::process::Command;

use super::types::{Endpoint, Session};
use crate::error_handling::types::{CaptureError, NetworkFailure};

pub const DEFAULT_VNC_COMMAND: [&str; 7] = [
    "vncdo",
    "-s",
    "{host}::{port}",
    "-p",
    "{password}",
    "capture",
    "{output}",
];

pub const DEFAULT_X11_COMMAND: [&str; 6] =
    ["import", "-display", "{display}", "-window", "root", "{output}"];

const STDERR_EXCERPT_LEN: usize = 512;

/// Captures a still image of one session to a path.
///
/// Implementations may block for as long as they like; the caller bounds
/// them with a timeout and abandons them when it expires.
#[async_trait]
pub trait ScreenGrabber: Send + Sync {
    async fn grab(&self, session: &Session, output: &Path) -> Result<PathBuf, CaptureError>;
}

#[derive(Debug, Clone)]
pub struct CommandGrabber {
    template: Vec<String>,
}

impl CommandGrabber {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }

    /// The argv for `session`, with every placeholder substituted.
    pub fn render(&self, session: &Session, output: &Path) -> Vec<String> {
        let (host, port) = match &session.endpoint {
            Endpoint::Vnc { host, port } => (host.clone(), port.to_string()),
            Endpoint::Display { .. } => ("localhost".to_string(), String::new()),
        };
        let display = session.display_name();
        let id = session.id.to_string();
        let password = session.credential.clone().unwrap_or_default();
        let output = output.to_string_lossy();

        self.template
            .iter()
            .map(|arg| {
                arg.replace("{host}", &host)
                    .replace("{port}", &port)
                    .replace("{display}", &display)
                    .replace("{session}", &id)
                    .replace("{password}", &password)
                    .replace("{output}", &output)
            })
            .collect()
    }
}

#[async_trait]
impl ScreenGrabber for CommandGrabber {
    async fn grab(&self, session: &Session, output: &Path) -> Result<PathBuf, CaptureError> {
        let argv = self.render(session, output);
        let Some((program, args)) = argv.split_first() else {
            return Err(CaptureError::Application("empty capture command".to_string()));
        };

        debug!("[{}] running {}", session.label(), program);
        let result = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CaptureError::Application(format!("failed to launch {}: {}", program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT_LEN).collect();
            return Err(CaptureError::Application(format!(
                "{} exited with {}: {}",
                program, result.status, excerpt
            )));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() => Ok(output.to_path_buf()),
            _ => Err(CaptureError::Application(format!(
                "{} reported success but wrote no image to {}",
                program,
                output.display()
            ))),
        }
    }
}

/// Probes the VNC server of a session before handing it to the capture command.
#[derive(Debug, Clone)]
pub struct VncGrabber {
    command: CommandGrabber,
}

impl VncGrabber {
    pub fn new(command: CommandGrabber) -> Self {
        Self { command }
    }

    /// Connects to `host:port` and reads the RFB protocol greeting.
    ///
    /// Returns the server's protocol version as `(major, minor)`.
    pub async fn probe(host: &str, port: u16) -> Result<(u16, u16), CaptureError> {
        let addrs: Vec<_> = lookup_host((host, port))
            .await
            .map_err(|e| CaptureError::network(NetworkFailure::Dns, format!("{}: {}", host, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(CaptureError::network(
                NetworkFailure::Dns,
                format!("{} has no addresses", host),
            ));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(mut stream) => {
                    let mut greeting = [0u8; 12];
                    stream
                        .read_exact(&mut greeting)
                        .await
                        .map_err(|e| CaptureError::from_io(&e))?;
                    return parse_rfb_greeting(&greeting);
                }
                Err(e) => {
                    debug!("Connection to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => CaptureError::from_io(&e),
            None => CaptureError::network(NetworkFailure::Io, "no connection attempted"),
        })
    }
}

#[async_trait]
impl ScreenGrabber for VncGrabber {
    async fn grab(&self, session: &Session, output: &Path) -> Result<PathBuf, CaptureError> {
        if let Endpoint::Vnc { host, port } = &session.endpoint {
            match Self::probe(host, *port).await {
                Ok((major, minor)) => {
                    debug!("[{}] RFB {}.{} server answered", session.label(), major, minor)
                }
                Err(e) => {
                    warn!("[{}] VNC probe failed: {}", session.label(), e);
                    return Err(e);
                }
            }
        }
        self.command.grab(session, output).await
    }
}

/// Parses an RFB `ProtocolVersion` message: `RFB xxx.yyy\n`.
pub fn parse_rfb_greeting(greeting: &[u8; 12]) -> Result<(u16, u16), CaptureError> {
    let malformed = || {
        CaptureError::Protocol(format!(
            "unexpected greeting {:?}",
            String::from_utf8_lossy(greeting)
        ))
    };

    if &greeting[..4] != b"RFB " || greeting[7] != b'.' || greeting[11] != b'\n' {
        return Err(malformed());
    }
    let number = |digits: &[u8]| -> Option<u16> {
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        std::str::from_utf8(digits).ok()?.parse().ok()
    };

    match (number(&greeting[4..7]), number(&greeting[8..11])) {
        (Some(major), Some(minor)) => Ok((major, minor)),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn shell(script: &str) -> CommandGrabber {
        CommandGrabber::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "{output}".to_string(),
        ])
    }

    fn local_vnc(port: u16) -> Session {
        Session {
            id: 1,
            endpoint: Endpoint::Vnc {
                host: "127.0.0.1".to_string(),
                port,
            },
            credential: Some("pw".to_string()),
        }
    }

    /// Serves one connection with `greeting` and returns the port.
    async fn serve_once(greeting: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(greeting).await;
            }
        });
        port
    }

    #[test]
    fn test_render_vnc_template() {
        let grabber = CommandGrabber::new(DEFAULT_VNC_COMMAND.iter().map(|s| s.to_string()).collect());
        let session = Session::vnc(2, "obs", Some("pw".to_string())).unwrap();
        let argv = grabber.render(&session, Path::new("/tmp/out.png"));
        assert_eq!(
            argv,
            vec!["vncdo", "-s", "obs::5902", "-p", "pw", "capture", "/tmp/out.png"]
        );
    }

    #[test]
    fn test_render_x11_template() {
        let grabber = CommandGrabber::new(DEFAULT_X11_COMMAND.iter().map(|s| s.to_string()).collect());
        let argv = grabber.render(&Session::x11(1), Path::new("shot.png"));
        assert_eq!(argv, vec!["import", "-display", ":1", "-window", "root", "shot.png"]);
    }

    #[test]
    fn test_parse_greeting() {
        assert_eq!(parse_rfb_greeting(b"RFB 003.008\n").unwrap(), (3, 8));
        assert!(matches!(
            parse_rfb_greeting(b"HTTP/1.1 200"),
            Err(CaptureError::Protocol(_))
        ));
        assert!(parse_rfb_greeting(b"RFB 00x.008\n").is_err());
    }

    #[tokio::test]
    async fn test_command_grabber_success() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.png");
        let grabber = shell("printf png > \"$0\"");

        let path = grabber.grab(&Session::x11(1), &output).await.unwrap();
        assert_eq!(path, output);
        assert_eq!(std::fs::read(&output).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_command_grabber_failures_are_application_errors() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.png");

        let err = shell("echo 'no display' >&2; exit 3")
            .grab(&Session::x11(1), &output)
            .await
            .unwrap_err();
        match err {
            CaptureError::Application(msg) => assert!(msg.contains("no display")),
            other => panic!("unexpected error {:?}", other),
        }

        let err = shell("true").grab(&Session::x11(1), &output).await.unwrap_err();
        assert!(matches!(err, CaptureError::Application(_)));

        let err = CommandGrabber::new(vec!["/nonexistent/gecko-grab".to_string()])
            .grab(&Session::x11(1), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Application(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_vnc_probe_reads_greeting() {
        let port = serve_once(b"RFB 003.008\n").await;
        assert_eq!(VncGrabber::probe("127.0.0.1", port).await.unwrap(), (3, 8));
    }

    #[tokio::test]
    async fn test_vnc_probe_rejects_other_protocols() {
        let port = serve_once(b"SSH-2.0-Open").await;
        let err = VncGrabber::probe("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, CaptureError::Protocol(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_vnc_probe_short_greeting_is_reset() {
        let port = serve_once(b"RFB").await;
        let err = VncGrabber::probe("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Network {
                kind: NetworkFailure::ConnectionReset,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_vnc_grabber_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dir = TempDir::new().unwrap();
        let grabber = VncGrabber::new(shell("printf png > \"$0\""));
        let err = grabber
            .grab(&local_vnc(port), &dir.path().join("shot.png"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Network {
                kind: NetworkFailure::ConnectionRefused,
                ..
            }
        ));
        assert!(err.is_retryable());
        assert!(!dir.path().join("shot.png").exists());
    }

    #[tokio::test]
    async fn test_vnc_grabber_delegates_after_probe() {
        let port = serve_once(b"RFB 003.008\n").await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.png");

        let grabber = VncGrabber::new(shell("printf png > \"$0\""));
        let path = grabber.grab(&local_vnc(port), &output).await.unwrap();
        assert_eq!(path, output);
    }
}
