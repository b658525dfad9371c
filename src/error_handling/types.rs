use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
    BadPattern(String),
    MissingValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::BadPattern(e) => write!(f, "Invalid pattern: {}", e),
            ConfigError::MissingValue(e) => write!(f, "Missing value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Why a single log source was left out of a scan or gather.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    NotFound,
    PermissionDenied,
    Decode,
    IoError(String),
}

impl ScanError {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ScanError::NotFound,
            io::ErrorKind::PermissionDenied => ScanError::PermissionDenied,
            _ => ScanError::IoError(err.to_string()),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::NotFound => write!(f, "file not found"),
            ScanError::PermissionDenied => write!(f, "permission denied"),
            ScanError::Decode => write!(f, "contents are not valid UTF-8"),
            ScanError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ScanError {}

/// Network-layer failure classes. These are worth retrying on a later run,
/// unlike protocol or application failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    ConnectionRefused,
    ConnectionReset,
    Dns,
    Io,
}

impl NetworkFailure {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetworkFailure::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => NetworkFailure::ConnectionReset,
            _ => NetworkFailure::Io,
        }
    }
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkFailure::ConnectionRefused => write!(f, "connection refused"),
            NetworkFailure::ConnectionReset => write!(f, "connection reset"),
            NetworkFailure::Dns => write!(f, "name resolution failed"),
            NetworkFailure::Io => write!(f, "network IO error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    Network {
        kind: NetworkFailure,
        message: String,
    },
    Protocol(String),
    Application(String),
    Discovery(String),
    OutputUnavailable(String),
}

impl CaptureError {
    pub fn network(kind: NetworkFailure, message: impl fmt::Display) -> Self {
        CaptureError::Network {
            kind,
            message: message.to_string(),
        }
    }

    pub fn from_io(err: &io::Error) -> Self {
        CaptureError::network(NetworkFailure::from_io(err), err)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, CaptureError::Network { .. })
    }

    /// Network failures may clear up on their own; everything else needs a
    /// configuration or software change first.
    pub fn is_retryable(&self) -> bool {
        self.is_network()
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Network { kind, message } => {
                write!(f, "Network error ({}): {}", kind, message)
            }
            CaptureError::Protocol(e) => write!(f, "Protocol error: {}", e),
            CaptureError::Application(e) => write!(f, "Capture failed: {}", e),
            CaptureError::Discovery(e) => write!(f, "Session discovery failed: {}", e),
            CaptureError::OutputUnavailable(e) => write!(f, "Capture output unavailable: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug)]
pub enum ReportError {
    IoError(std::io::Error),
    RunDirectoryExists(String),
    OutOfOrder(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::IoError(e) => write!(f, "Report IO error: {}", e),
            ReportError::RunDirectoryExists(e) => write!(f, "Run directory already exists: {}", e),
            ReportError::OutOfOrder(e) => write!(f, "Report section out of order: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::IoError(err)
    }
}

#[derive(Debug)]
pub enum MetricsError {
    Unavailable(String),
    IoError(std::io::Error),
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::Unavailable(e) => write!(f, "Metrics unavailable: {}", e),
            MetricsError::IoError(e) => write!(f, "Metrics IO error: {}", e),
        }
    }
}

impl std::error::Error for MetricsError {}

impl From<std::io::Error> for MetricsError {
    fn from(err: std::io::Error) -> Self {
        MetricsError::IoError(err)
    }
}

#[derive(Debug)]
pub enum ScienceError {
    NotConfigured,
    RootMissing(String),
    NoArtifacts(String),
    IoError(std::io::Error),
}

impl fmt::Display for ScienceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScienceError::NotConfigured => write!(f, "No science image root configured"),
            ScienceError::RootMissing(e) => write!(f, "Science image root missing: {}", e),
            ScienceError::NoArtifacts(e) => write!(f, "No science artifacts found under {}", e),
            ScienceError::IoError(e) => write!(f, "Science snapshot IO error: {}", e),
        }
    }
}

impl std::error::Error for ScienceError {}

impl From<std::io::Error> for ScienceError {
    fn from(err: std::io::Error) -> Self {
        ScienceError::IoError(err)
    }
}

#[derive(Debug)]
pub enum BundleError {
    IoError(std::io::Error),
    SourceMissing(String),
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleError::IoError(e) => write!(f, "Archive IO error: {}", e),
            BundleError::SourceMissing(e) => write!(f, "Bundle source missing: {}", e),
        }
    }
}

impl std::error::Error for BundleError {}

impl From<std::io::Error> for BundleError {
    fn from(err: std::io::Error) -> Self {
        BundleError::IoError(err)
    }
}

#[derive(Debug)]
pub enum DeliveryError {
    IoError(std::io::Error),
    TransportFailed(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::IoError(e) => write!(f, "Delivery IO error: {}", e),
            DeliveryError::TransportFailed(e) => write!(f, "Mail transport failed: {}", e),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl From<std::io::Error> for DeliveryError {
    fn from(err: std::io::Error) -> Self {
        DeliveryError::IoError(err)
    }
}

/// Run-level failures. Anything that reaches this type aborts the run.
#[derive(Debug)]
pub enum TriageError {
    ConfigurationError(ConfigError),
    ReportError(ReportError),
    CaptureError(CaptureError),
    BundleError(BundleError),
    TaskFailed(String),
}

impl fmt::Display for TriageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriageError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            TriageError::ReportError(e) => write!(f, "Report error: {}", e),
            TriageError::CaptureError(e) => write!(f, "Capture error: {}", e),
            TriageError::BundleError(e) => write!(f, "Bundle error: {}", e),
            TriageError::TaskFailed(e) => write!(f, "Background task failed: {}", e),
        }
    }
}

impl std::error::Error for TriageError {}

impl From<ConfigError> for TriageError {
    fn from(err: ConfigError) -> Self {
        TriageError::ConfigurationError(err)
    }
}

impl From<ReportError> for TriageError {
    fn from(err: ReportError) -> Self {
        TriageError::ReportError(err)
    }
}

impl From<CaptureError> for TriageError {
    fn from(err: CaptureError) -> Self {
        TriageError::CaptureError(err)
    }
}

impl From<BundleError> for TriageError {
    fn from(err: BundleError) -> Self {
        TriageError::BundleError(err)
    }
}

impl From<tokio::task::JoinError> for TriageError {
    fn from(err: tokio::task::JoinError) -> Self {
        TriageError::TaskFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failures_are_classified_from_io_kinds() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let other = io::Error::new(io::ErrorKind::Other, "boom");

        assert_eq!(NetworkFailure::from_io(&refused), NetworkFailure::ConnectionRefused);
        assert_eq!(NetworkFailure::from_io(&reset), NetworkFailure::ConnectionReset);
        assert_eq!(NetworkFailure::from_io(&eof), NetworkFailure::ConnectionReset);
        assert_eq!(NetworkFailure::from_io(&other), NetworkFailure::Io);
    }

    #[test]
    fn only_network_capture_errors_are_retryable() {
        let net = CaptureError::network(NetworkFailure::Dns, "no such host");
        assert!(net.is_network());
        assert!(net.is_retryable());
        assert!(!CaptureError::Protocol("bad greeting".into()).is_retryable());
        assert!(!CaptureError::Application("exit 1".into()).is_retryable());
    }

    #[test]
    fn scan_errors_map_io_kinds() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(ScanError::from_io(&missing), ScanError::NotFound);
        assert_eq!(ScanError::from_io(&denied), ScanError::PermissionDenied);
    }
}
