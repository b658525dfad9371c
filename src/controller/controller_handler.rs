use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::bundle::{Bundle, BundleAssembler};
use crate::configuration::types::TriageConfig;
use crate::delivery::{Deliverer, OutgoingReport, SendmailDelivery};
use crate::error_handling::types::{CaptureError, ScienceError, TriageError};
use crate::log_scanning::{gather_logs, LogScanner};
use crate::report::layout::RunLayout;
use crate::report::render;
use crate::report::writer::{ReportSection, ReportWriter};
use crate::science::collect_latest;
use crate::screen_capture::discovery::{self, SessionDiscovery};
use crate::screen_capture::{
    grabber_from_config, BoundedCaptureRunner, CaptureOrchestrator, CaptureOutcome,
    CaptureStatus, CaptureSummary, ScreenGrabber,
};
use crate::system_info::{MetricsProvider, ProcfsMetrics};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Disabled,
    Sent,
    Failed(String),
}

/// What one run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub report_path: PathBuf,
    pub bundle: Bundle,
    pub log_matches: usize,
    pub captures: CaptureSummary,
    pub science: Option<PathBuf>,
    pub notes: Vec<String>,
    pub delivery: DeliveryStatus,
}

/// Drives one triage run from report creation to delivery.
///
/// The controller is the only writer of the report. Log scanning, screen
/// capture, the metrics sample and the science snapshot run concurrently and
/// hand their results back by value; the controller then appends the
/// sections in their fixed order.
pub struct TriageController {
    config: TriageConfig,
    metrics: Arc<dyn MetricsProvider>,
    discovery: Arc<dyn SessionDiscovery>,
    grabber: Arc<dyn ScreenGrabber>,
    deliverer: Option<Arc<dyn Deliverer>>,
}

impl TriageController {
    /// A controller wired to the host: procfs metrics, the configured
    /// session discovery and grabber, and sendmail when alerts are enabled.
    pub fn new(config: TriageConfig) -> Self {
        let metrics: Arc<dyn MetricsProvider> = Arc::new(ProcfsMetrics::new());
        let discovery: Arc<dyn SessionDiscovery> =
            Arc::from(discovery::from_config(&config.capture.discovery));
        let grabber = grabber_from_config(&config.capture);
        let deliverer = config
            .report
            .delivery
            .clone()
            .map(|d| Arc::new(SendmailDelivery::new(d)) as Arc<dyn Deliverer>);

        Self::with_collaborators(config, metrics, discovery, grabber, deliverer)
    }

    pub fn with_collaborators(
        config: TriageConfig,
        metrics: Arc<dyn MetricsProvider>,
        discovery: Arc<dyn SessionDiscovery>,
        grabber: Arc<dyn ScreenGrabber>,
        deliverer: Option<Arc<dyn Deliverer>>,
    ) -> Self {
        Self {
            config,
            metrics,
            discovery,
            grabber,
            deliverer,
        }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub async fn run(&self, message: &str) -> Result<RunSummary, TriageError> {
        self.run_at(Utc::now(), message).await
    }

    /// Runs the collection as if started at `started`. The log window and
    /// every file name are derived from this instant.
    pub async fn run_at(
        &self,
        started: DateTime<Utc>,
        message: &str,
    ) -> Result<RunSummary, TriageError> {
        info!("Starting triage run at {}", started.to_rfc3339());

        let layout = RunLayout::create(&self.config.report.report_root, started)?;
        let mut report = ReportWriter::create(layout.report_path())?;

        let message = message.trim();
        let message = if message.is_empty() {
            "(no message provided)"
        } else {
            message
        };
        report.write_section(ReportSection::UserMessage, message)?;

        let metrics = Arc::clone(&self.metrics);
        let metrics_task = tokio::task::spawn_blocking(move || metrics.snapshot());

        let scanner = LogScanner::from_config(&self.config.logs, started);
        let sources = self.config.logs.sources.clone();
        let scan_task = tokio::task::spawn_blocking(move || {
            let scan = scanner.scan_all(&sources);
            (scanner.cutoff(), scan)
        });

        let science_task = {
            let image_root = self.config.science.image_root.clone();
            let extensions = self.config.science.extensions.clone();
            let dest = layout.run_dir().to_path_buf();
            tokio::task::spawn_blocking(move || match image_root {
                Some(root) => collect_latest(&root, &extensions, &dest),
                None => Err(ScienceError::NotConfigured),
            })
        };

        let (metrics_result, scan_result, capture_result, science_result) = tokio::join!(
            metrics_task,
            scan_task,
            self.capture_sessions(&layout),
            science_task
        );

        let system_info = match metrics_result {
            Ok(Ok(snapshot)) => snapshot.to_string(),
            Ok(Err(e)) => {
                report.note(format!("System information unavailable: {}", e));
                "Unavailable.\n".to_string()
            }
            Err(e) => {
                report.note(format!("System information task failed: {}", e));
                "Unavailable.\n".to_string()
            }
        };
        report.write_section(ReportSection::SystemInfo, &system_info)?;

        let (cutoff, scan) = scan_result?;
        for skipped in &scan.skipped {
            report.note(format!(
                "Log source {} skipped: {}",
                skipped.path.display(),
                skipped.reason
            ));
        }
        report.write_section(ReportSection::LogExcerpts, &render::log_excerpts(&scan, cutoff))?;

        let outcomes = match capture_result {
            Ok(outcomes) => {
                if outcomes.is_empty() {
                    report.note("No display sessions found; screen capture skipped");
                }
                outcomes
            }
            Err(CaptureError::Discovery(e)) => {
                report.note(format!("Session discovery failed, capture skipped: {}", e));
                Vec::new()
            }
            Err(e) => {
                error!("Screen capture aborted: {}", e);
                return Err(TriageError::CaptureError(e));
            }
        };
        for outcome in &outcomes {
            match outcome.status() {
                CaptureStatus::Success(_) => {}
                status => report.note(format!(
                    "Capture of session {} {}",
                    outcome.session().label(),
                    status
                )),
            }
        }
        report.write_section(ReportSection::Captures, &render::captures(&outcomes))?;

        let science = match science_result? {
            Ok(path) => Some(path),
            Err(ScienceError::NotConfigured) => {
                info!("No science image root configured");
                None
            }
            Err(e) => {
                report.note(format!("Science snapshot not collected: {}", e));
                None
            }
        };
        report.write_section(ReportSection::Science, &render::science(science.as_deref()))?;

        let gather = {
            let sources = self.config.logs.sources.clone();
            let suffixes = self.config.logs.suffixes.clone();
            let dest = layout.run_dir().to_path_buf();
            tokio::task::spawn_blocking(move || gather_logs(&sources, &suffixes, &dest)).await?
        };
        for failed in &gather.failed {
            report.note(format!(
                "Log {} not copied: {}",
                failed.path.display(),
                failed.reason
            ));
        }

        let notes = report.notes().to_vec();
        let report_path = report.finish()?;

        let bundle = {
            let run_dir = layout.run_dir().to_path_buf();
            let archive = layout.archive_path().to_path_buf();
            tokio::task::spawn_blocking(move || BundleAssembler::assemble(&run_dir, &archive))
                .await??
        };

        let delivery = self.deliver(&layout, &report_path, &bundle, &outcomes).await;

        let summary = RunSummary {
            run_dir: layout.run_dir().to_path_buf(),
            report_path,
            bundle,
            log_matches: scan.matches.len(),
            captures: CaptureSummary::from_outcomes(&outcomes),
            science,
            notes,
            delivery,
        };
        info!(
            "Triage run complete: {} ({} log entries, {})",
            summary.bundle.path.display(),
            summary.log_matches,
            summary.captures
        );
        Ok(summary)
    }

    async fn capture_sessions(&self, layout: &RunLayout) -> Result<Vec<CaptureOutcome>, CaptureError> {
        let discovery = Arc::clone(&self.discovery);
        let sessions = tokio::task::spawn_blocking(move || discovery.discover())
            .await
            .map_err(|e| CaptureError::Discovery(format!("discovery task failed: {}", e)))??;
        let runner = BoundedCaptureRunner::new(Arc::clone(&self.grabber), self.config.capture.timeout);
        CaptureOrchestrator::new(runner, self.config.capture.max_parallel)
            .run_all(sessions, layout)
            .await
    }

    async fn deliver(
        &self,
        layout: &RunLayout,
        report_path: &Path,
        bundle: &Bundle,
        outcomes: &[CaptureOutcome],
    ) -> DeliveryStatus {
        let Some(deliverer) = &self.deliverer else {
            return DeliveryStatus::Disabled;
        };

        let body = match tokio::fs::read_to_string(report_path).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Cannot read report for mailing: {}", e);
                format!("Report attached as {}\n", bundle.path.display())
            }
        };
        let mut attachments = vec![bundle.path.clone()];
        attachments.extend(outcomes.iter().filter_map(|o| o.screenshot().cloned()));

        let outgoing = OutgoingReport {
            subject: format!(
                "Gecko triage report {}",
                layout.started().format("%Y-%m-%d %H:%M:%S UTC")
            ),
            body,
            attachments,
        };

        match deliverer.deliver(&outgoing).await {
            Ok(()) => DeliveryStatus::Sent,
            Err(e) => {
                error!("Report delivery failed, bundle kept at {}: {}", bundle.path.display(), e);
                DeliveryStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::{DeliveryError, MetricsError};
    use crate::screen_capture::runner::tests::FakeGrabber;
    use crate::screen_capture::{Session, StaticSessionList};
    use crate::system_info::SystemSnapshot;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedMetrics(bool);

    impl MetricsProvider for FixedMetrics {
        fn snapshot(&self) -> Result<SystemSnapshot, MetricsError> {
            if self.0 {
                let mut snapshot = SystemSnapshot::empty(Utc::now());
                snapshot.hostname = Some("obs-control".to_string());
                Ok(snapshot)
            } else {
                Err(MetricsError::Unavailable("no procfs".to_string()))
            }
        }
    }

    #[derive(Default)]
    struct RecordingDeliverer {
        sent: Mutex<Vec<OutgoingReport>>,
        fail: bool,
    }

    #[async_trait]
    impl Deliverer for RecordingDeliverer {
        async fn deliver(&self, report: &OutgoingReport) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::TransportFailed("mail queue full".to_string()));
            }
            self.sent.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    struct Fixture {
        root: TempDir,
        started: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            fs::create_dir_all(root.path().join("reports")).unwrap();
            fs::create_dir_all(root.path().join("logs")).unwrap();
            fs::create_dir_all(root.path().join("science")).unwrap();
            Self {
                root,
                started: Utc::now(),
            }
        }

        fn stamp(&self, age: Duration) -> String {
            (self.started - age).format("%Y-%m-%d %H:%M:%S").to_string()
        }

        fn config(&self) -> TriageConfig {
            let toml = format!(
                r#"
                [report]
                report_root = {reports:?}

                [logs]
                sources = [{logs:?}]

                [capture]
                timeout_secs = 5

                [science]
                image_root = {science:?}
                "#,
                reports = self.root.path().join("reports").display().to_string(),
                logs = self.root.path().join("logs").display().to_string(),
                science = self.root.path().join("science").display().to_string(),
            );
            TriageConfig::from_toml_str(&toml).unwrap()
        }
    }

    fn controller(
        config: TriageConfig,
        sessions: &[u32],
        grabber: FakeGrabber,
        deliverer: Option<Arc<dyn Deliverer>>,
    ) -> TriageController {
        let sessions = sessions.iter().map(|&id| Session::x11(id)).collect();
        TriageController::with_collaborators(
            config,
            Arc::new(FixedMetrics(true)),
            Arc::new(StaticSessionList::new(sessions)),
            Arc::new(grabber),
            deliverer,
        )
    }

    #[tokio::test]
    async fn test_full_run() {
        let _ = env_logger::builder().is_test(true).try_init();
        let fx = Fixture::new();
        fs::write(
            fx.root.path().join("logs/instrument.log"),
            format!(
                "{} error: disk full\n{} warning: temp high\n{} info: all good\n",
                fx.stamp(Duration::hours(48)),
                fx.stamp(Duration::hours(1)),
                fx.stamp(Duration::minutes(5)),
            ),
        )
        .unwrap();
        fs::write(fx.root.path().join("science/frame.fits"), b"SIMPLE").unwrap();

        let mut grabber = FakeGrabber::new();
        grabber.refuse.insert(2);
        let deliverer = Arc::new(RecordingDeliverer::default());
        let controller = controller(
            fx.config(),
            &[1, 2, 3],
            grabber,
            Some(deliverer.clone() as Arc<dyn Deliverer>),
        );

        let summary = controller.run_at(fx.started, "dome stuck").await.unwrap();

        assert_eq!(summary.log_matches, 1);
        assert_eq!(summary.captures.succeeded, 2);
        assert_eq!(summary.captures.failed, 1);
        assert!(summary.science.as_ref().unwrap().ends_with("frame.fits"));
        assert_eq!(summary.delivery, DeliveryStatus::Sent);
        assert!(summary.bundle.path.exists());
        assert!(summary.run_dir.join("instrument.log").exists());

        let text = fs::read_to_string(&summary.report_path).unwrap();
        let order: Vec<usize> = [
            "=====Reported Error From User=====",
            "=====System Information=====",
            "=====Log Excerpts=====",
            "=====Screen Captures=====",
            "=====Science Snapshot=====",
            "=====Collection Notes=====",
        ]
        .iter()
        .map(|header| text.find(header).unwrap())
        .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert!(text.contains("dome stuck"));
        assert!(text.contains("temp high"));
        assert!(!text.contains("disk full"));
        assert!(text.contains("Capture of session 02 failed"));

        let sent = deliverer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attachments.len(), 3);
        assert_eq!(sent[0].attachments[0], summary.bundle.path);
    }

    #[tokio::test]
    async fn test_degraded_run_still_bundles() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.science.image_root = Some(fx.root.path().join("no-science"));

        let deliverer: Arc<dyn Deliverer> = Arc::new(RecordingDeliverer {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let controller = TriageController::with_collaborators(
            config,
            Arc::new(FixedMetrics(false)),
            Arc::new(StaticSessionList::new(Vec::new())),
            Arc::new(FakeGrabber::new()),
            Some(deliverer),
        );

        let summary = controller.run_at(fx.started, "").await.unwrap();

        assert!(summary.bundle.path.exists());
        assert_eq!(summary.captures.total, 0);
        assert!(summary.science.is_none());
        assert!(matches!(summary.delivery, DeliveryStatus::Failed(_)));
        assert!(summary.notes.iter().any(|n| n.contains("No display sessions")));
        assert!(summary.notes.iter().any(|n| n.contains("System information unavailable")));
        assert!(summary.notes.iter().any(|n| n.contains("Science snapshot not collected")));

        let text = fs::read_to_string(&summary.report_path).unwrap();
        assert!(text.contains("(no message provided)"));
    }

    /// Lists sessions with a call that is only legal off the async workers.
    struct BlockingDiscovery;

    impl SessionDiscovery for BlockingDiscovery {
        fn discover(&self) -> Result<Vec<Session>, CaptureError> {
            tokio::runtime::Handle::current().block_on(tokio::task::yield_now());
            Ok(vec![Session::x11(1)])
        }
    }

    #[tokio::test]
    async fn test_discovery_runs_off_the_async_workers() {
        let fx = Fixture::new();
        let controller = TriageController::with_collaborators(
            fx.config(),
            Arc::new(FixedMetrics(true)),
            Arc::new(BlockingDiscovery),
            Arc::new(FakeGrabber::new()),
            None,
        );

        let summary = controller.run_at(fx.started, "").await.unwrap();
        assert_eq!(summary.captures.succeeded, 1);
    }

    #[tokio::test]
    async fn test_second_run_in_same_second_is_refused() {
        let fx = Fixture::new();
        let controller = controller(fx.config(), &[], FakeGrabber::new(), None);

        let first = controller.run_at(fx.started, "one").await.unwrap();
        assert_eq!(first.delivery, DeliveryStatus::Disabled);

        let err = controller.run_at(fx.started, "two").await.unwrap_err();
        assert!(matches!(err, TriageError::ReportError(_)));
    }
}
