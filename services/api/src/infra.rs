use metrics_exporter_prometheus::PrometheusHandle;
use risk_intake::config::AppConfig;
use risk_intake::error::AppError;
use risk_intake::workflows::security::{Catalog, IntakeService, StoreBackend, TrackerBackend};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub(crate) type AppIntakeService = IntakeService<StoreBackend, TrackerBackend>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire catalog, storage and tracker backends chosen by configuration.
pub(crate) fn build_intake_service(
    config: &AppConfig,
    shutdown: CancellationToken,
) -> Result<AppIntakeService, AppError> {
    let catalog = Catalog::load(config.storage.catalog_path.as_deref())?;
    let store = StoreBackend::from_dir(config.storage.store_dir.as_deref())?;
    let tracker = TrackerBackend::from_config(&config.tracker)?;

    let store_kind = match &store {
        StoreBackend::Memory(_) => "memory",
        StoreBackend::File(_) => "file",
    };
    let tracker_kind = match &tracker {
        TrackerBackend::Null(_) => "null",
        TrackerBackend::Http(_) => "http",
    };
    info!(
        criteria = catalog.criteria.len(),
        store = store_kind,
        tracker = tracker_kind,
        "intake service configured"
    );

    Ok(IntakeService::new(Arc::new(catalog), Arc::new(store), Arc::new(tracker))
        .with_issue_base_url(config.tracker.issue_base_url.clone())
        .with_shutdown(shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_intake::config::{
        AppEnvironment, ServerConfig, StorageConfig, TelemetryConfig, TrackerConfig,
    };

    fn config(storage: StorageConfig) -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                ansi: false,
            },
            tracker: TrackerConfig {
                issue_base_url: Some("https://acme.atlassian.net".to_string()),
                ..TrackerConfig::default()
            },
            storage,
        }
    }

    #[test]
    fn builds_file_backed_service_from_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let service = build_intake_service(
            &config(StorageConfig {
                store_dir: Some(dir.path().join("sessions")),
                catalog_path: None,
            }),
            CancellationToken::new(),
        )
        .expect("service builds");

        let session = service.view("SEC-7").expect("session view");
        assert_eq!(
            session.issue_url.as_deref(),
            Some("https://acme.atlassian.net/browse/SEC-7")
        );
        assert!(!service.catalog().criteria.is_empty());
    }

    #[test]
    fn missing_catalog_file_fails_startup() {
        let result = build_intake_service(
            &config(StorageConfig {
                store_dir: None,
                catalog_path: Some("/nonexistent/catalog.json".into()),
            }),
            CancellationToken::new(),
        );

        assert!(matches!(result, Err(AppError::Catalog(_))));
    }

    #[test]
    fn shutdown_token_is_shared_with_the_service() {
        let shutdown = CancellationToken::new();
        let service =
            build_intake_service(&config(StorageConfig::default()), shutdown.clone())
                .expect("service builds");

        shutdown.cancel();
        assert!(service.shutdown_token().is_cancelled());
    }
}
