//! Dashboard Call - Anruf-Steuerung für das Front-Desk-Dashboard
//!
//! Das Dashboard tritt einem gehosteten Video-Meeting bei und meldet das
//! Anrufende an die native App und an einen Realtime-Datensatz:
//! - Backend-API für Credentials, Benutzerprofil und Stay-Update
//! - Realtime-Datenbank für den Anrufstatus (`status = 3` heißt beendet)
//! - Externer Calling-Service für Medien und Geräte
//! - Zustandsmaschine und Actor für den Anruf-Lebenszyklus

pub mod api;
pub mod call_engine;
pub mod calling;
pub mod config;
pub mod host;
pub mod realtime;
pub mod session;
pub mod view;

pub use call_engine::{
    CallController, CallPhase, Collaborators, ControllerError, ControllerEvent,
    ControllerSnapshot,
};
pub use config::{ConfigError, DashboardConfig};
pub use view::CallViewModel;

use api::HttpDashboardApi;
use calling::{BufferedLogSink, CallingService};
use host::HostShell;
use once_cell::sync::OnceCell;
use realtime::RestRealtimeStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// LOGGING
// ============================================================================

static TRACING: OnceCell<()> = OnceCell::new();

const DEFAULT_DIRECTIVES: [&str; 2] = ["dashboard_call=debug", "calling_sdk=info"];

/// Initialisiert das Logging einmal pro Prozess
///
/// Die Direktiven aus `RUST_LOG` werden um `dashboard_call=debug` und
/// `calling_sdk=info` ergänzt.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = DEFAULT_DIRECTIVES.iter().fold(
            tracing_subscriber::EnvFilter::from_default_env(),
            |filter, directive| match directive.parse::<tracing_subscriber::filter::Directive>() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => filter,
            },
        );

        // Ein bereits installierter Subscriber (z.B. in Tests) bleibt aktiv
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

// ============================================================================
// APPLICATION
// ============================================================================

/// Verdrahtet Konfiguration, HTTP-Clients und SDK-Log für eine Seite
pub struct DashboardApp {
    config: DashboardConfig,
    api: Arc<HttpDashboardApi>,
    realtime: Arc<RestRealtimeStore>,
    sdk_log: Arc<BufferedLogSink>,
}

impl DashboardApp {
    pub fn new(config: DashboardConfig) -> Self {
        let api = Arc::new(HttpDashboardApi::new(config.api_url.clone()));
        let realtime = Arc::new(RestRealtimeStore::new(
            config.realtime_url.clone(),
            config.realtime_auth.clone(),
        ));

        Self {
            config,
            api,
            realtime,
            sdk_log: Arc::new(BufferedLogSink::new()),
        }
    }

    /// Liest die Konfiguration aus der Umgebung und initialisiert das Logging
    pub fn from_env() -> Result<Self, ConfigError> {
        init_tracing();

        tracing::info!("Initializing dashboard...");
        let config = DashboardConfig::from_env()?;
        tracing::info!("API at {}, realtime at {}", config.api_url, config.realtime_url);

        Ok(Self::new(config))
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Startet einen Controller für eine Seite
    ///
    /// Calling-Service und Host kommen von der Oberfläche, alles andere
    /// stellt die App.
    pub fn start_session(
        &self,
        calling: Arc<dyn CallingService>,
        host: Arc<dyn HostShell>,
    ) -> CallController {
        let collaborators = Collaborators {
            api: self.api.clone(),
            calling,
            realtime: self.realtime.clone(),
            host,
            log_sink: self.sdk_log.clone(),
        };

        let controller = CallController::spawn(&self.config, collaborators);
        tracing::info!("Started call session {}", controller.session_id());
        controller
    }

    /// Gesammelte SDK-Logs, z.B. für einen Download
    pub fn take_sdk_log(&self) -> String {
        self.sdk_log.take()
    }

    /// Schreibt die SDK-Logs nach `path` oder ins App-Datenverzeichnis
    pub fn save_sdk_log(&self, path: Option<&Path>) -> std::io::Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => BufferedLogSink::default_log_path()?,
        };
        self.sdk_log.save_to(&path)?;
        tracing::info!("SDK log saved to {}", path.display());
        Ok(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::{LogSink, SdkLogLevel, LOG_FILE_NAME};

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_default_directives_parse() {
        for directive in DEFAULT_DIRECTIVES {
            assert!(directive
                .parse::<tracing_subscriber::filter::Directive>()
                .is_ok());
        }
    }

    #[test]
    fn test_sdk_log_export() {
        let app = DashboardApp::new(DashboardConfig::default());
        app.sdk_log.log(SdkLogLevel::Info, "agent created");

        let dir = tempfile::tempdir().unwrap();
        let path = app
            .save_sdk_log(Some(&dir.path().join(LOG_FILE_NAME)))
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[info] agent created"));
        assert_eq!(app.take_sdk_log(), "");
    }
}
