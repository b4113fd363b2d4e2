//! Calling Module - Schnittstelle zum externen Calling-Service
//!
//! Medien, Geräte und Signalisierung liegen komplett beim Calling-Service.
//! Dieses Modul beschreibt nur, was der Call-Controller davon braucht:
//! - Client mit injiziertem Log-Sink
//! - Call-Agent für den Meeting-Beitritt
//! - Device-Manager für Kameras, Mikrofone und Berechtigungen
//! - Handle auf den laufenden Anruf

mod log_sink;

pub use log_sink::{BufferedLogSink, LogSink, SdkLogLevel, TracingLogSink, LOG_FILE_NAME};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum CallingError {
    #[error("Calling SDK error: {0}")]
    Sdk(#[from] anyhow::Error),
}

// ============================================================================
// TYPES
// ============================================================================

/// Kamera oder Mikrofon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ergebnis der Geräte-Berechtigungsanfrage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DevicePermission {
    pub audio: bool,
    pub video: bool,
}

impl DevicePermission {
    pub fn granted(&self) -> bool {
        self.audio && self.video
    }
}

/// Lokaler Videostream aus einer Kamera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVideoStream {
    pub camera: DeviceInfo,
}

/// Optionen für den Calling-Client
#[derive(Clone)]
pub struct ClientOptions {
    pub user_id: String,
    pub log_sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Optionen für den Meeting-Beitritt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOptions {
    pub video: Option<LocalVideoStream>,
}

// ============================================================================
// SERVICE TRAITS
// ============================================================================

/// Einstiegspunkt in den Calling-Service
#[async_trait]
pub trait CallingService: Send + Sync {
    async fn create_client(
        &self,
        options: ClientOptions,
    ) -> Result<Arc<dyn CallClient>, CallingError>;
}

#[async_trait]
pub trait CallClient: Send + Sync {
    /// Erstellt einen Agenten für die Identität hinter `token`
    async fn create_agent(
        &self,
        token: &str,
        display_name: &str,
    ) -> Result<Arc<dyn CallAgent>, CallingError>;

    async fn device_manager(&self) -> Result<Arc<dyn DeviceManager>, CallingError>;
}

#[async_trait]
pub trait DeviceManager: Send + Sync {
    async fn cameras(&self) -> Result<Vec<DeviceInfo>, CallingError>;

    async fn microphones(&self) -> Result<Vec<DeviceInfo>, CallingError>;

    async fn ask_permission(
        &self,
        audio: bool,
        video: bool,
    ) -> Result<DevicePermission, CallingError>;
}

#[async_trait]
pub trait CallAgent: Send + Sync {
    /// Tritt einem Meeting über dessen Link bei
    async fn join(
        &self,
        meeting_link: &str,
        options: JoinOptions,
    ) -> Result<Arc<dyn ActiveCall>, CallingError>;
}

/// Handle auf den laufenden Anruf
#[async_trait]
pub trait ActiveCall: Send + Sync {
    fn id(&self) -> String;

    /// Anzahl aller Teilnehmer inklusive dem Dashboard selbst
    fn total_participants(&self) -> usize;

    async fn hang_up(&self) -> Result<(), CallingError>;
}
