//! Realtime-Store Abstraktion
//!
//! Ein Datensatz wird über einen Pfad adressiert und liefert pro geändertem
//! Feld ein [`FieldChange`]. Doppelte Zustellungen sind möglich, der
//! Empfänger muss sie idempotent behandeln.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Feld im Call-Datensatz, das den Anrufstatus trägt
pub const STATUS_FIELD: &str = "status";

/// Statuswert "Anruf beendet"
pub const STATUS_ENDED: i64 = 3;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid record path: {0}")]
    InvalidPath(String),

    #[error("Subscription cancelled by server")]
    Cancelled,
}

// ============================================================================
// RECORD PATH
// ============================================================================

/// Pfad eines Datensatzes, z.B. `calls/{ownerId}/{callKey}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordPath(String);

impl RecordPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().trim_matches('/').to_string())
    }

    /// Pfad des Status-Datensatzes eines Anrufs
    pub fn call_status(realtime_owner_id: &str, call_key: &str) -> Self {
        Self(format!("calls/{}/{}", realtime_owner_id, call_key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for RecordPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// FIELD CHANGE
// ============================================================================

/// Ein geändertes Feld eines beobachteten Datensatzes
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub key: String,
    pub value: serde_json::Value,
}

impl FieldChange {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// `true` wenn das Feld `status` auf "beendet" gesetzt wurde
    pub fn is_call_ended(&self) -> bool {
        self.key == STATUS_FIELD && self.value.as_i64() == Some(STATUS_ENDED)
    }
}

// ============================================================================
// RECORD WATCH
// ============================================================================

/// Laufendes Abonnement auf einen Datensatz
///
/// Beim Drop wird der Hintergrund-Task beendet.
#[derive(Debug)]
pub struct RecordWatch {
    changes: mpsc::Receiver<FieldChange>,
    task: Option<JoinHandle<()>>,
}

impl RecordWatch {
    pub fn new(changes: mpsc::Receiver<FieldChange>, task: JoinHandle<()>) -> Self {
        Self {
            changes,
            task: Some(task),
        }
    }

    /// Abonnement ohne eigenen Task, der Sender liefert die Änderungen
    pub fn from_receiver(changes: mpsc::Receiver<FieldChange>) -> Self {
        Self {
            changes,
            task: None,
        }
    }

    /// Wartet auf die nächste Änderung, `None` wenn das Abonnement endet
    pub async fn recv(&mut self) -> Option<FieldChange> {
        self.changes.recv().await
    }
}

impl Drop for RecordWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Abonniert Feldänderungen eines Datensatzes
    async fn watch(&self, path: &RecordPath) -> Result<RecordWatch, RealtimeError>;

    /// Setzt ein einzelnes Feld, andere Felder bleiben unverändert
    async fn update_field(
        &self,
        path: &RecordPath,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), RealtimeError>;
}

// ============================================================================
// TESTS
// ============================================================================
