//! Log-Ausgabe des Calling-SDKs
//!
//! Der Sink wird explizit an den Calling-Client übergeben, es gibt keinen
//! globalen Logger, der überschrieben wird.

use chrono::Utc;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

/// Dateiname für exportierte SDK-Logs
pub const LOG_FILE_NAME: &str = "log.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkLogLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for SdkLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SdkLogLevel::Verbose => "verbose",
            SdkLogLevel::Info => "info",
            SdkLogLevel::Warning => "warning",
            SdkLogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Empfänger für Log-Zeilen des Calling-SDKs
pub trait LogSink: Send + Sync {
    fn log(&self, level: SdkLogLevel, message: &str);
}

// ============================================================================
// TRACING SINK
// ============================================================================

/// Leitet SDK-Logs an `tracing` weiter (Target `calling_sdk`)
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: SdkLogLevel, message: &str) {
        match level {
            SdkLogLevel::Verbose => tracing::trace!(target: "calling_sdk", "{}", message),
            SdkLogLevel::Info => tracing::info!(target: "calling_sdk", "{}", message),
            SdkLogLevel::Warning => tracing::warn!(target: "calling_sdk", "{}", message),
            SdkLogLevel::Error => tracing::error!(target: "calling_sdk", "{}", message),
        }
    }
}

// ============================================================================
// BUFFERED SINK
// ============================================================================

/// Sammelt SDK-Logs im Speicher, damit sie als Datei exportiert werden können
#[derive(Debug, Default)]
pub struct BufferedLogSink {
    lines: Mutex<Vec<String>>,
}

impl BufferedLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Gibt alle gesammelten Zeilen zurück und leert den Puffer
    pub fn take(&self) -> String {
        let lines = std::mem::take(&mut *self.lines.lock());
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    /// Schreibt die gesammelten Zeilen in eine Datei und leert den Puffer
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.take())
    }

    /// Standardpfad für den Log-Export im App-Datenverzeichnis
    pub fn default_log_path() -> std::io::Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("com", "frontdesk", "dashboard-call")
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine app data directory",
                )
            })?;

        let mut path = proj_dirs.data_dir().to_path_buf();
        path.push(LOG_FILE_NAME);
        Ok(path)
    }
}

impl LogSink for BufferedLogSink {
    fn log(&self, level: SdkLogLevel, message: &str) {
        let line = format!("{} [{}] {}", Utc::now().to_rfc3339(), level, message);
        self.lines.lock().push(line);
    }
}

// ============================================================================
// TESTS
// ============================================================================
