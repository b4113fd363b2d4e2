//! Event-Stream Dekodierung für die Realtime-Datenbank
//!
//! Die Datenbank streamt Änderungen als `text/event-stream`:
//!
//! ```text
//! event: put
//! data: {"path":"/","data":{"status":1}}
//!
//! event: patch
//! data: {"path":"/","data":{"status":3}}
//! ```
//!
//! [`SseDecoder`] zerlegt den Byte-Stream in Events, [`ChildChangeTracker`]
//! hält einen lokalen Snapshot und meldet geänderte Felder der obersten Ebene.

use super::store::FieldChange;
use serde::Deserialize;
use serde_json::{Map, Value};

// ============================================================================
// SSE DECODER
// ============================================================================

/// Ein einzelnes Server-Sent Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Inkrementeller Decoder, Chunks dürfen an beliebiger Stelle getrennt sein
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nimmt einen Chunk entgegen und gibt alle vollständigen Events zurück
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&block[..end]);
            if let Some(event) = parse_block(&text) {
                events.push(event);
            }
        }
        events
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        // Kommentare
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }

    Some(SseEvent {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}

// ============================================================================
// STREAM MESSAGES
// ============================================================================

/// Inhalt eines `put` oder `patch` Events
#[derive(Debug, Clone, Deserialize)]
pub struct PathUpdate {
    pub path: String,
    #[serde(default)]
    pub data: Value,
}

/// Bedeutung eines Events für den Abonnenten
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    /// `cancel` oder `auth_revoked`: der Server beendet das Abonnement
    Closed { reason: String },
    Unknown(String),
}

impl StreamMessage {
    pub fn from_event(event: &SseEvent) -> Self {
        match event.event.as_str() {
            "put" | "patch" => match serde_json::from_str::<PathUpdate>(&event.data) {
                Ok(update) if event.event == "put" => Self::Put {
                    path: update.path,
                    data: update.data,
                },
                Ok(update) => Self::Patch {
                    path: update.path,
                    data: update.data,
                },
                Err(e) => Self::Unknown(format!("malformed {}: {}", event.event, e)),
            },
            "keep-alive" => Self::KeepAlive,
            "cancel" | "auth_revoked" => Self::Closed {
                reason: event.event.clone(),
            },
            other => Self::Unknown(other.to_string()),
        }
    }
}

// ============================================================================
// CHILD CHANGE TRACKER
// ============================================================================

/// Lokaler Snapshot eines Datensatzes
///
/// Meldet nur Änderungen an bereits vorhandenen Feldern. Der erste `put` auf
/// die Wurzel ist der Ausgangszustand und löst nichts aus; neu angelegte oder
/// gelöschte Felder ebenfalls nicht.
#[derive(Debug, Default)]
pub struct ChildChangeTracker {
    snapshot: Map<String, Value>,
    initialized: bool,
}

impl ChildChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &Map<String, Value> {
        &self.snapshot
    }

    pub fn apply(&mut self, message: &StreamMessage) -> Vec<FieldChange> {
        match message {
            StreamMessage::Put { path, data } => self.put(path, data.clone()),
            StreamMessage::Patch { path, data } => {
                let mut changes = Vec::new();
                if let Value::Object(children) = data {
                    for (key, value) in children {
                        let child_path = format!("{}/{}", path.trim_end_matches('/'), key);
                        changes.extend(self.put(&child_path, value.clone()));
                    }
                }
                self.initialized = true;
                changes
            }
            _ => Vec::new(),
        }
    }

    fn put(&mut self, path: &str, data: Value) -> Vec<FieldChange> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let Some((&top, rest)) = segments.split_first() else {
            return self.replace_root(data);
        };
        self.initialized = true;

        let before = self.snapshot.get(top).cloned();
        set_path(&mut self.snapshot, top, rest, data);
        let after = self.snapshot.get(top);

        match (before, after) {
            (Some(before), Some(after)) if before != *after => {
                vec![FieldChange::new(top, after.clone())]
            }
            _ => Vec::new(),
        }
    }

    fn replace_root(&mut self, data: Value) -> Vec<FieldChange> {
        let next = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let changes = if self.initialized {
            next.iter()
                .filter(|(key, value)| {
                    self.snapshot
                        .get(key.as_str())
                        .is_some_and(|previous| previous != *value)
                })
                .map(|(key, value)| FieldChange::new(key.clone(), value.clone()))
                .collect()
        } else {
            Vec::new()
        };

        self.snapshot = next;
        self.initialized = true;
        changes
    }
}

/// Setzt `value` unter `key/rest...`; `null` löscht den Eintrag
fn set_path(map: &mut Map<String, Value>, key: &str, rest: &[&str], value: Value) {
    let Some((&next, tail)) = rest.split_first() else {
        if value.is_null() {
            map.remove(key);
        } else {
            map.insert(key.to_string(), value);
        }
        return;
    };

    if value.is_null() && !map.contains_key(key) {
        return;
    }

    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        set_path(child, next, tail, value);
        if child.is_empty() {
            map.remove(key);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
