//! Realtime Module - Beobachtung des Call-Status-Datensatzes
//!
//! Dieses Modul verwaltet:
//! - Abonnements auf einen Datensatz (`calls/{ownerId}/{callKey}`)
//! - Dekodierung des Event-Streams der Realtime-Datenbank
//! - Schreiben des Status "beendet" für die Gegenseite

mod rest;
mod sse;
mod store;

pub use rest::RestRealtimeStore;
pub use sse::{ChildChangeTracker, PathUpdate, SseDecoder, SseEvent, StreamMessage};
pub use store::{
    FieldChange, RealtimeError, RealtimeStore, RecordPath, RecordWatch, STATUS_ENDED,
    STATUS_FIELD,
};
