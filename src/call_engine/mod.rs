//! Call Engine Module - Lebenszyklus eines Dashboard-Anrufs
//!
//! Dieses Modul verwaltet:
//! - Die reine Zustandsmaschine (Join, Status-Abo, Auflegen, Abbau)
//! - Den Actor, der ihre Effekte gegen die externen Dienste ausführt
//! - Den Anruf-Timer

mod controller;
mod machine;
mod timer;

pub use controller::{
    CallController, Collaborators, ControllerError, ControllerEvent, ControllerSnapshot,
    WATCH_RETRY_BASE, WATCH_RETRY_MAX,
};
pub use machine::{
    CallMachine, CallPhase, CallSnapshot, DeviceFailure, Effect, ErrorReason, HangupOrigin, Input,
    MachineSettings, ANNOUNCE_PARTICIPANT_LIMIT,
};
pub use timer::{format_elapsed, CallTimer};
