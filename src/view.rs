//! Anzeige-Modell der Dashboard-Seite
//!
//! Übersetzt den Zustand des Controllers in das, was die Seite zeigt. Das
//! Modell ist serialisierbar, damit eine Oberfläche es direkt rendern kann.

use crate::call_engine::{CallPhase, ControllerSnapshot, DeviceFailure, ErrorReason};
use serde::Serialize;

/// Beschriftung des Beitritts-Buttons
pub const JOIN_BUTTON_LABEL: &str = "Join call";

// ============================================================================
// VIEW TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GalleryLayout {
    FloatingLocalVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScalingMode {
    Fit,
    Crop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    pub scaling_mode: ScalingMode,
    pub is_mirrored: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            scaling_mode: ScalingMode::Fit,
            is_mirrored: false,
        }
    }
}

/// Video-Galerie; lokale und entfernte Streams nutzen dieselben Optionen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryView {
    pub layout: GalleryLayout,
    pub local_video: StreamOptions,
    pub remote_video: StreamOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlBarLayout {
    FloatingTop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlButton {
    EndCall,
    ScreenShare,
    Camera,
    Microphone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlBarView {
    pub layout: ControlBarLayout,
    pub buttons: Vec<ControlButton>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InCallView {
    pub elapsed: String,
    pub gallery: GalleryView,
    pub control_bar: ControlBarView,
}

/// Hauptbereich der Seite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "camelCase")]
pub enum Screen {
    Loading,
    ErrorPage { code: String, message: String },
    DeviceProblem { message: String },
    JoinButton { label: String },
    Connecting,
    InCall(InCallView),
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallViewModel {
    /// Wird als "Call ID: ..." über dem Anruf angezeigt
    pub call_id: Option<String>,
    pub screen: Screen,
}

// ============================================================================
// MAPPING
// ============================================================================

impl CallViewModel {
    pub fn from_snapshot(snapshot: &ControllerSnapshot) -> Self {
        let screen = match &snapshot.phase {
            CallPhase::Idle | CallPhase::AwaitingUser => Screen::Loading,
            CallPhase::AwaitingSession => Screen::JoinButton {
                label: JOIN_BUTTON_LABEL.to_string(),
            },
            CallPhase::Joining => Screen::Connecting,
            CallPhase::InCall => Screen::InCall(InCallView {
                elapsed: snapshot.elapsed.clone(),
                gallery: GalleryView {
                    layout: GalleryLayout::FloatingLocalVideo,
                    local_video: StreamOptions::default(),
                    remote_video: StreamOptions::default(),
                },
                control_bar: ControlBarView {
                    layout: ControlBarLayout::FloatingTop,
                    buttons: vec![
                        ControlButton::EndCall,
                        ControlButton::ScreenShare,
                        ControlButton::Camera,
                        ControlButton::Microphone,
                    ],
                },
            }),
            CallPhase::Ended { .. } => Screen::Ended,
            CallPhase::DeviceFailure(failure) => Screen::DeviceProblem {
                message: device_message(*failure).to_string(),
            },
            CallPhase::Error(reason) => Screen::ErrorPage {
                code: reason.to_string(),
                message: error_message(*reason).to_string(),
            },
        };

        Self {
            call_id: snapshot.call_id.clone(),
            screen,
        }
    }
}

fn error_message(reason: ErrorReason) -> &'static str {
    match reason {
        ErrorReason::MissingToken => "This page was opened without an access token.",
        ErrorReason::UserResolutionFailed => "Your account could not be loaded.",
        ErrorReason::MissingSessionParams => "The call link is incomplete.",
        ErrorReason::JoinFailed => "Joining the call failed.",
        ErrorReason::JoinTimedOut => "Joining the call took too long.",
    }
}

fn device_message(failure: DeviceFailure) -> &'static str {
    match failure {
        DeviceFailure::PermissionDenied => "Camera and microphone access was denied.",
        DeviceFailure::NoDevices => "No camera or microphone was found.",
    }
}

// ============================================================================
// TESTS
// ============================================================================
