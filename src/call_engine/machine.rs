//! Zustandsmaschine des Anruf-Lebenszyklus
//!
//! Die Maschine macht keine I/O. Jeder Schritt nimmt ein [`Input`] entgegen,
//! aktualisiert den Zustand und gibt die auszuführenden [`Effect`]s in
//! Reihenfolge zurück. Der [`CallController`](super::CallController) führt die
//! Effekte aus und speist deren Ergebnisse wieder als Inputs ein.
//!
//! ```text
//! Idle → AwaitingUser → AwaitingSession → Joining → InCall → Ended
//!                 ↘              ↘            ↘ DeviceFailure
//!                  Error ← ───── Error ← ──── Error
//! ```

use crate::api::{CallingCredentials, StayUpdate};
use crate::calling::{DeviceInfo, DevicePermission};
use crate::config::{DashboardConfig, TIMER_START_DELAY};
use crate::host::handoff_url;
use crate::realtime::{FieldChange, RecordPath};
use crate::session::{OwnerIdentity, SessionParams, ValidSession};
use std::time::Duration;

/// Bis zu dieser Teilnehmerzahl meldet das Dashboard das Ende an die Gegenseite
pub const ANNOUNCE_PARTICIPANT_LIMIT: usize = 2;

// ============================================================================
// CALL PHASE
// ============================================================================

/// Aktuelle Phase des Anrufs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallPhase {
    /// Seite noch nicht initialisiert
    Idle,
    /// Benutzerprofil wird geladen
    AwaitingUser,
    /// Bereit zum Beitritt
    AwaitingSession,
    /// Credentials, Geräte und Beitritt laufen
    Joining,
    /// Anruf aktiv
    InCall,
    /// Anruf beendet, Übergabe an die native App
    Ended { origin: HangupOrigin },
    /// Gerätefehler, die Seite wird neu geladen
    DeviceFailure(DeviceFailure),
    /// Session nicht nutzbar
    Error(ErrorReason),
}

impl CallPhase {
    /// Endzustände werden nie wieder verlassen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallPhase::Ended { .. } | CallPhase::DeviceFailure(_) | CallPhase::Error(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    MissingToken,
    UserResolutionFailed,
    MissingSessionParams,
    JoinFailed,
    JoinTimedOut,
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorReason::MissingToken => "missing-token",
            ErrorReason::UserResolutionFailed => "user-resolution-failed",
            ErrorReason::MissingSessionParams => "missing-session-params",
            ErrorReason::JoinFailed => "join-failed",
            ErrorReason::JoinTimedOut => "join-timed-out",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFailure {
    PermissionDenied,
    NoDevices,
}

/// Wer das Anrufende ausgelöst hat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangupOrigin {
    /// Auflegen am Dashboard
    Local,
    /// Gegenseite hat `status = 3` gesetzt
    Peer,
}

// ============================================================================
// INPUTS & EFFECTS
// ============================================================================

/// Zustand des laufenden Anrufs zum Zeitpunkt eines Inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub participants: usize,
    pub elapsed: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Mounted(SessionParams),
    UserResolved(OwnerIdentity),
    UserResolutionFailed,
    JoinRequested,
    CredentialsResolved(CallingCredentials),
    AgentReady,
    DevicesEnumerated {
        cameras: Vec<DeviceInfo>,
        microphones: usize,
    },
    PermissionAnswered(DevicePermission),
    CallJoined {
        call_id: String,
    },
    JoinFailed,
    JoinTimedOut,
    FieldChanged {
        change: FieldChange,
        snapshot: CallSnapshot,
    },
    HangUpRequested(CallSnapshot),
    Unmounted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ResolveUser { token: String },
    ArmJoinTimeout,
    DisarmJoinTimeout,
    ResolveCredentials { station_code: String },
    ConnectCalling { credentials: CallingCredentials },
    EnumerateDevices,
    RequestDevicePermission,
    JoinCall { meeting_link: String, camera: DeviceInfo },
    WatchStatus { path: RecordPath },
    StartTimer { delay: Duration },
    TerminateCall,
    StopTimer,
    CancelWatch,
    UpdateStay { token: String, update: StayUpdate },
    AnnounceCallEnded { path: RecordPath },
    Navigate { url: String },
    Reload,
}

impl Effect {
    /// Kurzname für Logs, ohne Tokens
    pub fn name(&self) -> &'static str {
        match self {
            Effect::ResolveUser { .. } => "resolve-user",
            Effect::ArmJoinTimeout => "arm-join-timeout",
            Effect::DisarmJoinTimeout => "disarm-join-timeout",
            Effect::ResolveCredentials { .. } => "resolve-credentials",
            Effect::ConnectCalling { .. } => "connect-calling",
            Effect::EnumerateDevices => "enumerate-devices",
            Effect::RequestDevicePermission => "request-device-permission",
            Effect::JoinCall { .. } => "join-call",
            Effect::WatchStatus { .. } => "watch-status",
            Effect::StartTimer { .. } => "start-timer",
            Effect::TerminateCall => "terminate-call",
            Effect::StopTimer => "stop-timer",
            Effect::CancelWatch => "cancel-watch",
            Effect::UpdateStay { .. } => "update-stay",
            Effect::AnnounceCallEnded { .. } => "announce-call-ended",
            Effect::Navigate { .. } => "navigate",
            Effect::Reload => "reload",
        }
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Feste Werte, die die Maschine in Effekte schreibt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSettings {
    pub station_code: String,
    pub handoff_url: String,
    pub timer_delay: Duration,
}

impl From<&DashboardConfig> for MachineSettings {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            station_code: config.station_code.clone(),
            handoff_url: config.handoff_url.clone(),
            timer_delay: TIMER_START_DELAY,
        }
    }
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

// ============================================================================
// CALL MACHINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct CallMachine {
    settings: MachineSettings,
    phase: CallPhase,
    params: SessionParams,
    session: Option<ValidSession>,
    owner: Option<OwnerIdentity>,
    selected_camera: Option<DeviceInfo>,
    call_id: Option<String>,
    permission_requested: bool,
    join_timeout_armed: bool,
    call_started: bool,
    watching: bool,
    timer_running: bool,
    detached: bool,
}

impl CallMachine {
    pub fn new(settings: MachineSettings) -> Self {
        Self {
            settings,
            phase: CallPhase::Idle,
            params: SessionParams::default(),
            session: None,
            owner: None,
            selected_camera: None,
            call_id: None,
            permission_requested: false,
            join_timeout_armed: false,
            call_started: false,
            watching: false,
            timer_running: false,
            detached: false,
        }
    }

    pub fn phase(&self) -> &CallPhase {
        &self.phase
    }

    pub fn session(&self) -> Option<&ValidSession> {
        self.session.as_ref()
    }

    pub fn owner(&self) -> Option<&OwnerIdentity> {
        self.owner.as_ref()
    }

    pub fn selected_camera(&self) -> Option<&DeviceInfo> {
        self.selected_camera.as_ref()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    /// `true` solange das Status-Abonnement läuft
    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// `true` nach dem Unmount; alle weiteren Inputs werden ignoriert
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Verarbeitet einen Input und gibt die Effekte in Ausführungsreihenfolge zurück
    pub fn step(&mut self, input: Input) -> Vec<Effect> {
        if self.detached {
            return Vec::new();
        }

        match input {
            Input::Mounted(params) => self.on_mounted(params),
            Input::UserResolved(owner) => self.on_user_resolved(owner),
            Input::UserResolutionFailed => {
                if self.phase == CallPhase::AwaitingUser {
                    self.phase = CallPhase::Error(ErrorReason::UserResolutionFailed);
                }
                Vec::new()
            }
            Input::JoinRequested => self.on_join_requested(),
            Input::CredentialsResolved(credentials) => {
                if self.is_preparing_join() {
                    vec![Effect::ConnectCalling { credentials }]
                } else {
                    Vec::new()
                }
            }
            Input::AgentReady => {
                if self.is_preparing_join() {
                    vec![Effect::EnumerateDevices]
                } else {
                    Vec::new()
                }
            }
            Input::DevicesEnumerated {
                cameras,
                microphones,
            } => self.on_devices(cameras, microphones),
            Input::PermissionAnswered(permission) => self.on_permission(permission),
            Input::CallJoined { call_id } => self.on_call_joined(call_id),
            Input::JoinFailed => {
                if self.phase != CallPhase::Joining {
                    return Vec::new();
                }
                self.phase = CallPhase::Error(ErrorReason::JoinFailed);
                self.teardown()
            }
            Input::JoinTimedOut => {
                if self.phase != CallPhase::Joining || !self.join_timeout_armed {
                    return Vec::new();
                }
                // Der Timeout ist bereits abgelaufen, kein Disarm nötig
                self.join_timeout_armed = false;
                self.phase = CallPhase::Error(ErrorReason::JoinTimedOut);
                self.teardown()
            }
            Input::FieldChanged { change, snapshot } => {
                let active = matches!(self.phase, CallPhase::Joining | CallPhase::InCall);
                if active && self.watching && change.is_call_ended() {
                    self.hang_up(HangupOrigin::Peer, snapshot)
                } else {
                    Vec::new()
                }
            }
            Input::HangUpRequested(snapshot) => {
                if self.phase == CallPhase::InCall {
                    self.hang_up(HangupOrigin::Local, snapshot)
                } else {
                    Vec::new()
                }
            }
            Input::Unmounted => {
                self.detached = true;
                self.teardown()
            }
        }
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    fn on_mounted(&mut self, params: SessionParams) -> Vec<Effect> {
        if self.phase != CallPhase::Idle {
            return Vec::new();
        }

        let Some(token) = params.token.clone() else {
            self.phase = CallPhase::Error(ErrorReason::MissingToken);
            return Vec::new();
        };

        self.params = params;
        self.phase = CallPhase::AwaitingUser;
        vec![Effect::ResolveUser { token }]
    }

    fn on_user_resolved(&mut self, owner: OwnerIdentity) -> Vec<Effect> {
        if self.phase != CallPhase::AwaitingUser {
            return Vec::new();
        }

        self.owner = Some(owner);
        match self.params.validate() {
            Some(session) => {
                self.session = Some(session);
                self.phase = CallPhase::AwaitingSession;
            }
            None => self.phase = CallPhase::Error(ErrorReason::MissingSessionParams),
        }
        Vec::new()
    }

    fn on_join_requested(&mut self) -> Vec<Effect> {
        if self.phase != CallPhase::AwaitingSession {
            return Vec::new();
        }

        self.phase = CallPhase::Joining;
        self.join_timeout_armed = true;
        vec![
            Effect::ArmJoinTimeout,
            Effect::ResolveCredentials {
                station_code: self.settings.station_code.clone(),
            },
        ]
    }

    fn on_devices(&mut self, cameras: Vec<DeviceInfo>, microphones: usize) -> Vec<Effect> {
        if !self.is_preparing_join() {
            return Vec::new();
        }

        let missing_devices = cameras.is_empty() || microphones == 0;

        if self.permission_requested {
            // Zweite Abfrage nach erteilter Berechtigung
            return match cameras.into_iter().next() {
                Some(camera) if !missing_devices => self.start_join(camera),
                _ => self.fail_devices(DeviceFailure::NoDevices),
            };
        }

        if missing_devices || self.selected_camera.is_none() {
            self.permission_requested = true;
            return vec![Effect::RequestDevicePermission];
        }

        match cameras.into_iter().next() {
            Some(camera) => self.start_join(camera),
            None => self.fail_devices(DeviceFailure::NoDevices),
        }
    }

    fn on_permission(&mut self, permission: DevicePermission) -> Vec<Effect> {
        if !self.is_preparing_join() || !self.permission_requested {
            return Vec::new();
        }

        if permission.granted() {
            vec![Effect::EnumerateDevices]
        } else {
            self.fail_devices(DeviceFailure::PermissionDenied)
        }
    }

    fn on_call_joined(&mut self, call_id: String) -> Vec<Effect> {
        if self.phase != CallPhase::Joining || !self.call_started {
            return Vec::new();
        }

        self.phase = CallPhase::InCall;
        self.call_id = Some(call_id);

        if self.join_timeout_armed {
            self.join_timeout_armed = false;
            vec![Effect::DisarmJoinTimeout]
        } else {
            Vec::new()
        }
    }

    /// Kamera mit Index 0 wird genommen, Beitritt, Status-Abo und Timer starten
    fn start_join(&mut self, camera: DeviceInfo) -> Vec<Effect> {
        let (Some(session), Some(owner)) = (&self.session, &self.owner) else {
            self.phase = CallPhase::Error(ErrorReason::MissingSessionParams);
            return self.teardown();
        };

        let meeting_link = session.call_link.clone();
        let path = RecordPath::call_status(&owner.realtime_owner_id, &session.call_key);

        self.selected_camera = Some(camera.clone());
        self.call_started = true;
        self.watching = true;
        self.timer_running = true;

        vec![
            Effect::JoinCall {
                meeting_link,
                camera,
            },
            Effect::WatchStatus { path },
            Effect::StartTimer {
                delay: self.settings.timer_delay,
            },
        ]
    }

    fn fail_devices(&mut self, failure: DeviceFailure) -> Vec<Effect> {
        self.phase = CallPhase::DeviceFailure(failure);
        let mut effects = self.teardown();
        effects.push(Effect::Reload);
        effects
    }

    /// Gemeinsame Abfolge für lokales und entferntes Auflegen
    fn hang_up(&mut self, origin: HangupOrigin, snapshot: CallSnapshot) -> Vec<Effect> {
        // Anzeige zuerst beenden, Buchhaltung danach
        self.phase = CallPhase::Ended { origin };
        let mut effects = self.teardown();

        let (Some(session), Some(owner)) = (&self.session, &self.owner) else {
            return effects;
        };

        effects.push(Effect::UpdateStay {
            token: session.token.clone(),
            update: StayUpdate::new(
                session.stay_id.clone(),
                owner.stay_owner_id,
                snapshot.elapsed,
                owner.display_name.clone(),
            ),
        });

        if snapshot.participants <= ANNOUNCE_PARTICIPANT_LIMIT {
            effects.push(Effect::AnnounceCallEnded {
                path: RecordPath::call_status(&owner.realtime_owner_id, &session.call_key),
            });
        }

        effects.push(Effect::Navigate {
            url: handoff_url(&self.settings.handoff_url, &session.call_key),
        });

        effects
    }

    /// Gibt Call-Handle, Timer, Abo und Join-Timeout frei, soweit vorhanden
    fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();

        if std::mem::take(&mut self.call_started) {
            effects.push(Effect::TerminateCall);
        }
        if std::mem::take(&mut self.timer_running) {
            effects.push(Effect::StopTimer);
        }
        if std::mem::take(&mut self.watching) {
            effects.push(Effect::CancelWatch);
        }
        if std::mem::take(&mut self.join_timeout_armed) {
            effects.push(Effect::DisarmJoinTimeout);
        }

        effects
    }

    fn is_preparing_join(&self) -> bool {
        self.phase == CallPhase::Joining && !self.call_started
    }
}

impl Default for CallMachine {
    fn default() -> Self {
        Self::new(MachineSettings::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
