//! Call-Controller
//!
//! Ein Actor-Task besitzt die [`CallMachine`] und führt deren Effekte gegen
//! die injizierten Dienste aus. Befehle von außen (Mount, Join, Auflegen,
//! Unmount) und Rückmeldungen aus Hintergrund-Tasks kommen über denselben
//! Kanal an und werden strikt nacheinander verarbeitet.
//!
//! Abbau und Buchhaltung (Auflegen, Stay-Update, Status-Meldung, Navigation)
//! laufen inline, damit ihre Reihenfolge erhalten bleibt. Alles, was hängen
//! kann, läuft in eigenen Tasks und meldet sich als Input zurück. So können
//! Join-Timeout und Unmount jederzeit dazwischenkommen.

use super::machine::{CallMachine, CallPhase, CallSnapshot, Effect, Input, MachineSettings};
use super::timer::{format_elapsed, CallTimer};
use crate::api::{CallingCredentials, DashboardApi};
use crate::calling::{
    ActiveCall, CallAgent, CallClient, CallingError, CallingService, ClientOptions, DeviceInfo,
    DeviceManager, DevicePermission, JoinOptions, LocalVideoStream, LogSink,
};
use crate::config::{DashboardConfig, AGENT_DISPLAY_NAME};
use crate::host::HostShell;
use crate::realtime::{FieldChange, RealtimeStore, RecordPath, STATUS_ENDED, STATUS_FIELD};
use crate::session::{OwnerIdentity, SessionError, SessionParams};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 100;

/// Erste Wartezeit vor einem neuen Abonnement, verdoppelt sich pro Fehlschlag
pub const WATCH_RETRY_BASE: Duration = Duration::from_secs(1);
pub const WATCH_RETRY_MAX: Duration = Duration::from_secs(30);

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Call controller is no longer running")]
    Closed,

    #[error("Invalid session: {0}")]
    Session(#[from] SessionError),
}

// ============================================================================
// EVENTS & SNAPSHOT
// ============================================================================

/// Events die vom CallController ausgelöst werden
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StateChanged(CallPhase),
    /// Fehler, nach dem der Lebenszyklus trotzdem weiterläuft
    Error(String),
}

/// Momentaufnahme für die Anzeige
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub phase: CallPhase,
    pub call_id: Option<String>,
    pub elapsed: String,
}

/// Externe Dienste, gegen die der Controller arbeitet
#[derive(Clone)]
pub struct Collaborators {
    pub api: Arc<dyn DashboardApi>,
    pub calling: Arc<dyn CallingService>,
    pub realtime: Arc<dyn RealtimeStore>,
    pub host: Arc<dyn HostShell>,
    pub log_sink: Arc<dyn LogSink>,
}

#[derive(Debug)]
struct SharedState {
    phase: CallPhase,
    call_id: Option<String>,
    elapsed: Option<watch::Receiver<String>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            phase: CallPhase::Idle,
            call_id: None,
            elapsed: None,
        }
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

enum Command {
    Mount(SessionParams, oneshot::Sender<()>),
    Join(oneshot::Sender<()>),
    HangUp(oneshot::Sender<()>),
    Unmount(oneshot::Sender<()>),
    Feedback(Feedback),
}

/// Rückmeldungen aus Hintergrund-Tasks
enum Feedback {
    User(Result<OwnerIdentity, String>),
    Credentials(CallingCredentials),
    Connected {
        client: Arc<dyn CallClient>,
        agent: Arc<dyn CallAgent>,
        devices: Arc<dyn DeviceManager>,
    },
    Devices {
        cameras: Vec<DeviceInfo>,
        microphones: usize,
    },
    Permission(DevicePermission),
    Joined(Arc<dyn ActiveCall>),
    JoinFailed(String),
    StatusChanged(FieldChange),
    JoinTimedOut,
    Warning(String),
}

// ============================================================================
// CALL CONTROLLER
// ============================================================================

/// Handle auf den Actor einer Dashboard-Session
pub struct CallController {
    commands: mpsc::Sender<Command>,
    shared: Arc<RwLock<SharedState>>,
    event_tx: broadcast::Sender<ControllerEvent>,
    session_id: Uuid,
    task: JoinHandle<()>,
}

impl CallController {
    /// Startet den Actor-Task für eine neue Session
    pub fn spawn(config: &DashboardConfig, collaborators: Collaborators) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let shared = Arc::new(RwLock::new(SharedState::default()));
        let session_id = Uuid::new_v4();

        let actor = Actor {
            machine: CallMachine::new(MachineSettings::from(config)),
            join_timeout: config.join_timeout,
            auto_join: config.auto_join,
            join_issued: false,
            collaborators,
            feedback: commands.downgrade(),
            shared: Arc::clone(&shared),
            event_tx: event_tx.clone(),
            client: None,
            agent: None,
            devices: None,
            call: None,
            timer: None,
            watch_task: None,
            timeout_task: None,
            pending: Vec::new(),
        };

        let span = tracing::info_span!("call_session", session = %session_id);
        let task = tokio::spawn(actor.run(rx).instrument(span));

        Self {
            commands,
            shared,
            event_tx,
            session_id,
            task,
        }
    }

    /// Initialisiert die Session mit den Seitenparametern
    pub async fn mount(&self, params: SessionParams) -> Result<(), ControllerError> {
        self.request(|done| Command::Mount(params, done)).await
    }

    /// Wie [`mount`](Self::mount), die Parameter kommen aus der Seiten-URL
    pub async fn mount_url(&self, page_url: &str) -> Result<(), ControllerError> {
        let params = SessionParams::from_page_url(page_url)?;
        self.mount(params).await
    }

    /// "Join call" - nur nötig, wenn `auto_join` aus ist
    pub async fn join(&self) -> Result<(), ControllerError> {
        self.request(Command::Join).await
    }

    /// Legt am Dashboard auf
    pub async fn hang_up(&self) -> Result<(), ControllerError> {
        self.request(Command::HangUp).await
    }

    /// Baut die Session ab und wartet, bis der Actor beendet ist
    pub async fn unmount(self) -> Result<(), ControllerError> {
        let result = self.request(Command::Unmount).await;
        if let Err(e) = self.task.await {
            tracing::error!("Call controller task failed: {}", e);
        }
        result
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.event_tx.subscribe()
    }

    /// Gibt die aktuelle Phase zurück
    pub fn phase(&self) -> CallPhase {
        self.shared.read().phase.clone()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let shared = self.shared.read();
        ControllerSnapshot {
            phase: shared.phase.clone(),
            call_id: shared.call_id.clone(),
            elapsed: shared
                .elapsed
                .as_ref()
                .map(|elapsed| elapsed.borrow().clone())
                .unwrap_or_else(|| format_elapsed(0)),
        }
    }

    /// Receiver für die Timer-Anzeige, sobald der Timer läuft
    pub fn elapsed_updates(&self) -> Option<watch::Receiver<String>> {
        self.shared.read().elapsed.clone()
    }

    /// Korrelations-Id der Session (steht auch im Tracing-Span)
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    async fn request<F>(&self, build: F) -> Result<(), ControllerError>
    where
        F: FnOnce(oneshot::Sender<()>) -> Command,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(build(done_tx))
            .await
            .map_err(|_| ControllerError::Closed)?;
        done_rx.await.map_err(|_| ControllerError::Closed)
    }
}

// ============================================================================
// STATUS WATCH
// ============================================================================

/// Hält das Abonnement auf den Anruf-Datensatz bis zum Abbruch aufrecht
///
/// Endet der Stream oder schlägt das Abonnieren fehl, wird das als Fehler
/// gemeldet und nach exponentiell wachsender Pause neu abonniert. Der Task
/// endet erst mit `CancelWatch` oder wenn der Actor weg ist.
async fn watch_call_record(
    realtime: Arc<dyn RealtimeStore>,
    path: RecordPath,
    feedback: mpsc::WeakSender<Command>,
) {
    let mut retry_delay = WATCH_RETRY_BASE;

    loop {
        let problem = match realtime.watch(&path).await {
            Ok(mut watch) => {
                tracing::debug!("Watching call record {}", path);
                retry_delay = WATCH_RETRY_BASE;

                while let Some(change) = watch.recv().await {
                    let Some(tx) = feedback.upgrade() else {
                        return;
                    };
                    let message = Command::Feedback(Feedback::StatusChanged(change));
                    if tx.send(message).await.is_err() {
                        return;
                    }
                }
                format!("Call record watch on {} ended, resubscribing", path)
            }
            Err(e) => format!("Could not watch {}: {}", path, e),
        };

        let Some(tx) = feedback.upgrade() else {
            return;
        };
        if tx
            .send(Command::Feedback(Feedback::Warning(problem)))
            .await
            .is_err()
        {
            return;
        }
        drop(tx);

        tokio::time::sleep(retry_delay).await;
        retry_delay = (retry_delay * 2).min(WATCH_RETRY_MAX);
    }
}

// ============================================================================
// ACTOR
// ============================================================================

struct Actor {
    machine: CallMachine,
    join_timeout: Duration,
    auto_join: bool,
    join_issued: bool,
    collaborators: Collaborators,
    feedback: mpsc::WeakSender<Command>,
    shared: Arc<RwLock<SharedState>>,
    event_tx: broadcast::Sender<ControllerEvent>,
    client: Option<Arc<dyn CallClient>>,
    agent: Option<Arc<dyn CallAgent>>,
    devices: Option<Arc<dyn DeviceManager>>,
    call: Option<Arc<dyn ActiveCall>>,
    timer: Option<CallTimer>,
    watch_task: Option<JoinHandle<()>>,
    timeout_task: Option<JoinHandle<()>>,
    pending: Vec<JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!("Call controller started");

        while let Some(command) = commands.recv().await {
            match command {
                Command::Mount(params, done) => {
                    self.dispatch(Input::Mounted(params)).await;
                    let _ = done.send(());
                }
                Command::Join(done) => {
                    self.join_issued = true;
                    self.dispatch(Input::JoinRequested).await;
                    let _ = done.send(());
                }
                Command::HangUp(done) => {
                    let snapshot = self.call_snapshot();
                    self.dispatch(Input::HangUpRequested(snapshot)).await;
                    let _ = done.send(());
                }
                Command::Unmount(done) => {
                    self.dispatch(Input::Unmounted).await;
                    let _ = done.send(());
                    break;
                }
                Command::Feedback(feedback) => self.on_feedback(feedback).await,
            }
        }

        // Handle ohne Unmount verworfen
        if !self.machine.is_detached() {
            self.dispatch(Input::Unmounted).await;
        }
        self.abort_background();

        tracing::info!("Call controller stopped");
    }

    async fn dispatch(&mut self, input: Input) {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let before = self.machine.phase().clone();
            let effects = self.machine.step(input);

            let phase = self.machine.phase().clone();
            if phase != before {
                self.publish_phase(phase);
            }

            for effect in effects {
                self.execute(effect).await;
            }

            if self.machine.phase().is_terminal() || self.machine.is_detached() {
                self.abort_pending();
            }

            if self.auto_join
                && !self.join_issued
                && *self.machine.phase() == CallPhase::AwaitingSession
            {
                self.join_issued = true;
                queue.push_back(Input::JoinRequested);
            }
        }
    }

    fn publish_phase(&self, phase: CallPhase) {
        tracing::info!("Call phase changed: {:?}", phase);
        {
            let mut shared = self.shared.write();
            shared.phase = phase.clone();
            shared.call_id = self.machine.call_id().map(str::to_string);
        }
        let _ = self.event_tx.send(ControllerEvent::StateChanged(phase));
    }

    async fn on_feedback(&mut self, feedback: Feedback) {
        let input = match feedback {
            Feedback::User(Ok(owner)) => {
                tracing::info!("Resolved dashboard user {}", owner.display_name);
                Input::UserResolved(owner)
            }
            Feedback::User(Err(e)) => {
                tracing::error!("User resolution failed: {}", e);
                Input::UserResolutionFailed
            }
            Feedback::Credentials(credentials) => Input::CredentialsResolved(credentials),
            Feedback::Connected {
                client,
                agent,
                devices,
            } => {
                if *self.machine.phase() == CallPhase::Joining {
                    self.client = Some(client);
                    self.agent = Some(agent);
                    self.devices = Some(devices);
                }
                Input::AgentReady
            }
            Feedback::Devices {
                cameras,
                microphones,
            } => {
                tracing::debug!(
                    "Found {} camera(s), {} microphone(s)",
                    cameras.len(),
                    microphones
                );
                Input::DevicesEnumerated {
                    cameras,
                    microphones,
                }
            }
            Feedback::Permission(permission) => Input::PermissionAnswered(permission),
            Feedback::Joined(call) => {
                self.on_joined(call).await;
                return;
            }
            Feedback::JoinFailed(e) => {
                tracing::error!("Joining the meeting failed: {}", e);
                Input::JoinFailed
            }
            Feedback::StatusChanged(change) => {
                tracing::debug!("Call record field {} changed to {}", change.key, change.value);
                Input::FieldChanged {
                    change,
                    snapshot: self.call_snapshot(),
                }
            }
            Feedback::JoinTimedOut => {
                self.timeout_task = None;
                Input::JoinTimedOut
            }
            Feedback::Warning(message) => {
                self.report(message);
                return;
            }
        };

        self.dispatch(input).await;
    }

    async fn on_joined(&mut self, call: Arc<dyn ActiveCall>) {
        let call_id = call.id();
        self.dispatch(Input::CallJoined {
            call_id: call_id.clone(),
        })
        .await;

        let accepted = *self.machine.phase() == CallPhase::InCall
            && self.machine.call_id() == Some(call_id.as_str());
        if accepted {
            tracing::info!("Joined call {}", call_id);
            self.call = Some(call);
            return;
        }

        // Anruf kam nach dem Abbau an
        tracing::warn!("Discarding call {} joined after teardown", call_id);
        if let Err(e) = call.hang_up().await {
            self.report(format!("Failed to hang up late call {}: {}", call_id, e));
        }
    }

    async fn execute(&mut self, effect: Effect) {
        tracing::debug!("Executing {}", effect.name());

        match effect {
            Effect::ResolveUser { token } => {
                let api = Arc::clone(&self.collaborators.api);
                self.spawn_feedback(async move {
                    let result = match api.current_user(&token).await {
                        Ok(response) => {
                            OwnerIdentity::from_response(&response).map_err(|e| e.to_string())
                        }
                        Err(e) => Err(e.to_string()),
                    };
                    Feedback::User(result)
                });
            }

            Effect::ArmJoinTimeout => {
                let feedback = self.feedback.clone();
                let timeout = self.join_timeout;
                let task = tokio::spawn(
                    async move {
                        tokio::time::sleep(timeout).await;
                        tracing::warn!("Join did not finish within {:?}", timeout);
                        if let Some(tx) = feedback.upgrade() {
                            let _ = tx.send(Command::Feedback(Feedback::JoinTimedOut)).await;
                        }
                    }
                    .in_current_span(),
                );
                if let Some(previous) = self.timeout_task.replace(task) {
                    previous.abort();
                }
            }

            Effect::DisarmJoinTimeout => {
                if let Some(task) = self.timeout_task.take() {
                    task.abort();
                }
            }

            Effect::ResolveCredentials { station_code } => {
                let api = Arc::clone(&self.collaborators.api);
                self.spawn_feedback(async move {
                    match api.acs_auth(&station_code).await {
                        Ok(credentials) => Feedback::Credentials(credentials),
                        Err(e) => Feedback::Warning(format!(
                            "Credential exchange failed, waiting for join timeout: {}",
                            e
                        )),
                    }
                });
            }

            Effect::ConnectCalling { credentials } => {
                let calling = Arc::clone(&self.collaborators.calling);
                let log_sink = Arc::clone(&self.collaborators.log_sink);
                self.spawn_feedback(async move {
                    let connect = async {
                        let client = calling
                            .create_client(ClientOptions {
                                user_id: credentials.user_id.clone(),
                                log_sink,
                            })
                            .await?;
                        let agent = client
                            .create_agent(&credentials.token, AGENT_DISPLAY_NAME)
                            .await?;
                        let devices = client.device_manager().await?;
                        Ok::<_, CallingError>(Feedback::Connected {
                            client,
                            agent,
                            devices,
                        })
                    };

                    connect
                        .await
                        .unwrap_or_else(|e| Feedback::JoinFailed(e.to_string()))
                });
            }

            Effect::EnumerateDevices => {
                let Some(devices) = self.devices.clone() else {
                    tracing::error!("Device enumeration requested without a device manager");
                    return;
                };
                self.spawn_feedback(async move {
                    let cameras = devices.cameras().await.unwrap_or_else(|e| {
                        tracing::warn!("Camera enumeration failed: {}", e);
                        Vec::new()
                    });
                    let microphones = devices
                        .microphones()
                        .await
                        .map(|microphones| microphones.len())
                        .unwrap_or_else(|e| {
                            tracing::warn!("Microphone enumeration failed: {}", e);
                            0
                        });
                    Feedback::Devices {
                        cameras,
                        microphones,
                    }
                });
            }

            Effect::RequestDevicePermission => {
                let Some(devices) = self.devices.clone() else {
                    tracing::error!("Permission requested without a device manager");
                    return;
                };
                self.spawn_feedback(async move {
                    let permission = devices.ask_permission(true, true).await.unwrap_or_else(|e| {
                        tracing::warn!("Permission prompt failed: {}", e);
                        DevicePermission::default()
                    });
                    Feedback::Permission(permission)
                });
            }

            Effect::JoinCall {
                meeting_link,
                camera,
            } => {
                let Some(agent) = self.agent.clone() else {
                    tracing::error!("Join requested without a call agent");
                    return;
                };
                tracing::info!("Joining meeting with camera {}", camera.name);
                self.spawn_feedback(async move {
                    let options = JoinOptions {
                        video: Some(LocalVideoStream { camera }),
                    };
                    match agent.join(&meeting_link, options).await {
                        Ok(call) => Feedback::Joined(call),
                        Err(e) => Feedback::JoinFailed(e.to_string()),
                    }
                });
            }

            Effect::WatchStatus { path } => {
                let realtime = Arc::clone(&self.collaborators.realtime);
                let feedback = self.feedback.clone();
                let task = tokio::spawn(
                    watch_call_record(realtime, path, feedback).in_current_span(),
                );
                if let Some(previous) = self.watch_task.replace(task) {
                    previous.abort();
                }
            }

            Effect::StartTimer { delay } => {
                let timer = CallTimer::start_after(delay);
                self.shared.write().elapsed = Some(timer.subscribe());
                self.timer = Some(timer);
            }

            Effect::TerminateCall => {
                self.abort_pending();
                if let Some(call) = self.call.take() {
                    if let Err(e) = call.hang_up().await {
                        self.report(format!("Failed to hang up call: {}", e));
                    }
                }
                self.agent = None;
                self.devices = None;
                if self.client.take().is_some() {
                    tracing::debug!("Released calling client");
                }
            }

            Effect::StopTimer => {
                if let Some(timer) = self.timer.take() {
                    tracing::info!("Call timer stopped at {}", timer.current());
                    timer.stop();
                }
            }

            Effect::CancelWatch => {
                if let Some(task) = self.watch_task.take() {
                    task.abort();
                }
            }

            Effect::UpdateStay { token, update } => {
                match self.collaborators.api.update_stay(&token, &update).await {
                    Ok(_) => tracing::info!(
                        "Stay {} updated (duration {})",
                        update.id,
                        update.call_duration
                    ),
                    Err(e) => self.report(format!("Stay update failed: {}", e)),
                }
            }

            Effect::AnnounceCallEnded { path } => {
                let ended = serde_json::Value::from(STATUS_ENDED);
                match self
                    .collaborators
                    .realtime
                    .update_field(&path, STATUS_FIELD, ended)
                    .await
                {
                    Ok(()) => tracing::info!("Announced call end at {}", path),
                    Err(e) => self.report(format!("Could not announce call end: {}", e)),
                }
            }

            Effect::Navigate { url } => {
                tracing::info!("Handing off to {}", url);
                self.collaborators.host.navigate(&url);
            }

            Effect::Reload => {
                tracing::warn!("Reloading page after device failure");
                self.collaborators.host.reload();
            }
        }
    }

    fn call_snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            participants: self
                .call
                .as_ref()
                .map(|call| call.total_participants())
                .unwrap_or(0),
            elapsed: self
                .timer
                .as_ref()
                .map(|timer| timer.current())
                .unwrap_or_else(|| format_elapsed(0)),
        }
    }

    fn spawn_feedback<F>(&mut self, lookup: F)
    where
        F: Future<Output = Feedback> + Send + 'static,
    {
        let feedback = self.feedback.clone();
        self.pending.retain(|task| !task.is_finished());
        self.pending.push(tokio::spawn(
            async move {
                let result = lookup.await;
                if let Some(tx) = feedback.upgrade() {
                    let _ = tx.send(Command::Feedback(result)).await;
                }
            }
            .in_current_span(),
        ));
    }

    fn report(&self, message: String) {
        tracing::warn!("{}", message);
        let _ = self.event_tx.send(ControllerEvent::Error(message));
    }

    fn abort_pending(&mut self) {
        for task in self.pending.drain(..) {
            task.abort();
        }
    }

    fn abort_background(&mut self) {
        self.abort_pending();
        for task in [self.watch_task.take(), self.timeout_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        self.timer = None;
    }
}
