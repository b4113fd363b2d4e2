//! In-Memory-Fakes für alle Dienste des Call-Controllers
//!
//! Alle Fakes schreiben in ein gemeinsames Journal, damit Tests die
//! Reihenfolge der Seiteneffekte prüfen können.

#![allow(dead_code)]

use async_trait::async_trait;
use dashboard_call::api::{ApiError, CallingCredentials, DashboardApi, StayUpdate};
use dashboard_call::calling::{
    ActiveCall, BufferedLogSink, CallAgent, CallClient, CallingError, CallingService,
    ClientOptions, DeviceInfo, DeviceManager, DevicePermission, JoinOptions,
};
use dashboard_call::host::HostShell;
use dashboard_call::realtime::{FieldChange, RealtimeError, RealtimeStore, RecordPath, RecordWatch};
use dashboard_call::session::{SessionParams, UserResponse};
use dashboard_call::{CallController, CallPhase, Collaborators, DashboardConfig};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub type Journal = Arc<Mutex<Vec<String>>>;

// ============================================================================
// API
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    Succeed,
    Fail,
    Stall,
}

pub struct FakeApi {
    journal: Journal,
    pub user: Mutex<Option<serde_json::Value>>,
    pub credentials: Mutex<CredentialMode>,
    pub fail_stay_update: AtomicBool,
    pub stay_updates: Mutex<Vec<(String, StayUpdate)>>,
}

impl FakeApi {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            user: Mutex::new(Some(json!({
                "user": {
                    "id": 7,
                    "uid": "user-uid",
                    "firstName": "Ana",
                    "lastName": "Diaz",
                    "subAccounts": [{ "ownerId": 42, "ownerUid": "owner-uid" }]
                }
            }))),
            credentials: Mutex::new(CredentialMode::Succeed),
            fail_stay_update: AtomicBool::new(false),
            stay_updates: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn acs_auth(&self, station_code: &str) -> Result<CallingCredentials, ApiError> {
        self.journal.lock().push(format!("acs_auth:{}", station_code));
        let mode = *self.credentials.lock();
        match mode {
            CredentialMode::Succeed => Ok(CallingCredentials {
                user_id: "8:acs:dashboard".into(),
                token: "acs-token".into(),
            }),
            CredentialMode::Fail => Err(ApiError::Status {
                status: 500,
                body: "auth backend down".into(),
            }),
            CredentialMode::Stall => futures::future::pending().await,
        }
    }

    async fn current_user(&self, token: &str) -> Result<UserResponse, ApiError> {
        self.journal.lock().push(format!("current_user:{}", token));
        let user = self.user.lock().clone();
        match user {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| ApiError::InvalidResponse(e.to_string())),
            None => Err(ApiError::Status {
                status: 401,
                body: "unauthorized".into(),
            }),
        }
    }

    async fn update_stay(
        &self,
        token: &str,
        update: &StayUpdate,
    ) -> Result<serde_json::Value, ApiError> {
        self.journal.lock().push(format!("update_stay:{}", update.id));
        if self.fail_stay_update.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.stay_updates
            .lock()
            .push((token.to_string(), update.clone()));
        Ok(json!({ "ok": true }))
    }
}

// ============================================================================
// CALLING SERVICE
// ============================================================================

pub struct FakeCall {
    journal: Journal,
    pub participants: AtomicUsize,
    pub hung_up: AtomicBool,
}

#[async_trait]
impl ActiveCall for FakeCall {
    fn id(&self) -> String {
        "call-1".to_string()
    }

    fn total_participants(&self) -> usize {
        self.participants.load(Ordering::SeqCst)
    }

    async fn hang_up(&self) -> Result<(), CallingError> {
        self.journal.lock().push("hang_up".to_string());
        self.hung_up.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeCalling {
    journal: Journal,
    pub cameras: Mutex<Vec<DeviceInfo>>,
    pub microphones: Mutex<Vec<DeviceInfo>>,
    pub permission: Mutex<DevicePermission>,
    pub fail_join: AtomicBool,
    pub call: Arc<FakeCall>,
    pub joined_with: Mutex<Option<(String, JoinOptions)>>,
    pub agent_identity: Mutex<Option<(String, String)>>,
}

impl FakeCalling {
    fn new(journal: Journal) -> Self {
        Self {
            call: Arc::new(FakeCall {
                journal: journal.clone(),
                participants: AtomicUsize::new(2),
                hung_up: AtomicBool::new(false),
            }),
            journal,
            cameras: Mutex::new(vec![
                DeviceInfo::new("cam-0", "Front Camera"),
                DeviceInfo::new("cam-1", "Document Camera"),
            ]),
            microphones: Mutex::new(vec![DeviceInfo::new("mic-0", "Desk Microphone")]),
            permission: Mutex::new(DevicePermission {
                audio: true,
                video: true,
            }),
            fail_join: AtomicBool::new(false),
            joined_with: Mutex::new(None),
            agent_identity: Mutex::new(None),
        }
    }
}

/// Dünner Wrapper, damit ein `Arc<FakeCalling>` alle Calling-Traits bedient
pub struct FakeCallingHandle(pub Arc<FakeCalling>);

#[async_trait]
impl CallingService for FakeCallingHandle {
    async fn create_client(
        &self,
        options: ClientOptions,
    ) -> Result<Arc<dyn CallClient>, CallingError> {
        self.0
            .journal
            .lock()
            .push(format!("create_client:{}", options.user_id));
        Ok(Arc::new(FakeCallingHandle(self.0.clone())))
    }
}

#[async_trait]
impl CallClient for FakeCallingHandle {
    async fn create_agent(
        &self,
        token: &str,
        display_name: &str,
    ) -> Result<Arc<dyn CallAgent>, CallingError> {
        *self.0.agent_identity.lock() = Some((token.to_string(), display_name.to_string()));
        Ok(Arc::new(FakeCallingHandle(self.0.clone())))
    }

    async fn device_manager(&self) -> Result<Arc<dyn DeviceManager>, CallingError> {
        Ok(Arc::new(FakeCallingHandle(self.0.clone())))
    }
}

#[async_trait]
impl DeviceManager for FakeCallingHandle {
    async fn cameras(&self) -> Result<Vec<DeviceInfo>, CallingError> {
        Ok(self.0.cameras.lock().clone())
    }

    async fn microphones(&self) -> Result<Vec<DeviceInfo>, CallingError> {
        Ok(self.0.microphones.lock().clone())
    }

    async fn ask_permission(
        &self,
        audio: bool,
        video: bool,
    ) -> Result<DevicePermission, CallingError> {
        self.0
            .journal
            .lock()
            .push(format!("ask_permission:{}:{}", audio, video));
        Ok(*self.0.permission.lock())
    }
}

#[async_trait]
impl CallAgent for FakeCallingHandle {
    async fn join(
        &self,
        meeting_link: &str,
        options: JoinOptions,
    ) -> Result<Arc<dyn ActiveCall>, CallingError> {
        self.0.journal.lock().push(format!("join:{}", meeting_link));
        if self.0.fail_join.load(Ordering::SeqCst) {
            return Err(CallingError::Sdk(anyhow::anyhow!("meeting not found")));
        }
        *self.0.joined_with.lock() = Some((meeting_link.to_string(), options));
        Ok(self.0.call.clone())
    }
}

// ============================================================================
// REALTIME STORE
// ============================================================================

pub struct FakeRealtime {
    journal: Journal,
    sender: Mutex<Option<mpsc::Sender<FieldChange>>>,
    /// Anzahl der nächsten `watch`-Aufrufe, die fehlschlagen
    pub failing_watches: AtomicUsize,
    pub watched: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl FakeRealtime {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            sender: Mutex::new(None),
            failing_watches: AtomicUsize::new(0),
            watched: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Liefert eine Feldänderung an das laufende Abonnement
    ///
    /// `false`, wenn niemand (mehr) zuhört.
    pub async fn push(&self, key: &str, value: serde_json::Value) -> bool {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => sender.send(FieldChange::new(key, value)).await.is_ok(),
            None => false,
        }
    }

    /// Beendet den laufenden Stream, als hätte der Server geschlossen
    pub fn end_stream(&self) {
        self.sender.lock().take();
    }
}

#[async_trait]
impl RealtimeStore for FakeRealtime {
    async fn watch(&self, path: &RecordPath) -> Result<RecordWatch, RealtimeError> {
        self.watched.lock().push(path.to_string());
        let failing = self.failing_watches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_watches.store(failing - 1, Ordering::SeqCst);
            return Err(RealtimeError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }

        let (tx, rx) = mpsc::channel(16);
        *self.sender.lock() = Some(tx);
        Ok(RecordWatch::from_receiver(rx))
    }

    async fn update_field(
        &self,
        path: &RecordPath,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        self.journal
            .lock()
            .push(format!("update_field:{}:{}", path, field));
        self.writes
            .lock()
            .push((path.to_string(), field.to_string(), value));
        Ok(())
    }
}

// ============================================================================
// HOST
// ============================================================================

pub struct FakeHost {
    journal: Journal,
    pub navigations: Mutex<Vec<String>>,
    pub reloads: AtomicUsize,
}

impl HostShell for FakeHost {
    fn navigate(&self, url: &str) {
        self.journal.lock().push(format!("navigate:{}", url));
        self.navigations.lock().push(url.to_string());
    }

    fn reload(&self) {
        self.journal.lock().push("reload".to_string());
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub journal: Journal,
    pub api: Arc<FakeApi>,
    pub calling: Arc<FakeCalling>,
    pub realtime: Arc<FakeRealtime>,
    pub host: Arc<FakeHost>,
    pub log_sink: Arc<BufferedLogSink>,
}

impl Harness {
    pub fn new() -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        Self {
            api: Arc::new(FakeApi::new(journal.clone())),
            calling: Arc::new(FakeCalling::new(journal.clone())),
            realtime: Arc::new(FakeRealtime::new(journal.clone())),
            host: Arc::new(FakeHost {
                journal: journal.clone(),
                navigations: Mutex::new(Vec::new()),
                reloads: AtomicUsize::new(0),
            }),
            log_sink: Arc::new(BufferedLogSink::new()),
            journal,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            api: self.api.clone(),
            calling: Arc::new(FakeCallingHandle(self.calling.clone())),
            realtime: self.realtime.clone(),
            host: self.host.clone(),
            log_sink: self.log_sink.clone(),
        }
    }

    pub fn spawn(&self, config: &DashboardConfig) -> CallController {
        CallController::spawn(config, self.collaborators())
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    /// Journal-Einträge ab dem ersten Eintrag mit `prefix`
    pub fn journal_from(&self, prefix: &str) -> Vec<String> {
        let journal = self.journal();
        let start = journal
            .iter()
            .position(|entry| entry.starts_with(prefix))
            .unwrap_or(journal.len());
        journal[start..].to_vec()
    }
}

pub fn params() -> SessionParams {
    SessionParams {
        call_link: Some("https://meet.example.com/j/42".into()),
        token: Some("tok".into()),
        stay_id: Some("17".into()),
        call_key: Some("key-1".into()),
    }
}

/// Wartet (in virtueller Zeit), bis die Phase `pred` erfüllt
pub async fn wait_for_phase<F>(controller: &CallController, pred: F) -> CallPhase
where
    F: Fn(&CallPhase) -> bool,
{
    for _ in 0..600 {
        let phase = controller.phase();
        if pred(&phase) {
            return phase;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("phase never reached, stuck at {:?}", controller.phase());
}

/// Lässt alle Hintergrund-Tasks laufen, ohne Zeit vorzuspulen
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
