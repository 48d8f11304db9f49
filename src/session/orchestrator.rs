//! Session orchestrator implementation
//!
//! A session owns one semaphore permit, at most one device and one
//! connection. Whoever takes a session out of the registry releases them;
//! a creation that finds its session ended releases only what it acquired.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::SessionOrchestrator;
use super::types::{ActionRecord, DeviceOrigin, GestureRequest, ReleaseMode, Session, SessionState};
use crate::config::Config;
use crate::connection::{DeviceAddress, DeviceConnectionManager, DeviceTarget};
use crate::device::DeviceLifecyclePool;
use crate::timing::{AggressivenessTier, BehaviorProfile, BehaviorTimingModel, RunningState};
use crate::touch::{GestureProfile, ScreenBounds, TouchPattern, TouchSynthesizer};
use crate::{Error, Result};

/// Orchestrator limits
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub max_sessions: usize,
    /// Sleep the drawn pre-action delay; when off the delay is only recorded
    pub pacing_enabled: bool,
    /// Seed for reproducible sessions
    pub seed: Option<u64>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for OrchestratorOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_sessions: config.max_concurrent_sessions,
            pacing_enabled: config.pacing_enabled,
            seed: None,
        }
    }
}

/// Gesture parameters matching a behavior profile
pub fn gesture_profile_for(profile: &BehaviorProfile) -> GestureProfile {
    match profile.tier() {
        AggressivenessTier::Cautious => GestureProfile::relaxed(),
        AggressivenessTier::Moderate | AggressivenessTier::Brisk => GestureProfile::default(),
        AggressivenessTier::Aggressive => GestureProfile::brisk(),
    }
}

struct Engine {
    synthesizer: TouchSynthesizer,
    rng: StdRng,
}

impl Engine {
    fn synthesize(&mut self, request: GestureRequest, bounds: &ScreenBounds, profile: &GestureProfile) -> TouchPattern {
        match request {
            GestureRequest::Tap { x, y } => self.synthesizer.tap(x, y, bounds, profile),
            GestureRequest::Swipe { from, to, duration } => self.synthesizer.swipe(from, to, duration, bounds, profile),
            GestureRequest::LongPress { x, y, hold } => self.synthesizer.long_press(x, y, hold, bounds, profile),
            GestureRequest::Pinch { cx, cy, scale, duration } => {
                self.synthesizer.pinch(cx, cy, scale, duration, bounds, profile)
            }
        }
    }
}

struct SessionEntry {
    session: Mutex<Session>,
    gestures: GestureProfile,
    engine: tokio::sync::Mutex<Engine>,
    timing: Mutex<RunningState>,
    log: Mutex<Vec<ActionRecord>>,
    cancel: watch::Sender<bool>,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl SessionEntry {
    fn snapshot(&self) -> Result<Session> {
        self.session
            .lock()
            .map(|s| s.clone())
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }

    fn state(&self) -> SessionState {
        self.session.lock().map(|s| s.state).unwrap_or(SessionState::Closed)
    }

    /// Move `from -> to`; false when the session moved elsewhere meanwhile
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        match self.session.lock() {
            Ok(mut session) if session.state == from => {
                session.state = to;
                true
            }
            _ => false,
        }
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut session) = self.session.lock() {
            session.state = state;
        }
    }

    fn require_active(&self, id: &str) -> Result<()> {
        match self.state() {
            SessionState::Active => Ok(()),
            SessionState::Ending | SessionState::Closed => {
                Err(Error::cancelled(format!("Session {} has ended", id)))
            }
            other => Err(Error::invalid_state(format!("Session {} is {:?}", id, other))),
        }
    }

    fn release_permit(&self) {
        if let Ok(mut permit) = self.permit.lock() {
            permit.take();
        }
    }
}

/// Resolves once `end_session` has flagged the session
async fn cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Session orchestrator implementation
pub struct SessionOrchestratorImpl {
    pool: Arc<DeviceLifecyclePool>,
    connections: Arc<DeviceConnectionManager>,
    timing: BehaviorTimingModel,
    slots: Arc<Semaphore>,
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    /// device id -> owning session id
    devices: Mutex<HashMap<String, String>>,
    options: OrchestratorOptions,
    seeds: AtomicU64,
}

impl SessionOrchestratorImpl {
    pub fn new(
        pool: Arc<DeviceLifecyclePool>,
        connections: Arc<DeviceConnectionManager>,
        timing: BehaviorTimingModel,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            pool,
            connections,
            timing,
            slots: Arc::new(Semaphore::new(options.max_sessions)),
            sessions: RwLock::new(HashMap::new()),
            devices: Mutex::new(HashMap::new()),
            seeds: AtomicU64::new(options.seed.unwrap_or_default()),
            options,
        }
    }

    pub fn pool(&self) -> &Arc<DeviceLifecyclePool> {
        &self.pool
    }

    pub fn connections(&self) -> &Arc<DeviceConnectionManager> {
        &self.connections
    }

    /// Session slots not currently held
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    fn engine(&self) -> Engine {
        match self.options.seed {
            Some(_) => {
                let seed = self.seeds.fetch_add(1, Ordering::Relaxed);
                Engine {
                    synthesizer: TouchSynthesizer::seeded(seed),
                    rng: StdRng::seed_from_u64(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
                }
            }
            None => Engine {
                synthesizer: TouchSynthesizer::from_entropy(),
                rng: StdRng::from_entropy(),
            },
        }
    }

    fn entry(&self, id: &str) -> Result<Arc<SessionEntry>> {
        self.sessions
            .read()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(id))
    }

    fn take_entry(&self, id: &str) -> Result<Option<Arc<SessionEntry>>> {
        Ok(self
            .sessions
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .remove(id))
    }

    /// Record `device_id` on the session unless another live session uses it
    fn bind_device(&self, entry: &SessionEntry, device_id: &str, pooled: bool) -> Result<()> {
        let id = entry.snapshot()?.id;
        {
            let mut devices = self
                .devices
                .lock()
                .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
            match devices.get(device_id) {
                Some(owner) if *owner != id => {
                    return Err(Error::invalid_state(format!("Device {} already has a session", device_id)));
                }
                _ => {
                    devices.insert(device_id.to_string(), id);
                }
            }
        }

        let mut session = entry
            .session
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
        session.device_id = device_id.to_string();
        session.pooled = pooled;
        Ok(())
    }

    /// Free every device bound to `session_id`
    fn unbind_devices(&self, session_id: &str) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.retain(|_, owner| owner != session_id);
        }
    }

    /// Bring up the device and attach; leaves the session Active
    async fn establish(&self, entry: &SessionEntry, origin: DeviceOrigin) -> Result<()> {
        let id = entry.snapshot()?.id;

        let address = match origin.external_address() {
            Some(address) => {
                self.bind_device(entry, &address.serial(), false)?;
                address
            }
            None => {
                let config = match origin {
                    DeviceOrigin::Launch(config) => config,
                    _ => return Err(Error::internal("launch origin expected")),
                };
                let instance = self.pool.launch(config).await?;
                if let Err(e) = self.bind_device(entry, &instance.id, true) {
                    let _ = self.pool.stop(&instance.id).await;
                    return Err(e);
                }
                if entry.state().is_terminal() {
                    return Err(Error::cancelled(format!("Session {} ended during launch", id)));
                }
                let instance = self.pool.wait_ready(&instance.id).await?;
                DeviceAddress::Emulator {
                    port: instance.listen_port,
                }
            }
        };

        if !entry.transition(SessionState::Created, SessionState::Attaching) {
            return Err(Error::cancelled(format!("Session {} ended during startup", id)));
        }

        let device_id = entry.snapshot()?.device_id;
        self.connections
            .connect(&DeviceTarget::new(device_id.clone(), address))
            .await?;

        if !entry.transition(SessionState::Attaching, SessionState::Active) {
            return Err(Error::cancelled(format!("Session {} ended while attaching", id)));
        }
        info!("Session {} active on {}", id, device_id);
        Ok(())
    }

    /// Release the connection, the device (per `mode`) and the slot
    async fn release(&self, entry: &SessionEntry, mode: ReleaseMode) {
        let session = match entry.snapshot() {
            Ok(session) => session,
            Err(e) => {
                warn!("Cannot release session: {}", e);
                entry.release_permit();
                return;
            }
        };

        if !session.device_id.is_empty() {
            if let Err(e) = self.connections.disconnect(&session.device_id).await {
                warn!("Failed to detach {}: {}", session.device_id, e);
            }
            if session.pooled && mode == ReleaseMode::Stop {
                match self.pool.stop(&session.device_id).await {
                    Ok(_) | Err(Error::DeviceNotFound(_)) => {}
                    Err(e) => warn!("Failed to stop device {}: {}", session.device_id, e),
                }
            }
        }
        self.unbind_devices(&session.id);
        entry.release_permit();
    }

    async fn perform(&self, id: &str, request: GestureRequest) -> Result<ActionRecord> {
        let entry = self.entry(id)?;
        entry.require_active(id)?;
        let cancel = entry.cancel.subscribe();

        let mut engine = entry.engine.lock().await;
        entry.require_active(id)?;
        let session = entry.snapshot()?;

        let delay = {
            let mut state = entry
                .timing
                .lock()
                .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
            self.timing.next_delay(&mut engine.rng, &session.profile, &mut state)
        };

        if self.options.pacing_enabled {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancelled(cancel.clone()) => {
                    return Err(Error::cancelled(format!("Session {} ended before {:?}", id, request.kind())));
                }
            }
        }

        let pattern = engine.synthesize(request, &session.bounds(), &entry.gestures);

        let outcome = tokio::select! {
            result = self.connections.dispatch(&session.device_id, &pattern) => result,
            _ = cancelled(cancel) => Err(Error::cancelled(format!("Session {} ended during {:?}", id, request.kind()))),
        };

        match outcome {
            Ok(()) => {}
            Err(e @ Error::ConnectionRemoved(_)) => {
                drop(engine);
                warn!("Session {} lost its device, ending it", id);
                if let Err(end) = self.end_session(id, ReleaseMode::Stop).await {
                    warn!("Failed to end session {}: {}", id, end);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let record = ActionRecord::from_pattern(&pattern, delay, Utc::now());
        debug!(
            "Session {} {:?}: {} points over {:?} after {:?}",
            id, record.kind, record.point_count, record.duration, delay
        );
        entry
            .log
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl SessionOrchestrator for SessionOrchestratorImpl {
    async fn create_session(&self, origin: DeviceOrigin, profile: BehaviorProfile) -> Result<Session> {
        let permit = self.slots.clone().try_acquire_owned().map_err(|_| {
            Error::resource_exhausted(format!("Session cap of {} reached", self.options.max_sessions))
        })?;

        let id = Uuid::new_v4().to_string();
        let (cancel, _) = watch::channel(false);
        let entry = Arc::new(SessionEntry {
            session: Mutex::new(Session {
                id: id.clone(),
                device_id: String::new(),
                profile,
                start_time: Utc::now(),
                state: SessionState::Created,
                screen: origin.screen(),
                pooled: false,
            }),
            gestures: gesture_profile_for(&profile),
            engine: tokio::sync::Mutex::new(self.engine()),
            timing: Mutex::new(RunningState::new()),
            log: Mutex::new(Vec::new()),
            cancel,
            permit: Mutex::new(Some(permit)),
        });

        self.sessions
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .insert(id.clone(), entry.clone());
        info!("Session {} created ({:?})", id, profile.personality());

        match self.establish(&entry, origin).await {
            Ok(()) => entry.snapshot(),
            Err(e) => {
                warn!("Session {} failed to start: {}", id, e);
                // Still registered means nobody ended it, so the cleanup is ours.
                let ours = self.take_entry(&id)?.is_some();
                if ours {
                    entry.set_state(SessionState::Ending);
                }
                self.release(&entry, ReleaseMode::Stop).await;
                entry.set_state(SessionState::Closed);
                Err(e)
            }
        }
    }

    async fn perform_tap(&self, session_id: &str, x: f64, y: f64) -> Result<ActionRecord> {
        self.perform(session_id, GestureRequest::Tap { x, y }).await
    }

    async fn perform_swipe(
        &self,
        session_id: &str,
        from: (f64, f64),
        to: (f64, f64),
        duration: Option<Duration>,
    ) -> Result<ActionRecord> {
        self.perform(session_id, GestureRequest::Swipe { from, to, duration }).await
    }

    async fn perform_long_press(&self, session_id: &str, x: f64, y: f64, hold: Duration) -> Result<ActionRecord> {
        self.perform(session_id, GestureRequest::LongPress { x, y, hold }).await
    }

    async fn perform_pinch(
        &self,
        session_id: &str,
        cx: f64,
        cy: f64,
        scale: f64,
        duration: Duration,
    ) -> Result<ActionRecord> {
        self.perform(session_id, GestureRequest::Pinch { cx, cy, scale, duration }).await
    }

    async fn end_session(&self, session_id: &str, mode: ReleaseMode) -> Result<()> {
        let entry = match self.take_entry(session_id)? {
            Some(entry) => entry,
            None => return Ok(()),
        };

        entry.set_state(SessionState::Ending);
        let _ = entry.cancel.send(true);
        info!("Ending session {} ({:?})", session_id, mode);

        // Wait for an in-flight gesture to observe the cancellation.
        let _engine = entry.engine.lock().await;
        self.release(&entry, mode).await;
        entry.set_state(SessionState::Closed);
        info!("Session {} closed", session_id);
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Session> {
        self.entry(session_id)?.snapshot()
    }

    fn list_sessions(&self) -> Vec<Session> {
        self.sessions
            .read()
            .map(|sessions| sessions.values().filter_map(|e| e.snapshot().ok()).collect())
            .unwrap_or_default()
    }

    fn action_log(&self, session_id: &str) -> Result<Vec<ActionRecord>> {
        self.entry(session_id)?
            .log
            .lock()
            .map(|log| log.clone())
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }

    fn consistency_score(&self, session_id: &str) -> Result<Option<f64>> {
        let entry = self.entry(session_id)?;
        let state = entry
            .timing
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
        Ok(self.timing.consistency_score(&state))
    }

    fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    async fn shutdown(&self) -> Result<()> {
        let ids: Vec<String> = self
            .sessions
            .read()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .keys()
            .cloned()
            .collect();
        info!("Ending {} session(s)", ids.len());

        let results = futures::future::join_all(ids.iter().map(|id| self.end_session(id, ReleaseMode::Stop))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to end session {} during shutdown: {}", id, e);
            }
        }
        Ok(())
    }
}
