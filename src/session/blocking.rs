//! Synchronous façade over a [`SessionOrchestrator`]
//!
//! Each call submits the async operation to an owned runtime and blocks on
//! it. Must not be used from inside another async runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use super::traits::SessionOrchestrator;
use super::types::{ActionRecord, DeviceOrigin, ReleaseMode, Session};
use crate::timing::BehaviorProfile;
use crate::{Error, Result};

/// Blocking session API
pub struct BlockingFleet {
    runtime: Runtime,
    sessions: Arc<dyn SessionOrchestrator>,
}

impl BlockingFleet {
    /// Multi-threaded runtime used by the façade
    pub fn build_runtime() -> Result<Runtime> {
        Builder::new_multi_thread()
            .enable_all()
            .thread_name("fleet-blocking")
            .build()
            .map_err(|e| Error::internal(format!("Failed to build runtime: {}", e)))
    }

    /// Wrap `sessions` with a fresh multi-threaded runtime
    pub fn new(sessions: Arc<dyn SessionOrchestrator>) -> Result<Self> {
        Ok(Self::with_runtime(Self::build_runtime()?, sessions))
    }

    pub fn with_runtime(runtime: Runtime, sessions: Arc<dyn SessionOrchestrator>) -> Self {
        Self { runtime, sessions }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Run any other future on the façade's runtime
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn create_session(&self, origin: DeviceOrigin, profile: BehaviorProfile) -> Result<Session> {
        self.block_on(self.sessions.create_session(origin, profile))
    }

    pub fn perform_tap(&self, session_id: &str, x: f64, y: f64) -> Result<ActionRecord> {
        self.block_on(self.sessions.perform_tap(session_id, x, y))
    }

    pub fn perform_swipe(
        &self,
        session_id: &str,
        from: (f64, f64),
        to: (f64, f64),
        duration: Option<Duration>,
    ) -> Result<ActionRecord> {
        self.block_on(self.sessions.perform_swipe(session_id, from, to, duration))
    }

    pub fn perform_long_press(&self, session_id: &str, x: f64, y: f64, hold: Duration) -> Result<ActionRecord> {
        self.block_on(self.sessions.perform_long_press(session_id, x, y, hold))
    }

    pub fn perform_pinch(&self, session_id: &str, cx: f64, cy: f64, scale: f64, duration: Duration) -> Result<ActionRecord> {
        self.block_on(self.sessions.perform_pinch(session_id, cx, cy, scale, duration))
    }

    pub fn end_session(&self, session_id: &str, mode: ReleaseMode) -> Result<()> {
        self.block_on(self.sessions.end_session(session_id, mode))
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        self.sessions.get_session(session_id)
    }

    pub fn list_sessions(&self) -> Vec<Session> {
        self.sessions.list_sessions()
    }

    pub fn action_log(&self, session_id: &str) -> Result<Vec<ActionRecord>> {
        self.sessions.action_log(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.session_count()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.block_on(self.sessions.shutdown())
    }
}
