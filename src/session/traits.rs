//! Session orchestrator trait

use std::time::Duration;

use async_trait::async_trait;

use super::types::{ActionRecord, DeviceOrigin, ReleaseMode, Session};
use crate::timing::BehaviorProfile;

/// Bounded-concurrency device sessions
///
/// Every gesture waits for a timing-model delay, is synthesized for the
/// session's screen and dispatched through the connection manager. Gestures
/// within one session never overlap.
#[async_trait]
pub trait SessionOrchestrator: Send + Sync {
    /// Acquire a session slot, bring up the device and attach to it
    ///
    /// Fails immediately with `ResourceExhausted` when every slot is taken.
    async fn create_session(&self, origin: DeviceOrigin, profile: BehaviorProfile) -> Result<Session, crate::Error>;

    async fn perform_tap(&self, session_id: &str, x: f64, y: f64) -> Result<ActionRecord, crate::Error>;

    async fn perform_swipe(
        &self,
        session_id: &str,
        from: (f64, f64),
        to: (f64, f64),
        duration: Option<Duration>,
    ) -> Result<ActionRecord, crate::Error>;

    async fn perform_long_press(&self, session_id: &str, x: f64, y: f64, hold: Duration) -> Result<ActionRecord, crate::Error>;

    async fn perform_pinch(
        &self,
        session_id: &str,
        cx: f64,
        cy: f64,
        scale: f64,
        duration: Duration,
    ) -> Result<ActionRecord, crate::Error>;

    /// End a session; ending an unknown or closed session is a no-op
    async fn end_session(&self, session_id: &str, mode: ReleaseMode) -> Result<(), crate::Error>;

    fn get_session(&self, session_id: &str) -> Result<Session, crate::Error>;

    fn list_sessions(&self) -> Vec<Session>;

    /// Gestures performed so far, oldest first
    fn action_log(&self, session_id: &str) -> Result<Vec<ActionRecord>, crate::Error>;

    /// Consistency of the recent delays, once enough have been drawn
    fn consistency_score(&self, session_id: &str) -> Result<Option<f64>, crate::Error>;

    /// Live sessions in any state
    fn session_count(&self) -> usize;

    /// End every session
    async fn shutdown(&self) -> Result<(), crate::Error>;
}
