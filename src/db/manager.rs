//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns the single live driver handle, the adapter-wide
//! [`LifecycleState`], the [`ActivityClock`] and the keep-alive task.
//!
//! # Design
//!
//! - **Handle slot with generations**: the handle lives behind a `std::sync::RwLock`
//!   together with a generation counter that is bumped every time the slot is
//!   replaced. Callers clone the `Arc` out of the slot and never hold the lock
//!   across an await.
//! - **Single-flight reconnect**: reconnects run under one `tokio::sync::Mutex`.
//!   A caller that saw generation `g` fail only reconnects if the slot is still
//!   at `g` once it holds the lock; otherwise someone else already replaced the
//!   handle and the caller just retries.
//! - **Old handle closed first**: a reconnect empties the slot and closes the old
//!   handle before the driver opens a new one, so two handles are never live.
//! - **Cancellation**: a connect or reconnect whose future is dropped mid-flight
//!   leaves the adapter `Failed` (never stuck in `Connecting`/`Reconnecting`),
//!   so the next call recovers through the normal reconnect path.
//! - **Keep-alive**: a [`KeepAliveTask`] holding a `Weak` reference to the
//!   manager state; stopped by `close()` and by caller-triggered reconnects.

use crate::db::dialect::{CanonicalQuery, Statement, normalize, translate};
use crate::db::driver::{Driver, DriverHandle};
use crate::db::keepalive::{KeepAliveOutcome, KeepAliveTask};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType, LifecycleState, Outcome};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Timestamp of the last successful operation.
///
/// Uses `tokio::time::Instant` so paused-clock tests control idleness.
#[derive(Debug)]
pub struct ActivityClock {
    last: RwLock<Instant>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last: RwLock::new(Instant::now()),
        }
    }

    /// Record a successful operation now. Synchronous - does not hold locks across await.
    pub fn touch(&self) {
        if let Ok(mut last) = self.last.write() {
            *last = Instant::now();
        }
    }

    pub fn last(&self) -> Instant {
        *self.last.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since the last successful operation.
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last())
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the adapter, for logging.
#[derive(Debug, Clone)]
pub struct AdapterStatus {
    pub dialect: DatabaseType,
    pub state: LifecycleState,
    pub generation: u64,
    pub handle_id: Option<Uuid>,
    pub connected_since: Option<DateTime<Utc>>,
    pub idle: Duration,
    pub keepalive_running: bool,
}

impl std::fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (generation {}, idle {}s)",
            self.dialect,
            self.state,
            self.generation,
            self.idle.as_secs()
        )
    }
}

/// Who asked for a reconnect. Keep-alive reconnects run inside the keep-alive
/// task and must leave it alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectOrigin {
    Caller,
    KeepAlive,
}

struct HandleSlot<H> {
    handle: Option<Arc<H>>,
    generation: u64,
    id: Option<Uuid>,
    connected_since: Option<DateTime<Utc>>,
}

impl<H> HandleSlot<H> {
    fn empty() -> Self {
        Self {
            handle: None,
            generation: 0,
            id: None,
            connected_since: None,
        }
    }
}

/// A failed attempt and the generation it ran against.
struct Attempt {
    error: DbError,
    generation: u64,
}

/// Marks the state `Failed` if dropped while a connect is still in flight,
/// e.g. when the caller's future is cancelled by a timeout.
struct PendingConnect<'a> {
    state: &'a Mutex<LifecycleState>,
    armed: bool,
}

impl<'a> PendingConnect<'a> {
    fn new(state: &'a Mutex<LifecycleState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(
            *state,
            LifecycleState::Connecting | LifecycleState::Reconnecting
        ) {
            warn!(from = %*state, "Connect attempt abandoned, marking adapter failed");
            *state = LifecycleState::Failed;
        }
    }
}

struct Inner<D: Driver> {
    driver: D,
    config: ConnectionConfig,
    state: Mutex<LifecycleState>,
    slot: RwLock<HandleSlot<D::Handle>>,
    /// Serializes connect, reconnect and close.
    reconnect_lock: tokio::sync::Mutex<()>,
    activity: ActivityClock,
    keepalive: Mutex<Option<KeepAliveTask>>,
}

/// Owns the live handle and its lifecycle. Cheap to clone; clones share state.
pub struct ConnectionManager<D: Driver> {
    inner: Arc<Inner<D>>,
}

impl<D: Driver> Clone for ConnectionManager<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> std::fmt::Debug for ConnectionManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("dialect", &self.inner.config.db_type)
            .field("state", &self.inner.state())
            .field("generation", &self.inner.generation())
            .finish_non_exhaustive()
    }
}

impl<D: Driver> ConnectionManager<D> {
    /// Create a manager for `config`. Nothing is connected until [`connect`](Self::connect).
    pub fn new(driver: D, config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                config,
                state: Mutex::new(LifecycleState::Disconnected),
                slot: RwLock::new(HandleSlot::empty()),
                reconnect_lock: tokio::sync::Mutex::new(()),
                activity: ActivityClock::new(),
                keepalive: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn db_type(&self) -> DatabaseType {
        self.inner.config.db_type
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    /// Generation of the current handle slot; bumped on every replacement.
    pub fn generation(&self) -> u64 {
        self.inner.generation()
    }

    pub fn activity(&self) -> &ActivityClock {
        &self.inner.activity
    }

    pub fn is_keepalive_running(&self) -> bool {
        self.inner
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(KeepAliveTask::is_running)
    }

    /// Establish the handle and start keep-alive where the dialect needs it.
    ///
    /// Fails with `DbError::Connection` if the driver cannot connect, or if the
    /// adapter is already connected.
    pub async fn connect(&self) -> DbResult<()> {
        let _guard = self.inner.reconnect_lock.lock().await;

        let state = self.inner.state();
        if state.is_connected() {
            return Err(DbError::connection(
                "Adapter is already connected",
                "Call close() before connecting again",
            ));
        }

        self.inner.transition(LifecycleState::Connecting)?;
        let pending = PendingConnect::new(&self.inner.state);
        let connected = self.inner.driver.connect(&self.inner.config).await;
        pending.disarm();

        match connected {
            Ok(handle) => {
                let generation = self.inner.install(handle);
                self.inner.transition(LifecycleState::Connected)?;
                self.inner.activity.touch();
                self.inner.start_keepalive();
                info!(
                    dialect = %self.inner.config.db_type,
                    generation,
                    "Adapter connected"
                );
                Ok(())
            }
            Err(e) => {
                self.inner.transition(LifecycleState::Failed)?;
                error!(
                    dialect = %self.inner.config.db_type,
                    error = %e,
                    "Initial connect failed"
                );
                Err(into_connection_error(e))
            }
        }
    }

    /// Run a canonical query.
    ///
    /// A transient failure gets exactly one reconnect followed by one retry;
    /// any other error, or a second failure, is returned unchanged.
    pub async fn execute(&self, query: &CanonicalQuery) -> DbResult<Outcome> {
        let statement = translate(self.inner.config.db_type, query)?;

        let attempt = match self.inner.run(&statement).await {
            Ok(outcome) => return Ok(outcome),
            Err(attempt) if attempt.error.is_transient() => attempt,
            Err(attempt) => return Err(attempt.error),
        };

        warn!(
            error = %attempt.error,
            generation = attempt.generation,
            "Transient failure, reconnecting before a single retry"
        );
        self.inner
            .reconnect_after(Some(attempt.generation), ReconnectOrigin::Caller)
            .await?;

        self.inner
            .run(&statement)
            .await
            .map_err(|attempt| attempt.error)
    }

    /// Replace the handle unconditionally.
    ///
    /// Stops keep-alive, closes the old handle (errors are logged, not
    /// returned), and connects again.
    pub async fn reconnect(&self) -> DbResult<()> {
        self.inner
            .reconnect_after(None, ReconnectOrigin::Caller)
            .await
    }

    /// Stop keep-alive, close the handle and go to `Disconnected`.
    ///
    /// Waits for an in-flight reconnect. Closing a disconnected adapter is a no-op.
    pub async fn close(&self) -> DbResult<()> {
        let _guard = self.inner.reconnect_lock.lock().await;
        self.inner.stop_keepalive();

        if self.inner.state() == LifecycleState::Disconnected {
            return Ok(());
        }

        // State first: an interrupted close must still end Disconnected
        let old = self.inner.replace(None);
        self.inner.transition(LifecycleState::Disconnected)?;
        if let Some(old) = old {
            if let Err(e) = old.close().await {
                warn!(error = %e, "Error closing connection handle");
            }
        }
        info!(dialect = %self.inner.config.db_type, "Adapter closed");
        Ok(())
    }

    /// Run one keep-alive tick now.
    ///
    /// Probes only when the adapter has been idle longer than the configured
    /// threshold; a failed probe triggers a reconnect.
    pub async fn keepalive_tick(&self) -> KeepAliveOutcome {
        self.inner.keepalive_tick().await
    }

    /// Snapshot for logging.
    pub fn status(&self) -> AdapterStatus {
        let slot = self.inner.slot.read().unwrap_or_else(PoisonError::into_inner);
        AdapterStatus {
            dialect: self.inner.config.db_type,
            state: self.inner.state(),
            generation: slot.generation,
            handle_id: slot.id,
            connected_since: slot.connected_since,
            idle: self.inner.activity.idle_for(),
            keepalive_running: self.is_keepalive_running(),
        }
    }
}

impl<D: Driver> Inner<D> {
    fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self) -> u64 {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    fn transition(&self, next: LifecycleState) -> DbResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *state;
        if !current.can_transition_to(next) {
            return Err(DbError::internal(format!(
                "Illegal lifecycle transition {} -> {}",
                current, next
            )));
        }
        *state = next;
        debug!(from = %current, to = %next, "Lifecycle transition");
        Ok(())
    }

    /// Swap the slot contents, bumping the generation. Returns the previous handle.
    fn replace(&self, handle: Option<D::Handle>) -> Option<Arc<D::Handle>> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.generation += 1;
        slot.id = handle.as_ref().map(|_| Uuid::new_v4());
        slot.connected_since = handle.as_ref().map(|_| Utc::now());
        if let Some(id) = slot.id {
            debug!(handle_id = %id, generation = slot.generation, "Installed connection handle");
        }
        std::mem::replace(&mut slot.handle, handle.map(Arc::new))
    }

    fn install(&self, handle: D::Handle) -> u64 {
        self.replace(Some(handle));
        self.generation()
    }

    /// Current handle and its generation, or the reason there is none.
    ///
    /// A missing handle in `Failed` or `Reconnecting` is reported as transient so
    /// the caller goes through the reconnect path.
    fn acquire(&self) -> Result<(Arc<D::Handle>, u64), Attempt> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = &slot.handle {
            return Ok((Arc::clone(handle), slot.generation));
        }

        let state = self.state();
        let error = match state {
            LifecycleState::Failed | LifecycleState::Reconnecting => DbError::transient(
                format!("No live connection handle (state: {})", state),
                None,
            ),
            _ => DbError::NotConnected { state },
        };
        Err(Attempt {
            error,
            generation: slot.generation,
        })
    }

    async fn run(&self, statement: &Statement) -> Result<Outcome, Attempt> {
        let (handle, generation) = self.acquire()?;
        let raw = handle
            .run(statement)
            .await
            .map_err(|error| Attempt { error, generation })?;
        let outcome = normalize(raw, statement.kind).map_err(|error| Attempt { error, generation })?;
        self.activity.touch();
        Ok(outcome)
    }

    /// Reconnect unless the slot has moved past `observed` in the meantime.
    async fn reconnect_after(
        self: &Arc<Self>,
        observed: Option<u64>,
        origin: ReconnectOrigin,
    ) -> DbResult<()> {
        let _guard = self.reconnect_lock.lock().await;

        let generation = self.generation();
        if observed.is_some_and(|g| g != generation) {
            debug!(
                observed = ?observed,
                generation,
                "Handle already replaced, skipping reconnect"
            );
            return Ok(());
        }

        let state = self.state();
        if matches!(
            state,
            LifecycleState::Disconnected | LifecycleState::Connecting
        ) {
            return Err(DbError::NotConnected { state });
        }

        if origin == ReconnectOrigin::Caller {
            self.stop_keepalive();
        }
        self.transition(LifecycleState::Reconnecting)?;
        let pending = PendingConnect::new(&self.state);
        info!(dialect = %self.config.db_type, origin = ?origin, "Reconnecting");

        if let Some(old) = self.replace(None) {
            if let Err(e) = old.close().await {
                warn!(error = %e, "Error closing stale connection handle");
            }
        }

        let connected = self.driver.connect(&self.config).await;
        pending.disarm();

        match connected {
            Ok(handle) => {
                let generation = self.install(handle);
                self.transition(LifecycleState::Connected)?;
                self.activity.touch();
                if origin == ReconnectOrigin::Caller {
                    self.start_keepalive();
                }
                info!(dialect = %self.config.db_type, generation, "Reconnected");
                Ok(())
            }
            Err(e) => {
                self.transition(LifecycleState::Failed)?;
                error!(dialect = %self.config.db_type, error = %e, "Reconnect failed");
                Err(e)
            }
        }
    }

    async fn keepalive_tick(self: &Arc<Self>) -> KeepAliveOutcome {
        let idle = self.activity.idle_for();
        if idle <= self.config.keepalive.idle_threshold() {
            return KeepAliveOutcome::Skipped;
        }

        let observed = match self.acquire() {
            Ok((handle, generation)) => match handle.run(&Statement::probe()).await {
                Ok(_) => {
                    debug!(idle_secs = idle.as_secs(), "Keep-alive probe succeeded");
                    return KeepAliveOutcome::Healthy;
                }
                Err(e) => {
                    warn!(error = %e, generation, "Keep-alive probe failed");
                    generation
                }
            },
            Err(Attempt { error, generation }) if error.is_transient() => generation,
            Err(_) => return KeepAliveOutcome::Skipped,
        };

        match self
            .reconnect_after(Some(observed), ReconnectOrigin::KeepAlive)
            .await
        {
            Ok(()) => KeepAliveOutcome::Recovered,
            Err(e) => {
                warn!(error = %e, "Keep-alive reconnect failed, will retry on next tick");
                KeepAliveOutcome::RecoveryFailed
            }
        }
    }

    fn start_keepalive(self: &Arc<Self>) {
        let options = &self.config.keepalive;
        if !options.is_enabled() || !self.config.db_type.drops_idle_connections() {
            return;
        }

        let weak = Arc::downgrade(self);
        let task = KeepAliveTask::spawn(options.interval(), move || {
            let inner = weak.upgrade()?;
            Some(async move { inner.keepalive_tick().await })
        });
        info!(
            interval_secs = options.interval_secs,
            idle_threshold_secs = options.idle_threshold_secs,
            "Keep-alive started"
        );

        // Replacing an old task drops (aborts) it
        *self.keepalive.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    fn stop_keepalive(&self) {
        let task = self
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if task.is_some() {
            debug!("Keep-alive stopped");
        }
    }
}

fn into_connection_error(err: DbError) -> DbError {
    match err {
        DbError::Connection { .. } => err,
        other => DbError::connection(
            other.to_string(),
            "Check that the database server is reachable and the credentials are valid",
        ),
    }
}
