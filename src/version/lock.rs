// ============================================================================
// Version Lock
// ============================================================================
//
// Single-slot, time-bounded mutual exclusion for version transitions.
// A claimed slot carries a renewal worker that keeps pushing `expires_at`
// forward; the worker lives exactly as long as the slot entry that owns it.
//
// ============================================================================

use crate::config::RegistryConfig;
use crate::core::OperationId;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, trace, warn};

/// Observable state of the current lock holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockInfo {
    pub operation_id: OperationId,
    pub acquired_at: Instant,
    pub expires_at: Instant,
}

impl LockInfo {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Background task extending a held lock.
struct RenewalWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for RenewalWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Slot entry: the lock plus the worker renewing it.
struct HeldLock {
    info: LockInfo,
    _renewal: RenewalWorker,
}

type Slot = Mutex<Option<HeldLock>>;

enum Claim {
    Acquired,
    Reentrant,
    Contended(OperationId),
}

pub struct VersionLock {
    slot: Arc<Slot>,
    lock_timeout: Duration,
    renewal_interval: Duration,
    retry_interval: Duration,
    max_retries: u32,
}

impl VersionLock {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            lock_timeout: config.lock_timeout,
            renewal_interval: config.lock_renewal_interval,
            retry_interval: config.lock_retry_interval,
            max_retries: config.max_lock_retries,
        }
    }

    /// Try to take the lock for `operation_id`, retrying a bounded number of
    /// times. Returns `None` once the retry budget is exhausted.
    pub async fn acquire(&self, operation_id: OperationId) -> Option<LockGuard> {
        for attempt in 1..=self.max_retries {
            match self.try_claim(operation_id) {
                Claim::Acquired => {
                    debug!(%operation_id, attempt, "version lock acquired");
                    return Some(LockGuard::new(&self.slot, operation_id, true));
                }
                Claim::Reentrant => {
                    trace!(%operation_id, "version lock re-entered");
                    return Some(LockGuard::new(&self.slot, operation_id, false));
                }
                Claim::Contended(holder) => {
                    debug!(%operation_id, %holder, attempt, "version lock contended");
                    if attempt < self.max_retries {
                        sleep(self.retry_interval).await;
                    }
                }
            }
        }

        warn!(%operation_id, retries = self.max_retries, "version lock retries exhausted");
        None
    }

    fn try_claim(&self, operation_id: OperationId) -> Claim {
        let mut slot = lock_slot(&self.slot);
        let now = Instant::now();

        if let Some(held) = slot.as_ref().filter(|held| !held.info.is_expired(now)) {
            return if held.info.operation_id == operation_id {
                Claim::Reentrant
            } else {
                Claim::Contended(held.info.operation_id)
            };
        }

        let renewal = spawn_renewal(
            Arc::downgrade(&self.slot),
            operation_id,
            self.lock_timeout,
            self.renewal_interval,
        );
        // Replacing an expired entry drops it and stops its worker.
        let superseded = slot.replace(HeldLock {
            info: LockInfo {
                operation_id,
                acquired_at: now,
                expires_at: now + self.lock_timeout,
            },
            _renewal: renewal,
        });
        drop(slot);
        if let Some(stale) = superseded {
            warn!(stale = %stale.info.operation_id, "superseded expired version lock");
        }
        Claim::Acquired
    }

    /// Release the lock if `operation_id` owns it. Returns whether it did.
    pub fn release(&self, operation_id: OperationId) -> bool {
        release_slot(&self.slot, operation_id)
    }

    /// Current holder, if the slot is occupied and not expired.
    pub fn holder(&self) -> Option<LockInfo> {
        let slot = lock_slot(&self.slot);
        slot.as_ref()
            .map(|held| held.info)
            .filter(|info| !info.is_expired(Instant::now()))
    }

    pub fn is_held(&self) -> bool {
        self.holder().is_some()
    }
}

fn lock_slot(slot: &Slot) -> std::sync::MutexGuard<'_, Option<HeldLock>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release_slot(slot: &Slot, operation_id: OperationId) -> bool {
    let released = {
        let mut guard = lock_slot(slot);
        let owns = guard
            .as_ref()
            .is_some_and(|held| held.info.operation_id == operation_id);
        if owns { guard.take() } else { None }
    };
    match released {
        Some(_) => {
            debug!(%operation_id, "version lock released");
            true
        }
        None => false,
    }
}

fn spawn_renewal(
    slot: Weak<Slot>,
    operation_id: OperationId,
    lock_timeout: Duration,
    renewal_interval: Duration,
) -> RenewalWorker {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + renewal_interval, renewal_interval);
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    let Some(strong) = slot.upgrade() else {
                        break;
                    };
                    let renewed = {
                        let mut guard = lock_slot(&strong);
                        match guard.as_mut() {
                            Some(held) if held.info.operation_id == operation_id => {
                                held.info.expires_at = Instant::now() + lock_timeout;
                                true
                            }
                            _ => false,
                        }
                    };
                    if !renewed {
                        break;
                    }
                    trace!(%operation_id, "version lock renewed");
                }
            }
        }
    });

    RenewalWorker {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}

/// Scope of a lock acquisition. An owning guard releases the lock when
/// dropped; a re-entrant guard leaves it to the outer owner.
pub struct LockGuard {
    slot: Arc<Slot>,
    operation_id: OperationId,
    owned: bool,
}

impl LockGuard {
    fn new(slot: &Arc<Slot>, operation_id: OperationId, owned: bool) -> Self {
        Self {
            slot: Arc::clone(slot),
            operation_id,
            owned,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    pub fn is_reentrant(&self) -> bool {
        !self.owned
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.owned {
            release_slot(&self.slot, self.operation_id);
        }
    }
}
