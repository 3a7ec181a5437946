use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

static PROCESS_LOCK: OnceLock<ConnectionLock> = OnceLock::new();

/// Admits at most one in-flight connection attempt among all controllers that
/// share it. Holders are identified by controller id.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLock {
    holder: Arc<Mutex<Option<u64>>>,
}

impl ConnectionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock shared by every controller in this process.
    pub fn process() -> Self {
        PROCESS_LOCK.get_or_init(ConnectionLock::new).clone()
    }

    pub fn try_acquire(&self, owner: u64) -> Option<ConnectionLockGuard> {
        let mut holder = self.slot();
        if holder.is_some() {
            return None;
        }
        *holder = Some(owner);

        Some(ConnectionLockGuard {
            lock: self.clone(),
            owner,
        })
    }

    pub fn holder(&self) -> Option<u64> {
        *self.slot()
    }

    pub fn is_held(&self) -> bool {
        self.holder().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<u64>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the lock when dropped.
#[derive(Debug)]
pub struct ConnectionLockGuard {
    lock: ConnectionLock,
    owner: u64,
}

impl ConnectionLockGuard {
    pub fn owner(&self) -> u64 {
        self.owner
    }
}

impl Drop for ConnectionLockGuard {
    fn drop(&mut self) {
        let mut holder = self.lock.slot();
        if *holder == Some(self.owner) {
            *holder = None;
        }
    }
}
