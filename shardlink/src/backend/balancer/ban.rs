use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::warn;

use super::Address;

/// Address ban.
#[derive(Clone, Debug)]
pub struct Ban {
    inner: Arc<RwLock<Option<BanEntry>>>,
    addr: Address,
}

impl Ban {
    /// Create new ban handler.
    pub(super) fn new(addr: &Address) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            addr: addr.clone(),
        }
    }

    /// Check if the address is banned.
    pub fn banned(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Ban the address for the ban_timeout duration.
    ///
    /// An existing ban is not extended.
    pub fn ban(&self, ban_timeout: Duration) -> bool {
        self.ban_at(Instant::now(), ban_timeout)
    }

    pub(super) fn ban_at(&self, created_at: Instant, ban_timeout: Duration) -> bool {
        let mut guard = self.inner.upgradable_read();

        if guard.is_none() {
            guard.with_upgraded(|guard| {
                *guard = Some(BanEntry {
                    created_at,
                    ban_timeout,
                });
            });
            drop(guard);
            warn!("marked down for {:?} [{}]", ban_timeout, self.addr);
            true
        } else {
            false
        }
    }

    /// Remove ban if it has expired.
    pub(super) fn unban_if_expired(&self, now: Instant) -> bool {
        let mut guard = self.inner.upgradable_read();
        let unbanned = if guard.as_ref().map(|b| b.expired(now)).unwrap_or(false) {
            guard.with_upgraded(|guard| {
                *guard = None;
            });

            true
        } else {
            false
        };
        drop(guard);
        if unbanned {
            warn!("resuming traffic [{}]", self.addr);
        }
        unbanned
    }
}

#[derive(Debug)]
struct BanEntry {
    created_at: Instant,
    ban_timeout: Duration,
}

impl BanEntry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ban_timeout
    }
}
