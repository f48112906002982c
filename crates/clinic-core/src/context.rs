//! Shared handles passed into every service.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::calendar::CurrentYearCache;
use crate::config::{Clock, PortalConfig};
use crate::db::Database;
use crate::error::PortalResult;

/// Borrowed view of the database, configuration, clock and year cache.
#[derive(Clone, Copy)]
pub struct ServiceContext<'a> {
    pub db: &'a Database,
    pub config: &'a PortalConfig,
    pub clock: &'a dyn Clock,
    pub current_year: &'a CurrentYearCache,
}

impl<'a> ServiceContext<'a> {
    pub fn new(
        db: &'a Database,
        config: &'a PortalConfig,
        clock: &'a dyn Clock,
        current_year: &'a CurrentYearCache,
    ) -> Self {
        Self {
            db,
            config,
            clock,
            current_year,
        }
    }

    /// Audit timestamp for the current instant.
    pub fn stamp(&self) -> String {
        self.clock.stamp()
    }

    /// Run a write transaction, retrying on lock contention.
    ///
    /// Each attempt is a fresh `BEGIN IMMEDIATE`; only busy/locked errors
    /// are retried, up to `lock_retries` times with linear backoff.
    pub fn write<T, F>(&self, operation: &str, mut f: F) -> PortalResult<T>
    where
        F: FnMut(&Database) -> PortalResult<T>,
    {
        let mut attempt = 0;
        loop {
            match self.db.immediate(&mut f) {
                Err(e) if e.is_lock_conflict() && attempt < self.config.lock_retries => {
                    attempt += 1;
                    warn!(operation, attempt, "lock conflict, retrying");
                    thread::sleep(Duration::from_millis(25 * u64::from(attempt)));
                }
                other => return other,
            }
        }
    }
}
