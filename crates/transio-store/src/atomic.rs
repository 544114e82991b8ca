//! Compare-and-set update loop over a single key/value cell.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;
use transio_common::{CasRetryConfig, Error, Result};
use transio_kv::KeyValueStore;

/// Read-modify-CAS loop over one key.
///
/// The retry bound comes from [`CasRetryConfig`]; with no bound the loop
/// keeps retrying until its transition wins.
#[derive(Clone)]
pub struct AtomicUpdater {
    kv: Arc<dyn KeyValueStore>,
    retry: CasRetryConfig,
}

impl AtomicUpdater {
    pub fn new(kv: Arc<dyn KeyValueStore>, retry: CasRetryConfig) -> Self {
        Self { kv, retry }
    }

    /// Replace the value of `key` with `f(current)`.
    ///
    /// `f` may run several times, each time on a freshly read value. When it
    /// returns the current value unchanged nothing is written.
    pub fn update<F>(&self, key: &str, ttl: Option<Duration>, mut f: F) -> Result<()>
    where
        F: FnMut(Option<&[u8]>) -> Result<Option<Vec<u8>>>,
    {
        let start = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts = attempts.saturating_add(1);
            let old = self.kv.get(key)?;
            let new = f(old.as_deref())?;
            if new == old {
                return Ok(());
            }
            if self
                .kv
                .compare_and_set(key, old.as_deref(), new.as_deref(), ttl)?
            {
                if attempts > 1 {
                    trace!("update({}) won after {} attempts", key, attempts);
                }
                return Ok(());
            }
            if self.retry.exhausted(attempts, start.elapsed()) {
                return Err(Error::Contention {
                    key: key.to_string(),
                    attempts,
                });
            }
        }
    }
}
