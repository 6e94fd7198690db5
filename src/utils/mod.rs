// Utility functions

use crate::store::{StoreError, StoreResult};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// This is useful when you want to continue even if a previous thread panicked.
/// The mutex state may be inconsistent, so use with caution.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Retry a store operation with exponential backoff while it reports
/// `Unavailable`. Any other outcome (success or a non-retryable error)
/// returns immediately. The final attempt's error is returned as-is.
pub async fn retry_store<T, F>(
    mut op: F,
    attempts: u32,
    initial_delay: Duration,
) -> StoreResult<T>
where
    F: FnMut() -> StoreResult<T>,
{
    let mut delay = initial_delay;
    let mut remaining = attempts.max(1);

    loop {
        match op() {
            Err(StoreError::Unavailable(reason)) if remaining > 1 => {
                log::warn!(
                    "Store unavailable ({}), retrying in {:?} ({} attempts left)",
                    reason,
                    delay,
                    remaining - 1
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                remaining -= 1;
            }
            other => return other,
        }
    }
}
