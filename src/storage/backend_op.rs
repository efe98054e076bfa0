//! Bounded retry of backend operations that fail temporarily.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::types::Result;

const BASE_DELAY: Duration = Duration::from_millis(10);

/// Runs `op` until it succeeds, fails permanently, or `attempts` runs out.
///
/// Temporary failures are retried after a doubling delay starting at 10ms and
/// capped at `max_wait`. The last error is returned unchanged.
pub fn execute<T, F>(name: &'static str, attempts: usize, max_wait: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = attempts.max(1);
    let mut delay = BASE_DELAY.min(max_wait);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_temporary() && attempt < attempts => {
                warn!(
                    op = name,
                    attempt,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "backend_op.retry"
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                delay = (delay * 2).min(max_wait);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
