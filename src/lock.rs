//! The lock acquisition state machine (§4.5) — the hard part.
//!
//! The lock lives entirely in Redis hash fields (`lock`, `wait`, `pid`) and
//! contenders coordinate only through monotonic counter arithmetic; there is
//! no server-side locking primitive. Acquisition is a bounded polling loop
//! ticking at [`SLEEP_TIME`]. This module only runs the loop and reports the
//! outcome — committing the winner's `pid`/`lock`/`req` fields and the
//! placeholder TTL is the caller's job ([`crate::handler::SessionHandler`]),
//! since that commit is shared with the read-only/locking-disabled paths
//! that skip this loop entirely.

use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::config::{DETECT_ZOMBIES, SLEEP_TIME, SessionConfig};
use crate::error::SessionError;
use crate::pid;

/// Outcome of one call to [`acquire`].
#[derive(Debug)]
pub struct LockOutcome {
    /// Whether this contender ends up holding the lock.
    pub has_lock: bool,
    /// Number of ticks spent in the loop; exposed as `failedLockAttempts`.
    pub tries: u64,
    /// Whether this contender registered (and must later unregister) as a
    /// waiter — used by the caller to decide whether to decrement `wait`
    /// after the loop.
    pub registered_waiter: bool,
}

/// Diagnostic snapshot captured when admission control rejects a contender.
#[derive(Debug)]
pub struct AdmissionSnapshot {
    pub writes: i64,
    pub req: String,
}

/// Run the acquisition loop against the session hash at `key`.
///
/// Returns [`SessionError::ConcurrentConnectionsExceeded`] if admission
/// control trips; `wait` has already been decremented by the time this
/// returns, satisfying the error's guarantee.
pub async fn acquire(
    conn: &mut deadpool_redis::Connection,
    key: &str,
    cfg: &SessionConfig,
) -> Result<LockOutcome, SessionError> {
    let break_after = cfg.break_after_ticks();
    let fail_after = cfg.fail_after_ticks();

    let mut tries: u64 = 0;
    let mut old_lock_pid: Option<String> = None;
    let mut old_lock: i64 = 0;
    let mut registered_waiter = false;
    let mut zombie_tick = false;
    let mut sleep_time = SLEEP_TIME;

    loop {
        // Step 1-2: atomically increment `lock`; an increment to 1 means we
        // hold it uncontested.
        let lock_val: i64 = conn.hincr(key, "lock", 1).await?;
        if lock_val == 1 {
            return Ok(LockOutcome {
                has_lock: true,
                tries,
                registered_waiter,
            });
        }

        // Step 3: once we're close enough to breaking, start tracking the
        // owner identity so we can detect whether it's changed.
        let mut lock_pid: Option<String> = None;
        if tries + 1 >= break_after.saturating_sub(1) {
            lock_pid = conn.hget(key, "pid").await?;
        }

        // Step 4: lock-break condition — owner hasn't changed across the
        // whole waiting window.
        if tries >= break_after && lock_pid == old_lock_pid {
            debug!(tries, ?lock_pid, "breaking stale lock");
            return Ok(LockOutcome {
                has_lock: true,
                tries,
                registered_waiter,
            });
        }
        if lock_pid.is_some() {
            old_lock_pid = lock_pid;
        }

        // Step 5: register as a waiter exactly once, defending against a
        // transiently negative counter left by zombie-waiter corrections.
        if !registered_waiter {
            for _ in 0..cfg.max_concurrency {
                let wait_val: i64 = conn.hincr(key, "wait", 1).await?;
                if wait_val >= 1 {
                    break;
                }
            }
            registered_waiter = true;
        }

        let wait_val: i64 = conn.hget(key, "wait").await?;

        // Step 6: zombie-waiter detection — only evaluated on the tick the
        // zombie flag was armed (step 9's odd phase).
        if zombie_tick && lock_val > old_lock && lock_val + 1 < old_lock + wait_val {
            warn!(tries, lock_val, wait_val, "correcting stale waiter count");
            let _: i64 = conn.hincr(key, "wait", -1).await?;
            old_lock = lock_val;
            tokio::time::sleep(sleep_time).await;
            sleep_time = SLEEP_TIME;
            continue;
        }

        // Step 7: admission control.
        if wait_val >= i64::from(cfg.max_concurrency) && !zombie_tick {
            let _: i64 = conn.hincr(key, "wait", -1).await?;
            let (writes, req): (Option<i64>, Option<String>) = redis::pipe()
                .hget(key, "writes")
                .hget(key, "req")
                .query_async(conn)
                .await?;
            let snapshot = AdmissionSnapshot {
                writes: writes.unwrap_or(0),
                req: req.unwrap_or_default(),
            };
            warn!(
                tries,
                wait_val,
                writes = snapshot.writes,
                req = %snapshot.req,
                "admission control rejected contender"
            );
            return Err(SessionError::ConcurrentConnectionsExceeded);
        }

        // Step 8.
        tries += 1;

        // Step 9: every DETECT_ZOMBIES ticks, run a zombie check.
        let phase = tries % DETECT_ZOMBIES;
        if phase == 1 {
            zombie_tick = true;
            sleep_time += std::time::Duration::from_millis(10);
        } else {
            zombie_tick = false;
            if phase == 0 {
                let owner: Option<String> = conn.hget(key, "pid").await?;
                if let Some(owner) = owner
                    && !pid::is_alive(&owner)
                {
                    warn!(%owner, "zombie owner detected, resetting lock counter");
                    let _: () = conn.hset(key, "lock", 0).await?;
                }
            }
        }

        // Step 10: give up.
        if tries >= break_after + fail_after {
            return Ok(LockOutcome {
                has_lock: false,
                tries,
                registered_waiter,
            });
        }

        // Step 11.
        old_lock = lock_val;
        tokio::time::sleep(sleep_time).await;
        sleep_time = SLEEP_TIME;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_reports_registration_state() {
        let outcome = LockOutcome {
            has_lock: true,
            tries: 0,
            registered_waiter: false,
        };
        assert!(outcome.has_lock);
        assert!(!outcome.registered_waiter);
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;
    use crate::config::SessionConfig;

    fn test_pool() -> deadpool_redis::Pool {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        deadpool_redis::Config::from_url(url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .expect("pool creation should succeed")
    }

    #[tokio::test]
    async fn uncontested_acquire_takes_one_tick() {
        let pool = test_pool();
        let mut conn = pool.get().await.expect("connection");
        let key = format!("lock-test-{}", uuid::Uuid::new_v4());
        let cfg = SessionConfig::default();

        let outcome = acquire(&mut conn, &key, &cfg).await.expect("should acquire");
        assert!(outcome.has_lock);
        assert_eq!(outcome.tries, 0);

        let _: () = conn.del(&key).await.unwrap();
    }
}
