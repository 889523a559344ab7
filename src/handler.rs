//! The session handler surface (§4.6): `open`/`read`/`write`/`destroy`/
//! `close`/`gc`, composing the codec, bot classifier, lifetime policy, and
//! lock engine behind Redis pipelines.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::bot::BotOverride;
use crate::codec;
use crate::config::SessionConfig;
use crate::context::RequestContext;
use crate::error::SessionError;
use crate::{connection, lock};

/// Placeholder TTL installed when a lock is acquired; the real TTL is
/// installed at write time (§4.5).
const LOCK_PLACEHOLDER_TTL_SECS: i64 = 6 * 60 * 60;

/// Owns, per process, a connection pool to Redis, the configured policy
/// knobs, and the handful of booleans/caches that make `read`→`write`
/// idempotent within one request (§3).
pub struct SessionHandler {
    pool: Pool,
    cfg: SessionConfig,
    bot_override: Option<Box<dyn BotOverride>>,
    read_only: bool,
    use_locking: bool,

    has_lock: bool,
    session_written: bool,
    lifetime: Option<i64>,
    failed_lock_attempts: u64,
    session_writes: i64,
    our_identity: String,
}

impl SessionHandler {
    /// Establish the Redis connection (direct or via Sentinel, §4.7) and
    /// return a handler ready for a single request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectionFailed`] if no connection succeeds.
    pub async fn connect(
        cfg: SessionConfig,
        bot_override: Option<Box<dyn BotOverride>>,
    ) -> Result<Self, SessionError> {
        let use_locking = !cfg.disable_locking;
        let pool = connection::establish(&cfg).await?;
        Ok(Self {
            pool,
            cfg,
            bot_override,
            read_only: false,
            use_locking,
            has_lock: false,
            session_written: false,
            lifetime: None,
            failed_lock_attempts: 0,
            session_writes: 0,
            our_identity: crate::pid::identity(),
        })
    }

    /// No-op success, matching the `open(savePath, sessionName) -> true`
    /// contract (§4.6).
    #[must_use]
    pub fn open(&self, _save_path: &str, _session_name: &str) -> bool {
        true
    }

    /// Mark this handler instance read-only: the locking loop is skipped
    /// entirely and no `lock`/`wait`/`pid` mutations occur.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Number of ticks the last `read` spent in the lock loop.
    #[must_use]
    pub fn failed_lock_attempts(&self) -> u64 {
        self.failed_lock_attempts
    }

    /// Read (and, unless read-only or locking is disabled, acquire the lock
    /// for) session `id`.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError::ConcurrentConnectionsExceeded`] when
    /// admission control rejects this contender; every other failure
    /// surfaces from the driver.
    pub async fn read(&mut self, id: &str, ctx: &RequestContext) -> Result<Vec<u8>, SessionError> {
        let key = self.cfg.session_key(id);
        let mut conn = self.pool.get().await?;

        let ran_acquisition = !self.read_only && self.use_locking;

        if !ran_acquisition {
            self.has_lock = !self.use_locking;
            self.failed_lock_attempts = 0;
        } else {
            let outcome = match lock::acquire(&mut conn, &key, &self.cfg).await {
                Ok(outcome) => outcome,
                Err(e @ SessionError::ConcurrentConnectionsExceeded) => {
                    self.session_written = true;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            self.has_lock = outcome.has_lock;
            self.failed_lock_attempts = outcome.tries;

            if outcome.registered_waiter {
                let _: i64 = conn.hincr(&key, "wait", -1).await?;
            }
        }

        let (data, writes): (Option<Vec<u8>>, Option<i64>) = redis::pipe()
            .hget(&key, "data")
            .hget(&key, "writes")
            .query_async(&mut conn)
            .await?;
        self.session_writes = writes.unwrap_or(0);

        if ran_acquisition {
            let mut pipe = redis::pipe();
            pipe.cmd("SELECT").arg(self.cfg.database).ignore();

            if self.has_lock {
                let prior_lock: i64 = conn.hget(&key, "lock").await.unwrap_or(0);
                if prior_lock > 1 {
                    let prior_req: Option<String> = conn.hget(&key, "req").await.unwrap_or(None);
                    warn!(
                        prior_lock,
                        prior_req = %prior_req.unwrap_or_default(),
                        "acquired a broken lock"
                    );
                }

                pipe.hset(&key, "pid", &self.our_identity).ignore();
                pipe.hset(&key, "lock", 1).ignore();
                pipe.hset(&key, "req", ctx.descriptor()).ignore();
            }
            // The placeholder TTL is installed regardless of whether this
            // contender ended up holding the lock, so partial state left by a
            // give-up can't leak indefinitely either. Only the acquisition
            // path touches `lock`/`wait`/`pid`, so only it installs this TTL;
            // read-only and locking-disabled reads never mutate the session.
            pipe.expire(&key, LOCK_PLACEHOLDER_TTL_SECS).ignore();
            pipe.exec_async(&mut conn).await?;
        }

        self.session_written = false;

        let payload = data.unwrap_or_default();
        codec::decode(&payload)
    }

    /// Commit `data` for session `id`, idempotent within this handler
    /// instance.
    ///
    /// If `sessionWritten` is already set (a prior `write` in this request
    /// already committed, or admission control already rejected a `read`),
    /// returns `true` without touching Redis. Otherwise commits only if
    /// locking is disabled, the stored owner is empty, or the stored owner
    /// is us; any other case means we lost (or never had) the lock, and no
    /// write occurs. Driver failures are caught and converted to `false`.
    pub async fn write(&mut self, id: &str, data: &[u8], ctx: &RequestContext) -> bool {
        if self.session_written {
            debug!(%id, "session already written this request, skipping");
            return true;
        }
        if self.read_only {
            return true;
        }
        self.session_written = true;

        match self.try_commit(id, data, ctx).await {
            Ok(committed) => committed,
            Err(e) => {
                warn!(error = %e, %id, "write failed");
                false
            }
        }
    }

    async fn try_commit(
        &mut self,
        id: &str,
        data: &[u8],
        ctx: &RequestContext,
    ) -> Result<bool, SessionError> {
        let key = self.cfg.session_key(id);
        let mut conn = self.pool.get().await?;

        let stored_pid: Option<String> = conn.hget(&key, "pid").await?;
        let owns = !self.use_locking
            || stored_pid.as_deref().is_none_or(str::is_empty)
            || stored_pid.as_deref() == Some(self.our_identity.as_str());

        if !owns {
            if self.has_lock {
                warn!(%id, "another process took the lock, write skipped");
            } else {
                warn!(%id, "unable to acquire lock, write skipped");
            }
            return Ok(true);
        }

        let user_agent = ctx.user_agent_or_empty();
        let lifetime = self.lifetime(user_agent);
        let encoded = codec::encode(
            data,
            self.cfg.compression_threshold,
            self.cfg.compression_library,
        );

        let mut pipe = redis::pipe();
        pipe.cmd("SELECT").arg(self.cfg.database).ignore();
        pipe.hset(&key, "data", encoded).ignore();
        pipe.hset(&key, "lock", 0).ignore();
        pipe.hincr(&key, "writes", 1).ignore();
        pipe.expire(&key, lifetime).ignore();
        pipe.exec_async(&mut conn).await?;

        info!(%id, lifetime, "session committed");
        Ok(true)
    }

    /// Delete session `id`. Always succeeds.
    pub async fn destroy(&self, id: &str) -> Result<bool, SessionError> {
        let key = self.cfg.session_key(id);
        let mut conn = self.pool.get().await?;
        let mut pipe = redis::pipe();
        pipe.cmd("SELECT").arg(self.cfg.database).ignore();
        pipe.unlink(&key).ignore();
        pipe.exec_async(&mut conn).await?;
        Ok(true)
    }

    /// Close the driver connection, if any. Safe to call more than once.
    pub fn close(&self) -> bool {
        info!("closing connection");
        true
    }

    /// No-op success; Redis TTL handles expiry natively.
    pub fn gc(&self, _max_lifetime: i64) -> bool {
        true
    }

    fn lifetime(&mut self, user_agent: &str) -> i64 {
        if let Some(cached) = self.lifetime {
            return cached;
        }
        let computed = crate::lifetime::compute_lifetime(
            self.session_writes,
            user_agent,
            &self.cfg,
            self.bot_override.as_deref(),
        )
        .min(self.cfg.max_lifetime);
        self.lifetime = Some(computed);
        computed
    }
}
