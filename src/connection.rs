//! Connection establishment (§4.7): direct connect, or Sentinel master
//! discovery with round-robin retries.

use deadpool_redis::{Config, Pool, Runtime};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Build a pool for `cfg`. If `cfg.sentinel` is set, resolve the master
/// through Sentinel first; otherwise connect directly. Fails with
/// [`SessionError::ConnectionFailed`] if no connection succeeds, preserving
/// the last underlying cause.
pub async fn establish(cfg: &SessionConfig) -> Result<Pool, SessionError> {
    match &cfg.sentinel {
        Some(sentinel) if !sentinel.servers.is_empty() => resolve_via_sentinel(cfg, sentinel).await,
        _ => direct_connect(&cfg.direct_url(), cfg),
    }
}

fn direct_connect(url: &str, cfg: &SessionConfig) -> Result<Pool, SessionError> {
    let pool_cfg = Config::from_url(url);
    pool_cfg
        .builder()
        .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?
        .wait_timeout(Some(cfg.timeout()))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| SessionError::ConnectionFailed(e.to_string()))
}

async fn resolve_via_sentinel(
    cfg: &SessionConfig,
    sentinel: &crate::config::SentinelConfig,
) -> Result<Pool, SessionError> {
    let passes = sentinel.connect_retries + 1;
    let mut last_error: Option<String> = None;

    for pass in 0..passes {
        for endpoint in &sentinel.servers {
            match try_one_sentinel(endpoint, sentinel, cfg).await {
                Ok(pool) => return Ok(pool),
                Err(e) => {
                    warn!(%endpoint, pass, error = %e, "sentinel endpoint failed");
                    last_error = Some(e);
                }
            }
        }
    }

    Err(SessionError::ConnectionFailed(last_error.unwrap_or_else(
        || "no sentinel endpoint reachable".to_owned(),
    )))
}

async fn try_one_sentinel(
    endpoint: &str,
    sentinel: &crate::config::SentinelConfig,
    cfg: &SessionConfig,
) -> Result<Pool, String> {
    let sentinel_url = format!("redis://{endpoint}");
    let client = redis::Client::open(sentinel_url).map_err(|e| e.to_string())?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| e.to_string())?;

    if let Some(password) = &sentinel.password {
        authenticate(&mut conn, password).await?;
    }

    let reply: Vec<String> = redis::cmd("SENTINEL")
        .arg("get-master-addr-by-name")
        .arg(&sentinel.master)
        .query_async(&mut conn)
        .await
        .map_err(|e| e.to_string())?;

    let [master_host, master_port] = reply.as_slice() else {
        return Err(format!("sentinel {endpoint} knows no master for {}", sentinel.master));
    };

    let master_url = format!("redis://{master_host}:{master_port}");
    let pool = direct_connect(&master_url, cfg).map_err(|e| e.to_string())?;

    if sentinel.verify_master {
        verify_role(&pool).await?;
    }

    info!(%master_host, %master_port, "resolved sentinel master");
    Ok(pool)
}

async fn authenticate(
    conn: &mut redis::aio::MultiplexedConnection,
    password: &str,
) -> Result<(), String> {
    match redis::cmd("AUTH")
        .arg(password)
        .query_async::<()>(conn)
        .await
    {
        Ok(()) => Ok(()),
        Err(e) => {
            // Tolerate the two known "no password set" error shapes.
            let msg = e.to_string();
            if msg.contains("no password is set") || msg.contains("ERR Client sent AUTH") {
                Ok(())
            } else {
                Err(msg)
            }
        }
    }
}

/// Verify a resolved master's `ROLE` is indeed `master`, with one 100 ms
/// retry to tolerate a just-promoted replica that hasn't updated yet.
async fn verify_role(pool: &Pool) -> Result<(), String> {
    for attempt in 0..2 {
        let mut conn = pool.get().await.map_err(|e| e.to_string())?;
        let reply: Vec<redis::Value> = conn.role().await.map_err(|e| e.to_string())?;
        if let Some(redis::Value::BulkString(role)) = reply.first()
            && role == b"master"
        {
            return Ok(());
        }
        if attempt == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
    Err("resolved address did not report ROLE master".to_owned())
}

trait RoleCommand {
    async fn role(&mut self) -> redis::RedisResult<Vec<redis::Value>>;
}

impl RoleCommand for deadpool_redis::Connection {
    async fn role(&mut self) -> redis::RedisResult<Vec<redis::Value>> {
        redis::cmd("ROLE").query_async(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_connect_builds_pool_from_valid_url() {
        let cfg = SessionConfig::default();
        let pool = direct_connect(&cfg.direct_url(), &cfg);
        assert!(pool.is_ok());
    }
}
