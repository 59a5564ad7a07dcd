/// Redis wrapper used as the write-side of contact submission storage.
///
/// Construction never fails: a missing URL or a bad client configuration yields a
/// store whose writes report `CommonError::RedisUnavailable`. Callers decide whether
/// that is fatal for the request.
use redis::AsyncCommands;
use tracing::warn;

pub struct RedisStore {
    client: Option<redis::Client>,
}

impl RedisStore {
    /// Attempt to create a client for `url`. If the URL is `None` or invalid,
    /// returns a store that reports itself unavailable.
    pub fn new(url: Option<&str>) -> Self {
        let client = url.and_then(|u| {
            redis::Client::open(u)
                .inspect_err(|e| warn!(error = %e, url = u, "failed to create redis client, store disabled"))
                .ok()
        });
        Self { client }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Test the connection by sending a PING. Returns `true` if Redis is reachable.
    pub async fn is_available(&self) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                result.is_ok()
            }
            Err(_) => false,
        }
    }

    /// Set a value with no expiry.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), crate::error::CommonError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis SET failed"))?;
        Ok(())
    }

    /// Append a value to the tail of a list.
    pub async fn rpush(&self, key: &str, value: &str) -> Result<(), crate::error::CommonError> {
        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(key, value)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis RPUSH failed"))?;
        Ok(())
    }

    async fn connection(
        &self,
    ) -> Result<redis::aio::MultiplexedConnection, crate::error::CommonError> {
        let client = self
            .client
            .as_ref()
            .ok_or(crate::error::CommonError::RedisUnavailable)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))?;
        Ok(conn)
    }
}
