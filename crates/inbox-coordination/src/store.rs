use anyhow::Result;
use redis::AsyncCommands;
use tokio::sync::Mutex;

/// Thin wrapper over a Redis connection providing the coordination
/// primitives the backend needs across instances: ephemeral session
/// blobs, the idempotency fast-path guard, and a pub/sub mirror for the
/// event bus. Conversation-accept exclusivity does not use this store —
/// see DESIGN.md's "Accept protocol: DB-only" entry for why.
pub struct CoordinationStore {
    namespace: String,
    connection: Mutex<redis::aio::ConnectionManager>,
    client: redis::Client,
}

impl CoordinationStore {
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            namespace: namespace.into(),
            connection: Mutex::new(manager),
            client,
        })
    }

    fn session_key(&self, key: &str) -> String {
        format!("{}:session:{}", self.namespace, key)
    }

    pub(crate) fn channel_name(&self, room: &str) -> String {
        format!("{}:room:{}", self.namespace, room)
    }

    pub async fn put_session(&self, key: &str, payload: &str, ttl_secs: usize) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.set_ex::<_, _, ()>(self.session_key(key), payload, ttl_secs as u64)
            .await?;
        Ok(())
    }

    pub async fn get_session(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.lock().await;
        Ok(conn.get(self.session_key(key)).await?)
    }

    pub async fn delete_session(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.del::<_, ()>(self.session_key(key)).await?;
        Ok(())
    }

    /// Fast-path idempotency guard used at webhook ingest time, ahead of
    /// the Persistence layer's own unique-constraint check: `SET NX`
    /// returning `false` means this `providerMessageId` was already seen.
    pub async fn claim_idempotency_key(&self, key: &str, ttl_secs: usize) -> Result<bool> {
        let full_key = format!("{}:idem:{}", self.namespace, key);
        let mut conn = self.connection.lock().await;
        let result: Option<String> = redis::cmd("SET")
            .arg(&full_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut *conn)
            .await?;
        Ok(result.is_some())
    }

    pub async fn publish(&self, room: &str, payload: &str) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.publish::<_, _, ()>(self.channel_name(room), payload).await?;
        Ok(())
    }

    pub fn client(&self) -> redis::Client {
        self.client.clone()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}
