//! Redis Streams consumer-group client backing the durable parse queue:
//! a producer side (`enqueue`, string-encoded metadata) and a
//! consumer-group side (group bootstrap, `XREADGROUP`, `XACK`,
//! `XPENDING`) built on the `ConnectionManager` + `AsyncCommands` idiom.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed stream entry: missing field `{0}`")]
    MissingField(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// The value `'$'` means "only new entries from here on"; group creation
/// uses `'0'` so every message ever written is eligible for replay by a
/// freshly created consumer group, matching the worker's `redis_client.py`.
const GROUP_START_ID: &str = "0";

/// Stream name producers (the API) and consumers (parse workers) agree on.
pub const FILE_PARSING_STREAM: &str = "file_parsing_queue";
/// Consumer group every parse worker joins, so work fans out across
/// workers instead of being delivered to each of them.
pub const PARSE_CONSUMER_GROUP: &str = "parse-workers";

#[derive(Clone)]
pub struct QueueClient {
    conn: ConnectionManager,
}

impl QueueClient {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    /// Idempotent consumer-group bootstrap. `BUSYGROUP` (group already
    /// exists) is not an error here — every worker calls this on startup.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let result: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg(GROUP_START_ID)
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enqueues a unit of parse work. Every metadata value is flattened to
    /// a string before `XADD` — Redis stream fields are text, so booleans
    /// become `"true"`/`"false"`, numbers go through `to_string()`, and a
    /// JSON `null` becomes the empty string, mirroring the producer's
    /// encoding in `redis_client.py`.
    pub async fn enqueue(
        &self,
        stream: &str,
        file_id: &str,
        metadata: Option<&HashMap<String, Value>>,
    ) -> Result<String> {
        let mut fields: Vec<(String, String)> = vec![("file_id".to_string(), file_id.to_string())];
        if let Some(meta) = metadata {
            for (k, v) in meta {
                fields.push((k.clone(), encode_field(v)));
            }
        }

        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", &fields).await?;
        Ok(id)
    }

    /// Reads up to `count` new entries for `consumer` in `group`, blocking
    /// up to `block_ms` if the stream is currently empty. Returns
    /// `(message_id, fields)` pairs.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, HashMap<String, String>)>> {
        self.read_group_from(stream, group, consumer, count, Some(block_ms), ">").await
    }

    /// Reclaims `consumer`'s own still-pending (delivered, unacked) entries
    /// without waiting for new ones — the redelivery half of PEL semantics.
    /// A worker restarted under the same consumer name calls this before
    /// entering its normal `read_group` loop so a message in flight when
    /// the previous process died gets processed exactly once more, per
    /// spec §5/§8 scenario S3. Reading history never blocks, so this
    /// passes no `BLOCK` argument.
    pub async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<(String, HashMap<String, String>)>> {
        self.read_group_from(stream, group, consumer, count, None, "0").await
    }

    async fn read_group_from(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: Option<u64>,
        start_id: &str,
    ) -> Result<Vec<(String, HashMap<String, String>)>> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(count);
        if let Some(block_ms) = block_ms {
            cmd.arg("BLOCK").arg(block_ms);
        }
        let reply: redis::streams::StreamReadReply =
            cmd.arg("STREAMS").arg(stream).arg(start_id).query_async(&mut conn).await?;

        let mut out = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let mut fields = HashMap::new();
                for (field, value) in entry.map {
                    if let Ok(s) = redis::from_redis_value::<String>(&value) {
                        fields.insert(field, s);
                    }
                }
                out.push((entry.id, fields));
            }
        }
        Ok(out)
    }

    pub async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[id]).await?;
        Ok(())
    }

    /// Count of entries delivered but not yet acked (the group's PEL size).
    pub async fn pending(&self, stream: &str, group: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamPendingReply =
            conn.xpending(stream, group).await?;
        Ok(match reply {
            redis::streams::StreamPendingReply::Empty => 0,
            redis::streams::StreamPendingReply::Data(data) => data.count as u64,
        })
    }

    pub async fn length(&self, stream: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(stream).await?;
        Ok(len)
    }

    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

fn encode_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalar_metadata_fields() {
        assert_eq!(encode_field(&Value::Null), "");
        assert_eq!(encode_field(&Value::Bool(true)), "true");
        assert_eq!(encode_field(&Value::from(42)), "42");
        assert_eq!(encode_field(&Value::String("xlsx".into())), "xlsx");
    }
}
