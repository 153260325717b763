use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};

use crate::error::ScrapeError;

/// A message popped from the durable stream, carrying the id needed to ack it.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub payload: String,
}

/// Durable fan-out with consumer groups: `XADD`/`XREADGROUP`/`XACK`. Backs the task dispatcher's
/// `stream:parsing_tasks` stream. Unlike `Cache`, there is no in-memory fallback for this trait —
/// losing the stream means losing at-least-once delivery across replicas, which the dispatcher
/// is not willing to silently degrade.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), ScrapeError>;

    /// Appends `payload`, trimming the stream to approximately `maxlen` entries.
    async fn xadd(&self, stream: &str, payload: &str, maxlen: usize) -> Result<String, ScrapeError>;

    /// Claims up to `count` unseen messages for `consumer` in `group`, blocking up to
    /// `block_ms` if none are immediately available.
    async fn xreadgroup(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamMessage>, ScrapeError>;

    async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<(), ScrapeError>;
}

#[derive(Clone)]
pub struct RedisStreamBroker {
    conn: ConnectionManager,
}

impl RedisStreamBroker {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl StreamBroker for RedisStreamBroker {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), ScrapeError> {
        let mut conn = self.conn.clone();
        let res: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match res {
            Ok(()) => Ok(()),
            // BUSYGROUP: the group already exists, which is the common case after restart.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(ScrapeError::from(e)),
        }
    }

    async fn xadd(&self, stream: &str, payload: &str, maxlen: usize) -> Result<String, ScrapeError> {
        let mut conn = self.conn.clone();
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(maxlen)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(ScrapeError::from)?;
        Ok(id)
    }

    async fn xreadgroup(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamMessage>, ScrapeError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms);
        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[">"], &opts)
            .await
            .map_err(ScrapeError::from)?;

        let mut out = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                if let Some(redis::Value::BulkString(bytes)) = id.map.get("payload") {
                    out.push(StreamMessage {
                        id: id.id.clone(),
                        payload: String::from_utf8_lossy(bytes).into_owned(),
                    });
                }
            }
        }
        Ok(out)
    }

    async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<(), ScrapeError> {
        let mut conn = self.conn.clone();
        conn.xack::<_, _, _, ()>(stream, group, &[id])
            .await
            .map_err(ScrapeError::from)
    }
}
