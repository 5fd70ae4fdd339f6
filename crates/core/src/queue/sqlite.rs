//! SQLite-backed queue transport.
//!
//! Visibility leases are modeled with a `visible_at` column: a message is
//! deliverable when `visible_at <= now`. Leasing pushes `visible_at` into
//! the future and rotates the receipt token, so a consumer whose lease
//! lapsed can no longer delete or extend the redelivered message.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::traits::QueueTransport;
use super::types::{DeadLetter, QueueError, QueueMessage, ReceiptToken};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS queue_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        queue TEXT NOT NULL,
        body BLOB NOT NULL,
        enqueued_at TEXT NOT NULL,
        visible_at TEXT NOT NULL,
        dequeue_count INTEGER NOT NULL DEFAULT 0,
        receipt TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_queue_messages_queue_visible
        ON queue_messages(queue, visible_at);

    CREATE TABLE IF NOT EXISTS dead_letters (
        id INTEGER PRIMARY KEY,
        queue TEXT NOT NULL,
        body BLOB NOT NULL,
        enqueued_at TEXT NOT NULL,
        dequeue_count INTEGER NOT NULL,
        reason TEXT NOT NULL,
        dead_lettered_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_dead_letters_queue ON dead_letters(queue);
"#;

/// SQLite-backed queue transport.
pub struct SqliteQueue {
    conn: Mutex<Connection>,
}

impl SqliteQueue {
    /// Open or create the queue database at `path`.
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(|e| QueueError::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory queue (useful for testing)
    pub fn in_memory() -> Result<Self, QueueError> {
        let conn =
            Connection::open_in_memory().map_err(|e| QueueError::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, QueueError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Look up a message by id and verify the caller still holds its lease.
    fn check_receipt(
        conn: &Connection,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
    ) -> Result<(), QueueError> {
        let stored: Option<Option<String>> = conn
            .query_row(
                "SELECT receipt FROM queue_messages WHERE id = ? AND queue = ?",
                params![id, queue],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        match stored {
            None => Err(QueueError::NotFound(id)),
            Some(stored) if stored.as_deref() == Some(receipt.as_str()) => Ok(()),
            Some(_) => Err(QueueError::ReceiptMismatch(id)),
        }
    }
}

#[async_trait]
impl QueueTransport for SqliteQueue {
    async fn send(&self, queue: &str, body: &[u8]) -> Result<i64, QueueError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO queue_messages (queue, body, enqueued_at, visible_at, dequeue_count)
             VALUES (?, ?, ?, ?, 0)",
            params![queue, body, now, now],
        )
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    async fn receive(
        &self,
        queue: &str,
        max: usize,
        lease: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        let now = Utc::now();
        let visible_until = now + chrono::Duration::from_std(lease).unwrap_or_default();

        let candidates: Vec<(i64, Vec<u8>, String, u32)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, body, enqueued_at, dequeue_count FROM queue_messages
                     WHERE queue = ? AND visible_at <= ?
                     ORDER BY id LIMIT ?",
                )
                .map_err(|e| QueueError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(params![queue, now.to_rfc3339(), max as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .map_err(|e| QueueError::Storage(e.to_string()))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| QueueError::Storage(e.to_string()))?
        };

        let mut messages = Vec::with_capacity(candidates.len());
        for (id, body, enqueued_at_str, dequeue_count) in candidates {
            let receipt = ReceiptToken::generate();
            tx.execute(
                "UPDATE queue_messages
                 SET visible_at = ?, dequeue_count = dequeue_count + 1, receipt = ?
                 WHERE id = ?",
                params![visible_until.to_rfc3339(), receipt.as_str(), id],
            )
            .map_err(|e| QueueError::Storage(e.to_string()))?;

            let enqueued_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&enqueued_at_str)
                .map_err(|e| QueueError::Storage(format!("Invalid timestamp: {}", e)))?
                .into();

            messages.push(QueueMessage {
                id,
                receipt,
                dequeue_count: dequeue_count + 1,
                body,
                enqueued_at,
            });
        }

        tx.commit().map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(messages)
    }

    async fn delete(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
    ) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap();
        Self::check_receipt(&conn, queue, id, receipt)?;

        conn.execute(
            "DELETE FROM queue_messages WHERE id = ? AND queue = ?",
            params![id, queue],
        )
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn extend(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
        lease: Duration,
    ) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap();
        Self::check_receipt(&conn, queue, id, receipt)?;

        let visible_until =
            Utc::now() + chrono::Duration::from_std(lease).unwrap_or_default();
        conn.execute(
            "UPDATE queue_messages SET visible_at = ? WHERE id = ?",
            params![visible_until.to_rfc3339(), id],
        )
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn abandon(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
    ) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap();
        Self::check_receipt(&conn, queue, id, receipt)?;

        // Clear the receipt so a stale holder cannot race the next delivery.
        conn.execute(
            "UPDATE queue_messages SET visible_at = ?, receipt = NULL WHERE id = ?",
            params![Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
        reason: &str,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn.lock().unwrap();
        Self::check_receipt(&conn, queue, id, receipt)?;

        let tx = conn
            .transaction()
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO dead_letters (id, queue, body, enqueued_at, dequeue_count, reason, dead_lettered_at)
             SELECT id, queue, body, enqueued_at, dequeue_count, ?, ?
             FROM queue_messages WHERE id = ?",
            params![reason, Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| QueueError::Storage(e.to_string()))?;

        tx.execute("DELETE FROM queue_messages WHERE id = ?", params![id])
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        tx.commit().map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM queue_messages WHERE queue = ?",
                params![queue],
                |row| row.get(0),
            )
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(count as u64)
    }

    async fn dead_letters(
        &self,
        queue: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DeadLetter>, QueueError> {
        let conn = self.conn.lock().unwrap();

        let (sql, params_vec): (&str, Vec<Box<dyn rusqlite::ToSql>>) = match queue {
            Some(q) => (
                "SELECT id, queue, body, enqueued_at, dequeue_count, reason, dead_lettered_at
                 FROM dead_letters WHERE queue = ? ORDER BY dead_lettered_at DESC LIMIT ?",
                vec![Box::new(q.to_string()), Box::new(limit as i64)],
            ),
            None => (
                "SELECT id, queue, body, enqueued_at, dequeue_count, reason, dead_lettered_at
                 FROM dead_letters ORDER BY dead_lettered_at DESC LIMIT ?",
                vec![Box::new(limit as i64)],
            ),
        };

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let id: i64 = row.get(0)?;
                let queue: String = row.get(1)?;
                let body: Vec<u8> = row.get(2)?;
                let enqueued_at: String = row.get(3)?;
                let dequeue_count: u32 = row.get(4)?;
                let reason: String = row.get(5)?;
                let dead_lettered_at: String = row.get(6)?;
                Ok((id, queue, body, enqueued_at, dequeue_count, reason, dead_lettered_at))
            })
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        let mut letters = Vec::new();
        for row in rows {
            let (id, queue, body, enqueued_at, dequeue_count, reason, dead_lettered_at) =
                row.map_err(|e| QueueError::Storage(e.to_string()))?;

            let parse = |s: &str| -> Result<DateTime<Utc>, QueueError> {
                Ok(DateTime::parse_from_rfc3339(s)
                    .map_err(|e| QueueError::Storage(format!("Invalid timestamp: {}", e)))?
                    .into())
            };

            letters.push(DeadLetter {
                id,
                queue,
                body: String::from_utf8_lossy(&body).into_owned(),
                enqueued_at: parse(&enqueued_at)?,
                dequeue_count,
                reason,
                dead_lettered_at: parse(&dead_lettered_at)?,
            });
        }

        Ok(letters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> SqliteQueue {
        SqliteQueue::in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let q = queue();
        let id = q.send("collect", b"hello").await.unwrap();
        assert!(id > 0);

        let messages = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].body, b"hello");
        assert_eq!(messages[0].dequeue_count, 1);
    }

    #[tokio::test]
    async fn test_leased_message_is_invisible() {
        let q = queue();
        q.send("collect", b"one").await.unwrap();

        let first = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Still leased, second receive sees nothing
        let second = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_expired_lease_redelivers_with_higher_count() {
        let q = queue();
        q.send("collect", b"one").await.unwrap();

        let first = q
            .receive("collect", 10, Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(first[0].dequeue_count, 1);

        // Zero-length lease has already lapsed
        let second = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].dequeue_count, 2);
        assert_ne!(first[0].receipt, second[0].receipt);
    }

    #[tokio::test]
    async fn test_delete_requires_current_receipt() {
        let q = queue();
        q.send("collect", b"one").await.unwrap();

        let first = q
            .receive("collect", 10, Duration::from_secs(0))
            .await
            .unwrap();
        let second = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();

        // Stale receipt from the lapsed lease must be rejected
        let result = q.delete("collect", first[0].id, &first[0].receipt).await;
        assert!(matches!(result, Err(QueueError::ReceiptMismatch(_))));

        // Current receipt works
        q.delete("collect", second[0].id, &second[0].receipt)
            .await
            .unwrap();
        assert_eq!(q.depth("collect").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_message() {
        let q = queue();
        let result = q
            .delete("collect", 999, &ReceiptToken::generate())
            .await;
        assert!(matches!(result, Err(QueueError::NotFound(999))));
    }

    #[tokio::test]
    async fn test_abandon_makes_message_visible_again() {
        let q = queue();
        q.send("collect", b"one").await.unwrap();

        let leased = q
            .receive("collect", 10, Duration::from_secs(300))
            .await
            .unwrap();
        q.abandon("collect", leased[0].id, &leased[0].receipt)
            .await
            .unwrap();

        let again = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].dequeue_count, 2);
    }

    #[tokio::test]
    async fn test_extend_pushes_visibility_out() {
        let q = queue();
        q.send("collect", b"one").await.unwrap();

        let leased = q
            .receive("collect", 10, Duration::from_secs(0))
            .await
            .unwrap();

        // Receipt is still current (nothing re-leased it yet), so extend
        // hides the message again.
        q.extend(
            "collect",
            leased[0].id,
            &leased[0].receipt,
            Duration::from_secs(300),
        )
        .await
        .unwrap();

        let visible = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn test_dead_letter_moves_message_aside() {
        let q = queue();
        q.send("collect", b"broken payload").await.unwrap();

        let leased = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();
        q.dead_letter("collect", leased[0].id, &leased[0].receipt, "poison")
            .await
            .unwrap();

        assert_eq!(q.depth("collect").await.unwrap(), 0);

        let letters = q.dead_letters(Some("collect"), 10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, "poison");
        assert_eq!(letters[0].body, "broken payload");
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let q = queue();
        q.send("collect", b"a").await.unwrap();
        q.send("process", b"b").await.unwrap();

        let messages = q
            .receive("process", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, b"b");
        assert_eq!(q.depth("collect").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_receive_respects_batch_limit() {
        let q = queue();
        for i in 0..5 {
            q.send("collect", format!("m{}", i).as_bytes()).await.unwrap();
        }

        let batch = q
            .receive("collect", 3, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(batch.len(), 3);

        let rest = q
            .receive("collect", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn test_depth_counts_leased_messages() {
        let q = queue();
        q.send("collect", b"a").await.unwrap();
        q.send("collect", b"b").await.unwrap();

        q.receive("collect", 1, Duration::from_secs(60))
            .await
            .unwrap();

        // One leased, one visible, both still in the queue
        assert_eq!(q.depth("collect").await.unwrap(), 2);
    }
}
