use sqlx::{sqlite::SqliteRow, Row};

use orcabot_core::domain::lead::LeadId;
use orcabot_core::domain::message::{Message, MessageId, MessageRole};

use super::{lead::parse_timestamp, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn append(&self, message: Message) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO message (id, lead_id, role, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.lead_id.0)
        .bind(message.role.as_str())
        .bind(&message.text)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(
        &self,
        lead_id: &LeadId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        // rowid breaks ties for turns recorded within the same millisecond.
        let rows = sqlx::query(
            "SELECT id, lead_id, role, body, created_at
             FROM message
             WHERE lead_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(&lead_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut messages =
            rows.into_iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

fn message_from_row(row: SqliteRow) -> Result<Message, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = MessageRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role_raw}`")))?;

    Ok(Message {
        id: MessageId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        role,
        text: row.try_get("body")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use orcabot_core::domain::lead::{Lead, LeadId, LeadStatus};
    use orcabot_core::domain::message::{Message, MessageId, MessageRole};

    use super::SqlMessageRepository;
    use crate::migrations;
    use crate::repositories::{LeadRepository, MessageRepository, SqlLeadRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn list_recent_returns_latest_turns_oldest_first() {
        let pool = setup_pool().await;
        let lead_id = insert_lead(&pool).await;
        let repo = SqlMessageRepository::new(pool.clone());

        let base = parse_ts("2026-02-23T12:00:00Z");
        for index in 0..5 {
            repo.append(Message {
                id: MessageId(format!("msg-{index}")),
                lead_id: lead_id.clone(),
                role: if index % 2 == 0 { MessageRole::Customer } else { MessageRole::Assistant },
                text: format!("turn {index}"),
                created_at: base + Duration::seconds(index),
            })
            .await
            .expect("append message");
        }

        let recent = repo.list_recent(&lead_id, 3).await.expect("list recent");
        let texts: Vec<&str> = recent.iter().map(|message| message.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 2", "turn 3", "turn 4"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn same_timestamp_turns_keep_insertion_order() {
        let pool = setup_pool().await;
        let lead_id = insert_lead(&pool).await;
        let repo = SqlMessageRepository::new(pool.clone());

        let at = parse_ts("2026-02-23T12:00:00Z");
        for index in 0..3 {
            repo.append(Message {
                id: MessageId(format!("msg-{index}")),
                lead_id: lead_id.clone(),
                role: MessageRole::Customer,
                text: format!("turn {index}"),
                created_at: at,
            })
            .await
            .expect("append message");
        }

        let recent = repo.list_recent(&lead_id, 10).await.expect("list recent");
        let texts: Vec<&str> = recent.iter().map(|message| message.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 0", "turn 1", "turn 2"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn tool_notes_round_trip_with_their_role() {
        let pool = setup_pool().await;
        let lead_id = insert_lead(&pool).await;
        let repo = SqlMessageRepository::new(pool.clone());

        repo.append(Message {
            id: MessageId("msg-note".to_string()),
            lead_id: lead_id.clone(),
            role: MessageRole::ToolNote,
            text: "[orçamento ORC-20260223-ABC123 enviado]".to_string(),
            created_at: parse_ts("2026-02-23T12:00:00Z"),
        })
        .await
        .expect("append note");

        let recent = repo.list_recent(&lead_id, 10).await.expect("list recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].role, MessageRole::ToolNote);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_lead(pool: &DbPool) -> LeadId {
        let lead_id = LeadId("lead-1".to_string());
        SqlLeadRepository::new(pool.clone())
            .save(Lead {
                id: lead_id.clone(),
                phone: "5511999990000".to_string(),
                name: None,
                status: LeadStatus::New,
                awaiting_quote_confirmation: false,
                created_at: parse_ts("2026-02-23T11:00:00Z"),
            })
            .await
            .expect("insert lead");
        lead_id
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
