use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use orcabot_core::domain::lead::{Lead, LeadId, LeadStatus};

use super::{LeadRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, phone, name, status, awaiting_quote_confirmation, created_at
             FROM lead
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(lead_from_row).transpose()
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, phone, name, status, awaiting_quote_confirmation, created_at
             FROM lead
             WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(lead_from_row).transpose()
    }

    async fn save(&self, lead: Lead) -> Result<(), RepositoryError> {
        // Names follow first-write-wins: an upsert never blanks or replaces a
        // stored name with a later webhook's push name.
        sqlx::query(
            "INSERT INTO lead (id, phone, name, status, awaiting_quote_confirmation, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                phone = excluded.phone,
                name = COALESCE(lead.name, excluded.name),
                status = excluded.status,
                awaiting_quote_confirmation = excluded.awaiting_quote_confirmation",
        )
        .bind(&lead.id.0)
        .bind(&lead.phone)
        .bind(lead.name.as_deref())
        .bind(lead.status.as_str())
        .bind(i64::from(lead.awaiting_quote_confirmation))
        .bind(lead.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn lead_from_row(row: SqliteRow) -> Result<Lead, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = LeadStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown lead status `{status_raw}`")))?;

    Ok(Lead {
        id: LeadId(row.try_get("id")?),
        phone: row.try_get("phone")?,
        name: row.try_get("name")?,
        status,
        awaiting_quote_confirmation: row.try_get::<i64, _>("awaiting_quote_confirmation")? != 0,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use orcabot_core::domain::lead::{Lead, LeadId, LeadStatus};

    use super::SqlLeadRepository;
    use crate::migrations;
    use crate::repositories::LeadRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_lead_repo_round_trips_by_id_and_phone() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());

        let lead = sample_lead("lead-1", "5511999990000", Some("Marcos"));
        repo.save(lead.clone()).await.expect("save lead");

        let by_id = repo.find_by_id(&lead.id).await.expect("find by id");
        assert_eq!(by_id, Some(lead.clone()));

        let by_phone = repo.find_by_phone("5511999990000").await.expect("find by phone");
        assert_eq!(by_phone, Some(lead));

        let missing = repo.find_by_phone("5500000000000").await.expect("find missing");
        assert_eq!(missing, None);

        pool.close().await;
    }

    #[tokio::test]
    async fn upsert_never_overwrites_a_stored_name() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());

        repo.save(sample_lead("lead-1", "5511999990000", Some("Marcos")))
            .await
            .expect("initial save");

        let mut renamed = sample_lead("lead-1", "5511999990000", Some("Outro Nome"));
        renamed.status = LeadStatus::Quoted;
        renamed.awaiting_quote_confirmation = true;
        repo.save(renamed).await.expect("second save");

        let found = repo
            .find_by_id(&LeadId("lead-1".to_string()))
            .await
            .expect("find lead")
            .expect("lead exists");

        assert_eq!(found.name.as_deref(), Some("Marcos"));
        assert_eq!(found.status, LeadStatus::Quoted);
        assert!(found.awaiting_quote_confirmation);

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_name_is_backfilled_by_later_save() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());

        repo.save(sample_lead("lead-1", "5511999990000", None)).await.expect("initial save");
        repo.save(sample_lead("lead-1", "5511999990000", Some("Marcos")))
            .await
            .expect("second save");

        let found = repo
            .find_by_id(&LeadId("lead-1".to_string()))
            .await
            .expect("find lead")
            .expect("lead exists");
        assert_eq!(found.name.as_deref(), Some("Marcos"));

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_lead(id: &str, phone: &str, name: Option<&str>) -> Lead {
        Lead {
            id: LeadId(id.to_string()),
            phone: phone.to_string(),
            name: name.map(str::to_string),
            status: LeadStatus::New,
            awaiting_quote_confirmation: false,
            created_at: parse_ts("2026-02-23T12:00:00Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
