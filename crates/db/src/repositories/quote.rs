use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use orcabot_core::domain::lead::LeadId;
use orcabot_core::domain::quote::{Quote, QuoteId, QuoteLineItem};

use super::{lead::parse_timestamp, QuoteRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, lead_id, items_json, total, issued_at, valid_until, document_url, notes
             FROM quote
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(quote_from_row).transpose()
    }

    async fn find_latest_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<Quote>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, lead_id, items_json, total, issued_at, valid_until, document_url, notes
             FROM quote
             WHERE lead_id = ?
             ORDER BY issued_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(&lead_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(quote_from_row).transpose()
    }

    async fn save(&self, quote: Quote) -> Result<(), RepositoryError> {
        let items_json = serde_json::to_string(&quote.items)
            .map_err(|error| RepositoryError::Decode(format!("encode quote items: {error}")))?;

        sqlx::query(
            "INSERT INTO quote (
                id, lead_id, items_json, total, issued_at, valid_until, document_url, notes
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                items_json = excluded.items_json,
                total = excluded.total,
                valid_until = excluded.valid_until,
                document_url = excluded.document_url,
                notes = excluded.notes",
        )
        .bind(&quote.id.0)
        .bind(&quote.lead_id.0)
        .bind(items_json)
        .bind(quote.total.to_string())
        .bind(quote.issued_at.to_rfc3339())
        .bind(quote.valid_until.to_rfc3339())
        .bind(quote.document_url.as_deref())
        .bind(quote.notes.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn quote_from_row(row: SqliteRow) -> Result<Quote, RepositoryError> {
    let items_json = row.try_get::<String, _>("items_json")?;
    let items: Vec<QuoteLineItem> = serde_json::from_str(&items_json)
        .map_err(|error| RepositoryError::Decode(format!("decode quote items: {error}")))?;

    let total_raw = row.try_get::<String, _>("total")?;
    let total = Decimal::from_str(&total_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid total `{total_raw}`: {error}")))?;

    Ok(Quote {
        id: QuoteId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        items,
        total,
        issued_at: parse_timestamp("issued_at", row.try_get("issued_at")?)?,
        valid_until: parse_timestamp("valid_until", row.try_get("valid_until")?)?,
        document_url: row.try_get("document_url")?,
        notes: row.try_get("notes")?,
    })
}
