use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use common::models::{ErrorKind, OrderOrigin, OrderSide, OrderType, Signal, TradeRecord};

use crate::StorageError;

pub struct TradeRepository;

impl TradeRepository {
    pub async fn insert(pool: &SqlitePool, record: &TradeRecord) -> Result<i64, StorageError> {
        let signal = match &record.signal {
            Some(signal) => Some(serde_json::to_string(signal)?),
            None => None,
        };

        let mut tx = pool.begin().await?;
        let seq = sqlx::query(
            r#"
                INSERT INTO trades (
                    id, order_id, symbol, side, quantity, order_type, origin, requested_at,
                    accepted, broker_order_id, broker_status, error_kind, error_message,
                    filled_at, attempts, signal, recorded_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.order_id.to_string())
        .bind(&record.symbol)
        .bind(record.side.as_str())
        .bind(record.quantity as i64)
        .bind(record.order_type.as_str())
        .bind(record.origin.as_str())
        .bind(record.requested_at)
        .bind(record.accepted)
        .bind(&record.broker_order_id)
        .bind(&record.broker_status)
        .bind(record.error.map(|k| k.as_str()))
        .bind(&record.error_message)
        .bind(record.filled_at)
        .bind(record.attempts as i64)
        .bind(signal)
        .bind(record.recorded_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        Ok(seq)
    }

    pub async fn fetch_all(pool: &SqlitePool) -> Result<Vec<TradeRecord>, StorageError> {
        let rows = sqlx::query("SELECT * FROM trades ORDER BY seq ASC")
            .fetch_all(pool)
            .await?;

        rows.iter().map(Self::from_row).collect()
    }

    #[cfg(test)]
    pub(crate) async fn count(pool: &SqlitePool) -> Result<i64, StorageError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM trades")
            .fetch_one(pool)
            .await?;
        Ok(n)
    }

    fn from_row(row: &SqliteRow) -> Result<TradeRecord, StorageError> {
        let seq: i64 = row.try_get("seq")?;
        let corrupt = |reason: String| StorageError::Corrupt { seq, reason };

        let id: String = row.try_get("id")?;
        let order_id: String = row.try_get("order_id")?;
        let side: String = row.try_get("side")?;
        let order_type: String = row.try_get("order_type")?;
        let origin: String = row.try_get("origin")?;
        let quantity: i64 = row.try_get("quantity")?;
        let attempts: i64 = row.try_get("attempts")?;
        let error_kind: Option<String> = row.try_get("error_kind")?;
        let signal: Option<String> = row.try_get("signal")?;

        Ok(TradeRecord {
            id: Uuid::parse_str(&id).map_err(|e| corrupt(e.to_string()))?,
            order_id: Uuid::parse_str(&order_id).map_err(|e| corrupt(e.to_string()))?,
            symbol: row.try_get("symbol")?,
            side: side.parse::<OrderSide>().map_err(corrupt)?,
            quantity: u32::try_from(quantity).map_err(|e| corrupt(e.to_string()))?,
            order_type: match order_type.as_str() {
                "market" => OrderType::Market,
                other => return Err(corrupt(format!("unknown order type '{}'", other))),
            },
            origin: origin.parse::<OrderOrigin>().map_err(corrupt)?,
            requested_at: row.try_get::<DateTime<Utc>, _>("requested_at")?,
            accepted: row.try_get("accepted")?,
            broker_order_id: row.try_get("broker_order_id")?,
            broker_status: row.try_get("broker_status")?,
            error: error_kind
                .map(|k| k.parse::<ErrorKind>())
                .transpose()
                .map_err(corrupt)?,
            error_message: row.try_get("error_message")?,
            filled_at: row.try_get::<Option<DateTime<Utc>>, _>("filled_at")?,
            attempts: u32::try_from(attempts).map_err(|e| corrupt(e.to_string()))?,
            signal: signal
                .map(|s| serde_json::from_str::<Signal>(&s))
                .transpose()?,
            recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
        })
    }
}
