//! PostgreSQL store backed by sqlx
//!
//! Catalog routines live in `_prom_catalog`; data tables live in
//! `prom_data` with columns `(time timestamptz, value double precision,
//! series_id bigint)`. Bulk inserts go through text-format COPY; series
//! resolution sends one pipelined batch of per-key transactions.

use super::{SampleRow, SeriesKey, Store, COPY_COLUMNS, DATA_SCHEMA};
use crate::model::SeriesId;
use crate::{Error, Result};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Either, Executor, PgPool, Row};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::info;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const GET_CREATE_METRIC_TABLE_SQL: &str =
    "SELECT table_name, possibly_new FROM _prom_catalog.get_or_create_metric_table_name($1)";
const GET_SERIES_ID_ROUTINE: &str = "_prom_catalog.get_series_id_for_key_value_array";
const FINALIZE_METRIC_CREATION_SQL: &str = "CALL _prom_catalog.finalize_metric_creation()";

/// PostgreSQL-backed [`Store`].
#[derive(Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to the given DSN.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(dsn)
            .await?;
        info!(max_connections = MAX_CONNECTIONS, "connected to store");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_or_create_metric_table_name(&self, metric: &str) -> Result<(String, bool)> {
        let row = sqlx::query_as::<_, (String, bool)>(GET_CREATE_METRIC_TABLE_SQL)
            .bind(metric)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(Error::MissingMetricTableName)
    }

    async fn resolve_series_ids(
        &self,
        metric: &str,
        keys: &[SeriesKey],
    ) -> Result<Vec<(String, SeriesId)>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        // One BEGIN/routine/COMMIT triple per key, sent as a single
        // pipelined batch: one round trip for the whole flush. The
        // transactions stay per-key, never shared between keys.
        let mut batch = String::with_capacity(keys.len() * 128);
        for key in keys {
            batch.push_str("BEGIN;\n");
            let _ = writeln!(
                batch,
                "SELECT * FROM {}({}, {}, {});",
                GET_SERIES_ID_ROUTINE,
                quote_literal(metric),
                quote_text_array(&key.names),
                quote_text_array(&key.values),
            );
            batch.push_str("COMMIT;\n");
        }

        let mut conn = self.pool.acquire().await?;
        let outcome: Result<Vec<(String, SeriesId)>> = async {
            let mut results = (&mut *conn).fetch_many(batch.as_str());
            let mut resolved = Vec::with_capacity(keys.len());
            while let Some(step) = results.try_next().await? {
                if let Either::Right(row) = step {
                    resolved.push((row.try_get(0)?, SeriesId(row.try_get(1)?)));
                }
            }
            Ok(resolved)
        }
        .await;

        let resolved = match outcome {
            Ok(resolved) => resolved,
            Err(e) => {
                // A failed statement aborts the rest of the batch and can
                // leave its transaction open on the connection.
                let _ = (&mut *conn).execute("ROLLBACK").await;
                return Err(e);
            }
        };
        if resolved.len() != keys.len() {
            return Err(Error::Storage(format!(
                "series pipeline returned {} rows for {} keys",
                resolved.len(),
                keys.len()
            )));
        }
        Ok(resolved)
    }

    async fn copy_samples(&self, table_name: &str, rows: Vec<SampleRow>) -> Result<u64> {
        let columns = COPY_COLUMNS
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "COPY {}.{} ({}) FROM STDIN WITH (FORMAT text)",
            DATA_SCHEMA,
            quote_identifier(table_name),
            columns,
        );

        let mut buf = String::with_capacity(rows.len() * 48);
        for row in &rows {
            let _ = write!(buf, "{}\t", encode_timestamp(row.timestamp_ms)?);
            write_float(&mut buf, row.value);
            let _ = writeln!(buf, "\t{}", row.series_id);
        }

        let mut conn = self.pool.acquire().await?;
        let mut copy = conn.copy_in_raw(&statement).await?;
        copy.send(buf.as_bytes()).await?;
        let written = copy.finish().await?;
        Ok(written)
    }

    async fn finalize_metric_creation(&self) -> Result<()> {
        sqlx::query(FINALIZE_METRIC_CREATION_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Millisecond timestamps become RFC 3339 UTC text; the store's timestamptz
/// input function parses it.
fn encode_timestamp(timestamp_ms: i64) -> Result<String> {
    let ts: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| Error::Storage(format!("timestamp out of range: {timestamp_ms}ms")))?;
    Ok(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Rust prints `NaN`/`inf`; the store wants `NaN`/`Infinity`.
fn write_float(buf: &mut String, value: f64) {
    if value.is_nan() {
        buf.push_str("NaN");
    } else if value == f64::INFINITY {
        buf.push_str("Infinity");
    } else if value == f64::NEG_INFINITY {
        buf.push_str("-Infinity");
    } else {
        let _ = write!(buf, "{value}");
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The pipelined batch goes through the simple-query protocol, which has
/// no bind parameters; values are embedded as quoted literals.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_text_array(items: &[String]) -> String {
    let mut out = String::from("ARRAY[");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote_literal(item));
    }
    out.push_str("]::text[]");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_encode_as_utc_rfc3339() {
        assert_eq!(
            encode_timestamp(1_700_000_000_000).unwrap(),
            "2023-11-14T22:13:20.000Z"
        );
        assert_eq!(encode_timestamp(0).unwrap(), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn non_finite_floats_use_store_spellings() {
        let mut buf = String::new();
        write_float(&mut buf, f64::NAN);
        buf.push(' ');
        write_float(&mut buf, f64::INFINITY);
        buf.push(' ');
        write_float(&mut buf, f64::NEG_INFINITY);
        buf.push(' ');
        write_float(&mut buf, 0.25);
        assert_eq!(buf, "NaN Infinity -Infinity 0.25");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("cpu_usage"), "\"cpu_usage\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn literals_escape_single_quotes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn text_arrays_render_as_typed_array_literals() {
        let items = vec!["__name__".to_string(), "o'brien".to_string()];
        assert_eq!(
            quote_text_array(&items),
            "ARRAY['__name__','o''brien']::text[]"
        );
        assert_eq!(quote_text_array(&[]), "ARRAY[]::text[]");
    }
}
