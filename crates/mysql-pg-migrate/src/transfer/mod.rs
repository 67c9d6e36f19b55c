//! Per-table data transfer.
//!
//! Rows are paged out of MySQL, by primary-key keyset when the table has a
//! primary key and by `LIMIT/OFFSET` otherwise. Each page is cut into chunks
//! of `batch_insert_size` rows and every chunk is loaded in its own target
//! transaction, so a chunk is either fully committed or not at all.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::core::identifier::quote_pg;
use crate::core::{ColumnDescriptor, Inconsistency, PkValue, Row, SourceCatalog, TargetExecutor};
use crate::dialect::TranslateOptions;
use crate::error::{MigrateError, Result};
use crate::progress::{NoProgress, RowProgress};

/// Transfer settings taken from `conversion.options` and `conversion.limits`.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per source page.
    pub max_rows_per_batch: usize,
    /// Rows per target load and transaction.
    pub batch_insert_size: usize,
    pub truncate_before_sync: bool,
    pub validate_data: bool,
    pub translate: TranslateOptions,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_rows_per_batch: 1000,
            batch_insert_size: 10_000,
            truncate_before_sync: false,
            validate_data: false,
            translate: TranslateOptions::default(),
        }
    }
}

/// How a table is paged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// `WHERE pk > last ORDER BY pk LIMIT n`; `index` is the key's position
    /// in the column list.
    Keyset { pk: String, index: usize },
    Offset,
}

/// Outcome of one table's transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    pub table: String,
    pub source_rows: i64,
    pub rows: u64,
    pub fetches: usize,
    pub loads: usize,
    /// The table had no rows and was skipped.
    pub empty: bool,
    /// Set when validation found a count mismatch.
    pub inconsistency: Option<Inconsistency>,
    pub elapsed: Duration,
}

/// Moves rows of one table at a time from source to target.
pub struct TransferEngine {
    source: Arc<dyn SourceCatalog>,
    target: Arc<dyn TargetExecutor>,
    config: TransferConfig,
    progress: Arc<dyn RowProgress>,
}

impl TransferEngine {
    pub fn new(
        source: Arc<dyn SourceCatalog>,
        target: Arc<dyn TargetExecutor>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
            progress: Arc::new(NoProgress),
        }
    }

    /// Report row progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn RowProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Copy every row of `table`, then optionally compare row counts.
    ///
    /// Any failure aborts this table only; chunks committed before the
    /// failure stay in the target.
    pub async fn execute(&self, table: &str) -> Result<TransferStats> {
        let start = Instant::now();
        let mut stats = TransferStats {
            table: table.to_string(),
            ..Default::default()
        };

        let columns = self.source.columns(table).await?;
        stats.source_rows = self.source.row_count(table).await?;
        if stats.source_rows == 0 {
            info!("{}: no rows, skipping", table);
            stats.empty = true;
            return Ok(stats);
        }

        if self.config.truncate_before_sync {
            self.truncate(table).await?;
        }

        let target_columns: Vec<String> = columns
            .iter()
            .map(|c| self.config.translate.column_name(&c.name))
            .collect();
        let pagination = self.pagination(table, &columns).await;
        let target_pk = match &pagination {
            Pagination::Keyset { pk, .. } => Some(self.config.translate.column_name(pk)),
            Pagination::Offset => None,
        };

        info!(
            "{}: transferring {} rows ({})",
            table,
            stats.source_rows,
            match &pagination {
                Pagination::Keyset { pk, .. } => format!("keyset on {}", pk),
                Pagination::Offset => "offset".to_string(),
            }
        );

        let page_size = self.config.max_rows_per_batch.max(1);
        let chunk_size = self.config.batch_insert_size.max(1);
        let total = stats.source_rows.max(0) as u64;
        let mut last: Option<PkValue> = None;
        let mut offset: u64 = 0;

        loop {
            let page = match &pagination {
                Pagination::Keyset { pk, .. } => {
                    self.source
                        .stream_by_keyset(table, &columns, pk, last.as_ref(), page_size)
                        .await?
                }
                Pagination::Offset => {
                    self.source
                        .stream_by_offset(table, &columns, offset, page_size)
                        .await?
                }
            };
            stats.fetches += 1;
            if page.is_empty() {
                break;
            }

            for chunk in page.chunks(chunk_size) {
                stats.rows += self
                    .load_chunk(table, &target_columns, chunk, target_pk.as_deref())
                    .await?;
                stats.loads += 1;
            }

            if let Pagination::Keyset { pk, index } = &pagination {
                let next = page
                    .last()
                    .and_then(|row| row.get(*index))
                    .and_then(PkValue::from_value);
                if next.is_none() || next == last {
                    return Err(MigrateError::load(
                        table,
                        format!("primary key {} did not advance past {:?}", pk, last),
                    ));
                }
                last = next;
            }
            offset += page.len() as u64;

            self.progress.rows_loaded(table, stats.rows, total).await;
            debug!("{}: {} of {} rows loaded", table, stats.rows, total);

            if page.len() < page_size {
                break;
            }
        }

        if self.config.validate_data {
            stats.inconsistency = self.validate(table, stats.source_rows).await?;
        } else {
            info!("{}: validation skipped", table);
        }

        stats.elapsed = start.elapsed();
        let rows_per_sec = if stats.elapsed.as_secs_f64() > 0.0 {
            (stats.rows as f64 / stats.elapsed.as_secs_f64()) as u64
        } else {
            0
        };
        info!(
            "{}: transferred {} rows in {:?} ({} rows/sec, {} fetches, {} loads)",
            table, stats.rows, stats.elapsed, rows_per_sec, stats.fetches, stats.loads
        );
        Ok(stats)
    }

    async fn pagination(&self, table: &str, columns: &[ColumnDescriptor]) -> Pagination {
        match self.source.primary_key(table).await {
            Ok(pk) => match columns.iter().position(|c| c.name == pk) {
                Some(index) => Pagination::Keyset { pk, index },
                None => {
                    warn!("{}: primary key {} not in column list, using OFFSET", table, pk);
                    Pagination::Offset
                }
            },
            Err(e) => {
                warn!("{}: no usable primary key ({}), using OFFSET pagination", table, e);
                Pagination::Offset
            }
        }
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", quote_pg(table));
        let mut tx = self
            .target
            .begin_tx()
            .await
            .map_err(|e| MigrateError::load(table, e))?;
        if let Err(e) = tx.execute(&sql).await {
            if let Err(rb) = tx.rollback().await {
                warn!("{}: rollback after failed truncate: {}", table, rb);
            }
            return Err(MigrateError::load(table, e));
        }
        tx.commit().await.map_err(|e| MigrateError::load(table, e))?;
        info!("{}: truncated", table);
        Ok(())
    }

    /// Load one chunk in its own transaction.
    async fn load_chunk(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Row],
        pk: Option<&str>,
    ) -> Result<u64> {
        let mut tx = self
            .target
            .begin_tx()
            .await
            .map_err(|e| MigrateError::load(table, e))?;

        match tx
            .bulk_insert(table, columns, rows, self.config.batch_insert_size, pk)
            .await
        {
            Ok(outcome) => {
                tx.commit().await.map_err(|e| MigrateError::load(table, e))?;
                Ok(outcome.inserted)
            }
            Err(e) => {
                error!("{}: load failed, rolling back: {}", table, e);
                if let Err(rb) = tx.rollback().await {
                    warn!("{}: rollback failed: {}", table, rb);
                }
                Err(match e {
                    MigrateError::Load { .. } => e,
                    other => MigrateError::load(table, other),
                })
            }
        }
    }

    async fn validate(&self, table: &str, source_rows: i64) -> Result<Option<Inconsistency>> {
        let target_rows = self.target.count_rows(table).await?;
        if target_rows == source_rows {
            info!("{}: row counts consistent ({})", table, source_rows);
            return Ok(None);
        }
        warn!(
            "{}: row count mismatch, source {} target {}",
            table, source_rows, target_rows
        );
        Ok(Some(Inconsistency {
            table: table.to_string(),
            source_rows,
            target_rows,
        }))
    }
}
