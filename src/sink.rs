//! Destino relacional dos whale trades (tabela `whale_trades`)

use crate::error::SinkError;
use crate::types::WhaleRow;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Como linhas repetidas (mesmo segmento, mesma posição) são tratadas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Insere sempre; reprocessar um segmento duplica as linhas.
    Append,
    /// Índice único em `(source_segment, record_index)`; repetidas são ignoradas.
    Dedup,
}

impl FromStr for InsertMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(InsertMode::Append),
            "dedup" | "unique" => Ok(InsertMode::Dedup),
            _ => Err(()),
        }
    }
}

#[async_trait]
pub trait WhaleSink: Send + Sync {
    /// Cria a tabela se não existir.
    async fn ensure_table(&self) -> Result<(), SinkError>;

    /// Insere as linhas e retorna quantas foram efetivamente gravadas.
    async fn insert(&self, rows: &[WhaleRow]) -> Result<u64, SinkError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS whale_trades (
        id BIGSERIAL PRIMARY KEY,
        symbol TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        quantity DOUBLE PRECISION NOT NULL,
        value_usd DOUBLE PRECISION NOT NULL,
        side TEXT NOT NULL,
        trade_time TIMESTAMPTZ NOT NULL,
        source_segment TEXT,
        record_index INTEGER
    )
    ",
    // Tabelas criadas pela versão anterior não têm a origem
    "ALTER TABLE whale_trades ADD COLUMN IF NOT EXISTS source_segment TEXT",
    "ALTER TABLE whale_trades ADD COLUMN IF NOT EXISTS record_index INTEGER",
];

const UNIQUE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS whale_trades_source_uq \
                            ON whale_trades (source_segment, record_index)";

const INSERT: &str = r"
    INSERT INTO whale_trades
        (symbol, price, quantity, value_usd, side, trade_time, source_segment, record_index)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
";

const INSERT_DEDUP: &str = r"
    INSERT INTO whale_trades
        (symbol, price, quantity, value_usd, side, trade_time, source_segment, record_index)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (source_segment, record_index) DO NOTHING
";

pub struct PgSink {
    pool: PgPool,
    mode: InsertMode,
    table_ready: AtomicBool,
}

impl PgSink {
    pub fn new(pool: PgPool, mode: InsertMode) -> Self {
        Self {
            pool,
            mode,
            table_ready: AtomicBool::new(false),
        }
    }

    /// Pool sem conexão imediata: o banco só é contatado quando há linhas.
    pub fn connect_lazy(database_url: &str, mode: InsertMode) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy(database_url)?;
        Ok(Self::new(pool, mode))
    }
}

#[async_trait]
impl WhaleSink for PgSink {
    async fn ensure_table(&self) -> Result<(), SinkError> {
        if self.table_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        if self.mode == InsertMode::Dedup {
            sqlx::query(UNIQUE_INDEX).execute(&self.pool).await?;
        }

        self.table_ready.store(true, Ordering::Release);
        debug!(mode = ?self.mode, "tabela whale_trades pronta");
        Ok(())
    }

    async fn insert(&self, rows: &[WhaleRow]) -> Result<u64, SinkError> {
        let sql = match self.mode {
            InsertMode::Append => INSERT,
            InsertMode::Dedup => INSERT_DEDUP,
        };

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            let result = sqlx::query(sql)
                .bind(&row.trade.symbol)
                .bind(row.trade.price)
                .bind(row.trade.quantity)
                .bind(row.trade.value_usd)
                .bind(row.trade.side.as_str())
                .bind(row.trade.trade_time)
                .bind(&row.source_segment)
                .bind(i32::try_from(row.record_index).unwrap_or(i32::MAX))
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        info!(inserted, total = rows.len(), "whale trades gravados na tabela whale_trades");
        Ok(inserted)
    }
}

// ============================================================================
// Em Memória
// ============================================================================

/// [`WhaleSink`] em memória, com a mesma regra de deduplicação.
pub struct MemorySink {
    mode: InsertMode,
    rows: Mutex<Vec<WhaleRow>>,
}

impl MemorySink {
    pub fn new(mode: InsertMode) -> Self {
        Self {
            mode,
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn rows(&self) -> Vec<WhaleRow> {
        self.rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl WhaleSink for MemorySink {
    async fn ensure_table(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn insert(&self, rows: &[WhaleRow]) -> Result<u64, SinkError> {
        let mut stored = self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut inserted = 0;
        for row in rows {
            let duplicate = self.mode == InsertMode::Dedup
                && stored.iter().any(|existing| {
                    existing.source_segment == row.source_segment
                        && existing.record_index == row.record_index
                });
            if !duplicate {
                stored.push(row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
