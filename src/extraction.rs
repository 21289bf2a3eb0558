//! Job de Extração de Whale Trades
//!
//! A cada execução: lista os segmentos brutos da janela, filtra os trades
//! acima do limiar e, se houver algum, grava um segmento limpo e as linhas
//! na tabela relacional. Sem whale trades, nenhum dado é gravado.
//!
//! Segmento ilegível (JSON inválido) é pulado; registro inválido dentro de
//! um segmento também. Falha de leitura ou escrita no armazenamento, ou no
//! banco, falha a execução inteira e o watermark não avança.

use crate::error::ExtractError;
use crate::filter::{WhaleFilter, DEFAULT_THRESHOLD_USD};
use crate::scanner::{ScanMode, SegmentScanner, Watermark};
use crate::segment::{clean_hour_prefix, clean_segment_key, decode_segment, encode_segment, watermark_key};
use crate::sink::{InsertMode, WhaleSink};
use crate::storage::{ObjectStore, SegmentWriter};
use crate::types::{TradeEvent, WhaleRow, WhaleTrade};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub threshold_usd: f64,
    pub scan_mode: ScanMode,
    pub insert_mode: InsertMode,
    /// Cadência do agendador embutido.
    pub interval: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            threshold_usd: DEFAULT_THRESHOLD_USD,
            scan_mode: ScanMode::Watermark,
            insert_mode: InsertMode::Append,
            interval: Duration::from_secs(120),
        }
    }
}

/// Resumo de uma execução concluída.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub segments_scanned: usize,
    pub segments_skipped: usize,
    pub records_skipped: usize,
    pub whales: usize,
    pub clean_key: Option<String>,
    pub rows_inserted: u64,
    pub watermark: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Outra execução já estava em andamento.
    Skipped,
}

pub struct ExtractionJob {
    scanner: SegmentScanner,
    filter: WhaleFilter,
    clean_writer: SegmentWriter,
    sink: Arc<dyn WhaleSink>,
    prefix: String,
    run_lock: Mutex<()>,
}

impl ExtractionJob {
    pub fn new(
        raw_store: Arc<dyn ObjectStore>,
        raw_bucket: impl Into<String>,
        clean_writer: SegmentWriter,
        sink: Arc<dyn WhaleSink>,
        prefix: impl Into<String>,
        config: &ExtractionConfig,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            scanner: SegmentScanner::new(raw_store, raw_bucket, prefix.clone(), config.scan_mode),
            filter: WhaleFilter::new(config.threshold_usd),
            clean_writer,
            sink,
            prefix,
            run_lock: Mutex::new(()),
        }
    }

    pub async fn run(&self) -> Result<RunOutcome, ExtractError> {
        self.run_at(Utc::now()).await
    }

    /// Executa o job como se o relógio marcasse `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunOutcome, ExtractError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("execução anterior ainda em andamento, pulando");
            return Ok(RunOutcome::Skipped);
        };

        let watermark_key = watermark_key(&self.prefix);
        let watermark = match self.scanner.mode() {
            ScanMode::Watermark => Watermark::load(&self.clean_writer, &watermark_key).await?,
            ScanMode::FullDay => None,
        };

        let keys = self.scanner.scan(now, watermark.as_ref()).await?;
        let mut report = RunReport {
            segments_scanned: keys.len(),
            ..RunReport::default()
        };
        if keys.is_empty() {
            info!("Nenhum arquivo bruto novo encontrado.");
            return Ok(RunOutcome::Completed(report));
        }

        let mut rows = Vec::new();
        for key in &keys {
            debug!(key = %key, "lendo segmento");
            let bytes = self.scanner.read(key).await?;

            let records = match decode_segment(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    warn!(key = %key, error = %e, "segmento inválido, pulando");
                    report.segments_skipped += 1;
                    continue;
                }
            };

            for (index, record) in records.iter().enumerate() {
                let event = match TradeEvent::decode(record) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(key = %key, index, error = %e, "registro inválido, pulando");
                        report.records_skipped += 1;
                        continue;
                    }
                };
                if let Some(trade) = self.filter.apply(&event) {
                    rows.push(WhaleRow {
                        trade,
                        source_segment: key.clone(),
                        record_index: u32::try_from(index).unwrap_or(u32::MAX),
                    });
                }
            }
        }

        report.whales = rows.len();
        if rows.is_empty() {
            info!(segments = keys.len(), "Whale trade não encontrado.");
        } else {
            let clean_key = self.free_clean_key(now).await?;
            let trades: Vec<&WhaleTrade> = rows.iter().map(|row| &row.trade).collect();
            self.clean_writer.write(&clean_key, encode_segment(&trades)?).await?;
            info!(
                count = rows.len(),
                bucket = %self.clean_writer.bucket(),
                key = %clean_key,
                "whale trades gravados no armazenamento"
            );

            self.sink.ensure_table().await?;
            report.rows_inserted = self.sink.insert(&rows).await?;
            report.clean_key = Some(clean_key);
        }

        if self.scanner.mode() == ScanMode::Watermark {
            if let Some(last) = keys.last() {
                let mark = Watermark {
                    last_segment: last.clone(),
                    updated_at: now,
                };
                mark.save(&self.clean_writer, &watermark_key).await?;
                report.watermark = Some(mark.last_segment);
            }
        }

        Ok(RunOutcome::Completed(report))
    }

    /// Chave limpa para `now` que ainda não existe no bucket. Outra execução
    /// no mesmo milissegundo empurra a chave para o seguinte.
    async fn free_clean_key(&self, now: DateTime<Utc>) -> Result<String, ExtractError> {
        self.clean_writer.ensure_bucket().await?;
        let existing = self
            .clean_writer
            .store()
            .list_objects(self.clean_writer.bucket(), &clean_hour_prefix(&self.prefix, now))
            .await?;

        let mut at = now;
        let mut key = clean_segment_key(&self.prefix, at);
        while existing.binary_search(&key).is_ok() {
            at += ChronoDuration::milliseconds(1);
            key = clean_segment_key(&self.prefix, at);
        }
        Ok(key)
    }
}
