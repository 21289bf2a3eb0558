//! Whale ETL - Binance WebSocket Trades
//!
//! `collect` conecta ao WebSocket da Binance, acumula os trades de BTC/USDT
//! e grava um segmento bruto por janela no MinIO. `extract` lê os segmentos
//! brutos, separa os trades acima de US$ 50.000 e grava o resultado no
//! bucket limpo e na tabela `whale_trades`.
//!
//! Uso:
//!   ./target/release/whale-etl collect
//!   ./target/release/whale-etl extract
//!   ./target/release/whale-etl extract --every 120
//!   STORAGE_BACKEND=memory RUST_LOG=debug ./target/release/whale-etl collect

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whale_etl::collector::Collector;
use whale_etl::config::{Config, StorageBackend};
use whale_etl::extraction::{ExtractionJob, RunOutcome};
use whale_etl::feed::WsConnector;
use whale_etl::s3::S3Store;
use whale_etl::scheduler::run_every;
use whale_etl::sink::{MemorySink, PgSink, WhaleSink};
use whale_etl::storage::{MemoryStore, ObjectStore, SegmentWriter};

#[derive(Parser)]
#[command(name = "whale-etl", about = "Coleta de trades e extração de whale trades")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Coleta o stream de trades em segmentos brutos
    Collect,
    /// Extrai whale trades dos segmentos brutos
    Extract {
        /// Repete a extração a cada N segundos (padrão: EXTRACT_INTERVAL_SECS)
        #[arg(long, num_args = 0..=1, default_missing_value = "0")]
        every: Option<u64>,
    },
}

// ============================================================================
// Função Principal
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("configuração inválida")?;

    // ========================================================================
    // Armazenamento
    // ========================================================================

    let store: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::S3 => {
            info!(endpoint = %config.storage.endpoint, "usando armazenamento S3");
            Arc::new(S3Store::new(&config.storage))
        }
        StorageBackend::Memory => {
            warn!("armazenamento em memória: nada será persistido");
            Arc::new(MemoryStore::new())
        }
    };

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("sinal de interrupção recebido, finalizando");
            signal.cancel();
        }
    });

    match cli.command {
        Command::Collect => collect(config, store, shutdown).await,
        Command::Extract { every } => extract(config, store, every, shutdown).await,
    }
}

// ============================================================================
// Subcomandos
// ============================================================================

async fn collect(config: Config, store: Arc<dyn ObjectStore>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let connector = Arc::new(WsConnector::new(config.feed_url.clone()));
    info!(url = %connector.url(), "Conectando ao feed...");

    let writer = SegmentWriter::new(store, config.storage.raw_bucket.clone());
    let collector = Collector::new(connector, writer, config.storage.segment_prefix.clone(), config.collector);

    let report = collector.run(shutdown).await;
    info!(
        connections = report.connections,
        segments = report.segments_written,
        skipped = report.messages_skipped,
        "=== Coleta Finalizada ==="
    );
    Ok(())
}

async fn extract(
    config: Config,
    store: Arc<dyn ObjectStore>,
    every: Option<u64>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let insert_mode = config.extraction.insert_mode;
    let sink: Arc<dyn WhaleSink> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemorySink::new(insert_mode)),
        StorageBackend::S3 => Arc::new(
            PgSink::connect_lazy(&config.database_url, insert_mode).context("DATABASE_URL inválida")?,
        ),
    };

    let job = Arc::new(ExtractionJob::new(
        store.clone(),
        config.storage.raw_bucket.clone(),
        SegmentWriter::new(store, config.storage.clean_bucket.clone()),
        sink,
        config.storage.segment_prefix.clone(),
        &config.extraction,
    ));

    match every {
        None => match job.run().await.context("extração falhou")? {
            RunOutcome::Completed(report) => {
                info!(
                    segments = report.segments_scanned,
                    whales = report.whales,
                    rows = report.rows_inserted,
                    "extração concluída"
                );
                Ok(())
            }
            RunOutcome::Skipped => Ok(()),
        },
        Some(secs) => {
            let every = if secs == 0 {
                config.extraction.interval
            } else {
                Duration::from_secs(secs)
            };
            let report = run_every(job, every, shutdown).await;
            info!(runs = report.runs, failures = report.failures, "=== Extração Finalizada ===");
            Ok(())
        }
    }
}
