//! Agendador embutido do job de extração
//!
//! Dispara [`ExtractionJob::run`] a cada `every`. Cada execução roda em sua
//! própria task; se a anterior ainda não terminou, o job devolve
//! [`RunOutcome::Skipped`] e o ciclo segue.

use crate::error::ExtractError;
use crate::extraction::{ExtractionJob, RunOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub runs: u64,
    pub skipped: u64,
    pub failures: u64,
}

impl SchedulerReport {
    fn record(&mut self, joined: Result<Result<RunOutcome, ExtractError>, JoinError>) {
        match joined {
            Ok(Ok(RunOutcome::Completed(report))) => {
                self.runs += 1;
                info!(
                    segments = report.segments_scanned,
                    whales = report.whales,
                    rows = report.rows_inserted,
                    "extração concluída"
                );
            }
            Ok(Ok(RunOutcome::Skipped)) => self.skipped += 1,
            Ok(Err(e)) => {
                self.failures += 1;
                error!(error = %e, "extração falhou");
            }
            Err(e) => {
                self.failures += 1;
                error!(error = %e, "task de extração abortada");
            }
        }
    }
}

/// Roda o job periodicamente até `shutdown`. Execuções em andamento são
/// aguardadas antes de retornar.
pub async fn run_every(
    job: Arc<ExtractionJob>,
    every: Duration,
    shutdown: CancellationToken,
) -> SchedulerReport {
    info!(every_secs = every.as_secs(), "agendador de extração iniciado");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();
    let mut report = SchedulerReport::default();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(joined) = in_flight.join_next() => report.record(joined),
            _ = ticker.tick() => {
                let job = job.clone();
                in_flight.spawn(async move { job.run().await });
            }
        }
    }

    if !in_flight.is_empty() {
        warn!(pending = in_flight.len(), "aguardando extração em andamento");
    }
    while let Some(joined) = in_flight.join_next().await {
        report.record(joined);
    }

    info!(runs = report.runs, skipped = report.skipped, failures = report.failures, "agendador finalizado");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionConfig;
    use crate::sink::{InsertMode, MemorySink};
    use crate::storage::{MemoryStore, SegmentWriter};

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_period() {
        let store = Arc::new(MemoryStore::new());
        let job = Arc::new(ExtractionJob::new(
            store.clone(),
            "crypto-raw",
            SegmentWriter::new(store, "crypto-clean"),
            Arc::new(MemorySink::new(InsertMode::Append)),
            "bitcoin",
            &ExtractionConfig::default(),
        ));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_every(job, Duration::from_secs(60), shutdown.clone()));

        // Disparos em 0s, 60s e 120s
        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();

        let report = handle.await.unwrap();
        assert_eq!(report, SchedulerReport { runs: 3, skipped: 0, failures: 0 });
    }
}
