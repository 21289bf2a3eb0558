//! Coletor do Stream de Trades
//!
//! Mantém a conexão com o feed, acumula os eventos da janela atual em um
//! [`TradeBuffer`] e grava um segmento bruto por janela.
//!
//! - Erro de leitura ou desconexão descarta o buffer da janela (perda
//!   limitada a um intervalo de flush) e o supervisor reconecta.
//! - Falha ao gravar NÃO descarta: o buffer fica retido e o flush é
//!   tentado de novo na próxima oportunidade.
//! - No modo [`FlushMode::OnArrival`] o flush só é avaliado quando chega
//!   mensagem; um período sem mensagens atrasa o flush indefinidamente.

use crate::buffer::TradeBuffer;
use crate::error::{FeedError, FlushError};
use crate::feed::{FeedConnector, FeedStream, ReconnectPolicy, Supervisor, SupervisorState};
use crate::segment::raw_segment_key;
use crate::storage::SegmentWriter;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacidade inicial do buffer (uma janela de 10s do BTCUSDT cabe folgada).
const BUFFER_CAPACITY: usize = 8192;

/// Quando o flush da janela é avaliado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Timer independente das mensagens: janelas ociosas também fecham.
    WallClock,
    /// Verificado após cada mensagem recebida.
    OnArrival,
}

impl FromStr for FlushMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wall-clock" | "wallclock" | "timer" => Ok(FlushMode::WallClock),
            "on-arrival" | "arrival" => Ok(FlushMode::OnArrival),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub flush_interval: Duration,
    pub flush_mode: FlushMode,
    pub reconnect: ReconnectPolicy,
    /// Tempo máximo do flush final no shutdown.
    pub shutdown_flush_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(10),
            flush_mode: FlushMode::WallClock,
            reconnect: ReconnectPolicy::default(),
            shutdown_flush_timeout: Duration::from_secs(5),
        }
    }
}

/// Contadores de uma execução do coletor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorReport {
    pub connections: u64,
    pub segments_written: u64,
    pub events_flushed: u64,
    pub events_discarded: u64,
    pub messages_skipped: u64,
}

enum SessionEnd {
    Shutdown,
    Failed(FeedError),
}

pub struct Collector {
    connector: Arc<dyn FeedConnector>,
    writer: SegmentWriter,
    prefix: String,
    config: CollectorConfig,
    last_key_ms: Option<i64>,
    report: CollectorReport,
}

impl Collector {
    pub fn new(
        connector: Arc<dyn FeedConnector>,
        writer: SegmentWriter,
        prefix: impl Into<String>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            connector,
            writer,
            prefix: prefix.into(),
            config,
            last_key_ms: None,
            report: CollectorReport::default(),
        }
    }

    /// Roda até `shutdown` ser cancelado (ou até esgotar `max_attempts`).
    pub async fn run(mut self, shutdown: CancellationToken) -> CollectorReport {
        if let Err(e) = self.writer.ensure_bucket().await {
            // Sem bucket ainda; o primeiro flush tenta de novo
            warn!(bucket = %self.writer.bucket(), error = %e, "não foi possível garantir o bucket");
        }

        let mut supervisor = Supervisor::new(self.config.reconnect.clone());
        let mut stream: Option<FeedStream> = None;

        loop {
            match supervisor.state() {
                SupervisorState::Connecting => {
                    let connected = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => None,
                        result = self.connector.connect() => Some(result),
                    };
                    match connected {
                        None => supervisor.stop(),
                        Some(Ok(s)) => {
                            info!("Conectado! Coletando dados...");
                            supervisor.on_connected();
                            stream = Some(s);
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "falha ao conectar no feed");
                            supervisor.on_failure();
                        }
                    }
                }
                SupervisorState::Streaming => {
                    let Some(s) = stream.take() else {
                        supervisor.on_failure();
                        continue;
                    };
                    match self.run_session(s, &shutdown).await {
                        SessionEnd::Shutdown => supervisor.stop(),
                        SessionEnd::Failed(e) => {
                            warn!(error = %e, "erro no WebSocket, reconectando");
                            supervisor.on_failure();
                        }
                    }
                }
                SupervisorState::Backoff { attempt } => {
                    let delay = supervisor.backoff_delay();
                    info!(attempt, delay_secs = delay.as_secs_f64(), "aguardando para reconectar");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => supervisor.stop(),
                        _ = tokio::time::sleep(delay) => supervisor.on_backoff_elapsed(),
                    }
                }
                SupervisorState::Stopped => break,
            }
        }

        self.report.connections = supervisor.connections();
        info!(
            segments = self.report.segments_written,
            events = self.report.events_flushed,
            discarded = self.report.events_discarded,
            "Coleta finalizada"
        );
        self.report
    }

    /// Consome uma conexão até desconectar ou até o shutdown.
    async fn run_session(&mut self, mut stream: FeedStream, shutdown: &CancellationToken) -> SessionEnd {
        let period = self.config.flush_interval;
        let wall_clock = self.config.flush_mode == FlushMode::WallClock;

        let mut buffer = TradeBuffer::with_capacity(BUFFER_CAPACITY);
        let mut window_start = Instant::now();
        let mut ticker = tokio::time::interval_at(window_start + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.final_flush(&mut buffer).await;
                    return SessionEnd::Shutdown;
                }
                _ = ticker.tick(), if wall_clock => {
                    self.try_flush(&mut buffer).await;
                }
                msg = stream.next() => match msg {
                    Some(Ok(text)) => {
                        self.ingest(&mut buffer, &text);
                        if !wall_clock && window_start.elapsed() >= period && !buffer.is_empty()
                            && self.try_flush(&mut buffer).await
                        {
                            window_start = Instant::now();
                        }
                    }
                    Some(Err(e)) => {
                        self.discard(&mut buffer);
                        return SessionEnd::Failed(e);
                    }
                    None => {
                        self.discard(&mut buffer);
                        return SessionEnd::Failed(FeedError::Closed);
                    }
                }
            }
        }
    }

    /// Decodifica uma mensagem; mensagens inválidas são puladas sem
    /// derrubar a conexão.
    fn ingest(&mut self, buffer: &mut TradeBuffer, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(event @ Value::Object(_)) => buffer.push(event),
            Ok(_) => {
                self.report.messages_skipped += 1;
                debug!("mensagem ignorada: não é um objeto JSON");
            }
            Err(e) => {
                self.report.messages_skipped += 1;
                warn!(error = %e, "mensagem com JSON inválido ignorada");
            }
        }
    }

    fn discard(&mut self, buffer: &mut TradeBuffer) {
        let lost = buffer.discard();
        if lost > 0 {
            self.report.events_discarded += lost as u64;
            warn!(lost, "janela abortada, buffer descartado");
        }
    }

    /// Flush com log de erro. Retorna `true` se o buffer ficou vazio.
    async fn try_flush(&mut self, buffer: &mut TradeBuffer) -> bool {
        if buffer.is_empty() {
            return true;
        }
        match self.flush(buffer).await {
            Ok(_) => true,
            Err(e) => {
                error!(pending = buffer.len(), error = %e, "falha ao gravar segmento, buffer retido");
                false
            }
        }
    }

    async fn final_flush(&mut self, buffer: &mut TradeBuffer) {
        if buffer.is_empty() {
            return;
        }
        let timeout = self.config.shutdown_flush_timeout;
        match tokio::time::timeout(timeout, self.flush(buffer)).await {
            Ok(Ok(key)) => info!(key = %key, "flush final concluído"),
            Ok(Err(e)) => error!(lost = buffer.len(), error = %e, "flush final falhou"),
            Err(_) => error!(lost = buffer.len(), "flush final excedeu o tempo limite"),
        }
    }

    /// Grava o buffer como um segmento bruto e o esvazia.
    async fn flush(&mut self, buffer: &mut TradeBuffer) -> Result<String, FlushError> {
        let payload = buffer.encode()?;
        let (key, key_ms) = self.next_key();

        self.writer.write(&key, payload).await?;

        self.last_key_ms = Some(key_ms);
        self.report.segments_written += 1;
        self.report.events_flushed += buffer.len() as u64;
        info!(
            count = buffer.len(),
            bucket = %self.writer.bucket(),
            key = %key,
            "trades gravados no armazenamento"
        );
        buffer.clear();
        Ok(key)
    }

    /// Chave do próximo segmento. Nunca repete o milissegundo da anterior,
    /// mesmo que o relógio não tenha avançado.
    fn next_key(&self) -> (String, i64) {
        let now = Utc::now();
        let mut ms = now.timestamp_millis();
        if let Some(last) = self.last_key_ms {
            if ms <= last {
                ms = last + 1;
            }
        }
        let at = DateTime::from_timestamp_millis(ms).unwrap_or(now);
        (raw_segment_key(&self.prefix, at), ms)
    }
}
