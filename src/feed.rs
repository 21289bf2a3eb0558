//! Conexão com o feed de trades e supervisor de reconexão
//!
//! O supervisor é uma máquina de estados explícita:
//!
//! ```text
//! Connecting ──ok──▶ Streaming ──erro/desconexão──▶ Backoff ──delay──▶ Connecting
//!      └──────────────erro─────────────────────────────▲
//! ```
//!
//! `Stopped` é terminal: pedido de shutdown, ou `max_attempts` falhas
//! consecutivas (com `max_attempts = None` tenta para sempre).

use crate::error::FeedError;
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Mensagens de texto recebidas de uma conexão.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<String, FeedError>> + Send>>;

/// Abre conexões com o feed.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<FeedStream, FeedError>;
}

// ============================================================================
// WebSocket
// ============================================================================

/// Conector WebSocket (stream público de trades da Binance por padrão).
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    async fn connect(&self) -> Result<FeedStream, FeedError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        // Ping/pong e frames binários não carregam trades
        let messages = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(_)) => Some(Err(FeedError::Closed)),
                Ok(_) => None,
                Err(e) => Some(Err(FeedError::Transport(e.to_string()))),
            }
        });

        Ok(Box::pin(messages))
    }
}

// ============================================================================
// Conector em Memória
// ============================================================================

pub type SessionSender = mpsc::UnboundedSender<Result<String, FeedError>>;

/// Conector roteirizado: cada [`ChannelConnector::add_session`] enfileira
/// uma conexão futura. Fechar o sender equivale a uma desconexão.
#[derive(Default)]
pub struct ChannelConnector {
    sessions: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<String, FeedError>>>>,
}

impl ChannelConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self) -> SessionSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(rx);
        tx
    }
}

#[async_trait]
impl FeedConnector for ChannelConnector {
    async fn connect(&self) -> Result<FeedStream, FeedError> {
        let rx = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| FeedError::Connect("nenhuma sessão disponível".to_string()))?;

        let messages = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(messages))
    }
}

// ============================================================================
// Política de Reconexão
// ============================================================================

/// Atraso entre tentativas. Com `multiplier = 1.0` o atraso é fixo.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            multiplier: 1.0,
            max_delay: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Atraso antes da tentativa `attempt` (1 = primeira falha).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

// ============================================================================
// Supervisor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Connecting,
    Streaming,
    Backoff { attempt: u32 },
    Stopped,
}

/// Transições de estado da conexão; quem executa I/O é o coletor.
#[derive(Debug)]
pub struct Supervisor {
    policy: ReconnectPolicy,
    state: SupervisorState,
    consecutive_failures: u32,
    connections: u64,
}

impl Supervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: SupervisorState::Connecting,
            consecutive_failures: 0,
            connections: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Total de conexões bem-sucedidas.
    pub fn connections(&self) -> u64 {
        self.connections
    }

    pub fn on_connected(&mut self) {
        self.consecutive_failures = 0;
        self.connections += 1;
        self.state = SupervisorState::Streaming;
    }

    /// Falha ao conectar ou durante o streaming.
    pub fn on_failure(&mut self) -> SupervisorState {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.state = match self.policy.max_attempts {
            Some(max) if self.consecutive_failures >= max => SupervisorState::Stopped,
            _ => SupervisorState::Backoff {
                attempt: self.consecutive_failures,
            },
        };
        self.state
    }

    /// Atraso do estado `Backoff` atual (zero nos demais estados).
    pub fn backoff_delay(&self) -> Duration {
        match self.state {
            SupervisorState::Backoff { attempt } => self.policy.delay_for(attempt),
            _ => Duration::ZERO,
        }
    }

    pub fn on_backoff_elapsed(&mut self) {
        if let SupervisorState::Backoff { .. } = self.state {
            self.state = SupervisorState::Connecting;
        }
    }

    pub fn stop(&mut self) {
        self.state = SupervisorState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_fixed_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(50), Duration::from_secs(5));
    }

    #[test]
    fn growing_delay_is_capped() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: None,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn cycles_through_states() {
        let mut sup = Supervisor::new(ReconnectPolicy::default());
        assert_eq!(sup.state(), SupervisorState::Connecting);

        sup.on_connected();
        assert_eq!(sup.state(), SupervisorState::Streaming);

        assert_eq!(sup.on_failure(), SupervisorState::Backoff { attempt: 1 });
        assert_eq!(sup.backoff_delay(), Duration::from_secs(5));

        sup.on_backoff_elapsed();
        assert_eq!(sup.state(), SupervisorState::Connecting);
        assert_eq!(sup.on_failure(), SupervisorState::Backoff { attempt: 2 });

        sup.on_backoff_elapsed();
        sup.on_connected();
        assert_eq!(sup.on_failure(), SupervisorState::Backoff { attempt: 1 });
        assert_eq!(sup.connections(), 2);
    }

    #[test]
    fn retries_forever_without_cap() {
        let mut sup = Supervisor::new(ReconnectPolicy::default());
        for _ in 0..10_000 {
            assert!(matches!(sup.on_failure(), SupervisorState::Backoff { .. }));
            sup.on_backoff_elapsed();
        }
    }

    #[test]
    fn stops_after_max_consecutive_failures() {
        let mut sup = Supervisor::new(ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        });
        assert_eq!(sup.on_failure(), SupervisorState::Backoff { attempt: 1 });
        sup.on_backoff_elapsed();
        assert_eq!(sup.on_failure(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn channel_connector_replays_sessions_in_order() {
        let connector = ChannelConnector::new();
        let first = connector.add_session();
        first.send(Ok("a".into())).unwrap();
        drop(first);

        let mut stream = connector.connect().await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(stream.next().await.is_none());

        assert!(matches!(connector.connect().await, Err(FeedError::Connect(_))));
    }
}
