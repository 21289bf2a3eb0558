//! Tipos e estruturas de dados

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Símbolo assumido quando o evento do feed não informa `symbol`.
pub const DEFAULT_SYMBOL: &str = "BTCUSDT";

/// Um trade recebido do feed, já validado.
///
/// `price` e `quantity` guardam o texto decimal original (como veio da
/// exchange) junto com o valor numérico já convertido.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub is_buyer_maker: bool,
    pub time: DateTime<Utc>,   // Timestamp do trade (da Binance)
}

/// Texto decimal da exchange com seu valor numérico.
#[derive(Debug, Clone, PartialEq)]
pub struct Decimal {
    raw: String,
    value: f64,
}

impl Decimal {
    /// Converte um texto decimal. Retorna `None` se não for um número finito.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: f64 = raw.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(Self { raw: raw.to_string(), value })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Lado inferido do agressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Maker comprador significa que o agressor vendeu.
    pub fn from_maker_flag(is_buyer_maker: bool) -> Self {
        if is_buyer_maker {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Trade "baleia": valor nocional acima do limiar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleTrade {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub value_usd: f64,
    pub side: Side,
    pub trade_time: DateTime<Utc>,
}

/// Whale trade com a origem (segmento bruto e posição dentro dele).
#[derive(Debug, Clone, PartialEq)]
pub struct WhaleRow {
    pub trade: WhaleTrade,
    pub source_segment: String,
    pub record_index: u32,
}
