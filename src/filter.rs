//! Filtro de whale trades

use crate::types::{Side, TradeEvent, WhaleTrade};

/// Limiar padrão de valor nocional (USD).
pub const DEFAULT_THRESHOLD_USD: f64 = 50_000.0;

/// Regra de valor: `price * quantity >= threshold_usd`.
#[derive(Debug, Clone, Copy)]
pub struct WhaleFilter {
    pub threshold_usd: f64,
}

impl Default for WhaleFilter {
    fn default() -> Self {
        Self {
            threshold_usd: DEFAULT_THRESHOLD_USD,
        }
    }
}

impl WhaleFilter {
    pub fn new(threshold_usd: f64) -> Self {
        Self { threshold_usd }
    }

    /// Retorna o [`WhaleTrade`] normalizado se o trade atingir o limiar.
    pub fn apply(&self, event: &TradeEvent) -> Option<WhaleTrade> {
        let price = event.price.value();
        let quantity = event.quantity.value();
        let value_usd = price * quantity;

        if value_usd < self.threshold_usd {
            return None;
        }

        Some(WhaleTrade {
            symbol: event.symbol.clone(),
            price,
            quantity,
            value_usd,
            side: Side::from_maker_flag(event.is_buyer_maker),
            trade_time: event.time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(price: &str, qty: &str, maker: bool) -> TradeEvent {
        TradeEvent::decode(&json!({
            "price": price, "qty": qty, "isBuyerMaker": maker, "time": 1_733_306_400_000i64
        }))
        .unwrap()
    }

    #[test]
    fn taker_buy_above_threshold() {
        let whale = WhaleFilter::default().apply(&event("30000", "2", false)).unwrap();

        assert_eq!(whale.value_usd, 60_000.0);
        assert_eq!(whale.side, Side::Buy);
        assert_eq!(whale.symbol, "BTCUSDT");
        assert_eq!(whale.trade_time.timestamp_millis(), 1_733_306_400_000);
    }

    #[test]
    fn maker_flag_means_sell() {
        let whale = WhaleFilter::default().apply(&event("30000", "2", true)).unwrap();
        assert_eq!(whale.side, Side::Sell);
    }

    #[test]
    fn below_threshold_yields_nothing() {
        assert!(WhaleFilter::default().apply(&event("100", "1", false)).is_none());
    }

    #[test]
    fn threshold_is_inclusive() {
        let filter = WhaleFilter::new(50_000.0);
        assert!(filter.apply(&event("25000", "2", false)).is_some());
        assert!(filter.apply(&event("24999.99", "2", false)).is_none());
    }

    #[test]
    fn side_serializes_upper_case() {
        let whale = WhaleFilter::default().apply(&event("40000", "2", true)).unwrap();
        let value = serde_json::to_value(&whale).unwrap();

        assert_eq!(value["side"], "SELL");
        assert_eq!(value["value_usd"], 80_000.0);
    }
}
