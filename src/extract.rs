//! Extração de Dados do JSON
//!
//! Valida um evento de trade vindo do feed (ou de um segmento bruto) e
//! produz um [`TradeEvent`] tipado. Aceita os nomes documentados
//! (`price`, `qty`, `isBuyerMaker`, `time`, `symbol`) e os nomes curtos do
//! stream de trades da Binance (`p`, `q`, `m`, `T`, `s`).

use crate::error::RecordError;
use crate::types::{Decimal, TradeEvent, DEFAULT_SYMBOL};
use chrono::DateTime;
use serde_json::{Map, Value};

impl TradeEvent {
    /// Decodifica um evento a partir de um valor JSON.
    ///
    /// # Retorno
    /// O evento validado, ou o [`RecordError`] indicando o campo que falhou.
    pub fn decode(value: &Value) -> Result<Self, RecordError> {
        let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

        let price = decimal_field(obj, "price", "p")?;
        let quantity = decimal_field(obj, "qty", "q")?;

        let is_buyer_maker = match field(obj, "isBuyerMaker", "m") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(RecordError::WrongType {
                    field: "isBuyerMaker",
                    expected: "boolean",
                })
            }
        };

        let time_ms = match field(obj, "time", "T") {
            None => return Err(RecordError::MissingField("time")),
            Some(v) => epoch_millis(v).ok_or(RecordError::WrongType {
                field: "time",
                expected: "epoch em milissegundos",
            })?,
        };
        let time = DateTime::from_timestamp_millis(time_ms)
            .ok_or(RecordError::TimestampOutOfRange(time_ms))?;

        let symbol = match field(obj, "symbol", "s") {
            None | Some(Value::Null) => DEFAULT_SYMBOL.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(RecordError::WrongType {
                    field: "symbol",
                    expected: "string",
                })
            }
        };

        Ok(TradeEvent {
            symbol,
            price,
            quantity,
            is_buyer_maker,
            time,
        })
    }
}

/// Busca um campo pelo nome longo; cai para o nome curto da exchange.
fn field<'a>(obj: &'a Map<String, Value>, name: &str, short: &str) -> Option<&'a Value> {
    obj.get(name).or_else(|| obj.get(short))
}

fn decimal_field(
    obj: &Map<String, Value>,
    name: &'static str,
    short: &str,
) -> Result<Decimal, RecordError> {
    let raw = match field(obj, name, short) {
        None => return Err(RecordError::MissingField(name)),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(RecordError::WrongType {
                field: name,
                expected: "decimal",
            })
        }
    };
    Decimal::parse(&raw).ok_or(RecordError::NotNumeric { field: name, value: raw })
}

fn epoch_millis(value: &Value) -> Option<i64> {
    if let Some(ms) = value.as_i64() {
        return Some(ms);
    }
    // Alguns produtores mandam o timestamp como float (1.7e12)
    value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)
}
