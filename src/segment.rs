//! Nomes de objetos e serialização de segmentos
//!
//! Layout no armazenamento:
//!   bruto:  {prefix}/trades/%Y/%m/%d/%H/trades_%Y-%m-%dT%H-%M-%S-%3f.json
//!   limpo:  {prefix}/whales/%Y/%m/%d/%H/whales_{unix_ts}_%3f.json
//!
//! As chaves brutas ordenam lexicograficamente na ordem do tempo.

use crate::error::SegmentError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Chave do segmento bruto gravado em `at`.
pub fn raw_segment_key(prefix: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/trades/{}/trades_{}.json",
        prefix,
        at.format("%Y/%m/%d/%H"),
        at.format("%Y-%m-%dT%H-%M-%S-%3f")
    )
}

/// Prefixo que cobre todos os segmentos brutos de um dia.
pub fn raw_day_prefix(prefix: &str, day: NaiveDate) -> String {
    format!("{}/trades/{}/", prefix, day.format("%Y/%m/%d"))
}

/// Dia de um segmento bruto, lido do caminho da chave.
pub fn raw_segment_day(prefix: &str, key: &str) -> Option<NaiveDate> {
    let rest = key.strip_prefix(prefix)?.strip_prefix("/trades/")?;
    NaiveDate::parse_from_str(rest.get(..10)?, "%Y/%m/%d").ok()
}

/// Chave do segmento limpo (whales) gravado em `at`. O sufixo em
/// milissegundos separa execuções dentro do mesmo segundo.
pub fn clean_segment_key(prefix: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}_{}.json",
        clean_hour_prefix(prefix, at),
        at.timestamp(),
        at.format("%3f")
    )
}

/// Prefixo dos segmentos limpos da hora de `at`.
pub fn clean_hour_prefix(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}/whales/{}/whales_", prefix, at.format("%Y/%m/%d/%H"))
}

/// Onde o job de extração guarda o watermark.
pub fn watermark_key(prefix: &str) -> String {
    format!("{}/state/extract_watermark.json", prefix)
}

/// Serializa um lote como array JSON.
pub fn encode_segment<T: Serialize>(records: &[T]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(records)
}

/// Lê um segmento: deve ser UTF-8 contendo um array JSON.
pub fn decode_segment(bytes: &[u8]) -> Result<Vec<Value>, SegmentError> {
    let text = std::str::from_utf8(bytes)?;
    match serde_json::from_str::<Value>(text)? {
        Value::Array(records) => Ok(records),
        _ => Err(SegmentError::NotAnArray),
    }
}
