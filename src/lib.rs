//! Whale ETL - Trades da Binance para MinIO e PostgreSQL
//!
//! Dois processos independentes:
//! - [`collector`]: WebSocket → segmentos brutos (um por janela de flush)
//! - [`extraction`]: segmentos brutos → whale trades (segmento limpo + tabela)

pub mod buffer;
pub mod collector;
pub mod config;
pub mod error;
pub mod extract;
pub mod extraction;
pub mod feed;
pub mod filter;
pub mod s3;
pub mod scanner;
pub mod scheduler;
pub mod segment;
pub mod sink;
pub mod storage;
pub mod types;
