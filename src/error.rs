//! Tipos de erro de cada camada

use thiserror::Error;

/// Falha ao validar um registro de trade (reporta qual campo falhou).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("registro não é um objeto JSON")]
    NotAnObject,

    #[error("campo ausente: {0}")]
    MissingField(&'static str),

    #[error("campo {field}: esperado {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("campo {field}: valor não numérico {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("campo time fora do intervalo: {0}")]
    TimestampOutOfRange(i64),
}

/// Falha ao decodificar o conteúdo de um segmento.
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("segmento não é UTF-8 válido: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("JSON inválido: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("segmento não é um array JSON")]
    NotAnArray,
}

/// Falha no armazenamento de objetos.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{op} falhou em {bucket}/{key}: {message}")]
    Request {
        op: &'static str,
        bucket: String,
        key: String,
        message: String,
    },

    #[error("bucket não encontrado: {0}")]
    NoSuchBucket(String),

    #[error("objeto não encontrado: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
}

impl StorageError {
    pub(crate) fn request(op: &'static str, bucket: &str, key: &str, err: impl ToString) -> Self {
        StorageError::Request {
            op,
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

/// Falha na conexão com o feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("falha ao conectar: {0}")]
    Connect(String),

    #[error("erro de transporte: {0}")]
    Transport(String),

    #[error("conexão encerrada pelo servidor")]
    Closed,
}

/// Falha ao gravar um segmento durante o flush.
#[derive(Error, Debug)]
pub enum FlushError {
    #[error("falha ao serializar buffer: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Falha no banco relacional.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("erro de banco: {0}")]
    Database(#[from] sqlx::Error),
}

/// Falha de uma execução do job de extração.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("erro de serialização: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuração inválida no ambiente.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("valor inválido para {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
