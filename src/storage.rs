//! Armazenamento de objetos e escritor de segmentos
//!
//! O [`ObjectStore`] é a interface mínima que o coletor e o job de extração
//! usam do serviço de objetos (MinIO/S3 em produção, [`MemoryStore`] em
//! testes). O [`SegmentWriter`] garante o bucket e faz um único `put` por
//! segmento.

use crate::error::StorageError;
use crate::segment::CONTENT_TYPE_JSON;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Operações de armazenamento de objetos usadas pelo pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Grava o objeto inteiro de uma vez (leitores nunca veem escrita parcial).
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Lista recursivamente as chaves sob `prefix`, em ordem.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;
}

// ============================================================================
// Escritor de Segmentos
// ============================================================================

/// Grava segmentos em um bucket, criando-o na primeira escrita.
pub struct SegmentWriter {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    bucket_ready: AtomicBool,
}

impl SegmentWriter {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            bucket_ready: AtomicBool::new(false),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Cria o bucket se ainda não existir. Idempotente.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        if self.bucket_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        if !self.store.bucket_exists(&self.bucket).await? {
            self.store.create_bucket(&self.bucket).await?;
            info!(bucket = %self.bucket, "bucket criado");
        }

        self.bucket_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Grava `payload` em `key` com um único `put`.
    pub async fn write(&self, key: &str, payload: Vec<u8>) -> Result<(), StorageError> {
        self.ensure_bucket().await?;

        let size = payload.len();
        self.store
            .put_object(&self.bucket, key, payload, CONTENT_TYPE_JSON)
            .await?;

        debug!(bucket = %self.bucket, key, size, "segmento gravado");
        Ok(())
    }
}

// ============================================================================
// Armazenamento em Memória
// ============================================================================

/// [`ObjectStore`] em memória (testes e modo `STORAGE_BACKEND=memory`).
#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Número de objetos em um bucket (0 se o bucket não existe).
    pub async fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map_or(0, |objects| objects.len())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}
