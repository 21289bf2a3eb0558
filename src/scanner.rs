//! Varredura de segmentos brutos e watermark do job de extração

use crate::error::{ExtractError, StorageError};
use crate::segment::{raw_day_prefix, raw_segment_day};
use crate::storage::{ObjectStore, SegmentWriter};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Quais segmentos entram em uma execução.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Todos os segmentos do dia corrente, a cada execução. Execuções
    /// repetidas no mesmo dia reprocessam os mesmos segmentos.
    FullDay,
    /// Dia anterior e dia corrente, só chaves depois do watermark.
    Watermark,
}

impl FromStr for ScanMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full-day" | "fullday" | "day" => Ok(ScanMode::FullDay),
            "watermark" => Ok(ScanMode::Watermark),
            _ => Err(()),
        }
    }
}

/// Último segmento bruto já processado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    pub last_segment: String,
    pub updated_at: DateTime<Utc>,
}

impl Watermark {
    /// Lê o watermark do bucket limpo. `None` se ainda não existe.
    pub async fn load(writer: &SegmentWriter, key: &str) -> Result<Option<Self>, ExtractError> {
        let store = writer.store();
        if !store.bucket_exists(writer.bucket()).await? {
            return Ok(None);
        }
        match store.get_object(writer.bucket(), key).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Dia do último segmento processado (cai para `updated_at` se a
    /// chave não seguir o layout bruto).
    pub fn day(&self, prefix: &str) -> NaiveDate {
        raw_segment_day(prefix, &self.last_segment).unwrap_or_else(|| self.updated_at.date_naive())
    }

    pub async fn save(&self, writer: &SegmentWriter, key: &str) -> Result<(), ExtractError> {
        writer.write(key, serde_json::to_vec(self)?).await?;
        Ok(())
    }
}

/// Lista os segmentos brutos dentro da janela de varredura.
pub struct SegmentScanner {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    mode: ScanMode,
}

impl SegmentScanner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        mode: ScanMode,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
            mode,
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Prefixos de dia cobertos por uma execução em `now`.
    ///
    /// No modo watermark a janela começa no dia do watermark (ou ontem, se
    /// for mais recente), para que uma parada longa do job não deixe dias
    /// sem listar.
    pub fn day_prefixes(&self, now: DateTime<Utc>, watermark: Option<&Watermark>) -> Vec<String> {
        let today = now.date_naive();
        let first = match self.mode {
            ScanMode::FullDay => today,
            ScanMode::Watermark => {
                let yesterday = today.pred_opt().unwrap_or(today);
                match watermark.map(|mark| mark.day(&self.prefix)) {
                    Some(day) if day < yesterday => day,
                    _ => yesterday,
                }
            }
        };

        first
            .iter_days()
            .take_while(|day| *day <= today)
            .map(|day| raw_day_prefix(&self.prefix, day))
            .collect()
    }

    /// Chaves a processar, em ordem cronológica.
    pub async fn scan(
        &self,
        now: DateTime<Utc>,
        watermark: Option<&Watermark>,
    ) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for prefix in self.day_prefixes(now, watermark) {
            match self.store.list_objects(&self.bucket, &prefix).await {
                Ok(found) => keys.extend(found),
                Err(StorageError::NoSuchBucket(bucket)) => {
                    debug!(bucket = %bucket, "bucket bruto ainda não existe");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            }
        }

        keys.sort();
        keys.dedup();

        if let (ScanMode::Watermark, Some(mark)) = (self.mode, watermark) {
            keys.retain(|key| key.as_str() > mark.last_segment.as_str());
        }
        Ok(keys)
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.store.get_object(&self.bucket, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{raw_segment_key, watermark_key, CONTENT_TYPE_JSON};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, day, hour, 0, 0).unwrap()
    }

    async fn store_with(keys: &[String]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("raw").await.unwrap();
        for key in keys {
            store.put_object("raw", key, b"[]".to_vec(), CONTENT_TYPE_JSON).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn full_day_lists_only_today() {
        let yesterday = raw_segment_key("bitcoin", at(3, 23));
        let today = raw_segment_key("bitcoin", at(4, 1));
        let store = store_with(&[yesterday, today.clone()]).await;
        let scanner = SegmentScanner::new(store, "raw", "bitcoin", ScanMode::FullDay);

        assert_eq!(scanner.scan(at(4, 2), None).await.unwrap(), vec![today]);
    }

    #[tokio::test]
    async fn watermark_mode_covers_yesterday_and_skips_seen_keys() {
        let seen = raw_segment_key("bitcoin", at(3, 22));
        let late = raw_segment_key("bitcoin", at(3, 23));
        let today = raw_segment_key("bitcoin", at(4, 1));
        let store = store_with(&[seen.clone(), late.clone(), today.clone()]).await;
        let scanner = SegmentScanner::new(store, "raw", "bitcoin", ScanMode::Watermark);

        let mark = Watermark { last_segment: seen, updated_at: at(3, 22) };
        assert_eq!(scanner.scan(at(4, 2), Some(&mark)).await.unwrap(), vec![late, today]);
    }

    #[tokio::test]
    async fn watermark_mode_reaches_back_to_the_watermark_day() {
        let seen = raw_segment_key("bitcoin", at(1, 10));
        let stalled = raw_segment_key("bitcoin", at(2, 10));
        let today = raw_segment_key("bitcoin", at(4, 1));
        let store = store_with(&[seen.clone(), stalled.clone(), today.clone()]).await;
        let scanner = SegmentScanner::new(store, "raw", "bitcoin", ScanMode::Watermark);

        let mark = Watermark { last_segment: seen, updated_at: at(1, 10) };
        assert_eq!(
            scanner.day_prefixes(at(4, 2), Some(&mark)),
            vec![
                "bitcoin/trades/2025/12/01/",
                "bitcoin/trades/2025/12/02/",
                "bitcoin/trades/2025/12/03/",
                "bitcoin/trades/2025/12/04/",
            ]
        );
        assert_eq!(scanner.scan(at(4, 2), Some(&mark)).await.unwrap(), vec![stalled, today]);
    }

    #[test]
    fn window_without_watermark_is_yesterday_and_today() {
        let scanner = SegmentScanner::new(Arc::new(MemoryStore::new()), "raw", "bitcoin", ScanMode::Watermark);
        assert_eq!(
            scanner.day_prefixes(at(4, 2), None),
            vec!["bitcoin/trades/2025/12/03/", "bitcoin/trades/2025/12/04/"]
        );

        let full_day = SegmentScanner::new(Arc::new(MemoryStore::new()), "raw", "bitcoin", ScanMode::FullDay);
        assert_eq!(full_day.day_prefixes(at(4, 2), None), vec!["bitcoin/trades/2025/12/04/"]);
    }

    #[test]
    fn watermark_day_falls_back_to_update_time() {
        let mark = Watermark { last_segment: "legacy.json".into(), updated_at: at(2, 5) };
        assert_eq!(mark.day("bitcoin"), at(2, 5).date_naive());
    }

    #[tokio::test]
    async fn missing_bucket_means_nothing_to_scan() {
        let scanner = SegmentScanner::new(Arc::new(MemoryStore::new()), "raw", "bitcoin", ScanMode::FullDay);
        assert!(scanner.scan(at(4, 2), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watermark_round_trips_through_clean_bucket() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let writer = SegmentWriter::new(store, "clean");
        let key = watermark_key("bitcoin");

        assert_eq!(Watermark::load(&writer, &key).await.unwrap(), None);

        let mark = Watermark { last_segment: "bitcoin/trades/x.json".into(), updated_at: at(4, 2) };
        mark.save(&writer, &key).await.unwrap();
        assert_eq!(Watermark::load(&writer, &key).await.unwrap(), Some(mark));
    }
}
