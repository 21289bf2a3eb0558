//! Cliente S3-compatível (MinIO)

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};

/// [`ObjectStore`] sobre a API S3 (path-style, endpoint próprio).
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "whale-etl",
        );
        let s3_cfg = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .force_path_style(true)
            .endpoint_url(config.endpoint.clone())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .build();

        Self {
            client: Client::from_conf(s3_cfg),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(StorageError::request("head_bucket", bucket, "", DisplayErrorContext(err))),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            // Outro processo criou o bucket entre o head e o create
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(err) => Err(StorageError::request("create_bucket", bucket, "", DisplayErrorContext(err))),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StorageError::request("put_object", bucket, key, DisplayErrorContext(err)))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_bucket()) => {
                    return Err(StorageError::NoSuchBucket(bucket.to_string()));
                }
                Err(err) => {
                    return Err(StorageError::request(
                        "list_objects",
                        bucket,
                        prefix,
                        DisplayErrorContext(err),
                    ))
                }
            };
            keys.extend(page.contents().iter().filter_map(|obj| obj.key().map(str::to_string)));
        }

        keys.sort();
        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let resp = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(resp) => resp,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(StorageError::request("get_object", bucket, key, DisplayErrorContext(err))),
        };

        let body = resp
            .body
            .collect()
            .await
            .map_err(|err| StorageError::request("get_object", bucket, key, err))?;
        Ok(body.into_bytes().to_vec())
    }
}
