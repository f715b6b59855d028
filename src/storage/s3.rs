//! S3 object store
//!
//! Region comes from the default provider chain, falling back to the
//! configured region. A custom endpoint (config `endpoint` or
//! `AWS_ENDPOINT_URL`) switches to path-style addressing so MinIO and
//! similar services work without DNS-style buckets.

use super::{ObjectInfo, ObjectStore, StorageError, StorageResult};
use crate::config::Config;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

/// S3-backed object store
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl S3Store {
    /// Build a client from the configuration and the ambient AWS environment
    pub async fn connect(config: &Config) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("S3 bucket not configured".to_string()));
        }

        let region = aws_config::Region::new(config.region.clone());
        let region_provider = RegionProviderChain::default_provider().or_else(region);

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider);

        let endpoint = config
            .endpoint
            .clone()
            .or_else(|| std::env::var("AWS_ENDPOINT_URL").ok())
            .filter(|e| !e.is_empty());
        if let Some(ref url) = endpoint {
            debug!("Using custom S3 endpoint: {}", url);
            loader = loader.endpoint_url(url);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(endpoint.is_some())
            .build();

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| config.region.clone());

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            region,
            endpoint,
        })
    }
}

/// Map an SDK failure onto the gateway taxonomy
fn classify<E>(operation: &'static str, key: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let code = service.err().code().unwrap_or("Unknown");
            match (status, code) {
                (_, "NoSuchBucket") => {
                    StorageError::Rejected(format!("{operation} {key}: bucket does not exist"))
                }
                (404, _) | (_, "NoSuchKey") | (_, "NotFound") => {
                    StorageError::NotFound(key.to_string())
                }
                (429, _) | (500..=599, _) | (_, "SlowDown") => StorageError::Transport(format!(
                    "{operation} {key}: {code} (HTTP {status})"
                )),
                _ => StorageError::Rejected(format!("{operation} {key}: {code} (HTTP {status})")),
            }
        }
        SdkError::ConstructionFailure(_) => {
            StorageError::Config(format!("{operation} {key}: {}", DisplayErrorContext(&err)))
        }
        _ => StorageError::Transport(format!("{operation} {key}: {}", DisplayErrorContext(&err))),
    }
}

fn to_utc(ts: &aws_sdk_s3::primitives::DateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos()).unwrap_or_else(Utc::now)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match classify("head", key, e) {
                StorageError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading s3://{}/{}", self.bucket, key);
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("get", key, e))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Transport(format!("reading body of {key}: {e}")))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let size = body.len();
        debug!("Uploading s3://{}/{} ({} bytes)", self.bucket, key, size);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(i64::try_from(size).unwrap_or(i64::MAX))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify("put", key, e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| classify("list", prefix, e))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: u64::try_from(object.size().unwrap_or(0)).unwrap_or(0),
                    last_modified: object.last_modified().map(to_utc).unwrap_or_else(Utc::now),
                });
            }

            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting s3://{}/{}", self.bucket, key);
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match classify("delete", key, e) {
                StorageError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    fn describe(&self) -> String {
        match self.endpoint {
            Some(ref endpoint) => format!("s3://{} ({}, {})", self.bucket, self.region, endpoint),
            None => format!("s3://{} ({})", self.bucket, self.region),
        }
    }
}
