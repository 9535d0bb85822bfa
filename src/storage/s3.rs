use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{error::DisplayErrorContext, primitives::ByteStream, Client};
use tracing::{debug, info, instrument};

use super::{ColdStorage, StorageError};

// ---

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

#[derive(Clone)]
pub struct S3ColdStorage {
    client: Client,
    bucket: String,
}

impl S3ColdStorage {
    // ---
    /// Build a client from the default AWS credential chain plus overrides.
    pub async fn connect(settings: &S3Settings) -> Self {
        // ---
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(settings.force_path_style)
            .build();

        info!("Cold storage client initialized for bucket: {}", settings.bucket);

        Self {
            client: Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
        }
    }
}

#[async_trait]
impl ColdStorage for S3ColdStorage {
    // ---
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        // ---
        debug!("Downloading s3://{}/{}", self.bucket, key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                debug!("s3://{}/{} does not exist yet", self.bucket, key);
                return Ok(None);
            }
            Err(e) => return Err(StorageError::Backend(DisplayErrorContext(&e).to_string())),
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);
        Ok(Some(data))
    }

    #[instrument(skip(self, bytes))]
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        // ---
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/csv")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {} bytes to s3://{}/{}", size, self.bucket, key);
        Ok(())
    }
}
