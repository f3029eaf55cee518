// S3-compatible object store (AWS, MinIO, ...) holding the notes sync target.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use super::{ObjectStore, StoreError};

const CREDENTIALS_PROVIDER_NAME: &str = "notetally-config";

/// Connection parameters for an S3-compatible bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    /// Custom endpoint URL; empty means the AWS default for the region.
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client with static credentials and path-style addressing.
    pub async fn connect(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER_NAME,
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials);
        if !settings.endpoint.is_empty() {
            loader = loader.endpoint_url(settings.endpoint.clone());
        }
        let shared = loader.load().await;

        let config = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true).build();
        debug!(bucket = %settings.bucket, endpoint = %settings.endpoint, "s3 client configured");

        Self { client: Client::from_conf(config), bucket: settings.bucket.clone() }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectStore for S3ObjectStore {
    async fn list(
        &self,
        prefix: Option<&str>,
        start_after: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_start_after(start_after.map(str::to_string))
            .send()
            .await
            .map_err(|error| transport("list", &error))?;

        Ok(output.contents().iter().filter_map(|object| object.key()).map(str::to_string).collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let output = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => output,
            Err(error) if error.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(StoreError::NotFound { key: key.to_string() });
            }
            Err(error) => return Err(transport("get", &error)),
        };

        let data = output.body.collect().await.map_err(|error| StoreError::Transport {
            operation: "get",
            message: error.to_string(),
        })?;
        Ok(data.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|error| transport("put", &error))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| transport("delete", &error))?;
        Ok(())
    }
}

fn transport<E>(operation: &'static str, error: &E) -> StoreError
where
    E: std::error::Error + 'static,
{
    StoreError::Transport { operation, message: DisplayErrorContext(error).to_string() }
}
