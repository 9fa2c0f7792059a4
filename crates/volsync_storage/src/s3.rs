//! Amazon S3 (and S3-compatible) object store.

use crate::error::{StoreError, StoreResult};
use crate::store::{ListPage, ObjectMeta, ObjectStore};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::Client;
use std::fmt;
use std::future::Future;
use std::io::{self, Read, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// An object store backed by the S3 API.
///
/// Credentials, region and endpoint come from the standard AWS provider
/// chain (`AWS_ACCESS_KEY_ID`, `AWS_REGION`, `AWS_ENDPOINT_URL`, profiles,
/// instance metadata and so on).
///
/// # Blocking
///
/// [`ObjectStore`] is synchronous. Each call drives the SDK on a small
/// runtime owned by the store, so calls must come from threads that are
/// not themselves running async tasks (plain threads or `spawn_blocking`).
///
/// # Uploads
///
/// The body is spooled to a temporary file first so the request carries a
/// known content length and large files are not held in memory.
pub struct S3Store {
    client: Client,
    runtime: Option<Runtime>,
}

impl S3Store {
    /// Connects using the default AWS configuration chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal runtime cannot be started.
    pub fn connect() -> StoreResult<Self> {
        let runtime = store_runtime()?;
        let sdk_config = runtime.block_on(aws_config::defaults(BehaviorVersion::latest()).load());
        let client = Client::new(&sdk_config);
        debug!(region = ?sdk_config.region(), "connected S3 client");
        Ok(Self {
            client,
            runtime: Some(runtime),
        })
    }

    /// Wraps an existing client.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal runtime cannot be started.
    pub fn with_client(client: Client) -> StoreResult<Self> {
        Ok(Self {
            client,
            runtime: Some(store_runtime()?),
        })
    }

    fn block_on<F: Future>(&self, future: F) -> StoreResult<F::Output> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(StoreError::backend("S3 store runtime has shut down")),
        }
    }
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Store").finish_non_exhaustive()
    }
}

impl Drop for S3Store {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn store_runtime() -> StoreResult<Runtime> {
    Ok(Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("volsync-s3")
        .enable_all()
        .build()?)
}

/// Converts an S3 timestamp to `SystemTime`.
fn system_time(timestamp: &DateTime) -> SystemTime {
    let nanos = Duration::from_nanos(u64::from(timestamp.subsec_nanos()));
    let secs = timestamp.secs();
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs()) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

/// Converts one ListObjectsV2 response into a page.
fn list_page_from(output: &ListObjectsV2Output) -> ListPage {
    let objects = output
        .contents()
        .iter()
        .filter_map(|object| {
            Some(ObjectMeta {
                key: object.key()?.to_string(),
                size: u64::try_from(object.size().unwrap_or_default()).unwrap_or_default(),
                last_modified: object
                    .last_modified()
                    .map(system_time)
                    .unwrap_or(UNIX_EPOCH),
            })
        })
        .collect();

    let next_token = if output.is_truncated().unwrap_or(false) {
        output.next_continuation_token().map(str::to_string)
    } else {
        None
    };

    ListPage {
        objects,
        next_token,
    }
}

fn backend_error<E: std::error::Error>(operation: &str, err: &E) -> StoreError {
    StoreError::backend(format!("S3 {operation} failed: {}", DisplayErrorContext(err)))
}

impl ObjectStore for S3Store {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage> {
        let request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation.map(str::to_string))
            .send();

        let output = self.block_on(request)?.map_err(|err| {
            if err
                .as_service_error()
                .is_some_and(|service| service.is_no_such_bucket())
            {
                StoreError::NoSuchBucket(bucket.to_string())
            } else {
                backend_error("ListObjectsV2", &err)
            }
        })?;
        Ok(list_page_from(&output))
    }

    fn get_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> StoreResult<u64> {
        self.block_on(async {
            let mut output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| {
                    if err
                        .as_service_error()
                        .is_some_and(|service| service.is_no_such_key())
                    {
                        StoreError::NoSuchKey {
                            bucket: bucket.to_string(),
                            key: key.to_string(),
                        }
                    } else {
                        backend_error("GetObject", &err)
                    }
                })?;

            let mut written = 0u64;
            while let Some(chunk) = output
                .body
                .try_next()
                .await
                .map_err(|err| backend_error("GetObject body", &err))?
            {
                sink.write_all(&chunk)?;
                written += chunk.len() as u64;
            }
            Ok::<u64, StoreError>(written)
        })?
    }

    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> StoreResult<u64> {
        let mut spool = NamedTempFile::new()?;
        let length = io::copy(body, &mut spool)?;
        spool.as_file().sync_all()?;

        self.block_on(async {
            let stream = ByteStream::from_path(spool.path())
                .await
                .map_err(|err| backend_error("PutObject body", &err))?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_length(i64::try_from(length).unwrap_or(i64::MAX))
                .body(stream)
                .send()
                .await
                .map_err(|err| backend_error("PutObject", &err))?;
            Ok::<u64, StoreError>(length)
        })?
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let request = self.client.delete_object().bucket(bucket).key(key).send();
        self.block_on(request)?
            .map_err(|err| backend_error("DeleteObject", &err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::types::Object;

    fn object(key: &str, size: i64, secs: i64) -> Object {
        Object::builder()
            .key(key)
            .size(size)
            .last_modified(DateTime::from_secs(secs))
            .build()
    }

    #[test]
    fn s3_timestamps_convert() {
        assert_eq!(
            system_time(&DateTime::from_secs(1_600_000_000)),
            UNIX_EPOCH + Duration::from_secs(1_600_000_000)
        );
        assert_eq!(
            system_time(&DateTime::from_secs_and_nanos(5, 250)),
            UNIX_EPOCH + Duration::new(5, 250)
        );
    }

    #[test]
    fn s3_listing_maps_to_page() {
        let output = ListObjectsV2Output::builder()
            .contents(object("vol/a.txt", 12, 100))
            .contents(object("vol/b.bin", 3, 200))
            .contents(Object::builder().size(1).build())
            .is_truncated(true)
            .next_continuation_token("token-1")
            .build();

        let page = list_page_from(&output);
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.objects[0].key, "vol/a.txt");
        assert_eq!(page.objects[0].size, 12);
        assert_eq!(
            page.objects[1].last_modified,
            UNIX_EPOCH + Duration::from_secs(200)
        );
        assert_eq!(page.next_token.as_deref(), Some("token-1"));
    }

    #[test]
    fn s3_last_page_has_no_token() {
        let output = ListObjectsV2Output::builder()
            .contents(object("k", 1, 1))
            .is_truncated(false)
            .next_continuation_token("ignored")
            .build();
        assert!(!list_page_from(&output).has_more());
    }

    #[test]
    fn s3_store_drops_inside_async_context() {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        let store = S3Store::with_client(Client::from_conf(config)).unwrap();

        let outer = Builder::new_current_thread().build().unwrap();
        outer.block_on(async move { drop(store) });
    }
}
