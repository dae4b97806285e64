use crate::config::S3Config;
use crate::error::UploadError;
use crate::event_publisher::{EventPublisher, UploadCorrelation};
use crate::metadata_store::{MetadataStore, PhotoRecord};
use crate::request::{decode_event, DecodedUpload};
use crate::response::ApiResponse;
use crate::s3_uploader::{storage_key, ObjectStore};
use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Object settings applied to every upload
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Bucket used when the request does not name one
    pub default_bucket: Option<String>,
    pub content_type: String,
}

impl From<&S3Config> for UploadSettings {
    fn from(config: &S3Config) -> Self {
        Self {
            default_bucket: config.default_bucket.clone(),
            content_type: config.content_type.clone(),
        }
    }
}

/// Runs one upload: decode, insert metadata, store the object, publish events.
///
/// Collaborators are shared handles; nothing request-scoped is kept on them,
/// so one handler serves every invocation.
#[derive(Clone)]
pub struct UploadHandler {
    metadata_store: Arc<dyn MetadataStore>,
    object_store: Arc<dyn ObjectStore>,
    publisher: Arc<dyn EventPublisher>,
    settings: UploadSettings,
}

impl UploadHandler {
    pub fn new(
        metadata_store: Arc<dyn MetadataStore>,
        object_store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn EventPublisher>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            metadata_store,
            object_store,
            publisher,
            settings,
        }
    }

    /// Handle an inbound event and build the response.
    ///
    /// Never fails: every error, including a panic in a collaborator, is
    /// mapped to a status code here.
    #[instrument(skip_all, fields(request_id = %request_id))]
    pub async fn handle_with_request_id(&self, event: &Value, request_id: Uuid) -> ApiResponse {
        let outcome = AssertUnwindSafe(self.process(event, request_id))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(UploadError::Validation(message))) => {
                warn!(reason = %message, "Rejected upload request");
                metrics::counter!("upload.requests.rejected").increment(1);
                ApiResponse::error(400, message)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Upload failed");
                metrics::counter!("upload.requests.failed").increment(1);
                ApiResponse::internal_error()
            }
            Err(_) => {
                error!("Unexpected error: upload handler panicked");
                metrics::counter!("upload.requests.failed").increment(1);
                ApiResponse::internal_error()
            }
        }
    }

    /// Handle an inbound event under a fresh request id
    pub async fn handle(&self, event: &Value) -> ApiResponse {
        self.handle_with_request_id(event, Uuid::new_v4()).await
    }

    async fn process(&self, event: &Value, request_id: Uuid) -> Result<ApiResponse, UploadError> {
        let DecodedUpload { request, content } = decode_event(event)?;

        let now = Utc::now();
        let timestamp = now.timestamp().to_string();

        let record = PhotoRecord::from_request(&request, now)?;
        let photo_id = self.metadata_store.insert_photo(&record).await?;

        let key = storage_key(photo_id);
        let bucket = request
            .bucket_name
            .clone()
            .or_else(|| self.settings.default_bucket.clone())
            .ok_or_else(|| {
                UploadError::Unexpected(format!("no bucket configured for photo {photo_id}"))
            })?;

        // The metadata row stays in place if the upload fails
        if let Err(e) = self
            .object_store
            .put_object(&bucket, &key, content, &self.settings.content_type)
            .await
        {
            error!(error = %e, photo_id, bucket = %bucket, "Object upload failed");
            metrics::counter!("upload.requests.failed").increment(1);
            return Ok(ApiResponse::error(
                500,
                format!("Failed to upload file for photo {photo_id}"),
            ));
        }

        let photo_s3_url = self.object_store.object_url(&bucket, &key);
        let correlation = UploadCorrelation {
            request_id,
            bucket,
            key,
            company_id: request.company_id,
            photo_id,
            timestamp: timestamp.clone(),
        };
        let models = request.models.as_deref().unwrap_or_default();

        // Redelivery of failed events is left to the bus's dead-letter queue
        match self.publisher.publish(&correlation, &photo_s3_url, models).await {
            Ok(count) => info!(photo_id, count, "Upload events published"),
            Err(e) => warn!(
                error = %e,
                photo_id,
                "EventBridge event sending failed for photo"
            ),
        }

        metrics::counter!("upload.requests.succeeded").increment(1);
        info!(photo_id, company_id = ?request.company_id, "Upload successful");

        Ok(ApiResponse::success(photo_id, timestamp, request.company_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_publisher::MockEventPublisher;
    use crate::metadata_store::MockMetadataStore;
    use crate::request::{INVALID_CONTENT, MISSING_BODY};
    use crate::response::INTERNAL_ERROR;
    use crate::s3_uploader::MockObjectStore;
    use async_trait::async_trait;
    use serde_json::json;

    const URL: &str = "https://photos-bucket.s3.us-east-1.amazonaws.com/uploads/17";

    fn settings() -> UploadSettings {
        UploadSettings {
            default_bucket: None,
            content_type: "image/jpeg".to_string(),
        }
    }

    fn handler(
        store: MockMetadataStore,
        objects: MockObjectStore,
        publisher: MockEventPublisher,
    ) -> UploadHandler {
        UploadHandler::new(
            Arc::new(store),
            Arc::new(objects),
            Arc::new(publisher),
            settings(),
        )
    }

    fn upload_event() -> Value {
        json!({
            "body": {
                "models": ["lambda-model1", "eks-model2"],
                "bucket_name": "photos-bucket",
                "user_id": 7,
                "company_id": 42,
                "title": "Roof",
                "date_taken": "01/15/24",
                "image_data_encoded": "SGVsbG8gV29ybGQ="
            }
        })
    }

    fn body(response: &ApiResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    fn store_returning(photo_id: i64) -> MockMetadataStore {
        let mut store = MockMetadataStore::new();
        store
            .expect_insert_photo()
            .times(1)
            .returning(move |_| Ok(photo_id));
        store
    }

    fn objects_accepting() -> MockObjectStore {
        let mut objects = MockObjectStore::new();
        objects.expect_put_object().times(1).returning(|_, _, _, _| Ok(()));
        objects
            .expect_object_url()
            .returning(|bucket, key| format!("https://{bucket}.s3.us-east-1.amazonaws.com/{key}"));
        objects
    }

    fn untouched() -> (MockMetadataStore, MockObjectStore, MockEventPublisher) {
        let mut store = MockMetadataStore::new();
        store.expect_insert_photo().times(0);
        let mut objects = MockObjectStore::new();
        objects.expect_put_object().times(0);
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().times(0);
        (store, objects, publisher)
    }

    #[tokio::test]
    async fn test_successful_upload() {
        let mut store = MockMetadataStore::new();
        store
            .expect_insert_photo()
            .withf(|photo| {
                photo.company_id == Some(42)
                    && photo.title.as_deref() == Some("Roof")
                    && photo.date_taken.as_deref() == Some("2024-01-15")
            })
            .times(1)
            .returning(|_| Ok(17));

        let mut objects = MockObjectStore::new();
        objects
            .expect_put_object()
            .withf(|bucket, key, content, content_type| {
                bucket.to_string() == "photos-bucket"
                    && key.to_string() == "uploads/17"
                    && content.as_slice() == b"Hello World"
                    && content_type.to_string() == "image/jpeg"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        objects
            .expect_object_url()
            .returning(|_, _| URL.to_string());

        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|correlation, url, models| {
                correlation.photo_id == 17
                    && correlation.key == "uploads/17"
                    && correlation.bucket == "photos-bucket"
                    && correlation.company_id == Some(42)
                    && url.to_string() == URL
                    && models.len() == 2
            })
            .times(1)
            .returning(|_, _, _| Ok(7));

        let response = handler(store, objects, publisher).handle(&upload_event()).await;

        assert_eq!(response.status_code, 200);
        let body = body(&response);
        assert_eq!(body["message"], "Upload successful");
        assert_eq!(body["photo_id"], 17);
        assert_eq!(body["company_id"], 42);
        assert!(body["timestamp"].as_str().unwrap().parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_request_id_is_the_correlation_id() {
        let request_id = Uuid::new_v4();

        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(move |correlation, _, _| correlation.request_id == request_id)
            .times(1)
            .returning(|_, _, _| Ok(7));

        let response = handler(store_returning(17), objects_accepting(), publisher)
            .handle_with_request_id(&upload_event(), request_id)
            .await;

        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn test_missing_body_makes_no_calls() {
        let (store, objects, publisher) = untouched();

        let response = handler(store, objects, publisher).handle(&json!({})).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(body(&response)["error"], MISSING_BODY);
    }

    #[tokio::test]
    async fn test_invalid_base64_makes_no_calls() {
        let (store, objects, publisher) = untouched();
        let event = json!({"body": {"company_id": 42, "image_data_encoded": "%%%"}});

        let response = handler(store, objects, publisher).handle(&event).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(body(&response)["error"], INVALID_CONTENT);
    }

    #[tokio::test]
    async fn test_persistence_failure_skips_upload() {
        let (_, objects, publisher) = untouched();
        let mut store = MockMetadataStore::new();
        store
            .expect_insert_photo()
            .times(1)
            .returning(|_| Err(UploadError::Persistence("insert returned no identifier".into())));

        let response = handler(store, objects, publisher).handle(&upload_event()).await;

        assert_eq!(response.status_code, 500);
        assert_eq!(body(&response)["error"], INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_unreadable_date_is_internal_error() {
        let (store, objects, publisher) = untouched();
        let mut event = upload_event();
        event["body"]["date_taken"] = json!("garbage");

        let response = handler(store, objects, publisher).handle(&event).await;

        assert_eq!(response.status_code, 500);
        assert_eq!(body(&response)["error"], INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_storage_failure_references_photo() {
        let (_, _, publisher) = untouched();
        let mut objects = MockObjectStore::new();
        objects.expect_put_object().times(1).returning(|_, key, _, _| {
            Err(UploadError::Storage {
                key: key.to_string(),
                message: "AccessDenied".to_string(),
            })
        });

        let response = handler(store_returning(17), objects, publisher)
            .handle(&upload_event())
            .await;

        assert_eq!(response.status_code, 500);
        assert_eq!(body(&response)["error"], "Failed to upload file for photo 17");
    }

    #[tokio::test]
    async fn test_publish_failure_still_succeeds() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _, _| Err(UploadError::Publish("throttled".into())));

        let response = handler(store_returning(17), objects_accepting(), publisher)
            .handle(&upload_event())
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(body(&response)["photo_id"], 17);
    }

    #[tokio::test]
    async fn test_default_bucket_fallback() {
        let mut objects = MockObjectStore::new();
        objects
            .expect_put_object()
            .withf(|bucket, _, _, _| bucket.to_string() == "fallback-bucket")
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        objects.expect_object_url().returning(|_, _| URL.to_string());

        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().times(1).returning(|_, _, _| Ok(1));

        let handler = UploadHandler::new(
            Arc::new(store_returning(3)),
            Arc::new(objects),
            Arc::new(publisher),
            UploadSettings {
                default_bucket: Some("fallback-bucket".to_string()),
                content_type: "image/jpeg".to_string(),
            },
        );
        let event = json!({"body": {"image_data_encoded": "AAEC"}});

        let response = handler.handle(&event).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(body(&response)["company_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_missing_bucket_after_insert() {
        let (_, objects, publisher) = untouched();
        let event = json!({"body": {"company_id": 42, "image_data_encoded": "AAEC"}});

        let response = handler(store_returning(9), objects, publisher)
            .handle(&event)
            .await;

        assert_eq!(response.status_code, 500);
        assert_eq!(body(&response)["error"], INTERNAL_ERROR);
    }

    struct PanickingStore;

    #[async_trait]
    impl MetadataStore for PanickingStore {
        async fn insert_photo(&self, _photo: &PhotoRecord) -> Result<i64, UploadError> {
            panic!("connection reset mid-insert");
        }

        async fn ping(&self) -> Result<(), UploadError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panic_is_mapped_to_internal_error() {
        let (_, objects, publisher) = untouched();
        let handler = UploadHandler::new(
            Arc::new(PanickingStore),
            Arc::new(objects),
            Arc::new(publisher),
            settings(),
        );

        let response = handler.handle(&upload_event()).await;

        assert_eq!(response.status_code, 500);
        assert_eq!(body(&response)["error"], INTERNAL_ERROR);
    }
}
