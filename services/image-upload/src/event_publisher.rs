//! Upload notifications on EventBridge.
//!
//! Every successful upload produces one `ImageUploaded` event plus one
//! processing event per downstream model. All events carry the same
//! correlation envelope so consumers can join them back to the photo.

use crate::config::{EventsConfig, FanOut};
use crate::error::UploadError;
use async_trait::async_trait;
use aws_sdk_eventbridge::config::Builder as EventBridgeConfigBuilder;
use aws_sdk_eventbridge::error::DisplayErrorContext;
use aws_sdk_eventbridge::types::PutEventsRequestEntry;
use aws_sdk_eventbridge::Client as EventBridgeClient;
use aws_types::SdkConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Detail type of the upload event
pub const UPLOADED_DETAIL_TYPE: &str = "ImageUploaded";
/// Processing type of the upload event
pub const UPLOAD_PROCESSING_TYPE: &str = "upload";
/// Model families of the fixed fan-out
pub const FIXED_MODEL_FAMILIES: [&str; 2] = ["lambda", "eks"];
/// Variants per family in the fixed fan-out
pub const FIXED_MODEL_VARIANTS: u32 = 3;
/// PutEvents accepts at most this many entries per call
pub const MAX_ENTRIES_PER_BATCH: usize = 10;

/// Fields shared by every event of one upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadCorrelation {
    pub request_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub company_id: Option<i64>,
    pub photo_id: i64,
    /// Unix seconds of the request
    pub timestamp: String,
}

/// JSON detail of a notification event
#[derive(Debug, Clone, Serialize)]
pub struct EventDetail<'a> {
    pub request_id: Uuid,
    pub bucket: &'a str,
    pub key: &'a str,
    pub company_id: Option<i64>,
    pub photo_id: i64,
    pub timestamp: &'a str,
    pub version: &'a str,
    pub photo_s3_url: &'a str,
    #[serde(rename = "processingType")]
    pub processing_type: &'a str,
}

/// One bus entry, ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub source: String,
    pub detail_type: String,
    pub detail: String,
    pub event_bus_name: String,
}

/// Publisher of upload notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish the upload event and its processing events.
    ///
    /// Returns the number of events accepted by the bus.
    async fn publish(
        &self,
        correlation: &UploadCorrelation,
        photo_s3_url: &str,
        models: &[String],
    ) -> Result<usize, UploadError>;
}

/// Processing types of the fixed fan-out: `lambda-model1` .. `eks-model3`
pub fn fixed_processing_types() -> Vec<String> {
    FIXED_MODEL_FAMILIES
        .iter()
        .flat_map(|family| (1..=FIXED_MODEL_VARIANTS).map(move |n| format!("{family}-model{n}")))
        .collect()
}

/// Detail type for a processing type, e.g. `Lambda-Model1Processing`
pub fn processing_detail_type(processing_type: &str) -> String {
    format!("{}Processing", title_case(processing_type))
}

/// Uppercase the first letter of every run of letters, lowercase the rest
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_word = false;

    for c in input.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }

    out
}

/// Build every event for an upload, upload event first
pub fn build_events(
    config: &EventsConfig,
    correlation: &UploadCorrelation,
    photo_s3_url: &str,
    models: &[String],
) -> Result<Vec<NotificationEvent>, UploadError> {
    let processing_types = match config.fan_out {
        FanOut::Fixed => fixed_processing_types(),
        FanOut::Requested => models.to_vec(),
    };

    let mut events = Vec::with_capacity(processing_types.len() + 1);
    events.push(build_event(
        config,
        correlation,
        photo_s3_url,
        UPLOADED_DETAIL_TYPE.to_string(),
        UPLOAD_PROCESSING_TYPE,
    )?);

    for processing_type in &processing_types {
        events.push(build_event(
            config,
            correlation,
            photo_s3_url,
            processing_detail_type(processing_type),
            processing_type,
        )?);
    }

    Ok(events)
}

fn build_event(
    config: &EventsConfig,
    correlation: &UploadCorrelation,
    photo_s3_url: &str,
    detail_type: String,
    processing_type: &str,
) -> Result<NotificationEvent, UploadError> {
    let detail = EventDetail {
        request_id: correlation.request_id,
        bucket: &correlation.bucket,
        key: &correlation.key,
        company_id: correlation.company_id,
        photo_id: correlation.photo_id,
        timestamp: &correlation.timestamp,
        version: &config.schema_version,
        photo_s3_url,
        processing_type,
    };

    let detail =
        serde_json::to_string(&detail).map_err(|e| UploadError::Publish(e.to_string()))?;

    Ok(NotificationEvent {
        source: config.source.clone(),
        detail_type,
        detail,
        event_bus_name: config.bus_name.clone(),
    })
}

/// Result of one `PutEvents` call that reached the bus
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutEventsOutcome {
    /// Entries the bus refused
    pub failed_entry_count: usize,
    /// Message of the first refused entry
    pub first_error: Option<String>,
}

/// A single `PutEvents` call. At most [`MAX_ENTRIES_PER_BATCH`] entries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn put_events(
        &self,
        entries: &[NotificationEvent],
    ) -> Result<PutEventsOutcome, UploadError>;
}

/// [`EventBus`] backed by the EventBridge client
pub struct EventBridgeBus {
    client: EventBridgeClient,
}

impl EventBridgeBus {
    pub fn new(sdk_config: &SdkConfig, config: &EventsConfig) -> Self {
        let mut builder = EventBridgeConfigBuilder::from(sdk_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        Self {
            client: EventBridgeClient::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl EventBus for EventBridgeBus {
    async fn put_events(
        &self,
        entries: &[NotificationEvent],
    ) -> Result<PutEventsOutcome, UploadError> {
        let entries: Vec<PutEventsRequestEntry> = entries
            .iter()
            .map(|event| {
                PutEventsRequestEntry::builder()
                    .source(&event.source)
                    .detail_type(&event.detail_type)
                    .detail(&event.detail)
                    .event_bus_name(&event.event_bus_name)
                    .build()
            })
            .collect();

        let output = self
            .client
            .put_events()
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| UploadError::Publish(DisplayErrorContext(&e).to_string()))?;

        let rejected: Vec<_> = output
            .entries()
            .iter()
            .filter(|entry| entry.error_code().is_some())
            .collect();

        Ok(PutEventsOutcome {
            failed_entry_count: rejected.len(),
            first_error: rejected
                .iter()
                .find_map(|entry| entry.error_message())
                .map(str::to_string),
        })
    }
}

/// EventBridge implementation of [`EventPublisher`]
pub struct EventBridgePublisher {
    bus: Arc<dyn EventBus>,
    config: EventsConfig,
}

impl EventBridgePublisher {
    /// Create a new publisher
    pub fn new(sdk_config: &SdkConfig, config: &EventsConfig) -> Self {
        Self::with_bus(Arc::new(EventBridgeBus::new(sdk_config, config)), config)
    }

    /// Create a publisher over an existing bus
    pub fn with_bus(bus: Arc<dyn EventBus>, config: &EventsConfig) -> Self {
        info!(
            bus = %config.bus_name,
            fan_out = ?config.fan_out,
            "EventBridge publisher initialized"
        );

        Self {
            bus,
            config: config.clone(),
        }
    }

    async fn put_batch(&self, batch: &[NotificationEvent]) -> Result<(), UploadError> {
        let outcome = self.bus.put_events(batch).await?;

        if outcome.failed_entry_count > 0 {
            return Err(UploadError::Publish(format!(
                "{} of {} entries rejected: {}",
                outcome.failed_entry_count,
                batch.len(),
                outcome.first_error.as_deref().unwrap_or("unknown error")
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for EventBridgePublisher {
    #[instrument(skip(self, correlation, photo_s3_url, models), fields(photo_id = correlation.photo_id))]
    async fn publish(
        &self,
        correlation: &UploadCorrelation,
        photo_s3_url: &str,
        models: &[String],
    ) -> Result<usize, UploadError> {
        let events = build_events(&self.config, correlation, photo_s3_url, models)?;

        debug!(count = events.len(), "Publishing upload events");

        for batch in events.chunks(MAX_ENTRIES_PER_BATCH) {
            if let Err(e) = self.put_batch(batch).await {
                warn!(error = %e, "Error sending events to EventBridge");
                metrics::counter!("upload.events.failed").increment(batch.len() as u64);
                return Err(e);
            }
        }

        metrics::counter!("upload.events.published").increment(events.len() as u64);

        Ok(events.len())
    }
}
