//! Image Upload Service
//!
//! Accepts an image upload, records its metadata in PostgreSQL, stores the
//! image in S3 under a key derived from the generated photo id, and notifies
//! downstream processors through EventBridge.
//!
//! ## Flow
//!
//! ```text
//!  request ──▶ decode ──▶ insert metadata ──▶ put object ──▶ publish events ──▶ response
//!                │              │                  │               │
//!               400            500           500 (photo id)   logged only
//! ```
//!
//! Every step runs once, in order. A failed upload leaves the metadata row
//! in place; a failed publish does not fail the request.
//!
//! ## Hosting
//!
//! - **Lambda**: the raw invocation payload is the event, the response
//!   envelope is the function result
//! - **HTTP**: `POST /upload` carries the payload as its body

pub mod api;
pub mod config;
pub mod date;
pub mod error;
pub mod event_publisher;
pub mod handler;
pub mod lambda;
pub mod metadata_store;
pub mod request;
pub mod response;
pub mod s3_uploader;

pub use config::{Config, FanOut, Runtime};
pub use error::UploadError;
pub use event_publisher::{EventBridgePublisher, EventPublisher, UploadCorrelation};
pub use handler::{UploadHandler, UploadSettings};
pub use metadata_store::{MetadataStore, PgMetadataStore, PhotoRecord};
pub use request::{decode_event, UploadRequest};
pub use response::ApiResponse;
pub use s3_uploader::{ObjectStore, S3Uploader};
