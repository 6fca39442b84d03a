//! Media conversion pipeline for club meeting recordings.
//!
//! Two pipelines share one skeleton: stage an untrusted payload into a
//! unique scratch directory, drive an external converter process,
//! validate what it wrote, relay the artifact, and remove the scratch
//! directory no matter how the job ended.
//!
//! - audio recording → plaintext transcript (returned inline)
//! - slide deck → thumbnail image (uploaded to object storage)

pub mod config;
pub mod converter;
pub mod error;
pub mod global;
pub mod pipeline;
pub mod relay;
pub mod transcript;
pub mod validate;
pub mod workspace;

pub use config::PipelineConfig;
pub use error::{ConvertError, Disposition};
pub use pipeline::{
    ConversionJob, JobKind, MediaPipeline, MediaSource, StoredThumbnail, Transcript,
};
pub use relay::{thumbnail_key, HttpObjectStore, ObjectStore};
