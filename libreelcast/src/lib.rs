//! Reelcast - publish one short video to YouTube Shorts and Instagram Reels
//!
//! The library validates a video against each platform's limits, publishes
//! it to every compatible platform concurrently, retries what is worth
//! retrying, and reports an independent outcome per platform.

pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod media;
pub mod orchestrator;
pub mod platforms;
pub mod retry;
pub mod transport;
pub mod types;
pub mod uploader;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{PlatformError, ReelcastError, Result};
pub use media::VideoSource;
pub use orchestrator::UploadOrchestrator;
pub use types::{ErrorKind, PlatformId, Privacy, UploadOutcome, UploadResult, VideoMetadata};
pub use uploader::VideoUploader;
pub use validation::{ValidationReport, Validator};
