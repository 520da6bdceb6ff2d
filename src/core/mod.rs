mod errors;
mod orchestrator;
mod session;
mod traits;
mod types;
mod uploader;

pub use errors::{Result, ServiceError, UploadError};
pub use orchestrator::{BatchOrchestrator, DEFAULT_PAUSE, ReportEntry, RunReport};
pub use session::{SessionState, UploadSession};
pub use traits::UploadService;
pub use types::{ChunkAck, JobId, Outcome, PrivacyStatus, SessionHandle, UploadEvent, UploadJob};
pub use uploader::{ChunkedUploader, DEFAULT_CHUNK_SIZE, UploaderConfig};
