pub mod auth;
pub mod config;
pub mod core;
pub mod manifest;
pub mod reporter;
pub mod utils;
pub mod youtube;

pub use auth::{
    AuthError, Credential, CredentialManager, CredentialSource, CredentialStore, IdentityProvider,
};
pub use config::Config;
pub use core::{
    BatchOrchestrator, ChunkAck, ChunkedUploader, JobId, Outcome, PrivacyStatus, RunReport,
    ServiceError, SessionHandle, SessionState, UploadError, UploadEvent, UploadJob, UploadService,
    UploaderConfig,
};
pub use manifest::{JobDefaults, load_manifest};
pub use youtube::YouTubeClient;
