use async_trait::async_trait;
use bytes::Bytes;
use crate::auth::Credential;
use super::errors::Result;
use super::types::{ChunkAck, SessionHandle, UploadJob};

/// Remote side of the resumable upload protocol.
///
/// Implementations map these calls onto a concrete wire format; the state
/// machine only relies on the offsets and identifiers they return.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Declare the job's metadata and total size, returning a session handle.
    async fn create_session(
        &self,
        credential: &Credential,
        job: &UploadJob,
        total_bytes: u64,
    ) -> Result<SessionHandle>;

    /// Send `data` starting at `offset`.
    async fn send_chunk(
        &self,
        credential: &Credential,
        session: &SessionHandle,
        offset: u64,
        data: Bytes,
        total_bytes: u64,
    ) -> Result<ChunkAck>;

    /// Ask how much of the session the server has confirmed.
    async fn query_offset(
        &self,
        credential: &Credential,
        session: &SessionHandle,
        total_bytes: u64,
    ) -> Result<ChunkAck>;
}
