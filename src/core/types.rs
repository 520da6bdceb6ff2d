use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::errors::UploadError;

/// Identifies one upload job within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Private => "private",
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One video to upload, fully resolved from its manifest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadJob {
    pub id: JobId,
    pub file_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
}

/// Opaque handle binding chunk sends to one upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub String);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acknowledgment of a chunk send or status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAck {
    /// Server has durably received bytes `[0, acknowledged_offset)`.
    Partial { acknowledged_offset: u64 },
    /// Upload finished and the service created the resource.
    Complete { resource_id: String },
}

/// How a job ended
#[derive(Debug)]
pub enum Outcome {
    Succeeded(String),
    Failed(UploadError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn video_id(&self) -> Option<&str> {
        match self {
            Outcome::Succeeded(id) => Some(id),
            Outcome::Failed(_) => None,
        }
    }
}

/// Advisory observations emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A job has started
    Started {
        job_id: JobId,
        title: String,
    },

    /// Session state changed
    StateChanged {
        job_id: JobId,
        old_state: super::session::SessionState,
        new_state: super::session::SessionState,
    },

    /// Server-confirmed progress
    Progress {
        job_id: JobId,
        bytes_sent: u64,
        total_bytes: u64,
    },

    /// A chunk send failed and will be retried
    Retrying {
        job_id: JobId,
        offset: u64,
        attempt: u32,
        error: String,
    },

    Completed {
        job_id: JobId,
        video_id: String,
    },

    Failed {
        job_id: JobId,
        error: String,
    },
}

#[allow(dead_code)]
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<UploadJob>();
        assert_send::<UploadEvent>();
        assert_send::<Outcome>();
    }
};
