use std::fmt;
use serde::{Deserialize, Serialize};
use super::errors::UploadError;
use super::types::{JobId, SessionHandle};

/// Lifecycle of one upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SessionState {
    /// Creating the remote session
    Initiating,
    /// Sending chunks
    Transferring,
    /// The service returned a video id
    Completed,
    Failed,
}

impl SessionState {
    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initiating => "initiating",
            SessionState::Transferring => "transferring",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Transfer state of one job, owned by the uploader for the job's lifetime.
#[derive(Debug)]
pub struct UploadSession {
    pub job_id: JobId,
    /// Set once the service accepts the session
    handle: Option<SessionHandle>,
    /// Highest offset the service has confirmed
    bytes_sent: u64,
    total_bytes: u64,
    state: SessionState,
}

impl UploadSession {
    pub fn new(job_id: JobId, total_bytes: u64) -> Self {
        debug_assert!(total_bytes > 0);
        Self {
            job_id,
            handle: None,
            bytes_sent: 0,
            total_bytes,
            state: SessionState::Initiating,
        }
    }

    /// Allowed edges of the session state graph.
    pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (from, to),
            (Initiating, Transferring)
                | (Initiating, Failed)
                | (Transferring, Transferring)
                | (Transferring, Completed)
                | (Transferring, Failed)
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes the service has not confirmed yet.
    pub fn remaining(&self) -> u64 {
        self.total_bytes - self.bytes_sent
    }

    /// Remote session, absent while still initiating.
    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    fn transition(&mut self, to: SessionState) -> SessionState {
        debug_assert!(
            Self::is_valid_transition(self.state, to),
            "invalid session transition {} -> {}",
            self.state,
            to
        );
        std::mem::replace(&mut self.state, to)
    }

    /// Session accepted by the service. Returns the previous state.
    pub fn begin(&mut self, handle: SessionHandle) -> SessionState {
        self.handle = Some(handle);
        self.transition(SessionState::Transferring)
    }

    /// Record a server-confirmed offset.
    ///
    /// The offset must not move backwards or past the end of the file.
    pub fn acknowledge(&mut self, offset: u64) -> Result<(), UploadError> {
        if offset < self.bytes_sent || offset > self.total_bytes {
            return Err(UploadError::UnexpectedResponse(format!(
                "acknowledged offset {} outside [{}, {}]",
                offset, self.bytes_sent, self.total_bytes
            )));
        }
        self.transition(SessionState::Transferring);
        self.bytes_sent = offset;
        Ok(())
    }

    /// The service returned the resource id; every byte counts as sent.
    pub fn complete(&mut self) -> SessionState {
        self.bytes_sent = self.total_bytes;
        self.transition(SessionState::Completed)
    }

    /// Abandon the session. The handle is kept for diagnostics.
    pub fn fail(&mut self) -> SessionState {
        self.transition(SessionState::Failed)
    }
}
