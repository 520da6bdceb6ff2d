use serde::{Deserialize, Serialize};
use crate::core::{PrivacyStatus, UploadJob};

/// Body of the session-creation request.
#[derive(Debug, Serialize)]
pub struct VideoResource<'a> {
    pub snippet: Snippet<'a>,
    pub status: Status,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub tags: &'a [String],
    pub category_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_audio_language: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub privacy_status: PrivacyStatus,
}

impl<'a> VideoResource<'a> {
    pub fn from_job(job: &'a UploadJob) -> Self {
        let language = job.language.as_deref();
        Self {
            snippet: Snippet {
                title: &job.title,
                description: &job.description,
                tags: &job.tags,
                category_id: &job.category_id,
                default_language: language,
                default_audio_language: language,
            },
            status: Status {
                privacy_status: job.privacy_status,
            },
        }
    }
}

/// The part of the final response we care about.
#[derive(Debug, Deserialize)]
pub struct UploadedVideo {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorItem {
    #[serde(default)]
    pub reason: String,
}
