//! Manifest of videos to upload.
//!
//! The manifest is a JSON array of entries:
//!
//! ```json
//! [{ "file": "ep1.mp4", "title": "Episode 1", "description": "...",
//!    "hashtags": "#one #two", "tags": "one, two", "language": "en" }]
//! ```
//!
//! [`prompt_entries`] builds one interactively for the videos of a folder.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::core::{JobId, PrivacyStatus, UploadJob};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to list videos in {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read answer: {0}")]
    Prompt(#[source] std::io::Error),

    #[error("Failed to write manifest {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Written by `--init` when no manifest path is given.
pub const DEFAULT_MANIFEST_FILE: &str = "video_upload_metadata.json";

const VIDEO_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ManifestEntry {
    /// Relative to the video folder
    pub file: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hashtags: String,
    /// Comma-separated
    #[serde(default)]
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_status: Option<PrivacyStatus>,
}

/// Values applied to entries that do not set their own.
#[derive(Debug, Clone)]
pub struct JobDefaults {
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            category_id: "20".to_string(),
            privacy_status: PrivacyStatus::Public,
        }
    }
}

/// Manifest description followed by a blank line and the hashtags, if any.
pub fn compose_description(description: &str, hashtags: &str) -> String {
    if hashtags.is_empty() {
        description.to_string()
    } else {
        format!("{description}\n\n{hashtags}")
    }
}

/// Split a comma-separated tag list, trimming each tag.
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

impl ManifestEntry {
    pub fn into_job(self, video_folder: &Path, defaults: &JobDefaults) -> UploadJob {
        let language = self
            .language
            .map(|lang| lang.trim().to_string())
            .filter(|lang| !lang.is_empty());

        UploadJob {
            id: JobId::new(),
            file_path: video_folder.join(&self.file),
            description: compose_description(&self.description, &self.hashtags),
            tags: split_tags(&self.tags),
            title: self.title,
            language,
            category_id: self.category_id.unwrap_or_else(|| defaults.category_id.clone()),
            privacy_status: self.privacy_status.unwrap_or(defaults.privacy_status),
        }
    }
}

/// Parse a manifest into jobs, resolving files against `video_folder`.
pub fn parse_manifest(
    json: &str,
    video_folder: &Path,
    defaults: &JobDefaults,
) -> Result<Vec<UploadJob>, ManifestError> {
    let entries: Vec<ManifestEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|entry| entry.into_job(video_folder, defaults))
        .collect())
}

pub async fn load_manifest(
    path: &Path,
    video_folder: &Path,
    defaults: &JobDefaults,
) -> Result<Vec<UploadJob>, ManifestError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_manifest(&json, video_folder, defaults)
}

/// File names of the `.mp4` videos directly inside `folder`, sorted.
pub fn list_videos(folder: &Path) -> Result<Vec<String>, ManifestError> {
    let scan_error = |source| ManifestError::Scan {
        path: folder.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(scan_error)? {
        let entry = entry.map_err(scan_error)?;
        let path = entry.path();
        let is_video = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(VIDEO_EXTENSION));
        if is_video && path.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

/// Ask for a value on `output`, reading one line from `input`.
///
/// An empty line or end of input keeps `default`.
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    default: &str,
) -> std::io::Result<String> {
    if default.is_empty() {
        write!(output, "{prompt}: ")?;
    } else {
        write!(output, "{prompt} [{default}]: ")?;
    }
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

/// Prompt for the metadata of each file. Every answer becomes the default
/// for the same question on the next file.
pub fn prompt_entries<R: BufRead, W: Write>(
    files: &[String],
    input: &mut R,
    output: &mut W,
) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut previous = ManifestEntry::default();
    let mut entries = Vec::with_capacity(files.len());

    for file in files {
        writeln!(output, "\n{file}").map_err(ManifestError::Prompt)?;
        let mut prompt = |question: &str, default: &str| {
            ask(&mut *input, &mut *output, question, default).map_err(ManifestError::Prompt)
        };
        let title = prompt("Title", &previous.title)?;
        let description = prompt("Description", &previous.description)?;
        let hashtags = prompt("Hashtags", &previous.hashtags)?;
        let tags = prompt("Tags (comma separated)", &previous.tags)?;
        let language = prompt("Language (e.g. en, es)", previous.language.as_deref().unwrap_or(""))?;

        let entry = ManifestEntry {
            file: file.clone(),
            title,
            description,
            hashtags,
            tags,
            language: Some(language).filter(|lang| !lang.is_empty()),
            category_id: None,
            privacy_status: None,
        };
        previous = entry.clone();
        entries.push(entry);
    }

    Ok(entries)
}

pub async fn save_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<(), ManifestError> {
    let json = serde_json::to_string_pretty(entries)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        })
}
