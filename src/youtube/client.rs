use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, HeaderValue, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use url::Url;
use crate::auth::Credential;
use crate::core::{ChunkAck, Result, ServiceError, SessionHandle, UploadJob, UploadService};
use super::types::{ApiErrorBody, UploadedVideo, VideoResource};

/// Resumable upload endpoint of the YouTube Data API v3.
pub const UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// Every chunk but the last must be a multiple of this.
pub const CHUNK_GRANULARITY: usize = 256 * 1024;

/// Round a requested chunk size down to what the service accepts.
pub fn aligned_chunk_size(requested: usize) -> usize {
    (requested / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY
}

/// YouTube Data API v3 resumable uploads.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    endpoint: String,
}

impl YouTubeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoint(UPLOAD_ENDPOINT, timeout)
    }

    /// Client against another endpoint, used by tests.
    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            // 308 means "resume incomplete" here, never follow it
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    fn resolve_location(&self, location: &str) -> Result<String> {
        let base = Url::parse(&self.endpoint)
            .map_err(|err| ServiceError::unexpected(format!("invalid endpoint {:?}: {err}", self.endpoint)))?;
        let url = base
            .join(location)
            .map_err(|err| ServiceError::unexpected(format!("invalid session location {location:?}: {err}")))?;
        Ok(url.to_string())
    }

    async fn interpret_ack(response: Response) -> Result<ChunkAck> {
        let status = response.status();
        match status {
            StatusCode::OK | StatusCode::CREATED => {
                let video: UploadedVideo = response.json().await.map_err(|err| {
                    ServiceError::unexpected(format!("final response without video id: {err}"))
                })?;
                Ok(ChunkAck::Complete { resource_id: video.id })
            }
            StatusCode::PERMANENT_REDIRECT => {
                let acknowledged_offset = parse_range_header(response.headers())?;
                Ok(ChunkAck::Partial { acknowledged_offset })
            }
            _ => Err(error_from_response(response).await),
        }
    }
}

/// `Range: bytes=0-N` means bytes up to and including N are stored.
pub fn parse_range_header(headers: &HeaderMap) -> Result<u64> {
    let Some(value) = headers.get(RANGE) else {
        return Ok(0);
    };

    let value = value
        .to_str()
        .map_err(|err| ServiceError::unexpected(format!("invalid Range header: {err}")))?;
    let last = value
        .strip_prefix("bytes=")
        .and_then(|range| range.split_once('-'))
        .filter(|(first, _)| first.trim() == "0")
        .map(|(_, last)| last.trim())
        .ok_or_else(|| ServiceError::unexpected(format!("malformed Range header {value:?}")))?;

    let last: u64 = last
        .parse()
        .map_err(|err| ServiceError::unexpected(format!("malformed Range header {value:?}: {err}")))?;

    Ok(last + 1)
}

/// Map a non-success status and its body onto the error taxonomy.
pub fn classify_status(status: u16, body: &str) -> ServiceError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let message = match &parsed {
        Some(parsed) if !parsed.error.message.is_empty() => parsed.error.message.clone(),
        _ => body.chars().take(200).collect(),
    };
    let rate_limited = parsed
        .as_ref()
        .map(|p| {
            p.error
                .errors
                .iter()
                .any(|e| e.reason == "rateLimitExceeded" || e.reason == "userRateLimitExceeded")
        })
        .unwrap_or(false);

    match status {
        401 => ServiceError::Unauthorized(message),
        403 if rate_limited => ServiceError::server_error(status, message),
        429 | 500..=599 => ServiceError::server_error(status, message),
        400..=499 => ServiceError::rejected(status, message),
        _ => ServiceError::unexpected(format!("status {status}: {message}")),
    }
}

async fn error_from_response(response: Response) -> ServiceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, &body)
}

#[async_trait]
impl UploadService for YouTubeClient {
    async fn create_session(
        &self,
        credential: &Credential,
        job: &UploadJob,
        total_bytes: u64,
    ) -> Result<SessionHandle> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&credential.access_token)
            .header("X-Upload-Content-Length", total_bytes.to_string())
            .header("X-Upload-Content-Type", "video/*")
            .json(&VideoResource::from_job(job))
            .send()
            .await?;

        if response.status() != StatusCode::OK && response.status() != StatusCode::CREATED {
            return Err(error_from_response(response).await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or_else(|| ServiceError::unexpected("no 'location' header in response"))?
            .to_str()
            .map_err(|err| ServiceError::unexpected(format!("invalid 'location' header: {err}")))?;

        Ok(SessionHandle(self.resolve_location(location)?))
    }

    async fn send_chunk(
        &self,
        credential: &Credential,
        session: &SessionHandle,
        offset: u64,
        data: Bytes,
        total_bytes: u64,
    ) -> Result<ChunkAck> {
        let last = offset + data.len() as u64 - 1;
        let response = self
            .client
            .put(&session.0)
            .bearer_auth(&credential.access_token)
            .header(CONTENT_LENGTH, data.len())
            .header(CONTENT_RANGE, format!("bytes {offset}-{last}/{total_bytes}"))
            .body(data)
            .send()
            .await?;

        Self::interpret_ack(response).await
    }

    async fn query_offset(
        &self,
        credential: &Credential,
        session: &SessionHandle,
        total_bytes: u64,
    ) -> Result<ChunkAck> {
        let response = self
            .client
            .put(&session.0)
            .bearer_auth(&credential.access_token)
            .header(CONTENT_LENGTH, HeaderValue::from_static("0"))
            .header(CONTENT_RANGE, format!("bytes */{total_bytes}"))
            .send()
            .await?;

        Self::interpret_ack(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_parse_range_header() {
        assert_eq!(parse_range_header(&HeaderMap::new()).unwrap(), 0);
        assert_eq!(parse_range_header(&range("bytes=0-262143")).unwrap(), 262144);
        assert_eq!(parse_range_header(&range("bytes=0-0")).unwrap(), 1);

        assert!(parse_range_header(&range("bytes=5-10")).is_err());
        assert!(parse_range_header(&range("items=0-10")).is_err());
        assert!(parse_range_header(&range("bytes=0-x")).is_err());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(401, ""), ServiceError::Unauthorized(_)));
        assert!(classify_status(503, "busy").is_retryable());
        assert!(classify_status(429, "").is_retryable());

        let quota = r#"{"error":{"code":403,"message":"quota","errors":[{"reason":"quotaExceeded"}]}}"#;
        let err = classify_status(403, quota);
        assert!(!err.is_retryable());
        assert!(matches!(err, ServiceError::Rejected { status_code: 403, ref message } if message == "quota"));

        let rate = r#"{"error":{"code":403,"message":"slow down","errors":[{"reason":"userRateLimitExceeded"}]}}"#;
        assert!(classify_status(403, rate).is_retryable());

        assert!(matches!(classify_status(400, "bad"), ServiceError::Rejected { .. }));
    }

    #[test]
    fn test_aligned_chunk_size() {
        assert_eq!(aligned_chunk_size(1), CHUNK_GRANULARITY);
        assert_eq!(aligned_chunk_size(CHUNK_GRANULARITY * 3 + 17), CHUNK_GRANULARITY * 3);
        assert_eq!(aligned_chunk_size(8 * 1024 * 1024), 8 * 1024 * 1024);
    }

    mod wire {
        use super::*;
        use chrono::{TimeDelta, Utc};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};
        use tokio::task::JoinHandle;
        use crate::core::{JobId, PrivacyStatus};

        /// Request head (lowercased) and body as received by the server.
        struct Captured {
            head: String,
            body: Vec<u8>,
        }

        async fn read_request(socket: &mut TcpStream) -> Captured {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);

                let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .map(|value| value.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    return Captured {
                        head,
                        body: buf[end + 4..end + 4 + len].to_vec(),
                    };
                }
            }
            panic!("connection closed before the request was complete");
        }

        /// Serve one connection with a canned response.
        async fn serve_once(response: &'static str) -> (String, JoinHandle<Captured>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let server = tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
                request
            });
            (format!("http://{addr}"), server)
        }

        fn client(base: &str) -> YouTubeClient {
            YouTubeClient::with_endpoint(&format!("{base}/upload"), Duration::from_secs(5)).unwrap()
        }

        fn credential() -> Credential {
            Credential::new("secret-token", Utc::now() + TimeDelta::hours(1), None)
        }

        fn job() -> UploadJob {
            UploadJob {
                id: JobId::new(),
                file_path: "a.mp4".into(),
                title: "Episode 1".to_string(),
                description: "desc".to_string(),
                tags: vec!["x".to_string()],
                language: None,
                category_id: "20".to_string(),
                privacy_status: PrivacyStatus::Private,
            }
        }

        #[tokio::test]
        async fn test_create_session_follows_location() {
            let (base, server) = serve_once(
                "HTTP/1.1 200 OK\r\nLocation: /upload?upload_id=xyz\r\nContent-Length: 0\r\n\r\n",
            )
            .await;

            let handle = client(&base).create_session(&credential(), &job(), 20).await.unwrap();
            assert_eq!(handle, SessionHandle(format!("{base}/upload?upload_id=xyz")));

            let request = server.await.unwrap();
            assert!(request.head.starts_with("post /upload?uploadtype=resumable&part=snippet%2cstatus "));
            assert!(request.head.contains("authorization: bearer secret-token"));
            assert!(request.head.contains("x-upload-content-length: 20"));

            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            assert_eq!(body["snippet"]["title"], "Episode 1");
            assert_eq!(body["status"]["privacyStatus"], "private");
        }

        #[tokio::test]
        async fn test_create_session_without_location() {
            let (base, _server) =
                serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;

            let err = client(&base).create_session(&credential(), &job(), 20).await;
            assert!(matches!(err, Err(ServiceError::UnexpectedResponse(_))));
        }

        #[tokio::test]
        async fn test_send_chunk_partial_acknowledgment() {
            let (base, server) = serve_once(
                "HTTP/1.1 308 Resume Incomplete\r\nRange: bytes=0-3\r\nContent-Length: 0\r\n\r\n",
            )
            .await;
            let session = SessionHandle(format!("{base}/upload?upload_id=xyz"));

            let ack = client(&base)
                .send_chunk(&credential(), &session, 0, Bytes::from_static(b"abcdefgh"), 20)
                .await
                .unwrap();
            assert_eq!(ack, ChunkAck::Partial { acknowledged_offset: 4 });

            let request = server.await.unwrap();
            assert!(request.head.starts_with("put /upload?upload_id=xyz "));
            assert!(request.head.contains("content-range: bytes 0-7/20"));
            assert_eq!(request.head.matches("content-length:").count(), 1);
            assert_eq!(request.body, b"abcdefgh");
        }

        #[tokio::test]
        async fn test_send_final_chunk_returns_video_id() {
            let (base, server) = serve_once(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 15\r\n\r\n{\"id\":\"abc123\"}",
            )
            .await;
            let session = SessionHandle(format!("{base}/upload?upload_id=xyz"));

            let ack = client(&base)
                .send_chunk(&credential(), &session, 12, Bytes::from_static(b"12345678"), 20)
                .await
                .unwrap();
            assert_eq!(ack, ChunkAck::Complete { resource_id: "abc123".to_string() });
            assert!(server.await.unwrap().head.contains("content-range: bytes 12-19/20"));
        }

        #[tokio::test]
        async fn test_query_offset_without_range_is_zero() {
            let (base, server) = serve_once(
                "HTTP/1.1 308 Resume Incomplete\r\nContent-Length: 0\r\n\r\n",
            )
            .await;
            let session = SessionHandle(format!("{base}/upload?upload_id=xyz"));

            let ack = client(&base).query_offset(&credential(), &session, 20).await.unwrap();
            assert_eq!(ack, ChunkAck::Partial { acknowledged_offset: 0 });

            let request = server.await.unwrap();
            assert!(request.head.contains("content-range: bytes */20"));
            assert!(request.body.is_empty());
        }

        #[tokio::test]
        async fn test_unauthorized_response() {
            let (base, _server) = serve_once(
                "HTTP/1.1 401 Unauthorized\r\nContent-Length: 38\r\n\r\n{\"error\":{\"code\":401,\"message\":\"bad\"}}",
            )
            .await;
            let session = SessionHandle(format!("{base}/upload?upload_id=xyz"));

            let err = client(&base)
                .send_chunk(&credential(), &session, 0, Bytes::from_static(b"abcd"), 4)
                .await;
            assert!(matches!(err, Err(ServiceError::Unauthorized(message)) if message == "bad"));
        }

        #[tokio::test]
        async fn test_stalled_server_times_out() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let _server = tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });

            let client = YouTubeClient::with_endpoint(
                &format!("http://{addr}/upload"),
                Duration::from_millis(300),
            )
            .unwrap();
            let session = SessionHandle(format!("http://{addr}/upload?upload_id=xyz"));

            let err = client.query_offset(&credential(), &session, 20).await;
            assert!(matches!(err, Err(ServiceError::Timeout)));
        }
    }

    #[test]
    fn test_resolve_relative_location() {
        let client = YouTubeClient::with_endpoint("https://upload.example.com/videos", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.resolve_location("/session/abc?upload_id=1").unwrap(),
            "https://upload.example.com/session/abc?upload_id=1"
        );
        assert_eq!(
            client.resolve_location("https://other.example.com/s").unwrap(),
            "https://other.example.com/s"
        );
    }
}
