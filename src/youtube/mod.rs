mod client;
pub mod types;

pub use client::{
    CHUNK_GRANULARITY, UPLOAD_ENDPOINT, YouTubeClient, aligned_chunk_size, classify_status,
    parse_range_header,
};
