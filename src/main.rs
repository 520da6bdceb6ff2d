use std::io::IsTerminal;
use std::path::PathBuf;
use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use video_uploader::auth::{ClientSecrets, GoogleOAuth};
use video_uploader::manifest::{DEFAULT_MANIFEST_FILE, list_videos, prompt_entries, save_manifest};
use video_uploader::reporter::ProgressReporter;
use video_uploader::youtube::aligned_chunk_size;
use video_uploader::{
    BatchOrchestrator, ChunkedUploader, Config, CredentialManager, CredentialStore, YouTubeClient,
    load_manifest,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("video-uploader");
    let init = args.get(1).is_some_and(|arg| arg == "--init");
    if init && (3..=4).contains(&args.len()) {
        let manifest_path = args.get(3).map_or(DEFAULT_MANIFEST_FILE, String::as_str);
        return init_manifest(PathBuf::from(&args[2]), PathBuf::from(manifest_path)).await;
    }
    if init || args.len() != 3 {
        eprintln!("Usage: {program} <video_folder> <metadata.json>");
        eprintln!("       {program} --init <video_folder> [metadata.json]");
        std::process::exit(1);
    }
    let video_folder = PathBuf::from(&args[1]);
    let manifest_path = PathBuf::from(&args[2]);

    let config = Config::load().context("load configuration")?;
    if !video_folder.is_dir() {
        tracing::warn!(folder = %video_folder.display(), "video folder does not exist");
    }

    let jobs = load_manifest(&manifest_path, &video_folder, &config.job_defaults())
        .await
        .context("load manifest")?;
    tracing::info!(jobs = jobs.len(), manifest = %manifest_path.display(), "manifest loaded");

    let secrets = ClientSecrets::load(&config.client_secret_file)
        .await
        .with_context(|| format!("load client secrets from {}", config.client_secret_file.display()))?;
    let credentials = CredentialManager::new(
        GoogleOAuth::new(secrets, config.request_timeout()),
        CredentialStore::new(&config.token_file),
    );

    let service = YouTubeClient::new(config.request_timeout()).context("build HTTP client")?;
    let chunk_size = aligned_chunk_size(config.chunk_size);
    let uploader = ChunkedUploader::new(service, config.uploader_config(chunk_size));
    let orchestrator = BatchOrchestrator::new(uploader, credentials, config.pause());

    let reporter = tokio::spawn(ProgressReporter::for_stderr().run(orchestrator.subscribe()));
    let report = orchestrator
        .run_all(jobs)
        .await
        .context("authenticate with YouTube")?;

    // closes the event channel so the reporter finishes
    drop(orchestrator);
    let _ = reporter.await;

    println!("{report}");
    Ok(())
}

/// Ask for each video's metadata and write the manifest.
async fn init_manifest(video_folder: PathBuf, manifest_path: PathBuf) -> anyhow::Result<()> {
    let files = list_videos(&video_folder)?;
    if files.is_empty() {
        anyhow::bail!("no .mp4 files in {}", video_folder.display());
    }
    tracing::info!(videos = files.len(), folder = %video_folder.display(), "building manifest");

    let entries = tokio::task::spawn_blocking(move || {
        let mut stdin = std::io::stdin().lock();
        let mut stdout = std::io::stdout().lock();
        prompt_entries(&files, &mut stdin, &mut stdout)
    })
    .await
    .context("prompt task panicked")??;

    save_manifest(&manifest_path, &entries).await?;
    println!(
        "Wrote {} entries to {}. Upload with: video-uploader {} {}",
        entries.len(),
        manifest_path.display(),
        video_folder.display(),
        manifest_path.display()
    );
    Ok(())
}
