//! Main entry point for the segmented downloader
//!
//! The call chain flows as follows:
//!
//! User Code
//! ↓
//! Downloader (this file)
//! ↓
//! DownloadSession (session.rs)
//! ↓
//! run_segment, one task per segment (worker.rs)
//! ↓
//! Core types (core/*)

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;

use crate::downloader::{
    config::DownloadConfig,
    core::{
        DownloadMetrics, DownloadRequest, ProgressCallback, Result, files::SegmentNaming,
        http::build_client,
    },
    session::DownloadSession,
};

/// Segmented downloader
///
/// Holds the pooled HTTP client and configuration shared by every session it
/// starts. Each [`Downloader::download`] call runs one independent session.
pub struct Downloader {
    client: Client,
    config: DownloadConfig,
    metrics: Arc<DownloadMetrics>,
    progress_callback: Option<ProgressCallback>,
}

impl Downloader {
    /// Validate `config` and build the transport
    pub fn new(config: DownloadConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        Ok(Self {
            client,
            config,
            metrics: Arc::new(DownloadMetrics::default()),
            progress_callback: None,
        })
    }

    /// Receive [`ProgressEvent`](crate::ProgressEvent)s from every session
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Get access to built-in metrics
    pub fn metrics(&self) -> &DownloadMetrics {
        &self.metrics
    }

    /// Download `request.url` into `<output_dir>/<stem>.<sniffed extension>`
    ///
    /// The URL is checked before any network activity.
    pub async fn download(&self, request: DownloadRequest) -> Result<PathBuf> {
        let url = request.parsed_url()?;
        let stem = request.output_stem(&url);
        let naming = SegmentNaming::new(&self.config.output_dir, stem);

        let session = DownloadSession::new(
            self.client.clone(),
            self.config.clone(),
            Arc::clone(&self.metrics),
            self.progress_callback.clone(),
            url,
            naming,
        );
        session.run(request.interrupt).await
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
