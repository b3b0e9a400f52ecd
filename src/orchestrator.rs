//! Album and artist batches on top of the download engine.
//!
//! # Overview
//!
//! [`Orchestrator::download_album`] loads an album page, creates the
//! `"Artist - Title (Year)"` directory, fetches the cover, resolves every song
//! page to its file URL and hands the files to the [`DownloadEngine`]. The
//! per-item outcomes are folded into a [`BatchResult`].
//!
//! [`Orchestrator::download_artist`] runs albums one after another, checking
//! the cancellation token between them.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use albumdl_core::download::{DownloadEngine, HttpClient, Reporter, RetryPolicy, TransportConfig};
//! use albumdl_core::orchestrator::Orchestrator;
//! use albumdl_core::site::MyzukaSource;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&TransportConfig::default())?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(MyzukaSource::new(client.clone())),
//!     DownloadEngine::new(3, RetryPolicy::default())?,
//!     client,
//!     Reporter::disabled(),
//!     CancellationToken::new(),
//! );
//! let result = orchestrator
//!     .download_album("https://myzuka.club/Album/630746/x")
//!     .await?;
//! println!("complete: {}", result.is_complete());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::download::constants::COVER_NAME;
use crate::download::{
    DownloadEngine, DownloadError, FailureType, HttpClient, ItemOutcome, Reporter,
    TransferOutcome, WorkItem, classify_error, sanitize_path_component,
};
use crate::site::{AlbumSource, PartialMetadata, TrackLink};

const ALBUM_MARKER: &str = "/album/";
const ARTIST_MARKER: &str = "/artist/";
const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_TITLE: &str = "Unknown Album";

/// What a command-line URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single album page.
    Album(String),
    /// An artist page listing albums.
    Artist(String),
}

impl Target {
    /// Classifies `url` by its `/Artist/` or `/Album/` path segment, ignoring
    /// case. Artist wins when both appear.
    #[must_use]
    pub fn parse(url: &str) -> Option<Self> {
        let lowered = url.to_lowercase();
        if lowered.contains(ARTIST_MARKER) {
            Some(Self::Artist(url.to_string()))
        } else if lowered.contains(ALBUM_MARKER) {
            Some(Self::Album(url.to_string()))
        } else {
            None
        }
    }

    /// The URL itself.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Album(url) | Self::Artist(url) => url,
        }
    }
}

/// Complete album identity used to name the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumMetadata {
    /// Performing artist.
    pub artist: String,
    /// Album title.
    pub title: String,
    /// Release year, if known.
    pub year: Option<String>,
}

impl AlbumMetadata {
    /// `"Artist - Title (Year)"`, or `"Artist - Title"` without a year,
    /// sanitized for use as a single path component.
    #[must_use]
    pub fn directory_name(&self) -> String {
        let name = match self.year.as_deref().map(str::trim) {
            Some(year) if !year.is_empty() => {
                format!("{} - {} ({year})", self.artist, self.title)
            }
            _ => format!("{} - {}", self.artist, self.title),
        };
        sanitize_path_component(&name)
    }
}

impl fmt::Display for AlbumMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.artist,
            self.title,
            self.year.as_deref().unwrap_or("")
        )
    }
}

/// Album field the page did not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    /// Artist name.
    Artist,
    /// Album title.
    Title,
    /// Release year.
    Year,
}

impl MetadataField {
    /// Human-readable label for prompts.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Artist => "ARTIST NAME",
            Self::Title => "ALBUM NAME",
            Self::Year => "ALBUM YEAR",
        }
    }
}

/// Supplies album fields missing from the page.
#[async_trait]
pub trait MetadataPrompt: Send + Sync {
    /// Returns a value for `field`, or `None` to leave it to the default.
    async fn ask(&self, field: MetadataField) -> Option<String>;
}

/// Prompt that never answers; missing fields fall back to placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

#[async_trait]
impl MetadataPrompt for NoPrompt {
    async fn ask(&self, _field: MetadataField) -> Option<String> {
        None
    }
}

/// Fills the gaps in `partial` through `prompt`.
pub async fn complete_metadata(
    partial: PartialMetadata,
    prompt: &dyn MetadataPrompt,
) -> AlbumMetadata {
    async fn field(
        value: Option<String>,
        which: MetadataField,
        prompt: &dyn MetadataPrompt,
    ) -> Option<String> {
        match value {
            Some(value) => Some(value),
            None => prompt
                .ask(which)
                .await
                .map(|answer| answer.trim().to_string())
                .filter(|answer| !answer.is_empty()),
        }
    }

    AlbumMetadata {
        artist: field(partial.artist, MetadataField::Artist, prompt)
            .await
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        title: field(partial.title, MetadataField::Title, prompt)
            .await
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        year: field(partial.year, MetadataField::Year, prompt).await,
    }
}

/// Error type for batch operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Album or artist page could not be loaded.
    #[error("failed to load page {url}")]
    Page {
        /// Page URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: DownloadError,
    },

    /// Album directory could not be created.
    #[error("failed to create directory {path}")]
    CreateDirectory {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled before the batch started.
    #[error("cancelled while loading {url}")]
    Cancelled {
        /// Page being loaded.
        url: String,
    },
}

impl OrchestratorError {
    fn page(url: &str, source: DownloadError) -> Self {
        if source.is_cancelled() {
            Self::Cancelled {
                url: url.to_string(),
            }
        } else {
            Self::Page {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Aggregate result of one album.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Album directory.
    pub directory_path: PathBuf,
    /// Tracks found on the page.
    pub items_total: usize,
    /// Tracks that did not end complete, cancelled ones included.
    pub items_failed: usize,
    /// The site lists tracks it no longer serves, or lists none at all.
    pub absent_remote: bool,
    /// Cancellation interrupted the batch.
    pub cancelled: bool,
    /// Per-track outcomes from the engine.
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchResult {
    /// True when every track is on disk.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.absent_remote && self.items_failed == 0 && !self.cancelled
    }
}

/// Aggregate result of an artist run.
#[derive(Debug, Clone, Default)]
pub struct ArtistResult {
    /// Albums that were attempted.
    pub albums: Vec<BatchResult>,
    /// Albums whose page or directory failed before any download.
    pub albums_failed: usize,
    /// Cancellation stopped the run.
    pub cancelled: bool,
}

impl ArtistResult {
    /// True when every album completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.albums_failed == 0 && self.albums.iter().all(BatchResult::is_complete)
    }
}

/// Runs album and artist batches.
pub struct Orchestrator {
    source: Arc<dyn AlbumSource>,
    engine: DownloadEngine,
    client: HttpClient,
    reporter: Reporter,
    cancel: CancellationToken,
    prompt: Arc<dyn MetadataPrompt>,
    base_path: PathBuf,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.engine)
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

enum Resolved {
    Ready(WorkItem),
    /// Song page without a usable file link; carries the page URL and why.
    Missing(String, String),
    /// Cancellation fired before the song page was resolved.
    Cancelled(String),
}

/// Item id of tracks that never reached the engine. Engine ids start at 1.
const UNSCHEDULED_ITEM_ID: usize = 0;

impl Orchestrator {
    /// Creates an orchestrator writing under the current directory with no
    /// metadata prompt.
    #[must_use]
    pub fn new(
        source: Arc<dyn AlbumSource>,
        engine: DownloadEngine,
        client: HttpClient,
        reporter: Reporter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            engine,
            client,
            reporter,
            cancel,
            prompt: Arc::new(NoPrompt),
            base_path: PathBuf::from("."),
        }
    }

    /// Sets the prompt used for metadata the page lacks.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn MetadataPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Sets the directory album directories are created in.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Dispatches on the kind of `target`.
    ///
    /// Returns whether everything completed.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::download_album`] and [`Orchestrator::download_artist`].
    pub async fn run(&self, target: &Target) -> Result<bool, OrchestratorError> {
        match target {
            Target::Album(url) => Ok(self.download_album(url).await?.is_complete()),
            Target::Artist(url) => Ok(self.download_artist(url).await?.is_complete()),
        }
    }

    /// Downloads one album.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::Page`] if the album page fails with a fatal error
    /// - [`OrchestratorError::CreateDirectory`] if the album directory cannot be created
    /// - [`OrchestratorError::Cancelled`] if cancellation fires before the page loads
    ///
    /// Track failures are not errors; they are counted in the [`BatchResult`].
    #[instrument(skip(self))]
    pub async fn download_album(&self, url: &str) -> Result<BatchResult, OrchestratorError> {
        let page = self
            .retry_transient(url, || self.source.album(url, &self.cancel))
            .await
            .map_err(|e| OrchestratorError::page(url, e))?;

        let metadata = complete_metadata(page.metadata, self.prompt.as_ref()).await;
        self.reporter.info(metadata.to_string());

        let directory = self.base_path.join(metadata.directory_name());
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| OrchestratorError::CreateDirectory {
                path: directory.clone(),
                source,
            })?;
        debug!(directory = %directory.display(), "album directory ready");

        self.download_cover(page.cover_url.as_deref(), &directory).await;

        for absent in &page.absent_tracks {
            self.reporter.warning(format!(
                "The track number {} ({}) is absent from website",
                absent.number, absent.title
            ));
        }
        let mut absent_remote = !page.absent_tracks.is_empty();
        if page.tracks.is_empty() {
            self.reporter
                .error("Unable to detect any song links, skipping this album");
            absent_remote = true;
        }

        let items_total = page.tracks.len();
        let resolved = self.resolve_tracks(page.tracks).await;

        let mut items = Vec::with_capacity(resolved.len());
        let mut unresolved = Vec::new();
        let mut cancelled = false;
        for entry in resolved {
            match entry {
                Resolved::Ready(item) => items.push(item),
                Resolved::Missing(page_url, reason) => {
                    self.reporter.error(reason.as_str());
                    unresolved.push(ItemOutcome {
                        item_id: UNSCHEDULED_ITEM_ID,
                        source_url: page_url,
                        path: None,
                        outcome: TransferOutcome::Failed { reason },
                        attempts: 0,
                    });
                }
                Resolved::Cancelled(page_url) => {
                    cancelled = true;
                    unresolved.push(ItemOutcome::not_started(UNSCHEDULED_ITEM_ID, page_url));
                }
            }
        }

        let mut outcomes = if items.is_empty() {
            Vec::new()
        } else {
            self.engine
                .run(items, &directory, &self.client, &self.reporter, &self.cancel)
                .await
        };
        outcomes.extend(unresolved);

        let failed = outcomes
            .iter()
            .filter(|o| !o.is_success())
            .count();
        cancelled = cancelled
            || self.cancel.is_cancelled()
            || outcomes
                .iter()
                .any(|o| matches!(o.outcome, TransferOutcome::Cancelled { .. }));

        let result = BatchResult {
            directory_path: directory,
            items_total,
            items_failed: failed,
            absent_remote,
            cancelled,
            outcomes,
        };

        let shown = result.directory_path.display();
        if result.is_complete() {
            self.reporter.info(format!("{shown} FINISHED"));
        } else {
            self.reporter.error(format!(
                "{shown} INCOMPLETE (tracks missing on website or user exit)"
            ));
        }
        info!(
            items_total = result.items_total,
            items_failed = result.items_failed,
            absent_remote = result.absent_remote,
            cancelled = result.cancelled,
            "album batch finished"
        );

        Ok(result)
    }

    /// Downloads every album of an artist, one album at a time.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Page`] or [`OrchestratorError::Cancelled`]
    /// if the artist page itself cannot be loaded. Failures of individual
    /// albums are reported and counted, and the run moves on.
    #[instrument(skip(self))]
    pub async fn download_artist(&self, url: &str) -> Result<ArtistResult, OrchestratorError> {
        let albums = self
            .retry_transient(url, || self.source.artist_albums(url, &self.cancel))
            .await
            .map_err(|e| OrchestratorError::page(url, e))?;

        self.reporter.warning(format!(
            "Going to download all {} albums from this artist",
            albums.len()
        ));

        let mut result = ArtistResult::default();
        for album_url in albums {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            match self.download_album(&album_url).await {
                Ok(batch) => {
                    let stop = batch.cancelled;
                    result.albums.push(batch);
                    if stop {
                        result.cancelled = true;
                        break;
                    }
                }
                Err(OrchestratorError::Cancelled { .. }) => {
                    result.cancelled = true;
                    break;
                }
                Err(e) => {
                    self.reporter
                        .error(format!("Skipping album {album_url}: {}", error_chain(&e)));
                    result.albums_failed += 1;
                }
            }
        }

        if !result.cancelled {
            self.reporter.info("ARTIST DOWNLOAD FINISHED");
        }
        Ok(result)
    }

    async fn download_cover(&self, cover_url: Option<&str>, directory: &Path) {
        let Some(cover_url) = cover_url else {
            self.reporter.warning("No cover found for this album");
            return;
        };
        let outcomes = self
            .engine
            .run(
                vec![WorkItem::new(cover_url).with_name(COVER_NAME)],
                directory,
                &self.client,
                &self.reporter,
                &self.cancel,
            )
            .await;
        if !outcomes.iter().all(ItemOutcome::is_success) {
            self.reporter
                .warning(format!("Cover could not be downloaded from {cover_url}"));
        }
    }

    async fn resolve_tracks(&self, tracks: Vec<TrackLink>) -> Vec<Resolved> {
        stream::iter(tracks)
            .map(|track| self.resolve_track(track))
            .buffered(self.engine.concurrency())
            .collect()
            .await
    }

    async fn resolve_track(&self, track: TrackLink) -> Resolved {
        let page_url = track.page_url.as_str();
        let resolved = self
            .retry_transient(page_url, || self.source.resolve_track(page_url, &self.cancel))
            .await;
        match resolved {
            Ok(Some(file_url)) => {
                let mut item = WorkItem::new(file_url);
                if let Some(number) = track.number {
                    item = item.with_sequence(number);
                }
                Resolved::Ready(item)
            }
            Ok(None) => Resolved::Missing(
                track.page_url.clone(),
                format!("Track {}: no file link on {page_url}", track.padded_number()),
            ),
            Err(e) if e.is_cancelled() => Resolved::Cancelled(track.page_url.clone()),
            Err(e) => Resolved::Missing(
                track.page_url.clone(),
                format!("Track {}: unable to load {page_url}: {e}", track.padded_number()),
            ),
        }
    }

    /// Repeats `op` while it fails transiently, pausing per the engine's
    /// retry policy. Stops on success, a fatal error or cancellation.
    async fn retry_transient<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, DownloadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DownloadError>>,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::cancelled(what));
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if classify_error(&e) == FailureType::Transient => {
                    self.reporter
                        .warning(format!("Problem loading {what}: {e}, retrying"));
                    if !self.engine.retry_policy().pause(&self.cancel).await {
                        return Err(DownloadError::cancelled(what));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
