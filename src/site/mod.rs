//! Album source: turns site pages into downloadable work.
//!
//! The orchestrator only talks to the [`AlbumSource`] trait. [`MyzukaSource`]
//! is the implementation for the live site; tests substitute their own.
//!
//! # Example
//!
//! ```no_run
//! use albumdl_core::download::{HttpClient, TransportConfig};
//! use albumdl_core::site::{AlbumSource, MyzukaSource};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = MyzukaSource::new(HttpClient::new(&TransportConfig::default())?);
//! let page = source
//!     .album("https://myzuka.club/Album/630746/x", &CancellationToken::new())
//!     .await?;
//! println!("{} tracks", page.tracks.len());
//! # Ok(())
//! # }
//! ```

mod extract;

pub use extract::{
    AbsentTrack, AlbumPage, PartialMetadata, TrackLink, base_url, decode_entities,
    parse_album_page, parse_artist_page, parse_song_page,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::download::{DownloadError, HttpClient};

/// Where album, artist and song pages come from.
///
/// Errors use [`DownloadError`] so callers can classify them with the same
/// rules as file transfers.
#[async_trait]
pub trait AlbumSource: Send + Sync {
    /// Loads an album page.
    async fn album(&self, url: &str, cancel: &CancellationToken)
    -> Result<AlbumPage, DownloadError>;

    /// Lists the album URLs of an artist, de-duplicated, in page order.
    async fn artist_albums(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, DownloadError>;

    /// Resolves a song page to the URL of the file itself. `Ok(None)` means
    /// the page carries no audio link.
    async fn resolve_track(
        &self,
        page_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, DownloadError>;
}

/// [`AlbumSource`] backed by the myzuka site markup.
#[derive(Debug, Clone)]
pub struct MyzukaSource {
    client: HttpClient,
}

impl MyzukaSource {
    /// Creates a source that fetches pages with `client`.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    async fn page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, url::Url), DownloadError> {
        let parsed = url::Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let html = self.client.fetch_text(url, cancel).await?;
        Ok((decode_entities(&html), parsed))
    }
}

#[async_trait]
impl AlbumSource for MyzukaSource {
    #[instrument(skip(self, cancel))]
    async fn album(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<AlbumPage, DownloadError> {
        let (html, parsed) = self.page(url, cancel).await?;
        let page = parse_album_page(&html, &parsed);
        debug!(
            tracks = page.tracks.len(),
            absent = page.absent_tracks.len(),
            cover = page.cover_url.is_some(),
            "parsed album page"
        );
        Ok(page)
    }

    #[instrument(skip(self, cancel))]
    async fn artist_albums(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, DownloadError> {
        let (html, parsed) = self.page(url, cancel).await?;
        Ok(parse_artist_page(&html, &parsed))
    }

    #[instrument(level = "debug", skip(self, cancel))]
    async fn resolve_track(
        &self,
        page_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, DownloadError> {
        let (html, parsed) = self.page(page_url, cancel).await?;
        Ok(parse_song_page(&html, &parsed))
    }
}
