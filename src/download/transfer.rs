//! Resumable single-file transfer.
//!
//! # Overview
//!
//! One call to [`transfer`] is one attempt at one [`WorkItem`]:
//!
//! 1. Probe the URL without a range to learn the remote size and, when the
//!    item has no name yet, the served filename.
//! 2. Size the local file. Tiny leftovers are treated as saved error pages.
//! 3. Decide between already-complete, inconsistent, resume and fresh
//!    ([`plan_resume`]).
//! 4. Stream the body in fixed-size chunks, appending or truncating.
//! 5. Compare the byte count with the remote size.
//!
//! Transport failures are returned as [`DownloadError`] for the retry loop to
//! classify; everything else is a [`TransferOutcome`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::client::{ByteRange, map_send_error, validate_url};
use super::constants::{
    CHUNK_SIZE, COVER_NAME, MIN_PAGE_SIZE, SITE_SUFFIX_TOKEN, SIZE_PROBE_ATTEMPTS,
    SMALL_CHUNK_SIZE,
};
use super::error::DownloadError;
use super::filename::resolve_destination_name;
use super::progress::{ItemId, ProgressEvent, TransferProgress};
use super::retry::TransferContext;
use super::state::{StateTracker, TransferOutcome, TransferState};

/// One file to download. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Ordinal within the batch (track number), used for display only.
    pub sequence_hint: Option<u32>,
    /// URL of the file itself.
    pub source_url: String,
    /// On-disk name. When `None`, resolved from the response headers.
    pub destination_name: Option<String>,
}

impl WorkItem {
    /// Item whose name will be taken from the server response.
    #[must_use]
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            sequence_hint: None,
            source_url: source_url.into(),
            destination_name: None,
        }
    }

    /// Sets a fixed destination name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.destination_name = Some(name.into());
        self
    }

    /// Sets the ordinal.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence_hint = Some(sequence);
        self
    }

    /// Short label for messages: the fixed name, else the URL.
    #[must_use]
    pub fn label(&self) -> &str {
        self.destination_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.source_url)
    }
}

/// Tunables for [`transfer`].
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Files at or below this size are presumed to be error pages.
    pub min_page_size: u64,
    /// Destination names exempt from the size threshold.
    pub small_assets: Vec<String>,
    /// Tokens removed from server-provided filenames.
    pub strip_tokens: Vec<String>,
    /// Total unranged probes before giving up on a usable size.
    pub probe_attempts: u32,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            min_page_size: MIN_PAGE_SIZE,
            small_assets: vec![COVER_NAME.to_string()],
            strip_tokens: vec![SITE_SUFFIX_TOKEN.to_string()],
            probe_attempts: SIZE_PROBE_ATTEMPTS,
        }
    }
}

impl TransferOptions {
    fn is_small_asset(&self, name: &str) -> bool {
        self.small_assets.iter().any(|asset| asset == name)
    }

    fn is_suspiciously_small(&self, size: u64, name: &str) -> bool {
        size <= self.min_page_size && !self.is_small_asset(name)
    }
}

/// What to do given the local and remote sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePlan {
    /// Sizes match; nothing to transfer.
    AlreadyComplete,
    /// Local file is larger than the remote one.
    Inconsistent,
    /// Request the remaining bytes starting at `from`.
    Resume {
        /// Offset of the first missing byte.
        from: u64,
    },
    /// Download from offset zero, truncating any local file.
    Fresh,
}

/// Decides how to proceed from the (already decontaminated) local size and
/// the remote size, if known.
#[must_use]
pub fn plan_resume(local_size: u64, remote_size: Option<u64>) -> ResumePlan {
    match remote_size {
        None => ResumePlan::Fresh,
        Some(_) if local_size == 0 => ResumePlan::Fresh,
        Some(remote) if local_size == remote => ResumePlan::AlreadyComplete,
        Some(remote) if local_size > remote => ResumePlan::Inconsistent,
        Some(_) => ResumePlan::Resume { from: local_size },
    }
}

/// Runs one attempt for `item`, writing into `directory`.
///
/// `path` receives the destination as soon as it is known, so the caller can
/// report the bytes on disk if a later step fails or is cancelled.
///
/// # Errors
///
/// Returns a [`DownloadError`] for any transport or file system failure; the
/// retry loop decides whether it is worth another attempt.
#[instrument(level = "debug", skip_all, fields(item_id = item_id, url = %item.source_url))]
pub(crate) async fn transfer(
    ctx: &TransferContext,
    item_id: ItemId,
    item: &WorkItem,
    directory: &Path,
    tracker: &mut StateTracker,
    path: &mut Option<PathBuf>,
) -> Result<TransferOutcome, DownloadError> {
    let url = item.source_url.as_str();
    let parsed = validate_url(url)?;
    let options = &ctx.options;

    tracker.transition(TransferState::Probing);

    let mut name = item
        .destination_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(|n| resolve_destination_name(Some(n), None, &parsed, &options.strip_tokens));

    // Probe until a usable size turns up or the attempts run out.
    let mut probe = None;
    let mut remote_size = None;
    for attempt in 1..=options.probe_attempts.max(1) {
        let response = ctx.client.fetch(url, None, &ctx.cancel).await?;
        let resolved = name.get_or_insert_with(|| {
            let disposition = response
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok());
            resolve_destination_name(None, disposition, &parsed, &options.strip_tokens)
        });
        let last = attempt >= options.probe_attempts;

        match content_length(&response) {
            None if !last => {
                debug!(attempt, "no content length reported, probing again");
            }
            None => {
                debug!("remote size unknown after all probes");
                probe = Some(response);
                break;
            }
            Some(size) if options.is_suspiciously_small(size, resolved) => {
                drop(response);
                if last {
                    ctx.reporter.error(format!(
                        "Served file ({resolved}) still too small after {} probes",
                        options.probe_attempts
                    ));
                    return Ok(TransferOutcome::Failed {
                        reason: format!(
                            "server kept answering with {size} bytes after {} probes",
                            options.probe_attempts
                        ),
                    });
                }
                ctx.reporter.warning(format!(
                    "Served file ({resolved}) too small (<= {} bytes), retrying",
                    options.min_page_size
                ));
                if !ctx.policy.pause(&ctx.cancel).await {
                    return Err(DownloadError::cancelled(url));
                }
            }
            Some(size) => {
                remote_size = Some(size);
                probe = Some(response);
                break;
            }
        }
    }
    let Some(probe) = probe else {
        ctx.reporter
            .error(format!("No usable response from {url} after probing"));
        return Ok(TransferOutcome::Failed {
            reason: "no usable probe response".to_string(),
        });
    };
    let name = name.unwrap_or_else(|| resolve_destination_name(None, None, &parsed, &[]));

    let file_path = directory.join(&name);
    *path = Some(file_path.clone());

    let mut local_size = local_file_size(&file_path).await?;
    if local_size > 0 && options.is_suspiciously_small(local_size, &name) {
        debug!(local_size, "discarding small local file, likely a saved error page");
        local_size = 0;
    }

    let (response, start) = match plan_resume(local_size, remote_size) {
        ResumePlan::AlreadyComplete => {
            ctx.reporter
                .info(format!("{name} (already complete, {})", format_mb(local_size)));
            return Ok(TransferOutcome::AlreadyComplete { bytes: local_size });
        }
        ResumePlan::Inconsistent => {
            let remote = remote_size.unwrap_or_default();
            ctx.reporter.error(format!(
                "{name} is already bigger ({local_size}) than the server side file ({remote}), check this file manually"
            ));
            return Ok(TransferOutcome::Inconsistent {
                local_size,
                remote_size: remote,
            });
        }
        ResumePlan::Resume { from } => {
            drop(probe);
            tracker.transition(TransferState::Resuming);
            let range = ByteRange::remaining(from, remote_size.unwrap_or_default());
            let response = ctx.client.fetch(url, Some(range), &ctx.cancel).await?;
            if response.status().as_u16() == 206 {
                debug!(from, "server honoured range request");
                (response, from)
            } else {
                ctx.reporter.warning(format!(
                    "{name}: range requests not supported by server, restarting at beginning"
                ));
                (response, 0)
            }
        }
        ResumePlan::Fresh => (probe, 0),
    };

    tracker.transition(TransferState::Writing);
    let file = open_destination(&file_path, start > 0).await?;
    let progress = TransferProgress {
        item_id,
        bytes_done: start,
        bytes_total: remote_size.and_then(|s| i64::try_from(s).ok()).unwrap_or(-1),
    };
    ctx.reporter.send(ProgressEvent::Started {
        filename: name.clone(),
        progress,
    });

    let chunk_size = if remote_size.is_some_and(|s| s < CHUNK_SIZE as u64) {
        SMALL_CHUNK_SIZE
    } else {
        CHUNK_SIZE
    };
    let started = Instant::now();
    let streamed = stream_to_file(ctx, url, &file_path, file, response, progress, chunk_size).await?;
    let bytes_done = match streamed {
        Streamed::Finished(bytes) => bytes,
        Streamed::Cancelled(bytes) => {
            debug!(bytes, "stopped at chunk boundary after cancellation");
            return Ok(TransferOutcome::Cancelled { bytes_done: bytes });
        }
    };

    let outcome = match remote_size {
        None => {
            ctx.reporter.warning(format!(
                "{name}: {} downloaded, but the server did not report a size to verify against",
                format_mb(bytes_done)
            ));
            TransferOutcome::Complete {
                bytes: bytes_done,
                verified: false,
            }
        }
        Some(remote) if bytes_done == remote => {
            ctx.reporter.info(completion_summary(
                &name,
                bytes_done,
                bytes_done - start,
                started.elapsed().as_secs_f64(),
            ));
            TransferOutcome::Complete {
                bytes: bytes_done,
                verified: true,
            }
        }
        Some(remote) if bytes_done < remote => TransferOutcome::Incomplete {
            bytes_done,
            bytes_total: remote,
        },
        Some(remote) => {
            ctx.reporter.error(format!(
                "{name}: received {bytes_done} bytes, more than the {remote} the server advertised"
            ));
            TransferOutcome::Failed {
                reason: format!("received {bytes_done} bytes, more than the {remote} advertised"),
            }
        }
    };
    Ok(outcome)
}

enum Streamed {
    Finished(u64),
    Cancelled(u64),
}

/// Streams the body, checking the token at every chunk boundary.
///
/// Whatever happens, the writer is flushed before returning so the bytes on
/// disk always equal the reported count.
async fn stream_to_file(
    ctx: &TransferContext,
    url: &str,
    file_path: &Path,
    file: File,
    response: reqwest::Response,
    mut progress: TransferProgress,
    chunk_size: usize,
) -> Result<Streamed, DownloadError> {
    let io_err = |e: std::io::Error| DownloadError::io(file_path.to_path_buf(), e);
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                writer.flush().await.map_err(io_err)?;
                return Ok(Streamed::Cancelled(progress.bytes_done));
            }
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                // Keep what arrived so the next attempt can resume from it.
                writer.flush().await.map_err(io_err)?;
                return Err(map_send_error(url, e));
            }
        };

        for piece in chunk.chunks(chunk_size) {
            writer.write_all(piece).await.map_err(io_err)?;
            progress.bytes_done += piece.len() as u64;
            ctx.reporter.send(ProgressEvent::Advanced(progress));
            if ctx.cancel.is_cancelled() {
                writer.flush().await.map_err(io_err)?;
                return Ok(Streamed::Cancelled(progress.bytes_done));
            }
        }
    }

    writer.flush().await.map_err(io_err)?;
    Ok(Streamed::Finished(progress.bytes_done))
}

async fn open_destination(path: &Path, append: bool) -> Result<File, DownloadError> {
    let result = if append {
        OpenOptions::new().create(true).append(true).open(path).await
    } else {
        File::create(path).await
    };
    result.map_err(|e| DownloadError::io(path.to_path_buf(), e))
}

/// Size of `path`, or 0 when it does not exist.
pub(crate) async fn local_file_size(path: &Path) -> Result<u64, DownloadError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(DownloadError::io(path.to_path_buf(), e)),
    }
}

fn content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

#[allow(clippy::cast_precision_loss)]
fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1_048_576.0)
}

#[allow(clippy::cast_precision_loss)]
fn completion_summary(name: &str, total: u64, transferred: u64, seconds: f64) -> String {
    let rate = if seconds > 0.0 {
        transferred as f64 / 1_048_576.0 / seconds
    } else {
        0.0
    };
    format!(
        "{name}: {} ({} new in {seconds:.1}s, {rate:.2} MB/s)",
        format_mb(total),
        format_mb(transferred)
    )
}
