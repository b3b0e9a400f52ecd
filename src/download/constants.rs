//! Constants for the download module (timeouts, size thresholds, retry delays).

use std::time::Duration;

/// Default HTTP timeout applied to connect and to every read (10 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Files at or below this size are treated as error/rate-limit pages.
pub const MIN_PAGE_SIZE: u64 = 8192;

/// Name of the album cover, the one small asset exempt from [`MIN_PAGE_SIZE`].
pub const COVER_NAME: &str = "cover.jpg";

/// Suffix the site appends to served filenames.
pub const SITE_SUFFIX_TOKEN: &str = "_myzuka";

/// Total unranged probes issued while looking for a usable remote size.
pub const SIZE_PROBE_ATTEMPTS: u32 = 5;

/// Write granularity for normal files.
pub const CHUNK_SIZE: usize = 8192;

/// Write granularity when the remote file is smaller than [`CHUNK_SIZE`].
pub const SMALL_CHUNK_SIZE: usize = 512;

/// Lower bound of the randomized wait between retries.
pub const DEFAULT_MIN_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Upper bound of the randomized wait between retries.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(10);
