//! Custom wiremock responders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wiremock::{Request, Respond, ResponseTemplate};

/// Deterministic body of `len` bytes.
pub fn body_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Serves `body`, honouring `Range: bytes=a-b` / `bytes=a-` with 206.
///
/// Every request's Range header (or `None`) is recorded.
#[derive(Clone)]
pub struct RangeResponder {
    body: Arc<Vec<u8>>,
    honour_ranges: bool,
    range_limit: Option<usize>,
    ranges_seen: Arc<Mutex<Vec<Option<String>>>>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            honour_ranges: true,
            range_limit: None,
            ranges_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers each ranged request with at most `limit` bytes, so every
    /// resumed stream ends short of the advertised size.
    pub fn short_ranges(body: Vec<u8>, limit: usize) -> Self {
        Self {
            range_limit: Some(limit),
            ..Self::new(body)
        }
    }

    /// A server that always answers 200 with the whole body.
    pub fn ignoring_ranges(body: Vec<u8>) -> Self {
        Self {
            honour_ranges: false,
            ..Self::new(body)
        }
    }

    pub fn ranges_seen(&self) -> Vec<Option<String>> {
        self.ranges_seen.lock().unwrap().clone()
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.ranges_seen.lock().unwrap().push(range.clone());

        let total = self.body.len();
        let parsed = range
            .as_deref()
            .filter(|_| self.honour_ranges)
            .and_then(|r| r.strip_prefix("bytes="))
            .and_then(|r| r.split_once('-'))
            .and_then(|(start, end)| {
                let start: usize = start.parse().ok()?;
                let end: usize = if end.is_empty() {
                    total - 1
                } else {
                    end.parse().ok()?
                };
                (start <= end && end < total).then_some((start, end))
            });

        match parsed {
            Some((start, end)) => {
                let served_end = self
                    .range_limit
                    .map_or(end, |limit| end.min(start + limit - 1));
                ResponseTemplate::new(206)
                    .insert_header(
                        "Content-Range",
                        format!("bytes {start}-{served_end}/{total}").as_str(),
                    )
                    .set_body_bytes(self.body[start..=served_end].to_vec())
            }
            None => ResponseTemplate::new(200).set_body_bytes(self.body.as_slice().to_vec()),
        }
    }
}

/// Fails the first `failures` requests with `status`, then serves `body`.
pub struct FlakyResponder {
    failures: usize,
    status: u16,
    body: Vec<u8>,
    calls: Arc<AtomicUsize>,
}

impl FlakyResponder {
    pub fn new(failures: usize, status: u16, body: Vec<u8>, calls: Arc<AtomicUsize>) -> Self {
        Self {
            failures,
            status,
            body,
            calls,
        }
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            ResponseTemplate::new(self.status)
        } else {
            ResponseTemplate::new(200).set_body_bytes(self.body.clone())
        }
    }
}

/// Responder that tracks peak concurrent requests.
///
/// Uses `std::thread::sleep` to hold each request open; the mock server runs
/// on its own threads, so the test runtime is not blocked.
pub struct ConcurrencyTrackingResponder {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay_ms: u64,
    body: Vec<u8>,
}

impl ConcurrencyTrackingResponder {
    pub fn new(current: Arc<AtomicUsize>, peak: Arc<AtomicUsize>, delay_ms: u64, body: Vec<u8>) -> Self {
        Self {
            current,
            peak,
            delay_ms,
            body,
        }
    }
}

impl Respond for ConcurrencyTrackingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        std::thread::sleep(Duration::from_millis(self.delay_ms));

        self.current.fetch_sub(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_bytes(self.body.clone())
    }
}

/// Minimal HTTP/1.1 server that answers every request with a 200 carrying no
/// Content-Length and closes the connection after `body`.
///
/// Returns the base URL. The accept loop lives as long as the runtime.
pub async fn serve_without_content_length(body: Vec<u8>) -> std::io::Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let body = Arc::new(body);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = Arc::clone(&body);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nConnection: close\r\n\r\n";
                // The client may drop a probe early; write errors are expected then.
                let _ = socket.write_all(head).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    Ok(format!("http://{addr}"))
}
