//! UDP tracker client (BEP 15) used for scrape metrics
//!
//! A [`UdpTracker`] only exists in the connected state: [`UdpTracker::connect`]
//! performs the handshake and [`UdpTracker::close`] consumes it.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use super::protocol::{self, Action, constants};
use super::types::{AnnounceRequest, AnnounceResponse, ScrapeBatch, ScrapeStats, TrackerScraper};
use crate::torrent::{InfoHash, TorrentError};

/// Largest datagram accepted from a tracker
const MAX_RESPONSE_SIZE: usize = 2048;

/// Connected UDP tracker endpoint.
///
/// Holds the connection id returned by the handshake and a per-endpoint
/// transaction counter that starts at a random value and increments per
/// request. One endpoint services one request at a time.
#[derive(Debug)]
pub struct UdpTracker {
    url: String,
    socket: UdpSocket,
    connection_id: u64,
    transaction_id: u32,
    request_timeout: Duration,
}

impl UdpTracker {
    /// Performs the connect handshake against a `udp://` tracker.
    ///
    /// # Errors
    ///
    /// - `TorrentError::UnsupportedTrackerScheme` - Non-UDP tracker URL
    /// - `TorrentError::TrackerConnectFailed` - Bad URL, lookup or socket failure
    /// - `TorrentError::RequestTimedOut` - No connect response within `request_timeout`
    /// - `TorrentError::TransactionMismatch` - Echoed transaction id differs
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self, TorrentError> {
        let addr = Self::resolve_address(url).await?;
        let connect_failed = |reason: String| TorrentError::TrackerConnectFailed {
            url: url.to_string(),
            reason,
        };

        let bind_addr = if addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| connect_failed(e.to_string()))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| connect_failed(e.to_string()))?;

        let mut tracker = Self {
            url: url.to_string(),
            socket,
            connection_id: constants::PROTOCOL_ID,
            transaction_id: rand::random(),
            request_timeout,
        };

        let transaction_id = tracker.next_transaction_id();
        let body = tracker
            .request(
                protocol::encode_connect(transaction_id),
                transaction_id,
                Action::Connect,
            )
            .await?;
        tracker.connection_id = protocol::decode_connect(&body)?;

        debug!("Connected to tracker {} ({})", url, addr);
        Ok(tracker)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Scrapes swarm statistics, batching at most 70 hashes per request.
    ///
    /// Every batch is sent even when an earlier one failed; each
    /// [`ScrapeBatch`] carries its own range of `hashes` and its own result
    /// (`RequestTimedOut`, `TransactionMismatch` or `TrackerProtocolError`).
    pub async fn scrape(&mut self, hashes: &[InfoHash]) -> Vec<ScrapeBatch> {
        let mut batches = Vec::with_capacity(hashes.len().div_ceil(constants::MAX_SCRAPE_HASHES));

        for (index, batch) in hashes.chunks(constants::MAX_SCRAPE_HASHES).enumerate() {
            let start = index * constants::MAX_SCRAPE_HASHES;
            let result = self.scrape_batch(batch).await;
            if let Err(e) = &result {
                debug!(
                    "Scrape batch {}..{} on {} failed: {}",
                    start,
                    start + batch.len(),
                    self.url,
                    e
                );
            }
            batches.push(ScrapeBatch {
                hashes: start..start + batch.len(),
                result,
            });
        }

        debug!("Scraped {} hashes from {}", hashes.len(), self.url);
        batches
    }

    async fn scrape_batch(&mut self, batch: &[InfoHash]) -> Result<Vec<ScrapeStats>, TorrentError> {
        let transaction_id = self.next_transaction_id();
        let packet = protocol::encode_scrape(self.connection_id, transaction_id, batch);
        let body = self.request(packet, transaction_id, Action::Scrape).await?;
        protocol::decode_scrape(&body, batch.len())
    }

    /// Announces to the tracker and returns swarm counts and peers.
    ///
    /// # Errors
    ///
    /// - `TorrentError::RequestTimedOut` - Announce went unanswered
    /// - `TorrentError::TransactionMismatch` - Response echoed the wrong transaction
    /// - `TorrentError::TrackerProtocolError` - Tracker error or malformed response
    pub async fn announce(
        &mut self,
        request: &AnnounceRequest,
    ) -> Result<AnnounceResponse, TorrentError> {
        let transaction_id = self.next_transaction_id();
        let packet = protocol::encode_announce(self.connection_id, transaction_id, request);
        let body = self
            .request(packet, transaction_id, Action::Announce)
            .await?;
        protocol::decode_announce(&body)
    }

    /// Drops the connection; the endpoint must be reconnected before reuse.
    pub fn close(self) {
        debug!("Closed tracker {}", self.url);
    }

    fn next_transaction_id(&mut self) -> u32 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Sends one request and waits for its response body.
    ///
    /// No automatic retry: a timeout is reported to the caller.
    async fn request(
        &self,
        packet: Bytes,
        transaction_id: u32,
        expected: Action,
    ) -> Result<Vec<u8>, TorrentError> {
        self.socket.send(&packet).await?;

        let mut buf = vec![0u8; MAX_RESPONSE_SIZE];
        let received = timeout(self.request_timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| TorrentError::RequestTimedOut {
                url: self.url.clone(),
            })??;

        let (action, echoed, body) = protocol::decode_header(&buf[..received])?;
        if echoed != transaction_id {
            return Err(TorrentError::TransactionMismatch {
                url: self.url.clone(),
                expected: transaction_id,
                received: echoed,
            });
        }

        match action {
            Action::Error => Err(TorrentError::TrackerProtocolError {
                message: protocol::decode_error(body),
            }),
            action if action != expected => Err(TorrentError::TrackerProtocolError {
                message: format!("Expected {expected:?} response, got {action:?}"),
            }),
            _ => Ok(body.to_vec()),
        }
    }

    async fn resolve_address(url: &str) -> Result<SocketAddr, TorrentError> {
        let connect_failed = |reason: String| TorrentError::TrackerConnectFailed {
            url: url.to_string(),
            reason,
        };

        let parsed = Url::parse(url).map_err(|e| connect_failed(e.to_string()))?;
        if parsed.scheme() != "udp" {
            return Err(TorrentError::UnsupportedTrackerScheme {
                url: url.to_string(),
            });
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| connect_failed("Missing host".to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = parsed.port().unwrap_or(80);

        tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| connect_failed(e.to_string()))?
            .next()
            .ok_or_else(|| connect_failed("No address for host".to_string()))
    }
}

/// [`TrackerScraper`] speaking the UDP tracker protocol.
#[derive(Debug, Clone)]
pub struct UdpTrackerScraper {
    request_timeout: Duration,
}

impl UdpTrackerScraper {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for UdpTrackerScraper {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl TrackerScraper for UdpTrackerScraper {
    async fn scrape(
        &self,
        tracker_url: &str,
        hashes: &[InfoHash],
    ) -> Result<Vec<ScrapeBatch>, TorrentError> {
        let mut tracker = UdpTracker::connect(tracker_url, self.request_timeout).await?;
        let batches = tracker.scrape(hashes).await;
        tracker.close();
        Ok(batches)
    }
}
