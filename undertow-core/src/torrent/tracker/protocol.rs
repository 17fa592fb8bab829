//! UDP tracker wire format (BEP 15)
//!
//! Pure encode/decode helpers; socket handling lives in `udp`.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::types::{AnnounceRequest, AnnounceResponse, ScrapeStats};
use crate::torrent::{InfoHash, TorrentError};

/// UDP tracker protocol constants
pub mod constants {
    /// Magic connection id for connect requests
    pub const PROTOCOL_ID: u64 = 0x41727101980;

    /// Largest number of info hashes a tracker accepts per scrape
    pub const MAX_SCRAPE_HASHES: usize = 70;

    /// Response header: action + transaction id
    pub const HEADER_SIZE: usize = 8;

    /// Bytes per `{seeders, completed, leechers}` scrape record
    pub const SCRAPE_RECORD_SIZE: usize = 12;

    /// Compact IPv4 peer entry (4 address + 2 port)
    pub const COMPACT_PEER_SIZE: usize = 6;
}

/// Tracker request/response action codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Announce,
    Scrape,
    Error,
}

impl Action {
    pub fn code(self) -> u32 {
        match self {
            Self::Connect => 0,
            Self::Announce => 1,
            Self::Scrape => 2,
            Self::Error => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Connect),
            1 => Some(Self::Announce),
            2 => Some(Self::Scrape),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

fn protocol_error(message: impl Into<String>) -> TorrentError {
    TorrentError::TrackerProtocolError {
        message: message.into(),
    }
}

/// 16-byte connect request.
pub fn encode_connect(transaction_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_u64(constants::PROTOCOL_ID);
    buf.put_u32(Action::Connect.code());
    buf.put_u32(transaction_id);
    buf.freeze()
}

/// Scrape request for at most [`constants::MAX_SCRAPE_HASHES`] hashes.
pub fn encode_scrape(connection_id: u64, transaction_id: u32, hashes: &[InfoHash]) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + hashes.len() * 20);
    buf.put_u64(connection_id);
    buf.put_u32(Action::Scrape.code());
    buf.put_u32(transaction_id);
    for hash in hashes {
        buf.put_slice(hash.as_bytes());
    }
    buf.freeze()
}

/// 98-byte announce request.
pub fn encode_announce(connection_id: u64, transaction_id: u32, request: &AnnounceRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(98);
    buf.put_u64(connection_id);
    buf.put_u32(Action::Announce.code());
    buf.put_u32(transaction_id);
    buf.put_slice(request.info_hash.as_bytes());
    buf.put_slice(&request.peer_id);
    buf.put_u64(request.downloaded);
    buf.put_u64(request.left);
    buf.put_u64(request.uploaded);
    buf.put_u32(request.event.code());
    buf.put_u32(0); // default IP
    buf.put_u32(request.key);
    buf.put_i32(request.num_want.map_or(-1, |n| i32::try_from(n).unwrap_or(i32::MAX)));
    buf.put_u16(request.port);
    buf.freeze()
}

/// Splits a response into action, echoed transaction id and body.
///
/// # Errors
/// - `TorrentError::TrackerProtocolError` - Short packet or unknown action
pub fn decode_header(mut packet: &[u8]) -> Result<(Action, u32, &[u8]), TorrentError> {
    if packet.len() < constants::HEADER_SIZE {
        return Err(protocol_error(format!(
            "Response too short: {} bytes",
            packet.len()
        )));
    }
    let code = packet.get_u32();
    let transaction_id = packet.get_u32();
    let action =
        Action::from_code(code).ok_or_else(|| protocol_error(format!("Unknown action {code}")))?;
    Ok((action, transaction_id, packet))
}

/// Connection id from a connect response body.
///
/// # Errors
/// - `TorrentError::TrackerProtocolError` - Body shorter than 8 bytes
pub fn decode_connect(mut body: &[u8]) -> Result<u64, TorrentError> {
    if body.len() < 8 {
        return Err(protocol_error("Connect response missing connection id"));
    }
    Ok(body.get_u64())
}

/// One record per requested hash, in request order.
///
/// # Errors
/// - `TorrentError::TrackerProtocolError` - Fewer records than requested
pub fn decode_scrape(mut body: &[u8], expected: usize) -> Result<Vec<ScrapeStats>, TorrentError> {
    if body.len() < expected * constants::SCRAPE_RECORD_SIZE {
        return Err(protocol_error(format!(
            "Scrape response holds {} bytes, expected {} records",
            body.len(),
            expected
        )));
    }

    Ok((0..expected)
        .map(|_| ScrapeStats {
            seeders: body.get_u32(),
            completed: body.get_u32(),
            leechers: body.get_u32(),
        })
        .collect())
}

/// Announce response body.
///
/// # Errors
/// - `TorrentError::TrackerProtocolError` - Body shorter than the fixed fields
pub fn decode_announce(mut body: &[u8]) -> Result<AnnounceResponse, TorrentError> {
    if body.len() < 12 {
        return Err(protocol_error("Announce response too short"));
    }
    let interval = body.get_u32();
    let leechers = body.get_u32();
    let seeders = body.get_u32();

    let peers = body
        .chunks_exact(constants::COMPACT_PEER_SIZE)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::V4(SocketAddrV4::new(ip, port))
        })
        .collect();

    Ok(AnnounceResponse {
        interval,
        seeders,
        leechers,
        peers,
    })
}

/// Error message carried by an error response, read up to the first NUL.
pub fn decode_error(body: &[u8]) -> String {
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).into_owned()
}

#[cfg(test)]
mod protocol_tests {
    use super::*;
    use crate::torrent::tracker::types::AnnounceEvent;

    #[test]
    fn test_connect_request_layout() {
        let packet = encode_connect(0xdeadbeef);
        assert_eq!(packet.len(), 16);
        assert_eq!(&packet[..8], &0x41727101980u64.to_be_bytes());
        assert_eq!(&packet[8..12], &[0, 0, 0, 0]);
        assert_eq!(&packet[12..], &0xdeadbeefu32.to_be_bytes());
    }

    #[test]
    fn test_scrape_request_layout() {
        let hashes = [InfoHash::new([1; 20]), InfoHash::new([2; 20])];
        let packet = encode_scrape(7, 9, &hashes);
        assert_eq!(packet.len(), 16 + 40);
        assert_eq!(&packet[8..12], &2u32.to_be_bytes());
        assert_eq!(&packet[16..36], &[1; 20]);
        assert_eq!(&packet[36..], &[2; 20]);
    }

    #[test]
    fn test_announce_request_is_98_bytes() {
        let request = AnnounceRequest {
            info_hash: InfoHash::new([4; 20]),
            peer_id: [5; 20],
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 100,
            event: AnnounceEvent::Started,
            key: 1,
            num_want: None,
        };
        let packet = encode_announce(1, 2, &request);
        assert_eq!(packet.len(), 98);
        assert_eq!(&packet[92..96], &(-1i32).to_be_bytes());
        assert_eq!(&packet[96..], &6881u16.to_be_bytes());
    }

    #[test]
    fn test_announce_num_want_saturates() {
        let request = AnnounceRequest {
            info_hash: InfoHash::new([4; 20]),
            peer_id: [5; 20],
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 100,
            event: AnnounceEvent::None,
            key: 1,
            num_want: Some(u32::MAX),
        };
        let packet = encode_announce(1, 2, &request);
        assert_eq!(&packet[92..96], &i32::MAX.to_be_bytes());

        let packet = encode_announce(1, 2, &AnnounceRequest { num_want: Some(50), ..request });
        assert_eq!(&packet[92..96], &50i32.to_be_bytes());
    }

    #[test]
    fn test_decode_header_rejects_short_and_unknown() {
        assert!(decode_header(&[0, 0, 0]).is_err());
        assert!(decode_header(&[0, 0, 0, 9, 0, 0, 0, 1]).is_err());

        let (action, tx, body) = decode_header(&[0, 0, 0, 2, 0, 0, 0, 5, 1]).unwrap();
        assert_eq!(action, Action::Scrape);
        assert_eq!(tx, 5);
        assert_eq!(body, &[1]);
    }

    #[test]
    fn test_decode_scrape_records() {
        let mut body = Vec::new();
        for value in [10u32, 20, 30, 1, 2, 3] {
            body.extend_from_slice(&value.to_be_bytes());
        }
        let stats = decode_scrape(&body, 2).unwrap();
        assert_eq!(stats[0].seeders, 10);
        assert_eq!(stats[0].completed, 20);
        assert_eq!(stats[0].leechers, 30);
        assert_eq!(stats[1].leechers, 3);

        assert!(decode_scrape(&body, 3).is_err());
    }

    #[test]
    fn test_decode_announce_peers() {
        let mut body = Vec::new();
        body.extend_from_slice(&1800u32.to_be_bytes());
        body.extend_from_slice(&4u32.to_be_bytes());
        body.extend_from_slice(&9u32.to_be_bytes());
        body.extend_from_slice(&[127, 0, 0, 1, 0x1a, 0xe1]);

        let response = decode_announce(&body).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(response.leechers, 4);
        assert_eq!(response.seeders, 9);
        assert_eq!(response.peers, vec!["127.0.0.1:6881".parse().unwrap()]);
    }

    #[test]
    fn test_decode_error_stops_at_nul() {
        assert_eq!(decode_error(b"torrent not registered\0junk"), "torrent not registered");
        assert_eq!(decode_error(b"no nul"), "no nul");
    }
}
