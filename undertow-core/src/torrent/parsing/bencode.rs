//! Bencode parsing logic and info hash calculation

use std::ops::Range;

use sha1::{Digest, Sha1};

use super::types::{FileEntry, TorrentInfo, push_unique};
use crate::torrent::{InfoHash, TorrentError};

// Type aliases for complex bencode types
pub(super) type BencodeDict<'a> = std::collections::HashMap<&'a [u8], bencode_rs::Value<'a>>;
pub(super) type ParseResult<T> = Result<T, TorrentError>;
pub(super) type BytesResult<'a> = Result<&'a [u8], TorrentError>;

fn invalid(reason: impl Into<String>) -> TorrentError {
    TorrentError::InvalidTorrentFile {
        reason: reason.into(),
    }
}

/// Bencode parsing utilities for torrent metadata extraction.
pub struct BencodeParser;

impl BencodeParser {
    /// Parse raw `.torrent` bytes into [`TorrentInfo`].
    ///
    /// The info hash is the SHA-1 of the `info` value exactly as it appears
    /// in `torrent_bytes`; nothing is re-serialized.
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidTorrentFile` - If bencode parsing or metadata extraction failed
    pub fn parse_torrent(torrent_bytes: &[u8]) -> ParseResult<TorrentInfo> {
        let parsed = bencode_rs::Value::parse(torrent_bytes)
            .map_err(|e| invalid(format!("Bencode parsing failed: {e:?}")))?;

        let Some(root) = parsed.first() else {
            return Err(invalid("Empty bencode data"));
        };

        let bencode_rs::Value::Dictionary(dict) = root else {
            return Err(invalid("Root element must be dictionary"));
        };

        Self::extract_info_from_dict(dict, torrent_bytes)
    }

    /// Extract torrent metadata from the root bencode dictionary
    fn extract_info_from_dict(
        dict: &BencodeDict<'_>,
        original_data: &[u8],
    ) -> ParseResult<TorrentInfo> {
        let info_value = dict
            .get(b"info".as_slice())
            .ok_or_else(|| invalid("Missing 'info' field"))?;

        let bencode_rs::Value::Dictionary(info_dict) = info_value else {
            return Err(invalid("Info field must be dictionary"));
        };

        let info_hash = Self::calculate_info_hash(original_data)?;

        let name = Self::extract_bytes_as_string(info_dict, b"name")?;
        let piece_length = Self::extract_integer(info_dict, b"piece length")?;
        if piece_length <= 0 {
            return Err(invalid("Piece length must be positive"));
        }

        let pieces_bytes = Self::extract_bytes(info_dict, b"pieces")?;
        if !pieces_bytes.len().is_multiple_of(20) {
            return Err(invalid("Invalid pieces length"));
        }

        let files = if let Ok(length) = Self::extract_integer(info_dict, b"length") {
            vec![FileEntry {
                path: vec![name.clone()],
                offset: 0,
                length: length.max(0) as u64,
            }]
        } else if let Some(bencode_rs::Value::List(files_list)) = info_dict.get(b"files".as_slice())
        {
            Self::extract_files(files_list)?
        } else {
            return Err(invalid("Missing 'files' or 'length' field"));
        };

        let total_size = files.iter().map(|f| f.length).sum();
        let is_private = matches!(Self::extract_integer(info_dict, b"private"), Ok(1));

        Ok(TorrentInfo {
            info_hash,
            name,
            piece_length: piece_length as u64,
            piece_count: (pieces_bytes.len() / 20) as u32,
            total_size,
            files,
            trackers: Self::extract_announce_urls(dict),
            is_private,
        })
    }

    /// Calculate SHA1 hash of the info dictionary as found in the input
    fn calculate_info_hash(original_data: &[u8]) -> ParseResult<InfoHash> {
        let span = Self::find_info_span(original_data)?;

        let mut hasher = Sha1::new();
        hasher.update(&original_data[span]);
        let digest = hasher.finalize();

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest);
        Ok(InfoHash::new(hash))
    }

    /// Locate the byte range of the top-level `info` value.
    ///
    /// Walks the root dictionary key by key so an `info` string occurring
    /// inside another value (an announce URL, a comment) is never mistaken
    /// for the key.
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidTorrentFile` - Root is not a dictionary or has no `info` key
    pub fn find_info_span(data: &[u8]) -> ParseResult<Range<usize>> {
        if data.first() != Some(&b'd') {
            return Err(invalid("Expected dictionary start"));
        }

        let mut pos = 1;
        while pos < data.len() && data[pos] != b'e' {
            let (key, value_start) = Self::read_string(data, pos)?;
            let value_end = Self::find_value_end(data, value_start)?;
            if key == b"info" {
                return Ok(value_start..value_end);
            }
            pos = value_end;
        }

        Err(invalid("Could not find info dictionary in data"))
    }

    /// Read a `<len>:<bytes>` string at `pos`, returning it and the next position.
    fn read_string(data: &[u8], pos: usize) -> ParseResult<(&[u8], usize)> {
        let colon = data[pos..]
            .iter()
            .position(|&b| b == b':')
            .map(|offset| pos + offset)
            .ok_or_else(|| invalid("Invalid string format"))?;

        let length: usize = std::str::from_utf8(&data[pos..colon])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| invalid("Invalid string length"))?;

        let start = colon + 1;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| invalid("String exceeds data"))?;
        Ok((&data[start..end], end))
    }

    /// Find the end position (exclusive) of the bencode value starting at `start`
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidTorrentFile` - If the value is truncated or malformed
    pub fn find_value_end(data: &[u8], start: usize) -> ParseResult<usize> {
        let mut pos = start;
        let mut depth = 0usize;

        loop {
            let Some(&byte) = data.get(pos) else {
                return Err(invalid("Incomplete bencode value"));
            };

            match byte {
                b'd' | b'l' => {
                    depth += 1;
                    pos += 1;
                }
                b'e' => {
                    if depth == 0 {
                        return Err(invalid("Unexpected end marker"));
                    }
                    depth -= 1;
                    pos += 1;
                }
                b'i' => {
                    let end = data[pos..]
                        .iter()
                        .position(|&b| b == b'e')
                        .ok_or_else(|| invalid("Unterminated integer"))?;
                    pos += end + 1;
                }
                b'0'..=b'9' => {
                    let (_, next) = Self::read_string(data, pos)?;
                    pos = next;
                }
                _ => return Err(invalid("Invalid bencode character")),
            }

            if depth == 0 {
                return Ok(pos);
            }
        }
    }

    /// Extract string from bencode dictionary
    fn extract_bytes_as_string(dict: &BencodeDict<'_>, key: &[u8]) -> ParseResult<String> {
        let bytes = Self::extract_bytes(dict, key)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            invalid(format!(
                "Invalid UTF-8 in field: {:?}",
                String::from_utf8_lossy(key)
            ))
        })
    }

    /// Extract bytes from bencode dictionary
    fn extract_bytes<'a>(dict: &'a BencodeDict<'_>, key: &[u8]) -> BytesResult<'a> {
        match dict.get(key) {
            Some(bencode_rs::Value::Bytes(bytes)) => Ok(bytes),
            _ => Err(invalid(format!(
                "Missing or invalid field: {:?}",
                String::from_utf8_lossy(key)
            ))),
        }
    }

    /// Extract integer from bencode dictionary
    fn extract_integer(dict: &BencodeDict<'_>, key: &[u8]) -> ParseResult<i64> {
        match dict.get(key) {
            Some(bencode_rs::Value::Integer(value)) => Ok(*value),
            _ => Err(invalid(format!(
                "Missing or invalid integer field: {:?}",
                String::from_utf8_lossy(key)
            ))),
        }
    }

    /// Extract files of a multi-file torrent with running byte offsets
    fn extract_files(files_list: &[bencode_rs::Value<'_>]) -> ParseResult<Vec<FileEntry>> {
        let mut files = Vec::with_capacity(files_list.len());
        let mut offset = 0u64;

        for file_value in files_list {
            let bencode_rs::Value::Dictionary(file_dict) = file_value else {
                return Err(invalid("Invalid file entry type"));
            };

            let length = Self::extract_integer(file_dict, b"length")?.max(0) as u64;

            let Some(bencode_rs::Value::List(path_list)) = file_dict.get(b"path".as_slice()) else {
                return Err(invalid("Missing or invalid path in file"));
            };

            let path = path_list
                .iter()
                .map(|component| match component {
                    bencode_rs::Value::Bytes(bytes) => String::from_utf8(bytes.to_vec())
                        .map_err(|_| invalid("Invalid UTF-8 in file path")),
                    _ => Err(invalid("Invalid path component type")),
                })
                .collect::<ParseResult<Vec<_>>>()?;

            files.push(FileEntry {
                path,
                offset,
                length,
            });
            offset = offset
                .checked_add(length)
                .ok_or_else(|| invalid("Total file length overflows"))?;
        }

        Ok(files)
    }

    /// Extract `announce` followed by the flattened `announce-list`
    fn extract_announce_urls(dict: &BencodeDict<'_>) -> Vec<String> {
        let mut announce_urls = Vec::new();

        if let Ok(announce) = Self::extract_bytes_as_string(dict, b"announce") {
            push_unique(&mut announce_urls, announce);
        }

        if let Some(bencode_rs::Value::List(announce_list)) = dict.get(b"announce-list".as_slice())
        {
            for tier in announce_list {
                if let bencode_rs::Value::List(tier_urls) = tier {
                    for url_value in tier_urls {
                        if let bencode_rs::Value::Bytes(url_bytes) = url_value
                            && let Ok(url) = String::from_utf8(url_bytes.to_vec())
                        {
                            push_unique(&mut announce_urls, url);
                        }
                    }
                }
            }
        }

        announce_urls
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const PIECES_20: &str = "\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01";

    fn create_minimal_torrent_data() -> Vec<u8> {
        format!(
            "d8:announce9:test.com:4:infod6:lengthi1048576e4:name9:test.file12:piece lengthi32768e6:pieces20:{PIECES_20}ee"
        )
        .into_bytes()
    }

    #[test]
    fn test_find_value_end_simple() {
        let bencode_data = b"d3:keyi42ee";
        let end = BencodeParser::find_value_end(bencode_data, 0).unwrap();
        assert_eq!(end, bencode_data.len());
    }

    #[test]
    fn test_find_value_end_nested() {
        let bencode_data = b"d3:keyd4:namei42eee";
        let end = BencodeParser::find_value_end(bencode_data, 0).unwrap();
        assert_eq!(end, bencode_data.len());
    }

    #[test]
    fn test_find_value_end_with_list() {
        let bencode_data = b"d4:listl4:testi42eee";
        let end = BencodeParser::find_value_end(bencode_data, 0).unwrap();
        assert_eq!(end, bencode_data.len());
    }

    #[test]
    fn test_find_value_end_scalars() {
        assert_eq!(BencodeParser::find_value_end(b"i-12e", 0).unwrap(), 5);
        assert_eq!(BencodeParser::find_value_end(b"4:spamxx", 0).unwrap(), 6);
    }

    #[test]
    fn test_find_value_end_incomplete() {
        assert!(BencodeParser::find_value_end(b"d3:key", 0).is_err());
        assert!(BencodeParser::find_value_end(b"d3:key999:", 0).is_err());
        assert!(BencodeParser::find_value_end(b"x", 0).is_err());
    }

    #[test]
    fn test_info_span_ignores_info_inside_other_values() {
        // The announce URL contains "4:info" which a substring search would hit first.
        let data = b"d8:announce6:4:info4:infod4:name1:xee";
        let span = BencodeParser::find_info_span(data).unwrap();
        assert_eq!(&data[span], b"d4:name1:xe");
    }

    #[test]
    fn test_info_hash_is_sha1_of_exact_info_bytes() {
        let data = create_minimal_torrent_data();
        let info = BencodeParser::parse_torrent(&data).unwrap();

        let span = BencodeParser::find_info_span(&data).unwrap();
        let expected: [u8; 20] = Sha1::digest(&data[span]).into();
        assert_eq!(info.info_hash, InfoHash::new(expected));
    }

    #[test]
    fn test_parse_minimal_valid() {
        let info = BencodeParser::parse_torrent(&create_minimal_torrent_data()).unwrap();
        assert_eq!(info.name, "test.file");
        assert_eq!(info.piece_length, 32768);
        assert_eq!(info.total_size, 1048576);
        assert_eq!(info.piece_count, 1);
        assert_eq!(info.files.len(), 1);
        assert_eq!(info.trackers, vec!["test.com:"]);
        assert!(!info.is_private);
    }

    #[test]
    fn test_parse_private_flag() {
        let torrent = format!(
            "d4:infod6:lengthi10e4:name1:a12:piece lengthi16e6:pieces20:{PIECES_20}7:privatei1eee"
        );
        let info = BencodeParser::parse_torrent(torrent.as_bytes()).unwrap();
        assert!(info.is_private);
        assert!(info.trackers.is_empty());
    }

    #[test]
    fn test_parse_invalid_pieces_length() {
        let torrent = "d4:infod6:lengthi10e4:name1:a12:piece lengthi16e6:pieces3:abcee";
        let err = BencodeParser::parse_torrent(torrent.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Invalid pieces length"));
    }

    #[test]
    fn test_parse_missing_info() {
        let err = BencodeParser::parse_torrent(b"d8:announce9:test.com:e").unwrap_err();
        assert!(err.to_string().contains("Missing 'info' field"));
    }

    #[test]
    fn test_parse_not_dictionary() {
        assert!(BencodeParser::parse_torrent(b"l4:teste").is_err());
        assert!(BencodeParser::parse_torrent(b"").is_err());
    }

    #[test]
    fn test_announce_list_flattened_and_deduplicated() {
        let torrent = format!(
            "d8:announce9:test.com:13:announce-listll9:test.com:el11:backup.com:ee4:infod6:lengthi10e4:name1:a12:piece lengthi16e6:pieces20:{PIECES_20}ee"
        );
        let info = BencodeParser::parse_torrent(torrent.as_bytes()).unwrap();
        assert_eq!(info.trackers, vec!["test.com:", "backup.com:"]);
    }

    #[test]
    fn test_extract_files_offsets() {
        let file = |name: &'static [u8], length| {
            let mut file_dict = HashMap::new();
            file_dict.insert(b"length".as_slice(), bencode_rs::Value::Integer(length));
            file_dict.insert(
                b"path".as_slice(),
                bencode_rs::Value::List(vec![bencode_rs::Value::Bytes(name)]),
            );
            bencode_rs::Value::Dictionary(file_dict)
        };

        let files =
            BencodeParser::extract_files(&[file(b"file1.txt", 524288), file(b"file2.dat", 1048576)])
                .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].offset, 0);
        assert_eq!(files[1].offset, 524288);
        assert_eq!(files[1].path, vec!["file2.dat"]);
    }

    #[test]
    fn test_extract_files_rejects_overflowing_lengths() {
        let file = |name: &'static [u8]| {
            let mut file_dict = HashMap::new();
            file_dict.insert(b"length".as_slice(), bencode_rs::Value::Integer(i64::MAX));
            file_dict.insert(
                b"path".as_slice(),
                bencode_rs::Value::List(vec![bencode_rs::Value::Bytes(name)]),
            );
            bencode_rs::Value::Dictionary(file_dict)
        };

        let result = BencodeParser::extract_files(&[file(b"a"), file(b"b"), file(b"c")]);
        assert!(matches!(result, Err(TorrentError::InvalidTorrentFile { .. })));
    }

    #[test]
    fn test_extract_files_invalid_entry() {
        let result = BencodeParser::extract_files(&[bencode_rs::Value::Integer(42)]);
        assert!(result.is_err());
    }
}
