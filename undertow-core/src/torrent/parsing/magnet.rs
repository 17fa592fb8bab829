//! Magnet link parsing utilities

use url::Url;

use super::types::{MagnetLink, push_unique};
use crate::torrent::{InfoHash, TorrentError};

const BTIH_PREFIX: &str = "urn:btih:";

/// Magnet link parsing utilities.
pub struct MagnetParser;

impl MagnetParser {
    /// Parses magnet link to extract torrent information.
    ///
    /// Pure and network-free. Tracker values are individually URL-decoded
    /// and stripped of literal backslashes some indexers leave behind.
    ///
    /// # Errors
    /// - `TorrentError::InvalidLocator` - Malformed magnet URI or missing/invalid `xt`
    pub fn parse_magnet_link(magnet_url: &str) -> Result<MagnetLink, TorrentError> {
        let url = Url::parse(magnet_url.trim()).map_err(|e| TorrentError::InvalidLocator {
            reason: format!("Invalid magnet link: {e}"),
        })?;

        if url.scheme() != "magnet" {
            return Err(TorrentError::InvalidLocator {
                reason: format!("Not a magnet link: {}", url.scheme()),
            });
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" if info_hash.is_none() => {
                    if let Some(hash) = value.strip_prefix(BTIH_PREFIX) {
                        info_hash = Some(hash.parse::<InfoHash>()?);
                    }
                }
                "dn" if display_name.is_none() => {
                    if !value.is_empty() {
                        display_name = Some(value.into_owned());
                    }
                }
                "tr" => push_unique(&mut trackers, value.replace('\\', "")),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| TorrentError::InvalidLocator {
            reason: format!("Missing urn:btih info hash in magnet link: {magnet_url}"),
        })?;

        Ok(MagnetLink {
            info_hash,
            display_name,
            trackers,
        })
    }

    /// Builds a magnet URI for an info hash, display name and trackers.
    pub fn to_magnet_uri(info_hash: &InfoHash, name: Option<&str>, trackers: &[String]) -> String {
        let mut uri = format!("magnet:?xt={BTIH_PREFIX}{info_hash}");
        if let Some(name) = name {
            uri.push_str("&dn=");
            uri.push_str(&urlencoding::encode(name));
        }
        for tracker in trackers {
            uri.push_str("&tr=");
            uri.push_str(&urlencoding::encode(tracker));
        }
        uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario_magnet() {
        let magnet = "magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA&dn=Example&tr=udp://tracker.example:80";
        let link = MagnetParser::parse_magnet_link(magnet).unwrap();

        assert_eq!(link.info_hash.to_string(), "a".repeat(40));
        assert_eq!(link.display_name.as_deref(), Some("Example"));
        assert_eq!(link.trackers, vec!["udp://tracker.example:80"]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let magnet = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=A&tr=udp%3A%2F%2Fa%3A1&tr=udp%3A%2F%2Fb%3A2";
        let first = MagnetParser::parse_magnet_link(magnet).unwrap();
        let second = MagnetParser::parse_magnet_link(magnet).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.trackers, vec!["udp://a:1", "udp://b:2"]);
    }

    #[test]
    fn test_base32_hash_matches_hex() {
        let hex_hash: InfoHash = "0123456789abcdef0123456789abcdef01234567".parse().unwrap();
        let b32 = data_encoding::BASE32.encode(hex_hash.as_bytes());

        let from_hex = MagnetParser::parse_magnet_link(&format!(
            "magnet:?xt=urn:btih:{hex_hash}"
        ))
        .unwrap();
        let from_b32 =
            MagnetParser::parse_magnet_link(&format!("magnet:?xt=urn:btih:{b32}")).unwrap();

        assert_eq!(from_hex.info_hash, from_b32.info_hash);
    }

    #[test]
    fn test_trackers_unescaped_and_deduplicated() {
        let magnet = format!(
            "magnet:?xt=urn:btih:{}&tr=udp:\\/\\/tracker.one:80&tr=udp%3A%2F%2Ftracker.one%3A80&tr=udp://tracker.two:6969",
            "b".repeat(40)
        );
        let link = MagnetParser::parse_magnet_link(&magnet).unwrap();
        assert_eq!(
            link.trackers,
            vec!["udp://tracker.one:80", "udp://tracker.two:6969"]
        );
        assert_eq!(link.display_name, None);
    }

    #[test]
    fn test_missing_or_bad_hash_is_invalid_locator() {
        for magnet in [
            "magnet:?dn=NoHash",
            "magnet:?xt=urn:btih:xyz",
            "http://example.com/?xt=urn:btih:aaaa",
            "not a url",
        ] {
            assert!(
                matches!(
                    MagnetParser::parse_magnet_link(magnet),
                    Err(TorrentError::InvalidLocator { .. })
                ),
                "{magnet} should be rejected"
            );
        }
    }

    #[test]
    fn test_to_magnet_uri_parses_back() {
        let hash = InfoHash::new([7; 20]);
        let trackers = vec!["udp://tracker.example:80/announce".to_string()];
        let uri = MagnetParser::to_magnet_uri(&hash, Some("Big Movie (2020)"), &trackers);

        let link = MagnetParser::parse_magnet_link(&uri).unwrap();
        assert_eq!(link.info_hash, hash);
        assert_eq!(link.display_name.as_deref(), Some("Big Movie (2020)"));
        assert_eq!(link.trackers, trackers);
    }
}
