//! # Tracker Announce
//!
//! Asks HTTP trackers for the peers of a swarm. Trackers are tried in the
//! order listed by the torrent; the first one answering with a non-empty
//! compact peer list wins.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_bencode::de;
use serde_bytes::ByteBuf;
use url::Url;

use crate::metainfo::TorrentFile;
use crate::peer::Peer;

const TRACKER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct BencodeTracker {
    /// Seconds to wait before refreshing the peer list
    #[allow(dead_code)]
    #[serde(default)]
    interval: u32,
    #[serde(rename = "failure reason")]
    failure_reason: Option<String>,
    #[serde(default)]
    peers: ByteBuf,
}

/// Percent-encodes every byte as `%XX`.
fn percent_encode_binary(data: &[u8]) -> String {
    data.iter().map(|byte| format!("%{:02X}", byte)).collect()
}

/// Builds the announce URL for a tracker.
pub fn build_tracker_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> Result<String> {
    let base_url =
        Url::parse(announce).map_err(|e| anyhow!("could not parse tracker url {}: {}", announce, e))?;

    // Built by hand: info_hash and peer_id are raw bytes, not UTF-8
    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
        percent_encode_binary(info_hash),
        percent_encode_binary(peer_id),
        port,
        left
    );

    let mut url = base_url.to_string();
    url.push(if base_url.query().is_some() { '&' } else { '?' });
    url.push_str(&query);

    Ok(url)
}

/// Parses a bencoded tracker response into peers.
pub fn parse_tracker_response(body: &[u8]) -> Result<Vec<Peer>> {
    let response: BencodeTracker =
        de::from_bytes(body).map_err(|e| anyhow!("could not decode tracker response: {}", e))?;

    if let Some(reason) = response.failure_reason {
        return Err(anyhow!("tracker refused announce: {}", reason));
    }

    Peer::from_compact(&response.peers)
}

fn announce(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<Peer>> {
    let body = client.get(url).send()?.error_for_status()?.bytes()?;
    parse_tracker_response(&body)
}

/// Requests peers from the torrent's trackers.
pub fn request_peers(torrent: &TorrentFile, peer_id: &[u8; 20], port: u16) -> Result<Vec<Peer>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(TRACKER_TIMEOUT)
        .build()?;

    for tracker in &torrent.announce {
        let url = match build_tracker_url(tracker, &torrent.info_hash, peer_id, port, torrent.length)
        {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping tracker {}: {}", tracker, e);
                continue;
            }
        };

        match announce(&client, &url) {
            Ok(peers) if !peers.is_empty() => {
                let mut seen = HashSet::new();
                let peers: Vec<Peer> = peers.into_iter().filter(|p| seen.insert(*p)).collect();
                info!("Tracker {} returned {} peers", tracker, peers.len());
                return Ok(peers);
            }
            Ok(_) => warn!("Tracker {} returned no peers", tracker),
            Err(e) => warn!("Tracker {} failed: {}", tracker, e),
        }
    }

    Err(anyhow!("could not get peers from any tracker"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    #[test]
    fn url_encodes_binary_fields() {
        let mut info_hash = [0; 20];
        info_hash[0] = 0xd8;
        info_hash[1] = 0x20;
        let url = build_tracker_url(
            "http://tracker.example:6969/announce",
            &info_hash,
            &[b'a'; 20],
            6881,
            351272960,
        )
        .unwrap();

        assert!(url.starts_with("http://tracker.example:6969/announce?info_hash=%D8%20%00"));
        assert!(url.contains(&format!("&peer_id={}&", "%61".repeat(20))));
        assert!(url.ends_with("&port=6881&uploaded=0&downloaded=0&left=351272960&compact=1"));
    }

    #[test]
    fn url_keeps_existing_query() {
        let url = build_tracker_url("http://t.example/a?key=1", &[0; 20], &[0; 20], 1, 2).unwrap();
        assert!(url.starts_with("http://t.example/a?key=1&info_hash="));
    }

    #[test]
    fn invalid_url_is_error() {
        assert!(build_tracker_url("not a url", &[0; 20], &[0; 20], 1, 2).is_err());
    }

    #[test]
    fn parse_compact_response() {
        let body = b"d8:intervali900e5:peers12:\x7f\x00\x00\x01\x1a\xe1\x0a\x00\x00\x02\x00\x50e";
        let peers = parse_tracker_response(body).unwrap();
        assert_eq!(
            peers,
            vec![
                Peer::new(Ipv4Addr::new(127, 0, 0, 1), 6881),
                Peer::new(Ipv4Addr::new(10, 0, 0, 2), 80),
            ]
        );
    }

    #[test]
    fn parse_failure_reason() {
        let body = b"d14:failure reason12:unregisterede";
        let err = parse_tracker_response(body).unwrap_err();
        assert!(err.to_string().contains("unregistered"));
    }
}
