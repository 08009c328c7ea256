//! Channel rendezvous discovery.
//!
//! Nodes announce themselves by joining a well-known chat channel with a nick of
//! the form `u<base58check(ipv4 ++ port)>`. Discovery connects to the server,
//! joins the channel, reads the member list and decodes every such nick.

use crate::network::types::DiscoveryError;

use backoff::{ExponentialBackoff, future::retry};
use rand::Rng;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

const RPL_NAMREPLY: &str = "353";
const RPL_ENDOFNAMES: &str = "366";

pub async fn discover(
	server: &str,
	channel: &str,
	timeout: Duration,
) -> Result<Vec<SocketAddr>, DiscoveryError> {
	match tokio::time::timeout(timeout, discover_inner(server, channel, timeout)).await {
		Ok(result) => result,
		Err(_) => Err(DiscoveryError::Timeout(timeout)),
	}
}

async fn discover_inner(
	server: &str,
	channel: &str,
	timeout: Duration,
) -> Result<Vec<SocketAddr>, DiscoveryError> {
	let policy = ExponentialBackoff {
		max_elapsed_time: Some(timeout),
		..ExponentialBackoff::default()
	};

	let stream = retry(policy, || async move {
		TcpStream::connect(server).await.map_err(|e| {
			debug!("Rendezvous connect to {} failed: {}", server, e);
			backoff::Error::transient(e)
		})
	})
	.await?;

	let (reader, mut writer) = stream.into_split();
	let mut lines = BufReader::new(reader).lines();

	let nick = format!("x{}", rand::rng().random_range(100_000u32..1_000_000));
	writer
		.write_all(format!("NICK {nick}\r\nUSER {nick} 8 * : {nick}\r\nJOIN {channel}\r\n").as_bytes())
		.await?;

	let mut users = Vec::new();
	while let Some(line) = lines.next_line().await? {
		let mut parts = line.split_whitespace();
		let first = parts.next().unwrap_or_default();

		if first == "PING" {
			let token = line.trim_start_matches("PING").trim();
			writer.write_all(format!("PONG {token}\r\n").as_bytes()).await?;
			continue;
		}

		match parts.next() {
			Some(RPL_NAMREPLY) => {
				if let Some((_, names)) = line.get(1..).and_then(|rest| rest.split_once(':')) {
					users.extend(names.split_whitespace().map(str::to_string));
				}
			}
			Some(RPL_ENDOFNAMES) => break,
			Some(code) if code.starts_with('4') || code.starts_with('5') => {
				return Err(DiscoveryError::Rendezvous(line));
			}
			_ => {}
		}
	}

	let _ = writer.write_all(b"QUIT\r\n").await;

	let peers: Vec<SocketAddr> = users.iter().filter_map(|user| decode_nick(user)).collect();
	info!(
		"Rendezvous channel {} listed {} users, {} peer addresses",
		channel,
		users.len(),
		peers.len()
	);
	Ok(peers)
}

/// Decodes a `u`-prefixed announcement nick into an address.
///
/// Channel operator and voice prefixes are ignored. Nicks with a bad checksum
/// or the wrong payload length yield `None`.
pub fn decode_nick(nick: &str) -> Option<SocketAddr> {
	let nick = nick.trim_start_matches(['@', '+']);
	let encoded = nick.strip_prefix('u')?;
	let payload = bs58::decode(encoded).with_check(None).into_vec().ok()?;
	if payload.len() != 6 {
		return None;
	}

	let ip = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
	let port = u16::from_be_bytes([payload[4], payload[5]]);
	Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn encode_nick(addr: SocketAddrV4) -> String {
		let mut payload = addr.ip().octets().to_vec();
		payload.extend_from_slice(&addr.port().to_be_bytes());
		format!("u{}", bs58::encode(payload).with_check().into_string())
	}

	#[test]
	fn decodes_announced_address() {
		let addr = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 7), 19333);
		let nick = encode_nick(addr);
		assert_eq!(decode_nick(&nick), Some(SocketAddr::V4(addr)));
		assert_eq!(decode_nick(&format!("@{nick}")), Some(SocketAddr::V4(addr)));
	}

	#[test]
	fn ignores_other_nicks() {
		assert_eq!(decode_nick("alice"), None);
		assert_eq!(decode_nick("uNotBase58!"), None);
	}
}
