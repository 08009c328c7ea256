//! Peer address discovery.
//!
//! A [`DiscoverySource`] is one way of finding addresses: the user's trusted
//! peer, DNS seeds, a channel rendezvous server or a fixed list. The
//! [`CompositeDiscovery`] puts the trusted peer first, appends general
//! discovery results unless the user asked for the trusted peer only, and then
//! trims the tail so that after the peer group's own shuffle the trusted entry
//! has a better chance of being among the addresses actually dialled.

use crate::network::rendezvous;
use crate::network::types::DiscoveryError;

use futures::future::join_all;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
	/// A single user-configured host.
	Trusted { host: String, port: u16 },
	/// DNS seeds answering with A/AAAA records of reachable peers.
	Dns { seeds: Vec<String>, port: u16 },
	/// Peers announcing themselves as encoded nicks in a chat channel.
	ChannelRendezvous { server: String, channel: String },
	/// A fixed address list.
	Fixed(Vec<SocketAddr>),
}

impl DiscoverySource {
	pub fn name(&self) -> &'static str {
		match self {
			DiscoverySource::Trusted { .. } => "trusted",
			DiscoverySource::Dns { .. } => "dns",
			DiscoverySource::ChannelRendezvous { .. } => "rendezvous",
			DiscoverySource::Fixed(_) => "fixed",
		}
	}

	pub async fn get_peers(&self, timeout: Duration) -> Result<Vec<SocketAddr>, DiscoveryError> {
		match self {
			DiscoverySource::Trusted { host, port } => {
				let addrs = resolve(host, *port, timeout).await?;
				// Only the first record is used for the trusted peer.
				Ok(addrs.into_iter().take(1).collect())
			}
			DiscoverySource::Dns { seeds, port } => {
				let lookups = seeds.iter().map(|seed| resolve(seed, *port, timeout));
				let mut peers = Vec::new();
				let mut resolved_any = false;
				for (seed, result) in seeds.iter().zip(join_all(lookups).await) {
					match result {
						Ok(addrs) => {
							debug!("DNS seed {} returned {} addresses", seed, addrs.len());
							resolved_any = true;
							peers.extend(addrs);
						}
						Err(e) => warn!("DNS seed {} failed: {}", seed, e),
					}
				}
				if !resolved_any {
					return Err(DiscoveryError::NoSeeds);
				}
				Ok(peers)
			}
			DiscoverySource::ChannelRendezvous { server, channel } => {
				rendezvous::discover(server, channel, timeout).await
			}
			DiscoverySource::Fixed(addrs) => Ok(addrs.clone()),
		}
	}
}

async fn resolve(host: &str, port: u16, timeout: Duration) -> Result<Vec<SocketAddr>, DiscoveryError> {
	let lookup = tokio::net::lookup_host((host, port));
	match tokio::time::timeout(timeout, lookup).await {
		Ok(Ok(addrs)) => Ok(addrs.collect()),
		Ok(Err(source)) => Err(DiscoveryError::Resolve {
			host: host.to_string(),
			source,
		}),
		Err(_) => Err(DiscoveryError::Timeout(timeout)),
	}
}

/// Trusted peer settings as read from preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedPeer {
	pub host: String,
	pub port: u16,
}

/// Address source installed on every new peer session.
#[derive(Debug, Clone)]
pub struct CompositeDiscovery {
	trusted: Option<DiscoverySource>,
	general: Option<DiscoverySource>,
	trim_cap: usize,
}

impl CompositeDiscovery {
	/// `trim_cap` is the regular connection pool size. With `trusted_only` set
	/// (and a trusted peer present) general discovery is skipped entirely.
	pub fn new(
		trusted: Option<TrustedPeer>,
		trusted_only: bool,
		general: DiscoverySource,
		trim_cap: usize,
	) -> Self {
		let skip_general = trusted.is_some() && trusted_only;
		Self {
			trusted: trusted.map(|peer| DiscoverySource::Trusted {
				host: peer.host,
				port: peer.port,
			}),
			general: (!skip_general).then_some(general),
			trim_cap,
		}
	}

	pub fn has_trusted_peer(&self) -> bool {
		self.trusted.is_some()
	}

	pub fn is_trusted_only(&self) -> bool {
		self.trusted.is_some() && self.general.is_none()
	}

	/// Collects addresses from every source. Failures of any one source are
	/// logged and contribute nothing.
	pub async fn get_peers(&self, timeout: Duration) -> Vec<SocketAddr> {
		let mut peers = Vec::new();
		let mut needs_trim = false;

		if let Some(trusted) = &self.trusted {
			match trusted.get_peers(timeout).await {
				Ok(addrs) if !addrs.is_empty() => {
					peers.extend(addrs);
					needs_trim = true;
				}
				Ok(_) => debug!("Trusted peer resolved to no addresses"),
				Err(e) => debug!("Dropping trusted peer: {}", e),
			}
		}

		if let Some(general) = &self.general {
			match general.get_peers(timeout).await {
				Ok(addrs) => peers.extend(addrs),
				Err(e) => warn!("{} discovery failed: {}", general.name(), e),
			}
		}

		if needs_trim {
			trim_for_trusted(&mut peers, self.trim_cap);
		}

		info!("Discovered {} peer addresses", peers.len());
		peers
	}
}

/// Drops addresses from the tail while the list is at or above `cap`, never
/// removing the first (trusted) entry.
pub fn trim_for_trusted(peers: &mut Vec<SocketAddr>, cap: usize) {
	while peers.len() >= cap && peers.len() > 1 {
		peers.pop();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addrs(count: u8) -> Vec<SocketAddr> {
		(1..=count)
			.map(|i| SocketAddr::from(([192, 168, 0, i], 9333)))
			.collect()
	}

	#[test]
	fn trim_keeps_head_and_shrinks_below_cap() {
		let mut peers = addrs(11);
		trim_for_trusted(&mut peers, 8);
		assert_eq!(peers.len(), 7);
		assert_eq!(peers[0], SocketAddr::from(([192, 168, 0, 1], 9333)));
	}

	#[test]
	fn trim_never_removes_only_entry() {
		let mut peers = addrs(1);
		trim_for_trusted(&mut peers, 1);
		assert_eq!(peers.len(), 1);
	}

	#[tokio::test]
	async fn trusted_peer_leads_trimmed_list() {
		let discovery = CompositeDiscovery::new(
			Some(TrustedPeer {
				host: "10.0.0.1".to_string(),
				port: 9333,
			}),
			false,
			DiscoverySource::Fixed(addrs(10)),
			8,
		);

		let peers = discovery.get_peers(Duration::from_secs(1)).await;
		assert!(peers.len() <= 8);
		assert_eq!(peers[0], SocketAddr::from(([10, 0, 0, 1], 9333)));
	}

	#[tokio::test]
	async fn trusted_only_skips_general_discovery() {
		let discovery = CompositeDiscovery::new(
			Some(TrustedPeer {
				host: "10.0.0.1".to_string(),
				port: 9333,
			}),
			true,
			DiscoverySource::Fixed(addrs(10)),
			8,
		);

		assert!(discovery.is_trusted_only());
		let peers = discovery.get_peers(Duration::from_secs(1)).await;
		assert_eq!(peers, vec![SocketAddr::from(([10, 0, 0, 1], 9333))]);
	}

	#[tokio::test]
	async fn no_trusted_peer_means_no_trim() {
		let discovery = CompositeDiscovery::new(None, true, DiscoverySource::Fixed(addrs(10)), 8);

		assert!(!discovery.is_trusted_only());
		assert_eq!(discovery.get_peers(Duration::from_secs(1)).await.len(), 10);
	}
}
