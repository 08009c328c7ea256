//! Service configuration and per-network parameters.

use crate::chain::{BlockHash, BlockHeader};
use crate::chain::store::DEFAULT_CAPACITY;
use crate::network::DiscoverySource;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV_VAR: &str = "WALLET_SYNC_CONFIG";

/// Number of decimal places of the native coin.
pub const COIN_DECIMALS: u32 = 8;

/// Genesis merkle root shared by both networks, internal byte order.
const GENESIS_MERKLE_ROOT: [u8; 32] = [
	0xd9, 0xce, 0xd4, 0xed, 0x11, 0x30, 0xf7, 0xb7, 0xfa, 0xad, 0x9b, 0xe2, 0x53, 0x23, 0xff,
	0xaf, 0xa3, 0x32, 0x32, 0xa1, 0x7c, 0x3e, 0xdf, 0x6c, 0xfd, 0x97, 0xbe, 0xe6, 0xba, 0xfb,
	0xdd, 0x97,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkId {
	MainNet,
	TestNet,
}

impl NetworkId {
	pub fn port(&self) -> u16 {
		match self {
			NetworkId::MainNet => 9333,
			NetworkId::TestNet => 19333,
		}
	}

	pub fn dns_seeds(&self) -> &'static [&'static str] {
		match self {
			NetworkId::MainNet => &[
				"dnsseed.litecointools.com",
				"dnsseed.litecoinpool.org",
				"dnsseed.ltc.xurious.com",
				"dnsseed.koin-project.com",
			],
			NetworkId::TestNet => &[],
		}
	}

	pub fn rendezvous_channel(&self) -> &'static str {
		match self {
			NetworkId::MainNet => "#litecoin",
			NetworkId::TestNet => "#litecoinTEST3",
		}
	}

	/// Appended to amounts shown to the user.
	pub fn display_suffix(&self) -> &'static str {
		match self {
			NetworkId::MainNet => "",
			NetworkId::TestNet => " [testnet3]",
		}
	}

	pub fn default_chain_file(&self) -> &'static str {
		match self {
			NetworkId::MainNet => "blockchain",
			NetworkId::TestNet => "blockchain-testnet",
		}
	}

	pub fn genesis_header(&self) -> BlockHeader {
		let (time, nonce) = match self {
			NetworkId::MainNet => (1_317_972_665, 2_084_524_493),
			NetworkId::TestNet => (1_317_798_646, 385_270_584),
		};
		BlockHeader {
			version: 1,
			prev_block: BlockHash::ZERO,
			merkle_root: BlockHash(GENESIS_MERKLE_ROOT),
			time,
			bits: 0x1e0ffff0,
			nonce,
		}
	}

	/// General-purpose discovery: DNS seeds on the main network, the
	/// rendezvous channel on the test network.
	pub fn general_discovery(&self, rendezvous_server: &str) -> DiscoverySource {
		match self {
			NetworkId::MainNet => DiscoverySource::Dns {
				seeds: self.dns_seeds().iter().map(|s| s.to_string()).collect(),
				port: self.port(),
			},
			NetworkId::TestNet => DiscoverySource::ChannelRendezvous {
				server: rendezvous_server.to_string(),
				channel: self.rendezvous_channel().to_string(),
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
	pub network: NetworkId,
	pub data_dir: PathBuf,
	/// File name of the chain store inside `data_dir`; network default when unset.
	pub chain_file: Option<String>,
	/// Pre-packaged chain store image copied in on first run.
	pub snapshot_path: Option<PathBuf>,
	pub store_capacity: u32,
	pub max_connected_peers: usize,
	pub user_agent: String,
	pub state_broadcast_throttle_ms: u64,
	pub widget_throttle_ms: u64,
	pub tick_interval_secs: u64,
	pub idle_window: usize,
	pub idle_timeout_ticks: usize,
	pub discovery_timeout_secs: u64,
	pub rendezvous_server: String,
	/// When set, replaces the network's general discovery with a fixed list.
	pub fixed_peers: Vec<std::net::SocketAddr>,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			network: NetworkId::MainNet,
			data_dir: PathBuf::from("wallet-data"),
			chain_file: None,
			snapshot_path: None,
			store_capacity: DEFAULT_CAPACITY,
			max_connected_peers: 6,
			user_agent: "Litecoin Wallet".to_string(),
			state_broadcast_throttle_ms: 1000,
			widget_throttle_ms: 1000,
			tick_interval_secs: 60,
			idle_window: 10,
			idle_timeout_ticks: 2,
			discovery_timeout_secs: 5,
			rendezvous_server: "irc.lfnet.org:6667".to_string(),
			fixed_peers: Vec::new(),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Failed to read config file {path:?}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse config file {path:?}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

impl ServiceConfig {
	/// Loads the file named by [`CONFIG_ENV_VAR`], or defaults when the
	/// variable is unset or the file does not exist.
	pub async fn load_from_env() -> Result<Self, ConfigError> {
		match std::env::var_os(CONFIG_ENV_VAR) {
			Some(path) => Self::load(Path::new(&path)).await,
			None => Ok(Self::default()),
		}
	}

	pub async fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = match tokio::fs::read_to_string(path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				info!("No config file at {:?}, using defaults", path);
				return Ok(Self::default());
			}
			Err(source) => {
				return Err(ConfigError::Io {
					path: path.to_path_buf(),
					source,
				});
			}
		};

		serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn chain_file_path(&self) -> PathBuf {
		let name = self
			.chain_file
			.as_deref()
			.unwrap_or_else(|| self.network.default_chain_file());
		self.data_dir.join(name)
	}

	pub fn preferences_path(&self) -> PathBuf {
		self.data_dir.join("preferences.json")
	}

	pub fn state_broadcast_throttle(&self) -> Duration {
		Duration::from_millis(self.state_broadcast_throttle_ms)
	}

	pub fn widget_throttle(&self) -> Duration {
		Duration::from_millis(self.widget_throttle_ms)
	}

	pub fn tick_interval(&self) -> Duration {
		Duration::from_secs(self.tick_interval_secs)
	}

	pub fn discovery_timeout(&self) -> Duration {
		Duration::from_secs(self.discovery_timeout_secs)
	}

	pub fn general_discovery(&self) -> DiscoverySource {
		if self.fixed_peers.is_empty() {
			self.network.general_discovery(&self.rendezvous_server)
		} else {
			DiscoverySource::Fixed(self.fixed_peers.clone())
		}
	}
}
