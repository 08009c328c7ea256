use std::sync::Arc;
use tracing::{error, info, warn};

use wallet_chain_sync::config::ServiceConfig;
use wallet_chain_sync::network::dry_run::DryRunPeerGroupFactory;
use wallet_chain_sync::preferences::{FilePreferencesRepository, Preferences};
use wallet_chain_sync::service::{
	EnvironmentSignal, ResourceGuard, ServiceDeps, StatusBroadcaster, StatusEvent, SyncService,
};
use wallet_chain_sync::wallet::MemoryWallet;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting blockchain sync service");

	let config = match ServiceConfig::load_from_env().await {
		Ok(config) => config,
		Err(e) => {
			error!("{}", e);
			std::process::exit(1);
		}
	};
	info!(
		"Network {:?}, data directory {:?}",
		config.network, config.data_dir
	);

	if let Err(e) = tokio::fs::create_dir_all(&config.data_dir).await {
		error!("Cannot create data directory {:?}: {}", config.data_dir, e);
		std::process::exit(1);
	}

	let preferences = match Preferences::open(Arc::new(FilePreferencesRepository::new(
		config.preferences_path(),
	)))
	.await
	{
		Ok(preferences) => preferences,
		Err(e) => {
			error!("Failed to load preferences: {}", e);
			std::process::exit(1);
		}
	};

	let deps = ServiceDeps {
		wallet: Arc::new(MemoryWallet::with_save_path(config.data_dir.join("wallet.json"))),
		preferences,
		peer_groups: Arc::new(DryRunPeerGroupFactory::new(config.discovery_timeout())),
		resources: ResourceGuard::in_process(env!("CARGO_PKG_NAME")),
		broadcaster: StatusBroadcaster::new(),
	};

	let (service, handle) = match SyncService::start(config, deps).await {
		Ok(started) => started,
		Err(e) => {
			error!("Sync service failed to start: {}", e);
			std::process::exit(1);
		}
	};

	let mut status = handle.subscribe();
	tokio::spawn(async move {
		while let Ok(event) = status.recv().await {
			match event {
				StatusEvent::Blockchain(state) => info!(
					"Chain height {} ({}), replaying: {}, download: {}",
					state.chain_height, state.chain_date, state.replaying, state.download
				),
				StatusEvent::Peers(state) => info!("{} peers connected", state.num_peers),
				_ => {}
			}
		}
	});

	let signals = handle.clone();
	tokio::spawn(async move {
		let available = [
			EnvironmentSignal::Connectivity {
				connected: true,
				reason: None,
			},
			EnvironmentSignal::Battery {
				level: 100,
				scale: 100,
				plugged: true,
			},
		];
		for signal in available {
			if let Err(e) = signals.environment(signal).await {
				warn!("Failed to deliver environment signal: {}", e);
			}
		}

		if tokio::signal::ctrl_c().await.is_ok() {
			info!("Interrupted, shutting down");
		}
		if let Err(e) = signals.shutdown().await {
			warn!("Failed to request shutdown: {}", e);
		}
	});

	match service.run().await {
		Ok(reason) => info!("Sync service stopped ({:?})", reason),
		Err(e) => {
			error!("Sync service failed: {}", e);
			std::process::exit(1);
		}
	}
}
