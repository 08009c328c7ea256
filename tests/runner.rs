mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use common::{Harness, headers_after};
use wallet_chain_sync::chain::ChainStore;
use wallet_chain_sync::service::{
	EnvironmentSignal, StatusEvent, StopReason, SyncService, SyncServiceError, SyncServiceHandle,
	SystemLock,
};
use wallet_chain_sync::wallet::{
	Address, ConfidenceType, SendRequest, TransactionSender, VerificationError, Wallet,
};

async fn bring_up(handle: &SyncServiceHandle) {
	handle
		.environment(EnvironmentSignal::Connectivity {
			connected: true,
			reason: Some("test".to_string()),
		})
		.await
		.unwrap();
	handle
		.environment(EnvironmentSignal::Battery {
			level: 5,
			scale: 100,
			plugged: true,
		})
		.await
		.unwrap();
}

async fn next_blockchain_height(status: &mut broadcast::Receiver<StatusEvent>) -> u32 {
	loop {
		if let StatusEvent::Blockchain(state) = status.recv().await.unwrap() {
			return state.chain_height;
		}
	}
}

#[tokio::test(start_paused = true)]
async fn stalled_download_stops_the_service() {
	let harness = Harness::new();
	// A chain still at genesis is never considered stalled.
	let genesis = harness.config.network.genesis_header();
	let mut store =
		ChainStore::open(harness.chain_file(), harness.config.store_capacity, &genesis).unwrap();
	let mut parent = *store.chain_head();
	for header in headers_after(&genesis, 3) {
		let stored = parent.build_next(header);
		store.put(&stored);
		store.set_chain_head(&stored).unwrap();
		parent = stored;
	}
	store.close().unwrap();

	let (service, _handle) = SyncService::start(harness.config.clone(), harness.deps().await)
		.await
		.unwrap();

	let started = tokio::time::Instant::now();
	let reason = service.run().await.unwrap();

	assert_eq!(reason, StopReason::Idle);
	// One tick to take the baseline, two without progress.
	let elapsed = started.elapsed();
	assert!(elapsed >= Duration::from_secs(180));
	assert!(elapsed < Duration::from_secs(240));
}

#[tokio::test(start_paused = true)]
async fn downloads_reach_observers_throttled() {
	let harness = Harness::new();
	let (service, handle) = SyncService::start(harness.config.clone(), harness.deps().await)
		.await
		.unwrap();
	let mut status = handle.subscribe();
	let running = tokio::spawn(service.run());

	bring_up(&handle).await;
	assert!(handle.connected_peers().await.unwrap().is_some());
	assert!(harness.wake.is_held());

	// One immediate state per environment signal.
	assert_eq!(next_blockchain_height(&mut status).await, 0);
	assert_eq!(next_blockchain_height(&mut status).await, 0);

	let listener = harness.groups.last_listener();
	let genesis = harness.config.network.genesis_header();
	let headers = headers_after(&genesis, 3);
	for (n, header) in headers.iter().enumerate() {
		assert!(listener.blocks_downloaded(*header, (headers.len() - n - 1) as u32));
	}

	let before = tokio::time::Instant::now();
	assert_eq!(next_blockchain_height(&mut status).await, 3);
	assert!(before.elapsed() <= Duration::from_secs(1));

	let recent = handle.recent_blocks(2).await.unwrap();
	assert_eq!(
		recent.iter().map(|info| info.height).collect::<Vec<_>>(),
		vec![3, 2]
	);

	handle.shutdown().await.unwrap();
	assert_eq!(running.await.unwrap().unwrap(), StopReason::Shutdown);
	assert!(!harness.wake.is_held());
	assert_eq!(harness.groups.log().live, 0);
	assert_eq!(harness.broadcaster.latest_blockchain(), None);
}

#[tokio::test]
async fn low_memory_stops_the_service() {
	let harness = Harness::new();
	let (service, handle) = SyncService::start(harness.config.clone(), harness.deps().await)
		.await
		.unwrap();
	let running = tokio::spawn(service.run());

	bring_up(&handle).await;
	handle.low_memory().await.unwrap();

	assert_eq!(running.await.unwrap().unwrap(), StopReason::LowMemory);
	assert_eq!(harness.groups.log().live, 0);
	assert!(matches!(
		handle.notify_widgets().await,
		Err(SyncServiceError::ChannelClosed)
	));
}

#[tokio::test]
async fn reset_command_stops_and_removes_the_store() {
	let harness = Harness::new();
	let (service, handle) = SyncService::start(harness.config.clone(), harness.deps().await)
		.await
		.unwrap();
	let running = tokio::spawn(service.run());
	assert!(harness.chain_file().exists());

	handle.hold_keep_alive().await.unwrap();
	handle.reset_blockchain().await.unwrap();

	assert_eq!(running.await.unwrap().unwrap(), StopReason::Reset);
	assert!(!harness.chain_file().exists());
	assert!(!harness.keep_alive.is_held());
}

#[tokio::test]
async fn dropping_every_handle_shuts_down() {
	let harness = Harness::new();
	let (service, handle) = SyncService::start(harness.config.clone(), harness.deps().await)
		.await
		.unwrap();
	drop(handle);

	assert_eq!(service.run().await.unwrap(), StopReason::Shutdown);
}

#[tokio::test]
async fn confirmed_send_is_committed_once_and_broadcast() {
	let harness = Harness::new();
	let (service, handle) = SyncService::start(harness.config.clone(), harness.deps().await)
		.await
		.unwrap();
	// Funded after start: a fresh store clears the wallet.
	harness
		.wallet
		.receive(None, 100_000, ConfidenceType::Building);
	let running = tokio::spawn(service.run());
	bring_up(&handle).await;

	let sender = TransactionSender::new(harness.wallet.clone(), handle.clone());
	let request = SendRequest {
		to: Address::from("LTpYZG19YmfvY2bBDYtCKpunVRw7nVgRHW"),
		amount: 40_000,
		fee: 100,
	};

	// An underpriced first build is replaced before anything is committed.
	let prepared = sender.prepare(request.clone()).await.unwrap();
	let first_tx = prepared.transaction().clone();
	let first = first_tx.hash;
	let prepared = prepared
		.with_fee(SendRequest {
			fee: 1_000,
			..request.clone()
		})
		.await
		.unwrap();
	assert_eq!(prepared.fee(), 1_000);
	assert_eq!(harness.wallet.prepared_count(), 1);
	assert!(matches!(
		harness.wallet.commit(&first_tx),
		Err(VerificationError::Rejected { .. })
	));

	// A build that is never confirmed is released when dropped.
	drop(sender.prepare(request.clone()).await.unwrap());
	assert_eq!(harness.wallet.prepared_count(), 1);

	let hash = prepared.confirm().await.unwrap();
	assert_ne!(hash, first);
	assert_eq!(harness.wallet.get_transaction(&first), None);
	assert!(harness.wallet.get_transaction(&hash).is_some());
	assert_eq!(harness.wallet.prepared_count(), 0);
	assert_eq!(
		harness
			.wallet
			.balance(wallet_chain_sync::wallet::BalanceType::Available),
		59_000
	);

	// The broadcast request is handled before the shutdown that follows it.
	handle.shutdown().await.unwrap();
	running.await.unwrap().unwrap();
	assert_eq!(harness.groups.log().broadcasts, vec![hash]);
}
