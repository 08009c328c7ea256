mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::headers_after;
use wallet_chain_sync::chain::{AddOutcome, BlockChain, BlockHash, BlockHeader, ChainStore};
use wallet_chain_sync::config::NetworkId;
use wallet_chain_sync::wallet::MemoryWallet;

/// A competing branch on top of `parent`, distinct from `headers_after`.
fn fork_of(parent: &BlockHeader, count: usize) -> Vec<BlockHeader> {
	let mut headers = Vec::with_capacity(count);
	let mut prev = *parent;
	for n in 0..count {
		let header = BlockHeader {
			merkle_root: BlockHash([0xf0; 32]),
			prev_block: prev.hash(),
			time: prev.time + 60,
			nonce: 1000 + n as u32,
			..prev
		};
		headers.push(header);
		prev = header;
	}
	headers
}

fn open_chain(dir: &tempfile::TempDir, wallet: Arc<MemoryWallet>) -> BlockChain {
	let genesis = NetworkId::TestNet.genesis_header();
	let store = ChainStore::open(dir.path().join("chain"), 64, &genesis).unwrap();
	BlockChain::new(store, wallet).unwrap()
}

#[test]
fn longest_branch_wins_and_wallet_follows() {
	let dir = tempfile::tempdir().unwrap();
	let wallet = Arc::new(MemoryWallet::new());
	let mut chain = open_chain(&dir, wallet.clone());
	let genesis = NetworkId::TestNet.genesis_header();

	let main = headers_after(&genesis, 2);
	for header in &main {
		assert!(matches!(chain.add(*header).unwrap(), AddOutcome::Extended(_)));
	}
	assert_eq!(chain.best_height(), 2);
	assert_eq!(wallet.best_height(), 2);

	let fork = fork_of(&genesis, 3);
	assert!(matches!(chain.add(fork[0]).unwrap(), AddOutcome::SideChain(_)));
	assert!(matches!(chain.add(fork[1]).unwrap(), AddOutcome::SideChain(_)));
	assert_eq!(chain.chain_head().hash, main[1].hash());

	match chain.add(fork[2]).unwrap() {
		AddOutcome::Reorganized(head) => assert_eq!(head.height, 3),
		other => panic!("expected a reorganization, got {:?}", other),
	}
	assert_eq!(chain.chain_head().hash, fork[2].hash());
	assert_eq!(wallet.best_height(), 3);

	let heights: Vec<u32> = chain.recent_headers(10).iter().map(|h| h.height).collect();
	assert_eq!(heights, vec![3, 2, 1, 0]);
	chain.close().unwrap();
}

#[test]
fn orphans_and_duplicates_leave_the_head_alone() {
	let dir = tempfile::tempdir().unwrap();
	let mut chain = open_chain(&dir, Arc::new(MemoryWallet::new()));
	let genesis = NetworkId::TestNet.genesis_header();
	let headers = headers_after(&genesis, 3);

	assert_eq!(chain.add(headers[2]).unwrap(), AddOutcome::Orphan);
	assert!(matches!(chain.add(headers[0]).unwrap(), AddOutcome::Extended(_)));
	assert_eq!(chain.add(headers[0]).unwrap(), AddOutcome::Duplicate);
	assert_eq!(chain.best_height(), 1);
	chain.close().unwrap();
}

#[test]
fn head_survives_reopen() {
	let dir = tempfile::tempdir().unwrap();
	let genesis = NetworkId::TestNet.genesis_header();
	let headers = headers_after(&genesis, 5);
	{
		let mut chain = open_chain(&dir, Arc::new(MemoryWallet::new()));
		for header in &headers {
			chain.add(*header).unwrap();
		}
		chain.close().unwrap();
	}

	let chain = open_chain(&dir, Arc::new(MemoryWallet::new()));
	assert_eq!(chain.best_height(), 5);
	assert_eq!(chain.chain_head().hash, headers[4].hash());
	assert_eq!(chain.recent_headers(2).len(), 2);
	chain.close().unwrap();
}
