//! Local header chain.
//!
//! - `store`: the file-backed ring of headers with corruption detection.
//! - `blockchain`: best-chain selection on top of the store, feeding the wallet.
//! - `snapshot`: fast-start seeding of a fresh store from a packaged snapshot.

pub mod blockchain;
pub mod snapshot;
pub mod store;
pub mod types;

pub use blockchain::BlockChain;
pub use snapshot::{SnapshotCopyError, copy_chain_snapshot};
pub use store::ChainStore;
pub use types::*;
