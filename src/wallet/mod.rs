pub mod memory;
pub mod sender;
pub mod types;

pub use memory::MemoryWallet;
pub use sender::{PreparedSend, SendError, TransactionSender};
pub use types::*;
