pub mod lock;
pub mod memory;
pub mod node_store;
pub mod transaction;
pub mod types;

pub use lock::{LeaseToken, LockError, LockService, MemoryLockService};
pub use memory::{MemoryNodeStore, MemoryTypeDictionary};
pub use node_store::{NodeStore, StorageError, TypeDictionary};
pub use transaction::{RetryConfig, TransactionRunner};
pub use types::{model, NodeRef, PropertyValue, QName};
