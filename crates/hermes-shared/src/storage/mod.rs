//! # Durable Storage Layer
//!
//! The four persistence tables behind the routing core: thread mappings,
//! queue registry, ownership, and the session index. Persistent stores are
//! the source of truth; in-memory structures elsewhere in the core are
//! strictly derived state.

pub mod error;
pub mod providers;
pub mod traits;
pub mod types;

pub use error::StorageError;
pub use providers::{MemoryStorage, PostgresStorage, StorageProvider};
pub use traits::{OwnershipStore, QueueRegistryStore, SessionIndexStore, ThreadMappingStore};
pub use types::{OwnershipRecord, OwnershipStatus, QueueTripletRecord, SessionRecord};
