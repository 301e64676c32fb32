//! Session store adapters.
//!
//! ## Backends
//!
//! - `RedisSessionBackend` - Shared primary, conditional writes via Lua
//! - `PostgresSessionBackend` - Durable secondary, version-guarded updates
//! - `FileSessionBackend` - Durable secondary on a local directory
//! - `InMemorySessionBackend` - Last resort, lost on restart
//! - `FaultInjectingBackend` - Wrapper for outage and contention tests
//!
//! `SessionStore` chains them in priority order:
//!
//! ```ignore
//! let store = SessionStore::new(
//!     vec![redis, postgres, Arc::new(InMemorySessionBackend::new())],
//!     SessionStoreOptions::default(),
//!     clock,
//! );
//! ```

mod fault;
mod file;
mod in_memory;
mod postgres;
mod redis;
mod store;

pub use fault::FaultInjectingBackend;
pub use file::FileSessionBackend;
pub use in_memory::InMemorySessionBackend;
pub use postgres::PostgresSessionBackend;
pub use redis::RedisSessionBackend;
pub use store::{BackendStatus, SessionStore, SessionStoreOptions};
