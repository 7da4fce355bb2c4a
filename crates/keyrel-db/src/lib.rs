//! Store access layer for keyrel.
//!
//! Everything that touches the wire lives here: the typed command set, the
//! reply model with its validator, connection sessions, and two executors
//! that carry commands (a live [`fred`] connection and an in-memory store).
//!
//! # Architecture
//!
//! ```text
//! Scan / Modify engine
//!     |
//!     +-- Session::run(command, context) --> check_reply --> Reply | DbError
//!             |
//!             +-- CommandExecutor
//!                   |-- RedisConnection   (fred client, live store)
//!                   +-- MemoryConnection  (MemoryStore, tests and offline runs)
//! ```
//!
//! # Modules
//!
//! - [`command`] -- Typed store commands and scan patterns
//! - [`reply`] -- Reply model and the reply validator
//! - [`session`] -- Session lifecycle and the executor trait
//! - [`redis`] -- `fred`-backed live connections
//! - [`memory`] -- In-memory store
//! - [`error`] -- Shared error types

pub mod command;
pub mod error;
pub mod memory;
pub mod redis;
pub mod reply;
pub mod session;

// Re-export primary types for convenience.
pub use command::{CURSOR_START, Command, PAGE_SIZE};
pub use error::{DbError, TransportError};
pub use memory::{Entry, MemoryConnection, MemoryStore};
pub use redis::{RedisConnection, connect};
pub use reply::{Reply, ReplyKind, check_reply};
pub use session::{CommandExecutor, Session};
