//! Exactly-once delivery building blocks.
//!
//! Two composable layers:
//! - **Dedup reservation** ([`DedupStore`]): an atomic check-and-set that
//!   suppresses duplicate enqueues within a TTL
//! - **Transactional outbox** ([`OutboxRepository`] + [`OutboxRelay`]): a
//!   producer commits an outbox row inside the same database transaction as
//!   its business write; a background relay moves committed rows into the
//!   queue backend exactly once
//!
//! ```text
//! business txn ──append row──> outbox table
//!                                  │ (relay poll, oldest first)
//!                        dedup reserve ── duplicate? ──> mark processed
//!                                  │ new
//!                           backend.enqueue
//!                                  │
//!                            mark processed
//! ```
//!
//! The relay is safe to run in multiple instances: the dedup reservation is
//! the single point of enqueue ordering, and a duplicate observed at enqueue
//! time counts as success.

pub mod dedup;
pub mod entity;
pub mod error;
pub mod keygen;
pub mod outbox;
pub mod postgres;
pub mod relay;

pub use dedup::{DedupOutcome, DedupStore, MemoryDedupStore, RedisDedupStore};
pub use error::{DeliveryError, DeliveryResult};
pub use keygen::KeyStrategy;
pub use outbox::{MemoryOutboxRepository, NewOutboxRow, OutboxRepository, OutboxRow, OutboxStatus};
pub use postgres::PgOutboxRepository;
pub use relay::{OutboxRelay, RelayConfig};
