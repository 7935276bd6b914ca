//! Backend-to-backend queue migration.
//!
//! A migration proceeds in phases:
//!
//! ```text
//! validation ──> draining (optional) ──> copying ──> verifying ──> completed
//!      │               │                    │             │
//!      └───────────────┴───── failed <─────┴─────────────┘
//! ```
//!
//! Draining flips the producer route to the target before any copying, so
//! the source backlog only shrinks from that point on. Copying batches the
//! source into the target; verification compares lengths. At most one
//! migration is active per queue, progress is reported live with an ETA, and
//! cancellation is cooperative (the target keeps the copied prefix).

pub mod controller;
pub mod error;
pub mod router;

pub use controller::{
    MigrationController, MigrationOptions, MigrationPhase, MigrationReport, ProgressSnapshot,
};
pub use error::{MigrationError, MigrationResult};
pub use router::ProducerRouter;
