//! Repository layer for database access.
//!
//! Trait-based repositories keep the pipeline independent of sqlx; the `*TxOps`
//! helpers run inside a caller-owned transaction and never commit.

pub mod appearance_tx;
pub mod catalog;
pub mod notification;

pub use appearance_tx::*;
pub use catalog::*;
pub use notification::*;
