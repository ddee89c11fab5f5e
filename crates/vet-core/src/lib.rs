//! vet-core: block-level review tracking for AI-proposed file edits.
//!
//! An AI tool writes straight into a file; vet records what changed as
//! **blocks** that a human later accepts (keep) or rejects (revert). Blocks
//! can travel as plain text using conflict **markers**, and the whole review
//! state can be **snapshotted** to a blob store and restored.

pub mod block;
pub mod block_id;
pub mod config;
pub mod diff;
pub mod error;
mod fsutil;
pub mod hash;
mod lock;
pub mod markers;
pub mod path_key;
pub mod persist;
pub mod registry;
pub mod store;
pub mod tracker;
pub mod validate;

pub use block::{apply_revert, Block, BlockStatus, FileRecord, Revert};
pub use config::EngineConfig;
pub use error::{VetError, VetResult};
pub use path_key::PathKey;
pub use registry::StateRegistry;
pub use tracker::{DocumentHost, Tracker};
