//! TRv1 accountability service.
//!
//! Runs the accountability core inside a validator: consensus messages are
//! validated and stored as they arrive, equivocation and out-of-turn
//! proposals are reported immediately, and every new block triggers a rule
//! scan `delta` heights back plus innocence proofs for accusations naming this
//! node. Queued proofs are handed to a submission channel in batches.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod service;

pub use config::{AccountabilityConfig, ConfigError};
pub use error::{Result, ServiceError};
pub use orchestrator::{BlockEvent, DropReason, MessageOutcome, Orchestrator};
pub use service::AccountabilityService;
