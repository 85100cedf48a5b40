//! # rangepurge-session
//!
//! Purge session state for Rangepurge.
//!
//! This crate provides:
//! - [`PurgeSession`], the per-channel configuration and range state
//! - [`SessionStore`], the in-memory map enforcing one session per channel
//! - [`RangeEngine`], validation of markers, exclusions and the run claim
//! - [`PurgeController`], typed operations for a UI dispatch layer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rangepurge_session::{PurgeController, SessionStore};
//!
//! let controller = PurgeController::new(Arc::new(SessionStore::new()), config.limits);
//! controller.begin(channel, user);
//! controller.select_start(channel, user, start)?;
//! controller.select_end(channel, user, end)?;
//! let plan = controller.claim_run(channel, user)?;
//! ```

pub mod controller;
pub mod purge;
pub mod range;
pub mod store;

pub use controller::{BeginOutcome, PurgeController, Selection};
pub use purge::PurgeSession;
pub use range::{RangeEngine, RunPlan, MIN_BULK_LIMIT};
pub use store::{SessionHandle, SessionStore};
