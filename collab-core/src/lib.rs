//! # collab-core
//!
//! Pure logic for Duet sessions (no I/O, instant tests).
//!
//! This crate implements the session state machine, the pairing plan and
//! document reconciliation without any network, engine or editor access.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (HTTP, engine calls, editor prompts) is performed by
//! `collab-client`, which interprets the results of these functions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pairing;
pub mod reconcile;
pub mod state;

pub use pairing::{HandshakeStep, PairingError};
pub use reconcile::{MergeDecision, ReconcileError, Resolution};
pub use state::{SessionState, Transition, TransportEvent};
