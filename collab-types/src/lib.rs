//! # collab-types
//!
//! Wire format types for the Duet paired-editing session protocol.
//!
//! This crate provides the foundational types used across all Duet crates:
//! - [`SessionId`], [`UserId`], [`AuthToken`] - Identity types
//! - [`HelloResponse`], [`PairingResult`] - Pairing-service payloads
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;

pub use error::WireError;
pub use ids::{AuthToken, SessionId, UserId};
pub use messages::{HelloResponse, PairingResult, RawPairing, UpdateMarker};
