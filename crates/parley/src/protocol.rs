//! The canonical event vocabulary and its text framing.
//!
//! This is the one format every other component speaks: the normalizer
//! produces [`CanonicalEvent`]s, the orchestrator encodes them with
//! [`codec::encode`] and hands the bytes to the transport.
pub mod codec;
pub mod event;

pub use codec::{decode, encode, ProtocolError};
pub use event::{CanonicalEvent, EventKind};
