//! These models represent the records the orchestrator reads and writes.
//!
//! Vendor wire formats never leak in here: adapters translate their own
//! request and event shapes at the edge, and the rest of the crate only sees
//! these structs plus the canonical events in [`crate::protocol`].
pub mod conversation;
pub mod message;
pub mod role;
pub mod tool;
