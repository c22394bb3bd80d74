//! Response types and the per-call accumulator
//!
//! SSE frames arrive as [`SseEvent`]s and are folded by a
//! [`ResponseAccumulator`] into [`ResponseState`] snapshots.

mod accumulator;
mod types;

pub use accumulator::{decode_embedded_answer, ResponseAccumulator};
pub use types::*;
