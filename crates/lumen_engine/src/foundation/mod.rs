//! Foundation utilities: math types, frame timing, and signals
//!
//! These are the leaf building blocks the rest of the engine depends on.

pub mod math;
pub mod signal;
pub mod time;
