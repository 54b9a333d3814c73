//! Runtime primitives shared by the gateway and its background monitors.

pub mod liveness;
pub mod task;

pub use liveness::{ActivitySignal, DEFAULT_MAX_INACTIVE, LivenessState, LivenessTracker};
pub use task::{TaskHandle, spawn_named, spawn_periodic};
