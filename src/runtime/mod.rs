//! Single-writer async runtime, auth binding and event stream APIs.

/// Auth-state to store binding.
pub mod binder;
/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
