//! Optimistic working copy of opportunities.
//!
//! A stage move or field edit is applied to the local record immediately and
//! reported to subscribers; the coordinator later commits it with the server
//! record or rolls it back to the exact value captured at apply time.

mod core;
mod remote;
mod types;


pub use self::core::OptimisticStore;
pub use remote::pump_remote_changes;
pub use types::{
    ApplyOutcome, BoardColumn, Mutation, MutationToken, RemoteStageChange, StoreError, StoreEvent,
};
