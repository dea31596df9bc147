#![deny(unreachable_pub)]

//! The stateful half of the job coordinator: durable artifact storage,
//! the in-memory registry/queue/worker collections, the split
//! dispatcher, the per-job state machine, the chain resolver, the
//! liveness sweeps, and the `Coordinator` facade that composes them
//! under one lock.

mod chain;
mod coordinator;
mod registry;
mod split;
mod state_machine;
mod store;
mod sweep;

pub use chain::JobSubmission;
pub use coordinator::{CompleteResult, Coordinator, JobOffer, JobStatus, NetworkStats};
pub use store::ArtifactStore;
