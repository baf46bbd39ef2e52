//! Job persistence interface and in-memory implementation.
//!
//! The dispatcher and HTTP layer only ever see the [`JobStore`] trait;
//! durability and schema are the implementation's concern. The
//! [`MemoryJobStore`] provided here keeps records in a process-local
//! map and is the default backing for tests and single-process
//! deployments.
//!
//! Status transitions go through the helpers in [`transitions`], which
//! perform each change as one atomic read-modify-write so the worker's
//! terminal write can never race a concurrent cancel into a lost
//! update.

pub mod memory;
pub mod store;
pub mod transitions;

pub use memory::MemoryJobStore;
pub use store::{JobStore, Mutator, StoreError};
