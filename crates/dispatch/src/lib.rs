//! Job dispatch: the FIFO queue, the single worker loop, and the
//! mock/real execution routing.
//!
//! Exactly one job executes at a time. Producers enqueue job ids from
//! anywhere; the worker pulls them in order, drives each job through
//! its state machine, and publishes progress on the
//! [`genflow_events::ProgressBus`]. A job failure is contained to that
//! job; the loop only exits on an explicit shutdown signal.

pub mod backend;
pub mod dispatcher;
pub mod executor;
pub mod mock;

pub use backend::{BackendError, BackendOutput, GenerationBackend};
pub use dispatcher::JobDispatcher;
pub use executor::{execute_job, ExecuteError};
pub use mock::MockBackend;
