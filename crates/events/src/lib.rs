//! Live job-progress publish/subscribe infrastructure.
//!
//! - [`ProgressBus`]: per-job fan-out hub with non-blocking,
//!   best-effort delivery. A slow or dead subscriber is dropped rather
//!   than ever delaying the publisher.
//! - [`JobEvent`]: the status/progress envelope published on every
//!   update.
//! - [`ProgressStream`]: a single subscriber's lazy event sequence,
//!   with keepalive markers during idle stretches and automatic
//!   teardown once a terminal status is observed.

pub mod bus;
pub mod stream;

pub use bus::{JobEvent, ProgressBus};
pub use stream::{ProgressStream, StreamItem};
