//! Runtime core: registry, process lifecycle, health monitoring, shutdown.
//!
//! This module contains the supervision runtime. The main entry point is
//! [`Supervisor`], which wires the pieces together and exposes the public
//! API.
//!
//! Internal modules:
//! - [`registry`]: name-keyed job map, viewer pinning, eviction sweep;
//! - [`payload`]: out-of-band handoff of the job description to the worker;
//! - [`lifecycle`]: worker spawn, exit classification, stop signaling;
//! - [`monitor`]: recurring health/rotation tick;
//! - [`rotate`]: size-triggered log rotation with reopen signaling;
//! - [`shutdown`]: cross-platform OS termination-signal future;
//! - [`supervisor`]: orchestration, drain controller, public API.

mod lifecycle;
mod monitor;
mod payload;
mod registry;
mod rotate;
mod shutdown;
mod supervisor;

pub use lifecycle::{ExitOutcome, Lifecycle, StopKind};
pub use payload::{PayloadChannel, ShmChannel};
pub use registry::{JobRegistry, ViewerRef, encoder_index_from_path, job_name_from_path};
pub use supervisor::Supervisor;
