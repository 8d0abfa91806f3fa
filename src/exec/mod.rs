// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`surface`] defines the process/display surface the engine runs tasks
//!   on, and the resolved [`ExecutionOptions`] for one launch.
//! - [`shell`] is the production surface built on `tokio::process`.
//! - [`channel`] owns one surface and the `Init -> Ready -> Running ->
//!   Exited` lifecycle of the process on it.
//! - [`pool`] hands out exited channels for reuse or creates new ones.

pub mod channel;
pub mod pool;
pub mod shell;
pub mod surface;

pub use channel::{
    ChannelState, CompletionHandle, ExecuteRequest, ExecutionChannel, RunHandles, TaskExit,
};
pub use pool::{Acquired, ExecutionPool};
pub use shell::{ShellSurface, ShellSurfaceFactory};
pub use surface::{
    ExecutionOptions, ExecutorId, Surface, SurfaceEvent, SurfaceEventSender, SurfaceFactory,
};
