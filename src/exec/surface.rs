// src/exec/surface.rs

//! Process / display surface abstraction.
//!
//! An execution channel never touches OS processes directly. It talks to a
//! [`Surface`] created by a [`SurfaceFactory`]:
//!
//! - production uses [`crate::exec::ShellSurfaceFactory`], which spawns the
//!   shell with `tokio::process`;
//! - tests provide a scriptable fake that emits [`SurfaceEvent`]s on demand.
//!
//! A surface outlives a single process: when a channel is reused, the next
//! task is launched on the same surface.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::errors::Result;

/// Identity of an execution channel. Unique and never reused.
pub type ExecutorId = u64;

/// Fully resolved options for one process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Display name, e.g. `"Task - build"`.
    pub name: String,
    /// Shell program.
    pub shell: String,
    /// Arguments after the shell program: flag and command line.
    pub shell_args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: String,
}

impl ExecutionOptions {
    pub fn command_line(&self) -> &str {
        self.shell_args.last().map(String::as_str).unwrap_or("")
    }
}

/// Lifecycle notifications from a surface to its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The process is live. `pid` is `None` if the OS did not report one.
    Attached { pid: Option<u32> },
    /// Raw output bytes, in receipt order.
    Output(Vec<u8>),
    /// The process exited. Sent exactly once per launch.
    Exited { code: Option<i32> },
    /// The display backing the surface was torn down externally.
    Removed,
}

pub type SurfaceEventSender = mpsc::UnboundedSender<SurfaceEvent>;

pub trait Surface: Send {
    /// Start a process with `options`, reporting its lifecycle on `events`.
    fn launch(&mut self, options: &ExecutionOptions, events: SurfaceEventSender) -> Result<()>;

    /// Write a line of text to the display (banners, exit messages).
    fn write_line(&mut self, text: &str);

    /// Stop accepting user input.
    fn disable_input(&mut self);

    /// Release the running process. The exit is still reported as an event.
    fn dispose(&mut self);

    /// Forcefully kill the running process.
    fn kill(&mut self);

    /// Tear down the display.
    fn remove(&mut self);
}

pub trait SurfaceFactory: Send + Sync {
    fn create(&self, executor: ExecutorId, options: &ExecutionOptions) -> Result<Box<dyn Surface>>;
}
