// src/engine/mod.rs

//! Task execution engine.
//!
//! This module ties together:
//! - command and matcher resolution for a submitted task
//! - the execution pool (channel reuse)
//! - the table of active tasks, keyed by task id
//! - the lifecycle event stream (`Start`, `Active`, `ProcessStarted`,
//!   `ProcessEnded`, `End`)

pub mod system;

use std::sync::Arc;

use crate::exec::{CompletionHandle, ExecutorId};
use crate::matcher::ProblemSink;
use crate::task::Task;

pub use system::TaskEngine;

/// Discriminant of a [`TaskEvent`], handy for asserting event order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEventKind {
    Start,
    Active,
    ProcessStarted,
    ProcessEnded,
    End,
}

/// Lifecycle events, emitted in this order for every run.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Start { task: Arc<Task> },
    Active { task: Arc<Task> },
    ProcessStarted { task: Arc<Task>, pid: Option<u32> },
    ProcessEnded { task: Arc<Task>, exit_code: Option<i32> },
    End { task: Arc<Task> },
}

impl TaskEvent {
    pub fn kind(&self) -> TaskEventKind {
        match self {
            TaskEvent::Start { .. } => TaskEventKind::Start,
            TaskEvent::Active { .. } => TaskEventKind::Active,
            TaskEvent::ProcessStarted { .. } => TaskEventKind::ProcessStarted,
            TaskEvent::ProcessEnded { .. } => TaskEventKind::ProcessEnded,
            TaskEvent::End { .. } => TaskEventKind::End,
        }
    }

    pub fn task(&self) -> &Arc<Task> {
        match self {
            TaskEvent::Start { task }
            | TaskEvent::Active { task }
            | TaskEvent::ProcessStarted { task, .. }
            | TaskEvent::ProcessEnded { task, .. }
            | TaskEvent::End { task } => task,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExecuteKind {
    /// The process was handed to a channel; `run` does not wait for it.
    Started,
}

/// Returned by [`TaskEngine::run`].
#[derive(Debug, Clone)]
pub struct TaskExecuteResult {
    pub task: Arc<Task>,
    pub kind: TaskExecuteKind,
    /// Channel the task runs on.
    pub executor: ExecutorId,
    /// True if an exited channel was reused.
    pub reused: bool,
    pub completion: CompletionHandle,
    /// Problems reported by the task's matchers.
    pub problems: ProblemSink,
}

#[derive(Debug, Clone)]
pub struct TerminateResponse {
    pub success: bool,
    /// The terminated task, or `None` if it was not active.
    pub task: Option<Arc<Task>>,
}
