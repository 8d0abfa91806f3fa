// src/exec/channel.rs

//! Execution channel: one actor per channel owning a surface and the
//! lifecycle of the process currently running on it.
//!
//! State machine: `Init -> Ready -> Running -> Exited`, and back to `Init`
//! only through [`ExecutionChannel::reset`].
//!
//! The [`ExecutionChannel`] handle is cheap to clone. State is published
//! through a `watch` channel so the pool can inspect it synchronously; every
//! other interaction goes through the actor's command queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::errors::EngineError;
use crate::exec::surface::{ExecutionOptions, ExecutorId, Surface, SurfaceEvent, SurfaceFactory};
use crate::matcher::ProblemCollector;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Init,
    Ready,
    Running,
    Exited,
}

impl ChannelState {
    /// Ready or Running.
    pub fn is_live(self) -> bool {
        matches!(self, ChannelState::Ready | ChannelState::Running)
    }
}

/// Result of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskExit {
    pub exit_code: Option<i32>,
}

/// Awaitable, cloneable completion of one run.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    rx: watch::Receiver<Option<TaskExit>>,
}

impl CompletionHandle {
    /// Wait for the run to finish.
    pub async fn wait(&self) -> TaskExit {
        let mut rx = self.rx.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(value) => *value,
            Err(_) => None,
        };
        exit.unwrap_or(TaskExit { exit_code: None })
    }

    /// The result, if the run has already finished.
    pub fn try_result(&self) -> Option<TaskExit> {
        *self.rx.borrow()
    }
}

/// What the channel needs to start one run.
#[derive(Debug)]
pub struct ExecuteRequest {
    pub task: Arc<Task>,
    pub options: ExecutionOptions,
    pub collector: ProblemCollector,
}

/// Caller side of a started run.
#[derive(Debug)]
pub struct RunHandles {
    pub run_id: u64,
    /// Resolves once the process is attached (pid known).
    pub ready: oneshot::Receiver<Option<u32>>,
    /// Resolves once with the exit code.
    pub exit: oneshot::Receiver<Option<i32>>,
    pub completion: CompletionHandle,
}

enum ChannelCommand {
    Execute {
        run: ActiveRun,
        options: ExecutionOptions,
        reuse: bool,
    },
    Reset,
    Terminate {
        run_id: u64,
        reply: oneshot::Sender<bool>,
    },
}

struct ActiveRun {
    run_id: u64,
    task: Arc<Task>,
    collector: ProblemCollector,
    ready: Option<oneshot::Sender<Option<u32>>>,
    exit: Option<oneshot::Sender<Option<i32>>>,
    completion: watch::Sender<Option<TaskExit>>,
}

struct ChannelShared {
    id: ExecutorId,
    state: watch::Sender<ChannelState>,
    pid: Mutex<Option<u32>>,
    current_run: AtomicU64,
}

impl ChannelShared {
    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    fn set_pid(&self, pid: Option<u32>) {
        *self.pid.lock().unwrap_or_else(|e| e.into_inner()) = pid;
    }
}

#[derive(Clone)]
pub struct ExecutionChannel {
    shared: Arc<ChannelShared>,
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl std::fmt::Debug for ExecutionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionChannel")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ExecutionChannel {
    /// Create the channel and spawn its actor. Must be called within a Tokio
    /// runtime.
    ///
    /// `removed_tx` receives the channel id once its surface is removed.
    pub fn spawn(
        id: ExecutorId,
        factory: Arc<dyn SurfaceFactory>,
        removed_tx: mpsc::UnboundedSender<ExecutorId>,
        kill_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Init);
        let shared = Arc::new(ChannelShared {
            id,
            state,
            pid: Mutex::new(None),
            current_run: AtomicU64::new(0),
        });
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let actor = ChannelActor {
            shared: Arc::clone(&shared),
            factory,
            surface: None,
            events: None,
            run: None,
            last_run: 0,
            disposed: false,
            removed: false,
            removed_tx,
            terminate_waiters: Vec::new(),
            kill_timeout,
            kill_deadline: None,
        };
        tokio::spawn(actor.run(commands_rx));

        Self { shared, commands }
    }

    pub fn id(&self) -> ExecutorId {
        self.shared.id
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Pid of the current (or last) process, once attached.
    pub fn process_id(&self) -> Option<u32> {
        *self.shared.pid.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Id of the most recent run started on this channel.
    pub fn current_run(&self) -> u64 {
        self.shared.current_run.load(Ordering::SeqCst)
    }

    /// Wait until the channel reaches `state`.
    pub async fn wait_for_state(&self, state: ChannelState) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|s| *s == state).await;
    }

    /// Move an exited channel back to `Init` so it can be reused.
    ///
    /// Returns `false` (and changes nothing) unless the channel is `Exited`.
    /// The check and the transition are one atomic step.
    pub fn reset(&self) -> bool {
        let reset = self.shared.state.send_if_modified(|state| {
            if *state == ChannelState::Exited {
                *state = ChannelState::Init;
                true
            } else {
                false
            }
        });

        if reset {
            self.shared.set_pid(None);
            let _ = self.commands.send(ChannelCommand::Reset);
            debug!(executor = self.id(), "execution channel reset");
        }
        reset
    }

    /// Start a run. With `reuse`, the task is launched on the channel's
    /// existing surface; otherwise a new surface is created.
    pub fn execute(&self, request: ExecuteRequest, reuse: bool) -> RunHandles {
        let run_id = self.shared.current_run.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_state(ChannelState::Ready);

        let (ready_tx, ready) = oneshot::channel();
        let (exit_tx, exit) = oneshot::channel();
        let (completion_tx, completion_rx) = watch::channel(None);

        let run = ActiveRun {
            run_id,
            task: request.task,
            collector: request.collector,
            ready: Some(ready_tx),
            exit: Some(exit_tx),
            completion: completion_tx,
        };

        let command = ChannelCommand::Execute {
            run,
            options: request.options,
            reuse,
        };
        if self.commands.send(command).is_err() {
            error!(executor = self.id(), "execution channel actor is gone");
        }

        RunHandles {
            run_id,
            ready,
            exit,
            completion: CompletionHandle { rx: completion_rx },
        }
    }

    /// Terminate run `run_id`.
    ///
    /// If the channel has moved on to a later run, nothing is touched. If the
    /// process already exited the surface is removed right away; otherwise
    /// this waits for the exit (bounded by the kill timeout).
    pub async fn terminate(&self, run_id: u64) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(ChannelCommand::Terminate { run_id, reply })
            .is_err()
        {
            return true;
        }
        rx.await.unwrap_or(true)
    }
}

struct ChannelActor {
    shared: Arc<ChannelShared>,
    factory: Arc<dyn SurfaceFactory>,
    surface: Option<Box<dyn Surface>>,
    /// Events of the most recent launch only.
    events: Option<mpsc::UnboundedReceiver<SurfaceEvent>>,
    run: Option<ActiveRun>,
    last_run: u64,
    disposed: bool,
    removed: bool,
    removed_tx: mpsc::UnboundedSender<ExecutorId>,
    terminate_waiters: Vec<oneshot::Sender<bool>>,
    kill_timeout: Duration,
    kill_deadline: Option<Instant>,
}

impl ChannelActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ChannelCommand>) {
        debug!(executor = self.shared.id, "execution channel started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_surface_event(event),
                    None => self.events_closed(),
                },
                () = deadline(self.kill_deadline) => self.force_kill(),
            }
        }

        if let Some(surface) = self.surface.as_mut() {
            if !self.disposed {
                surface.dispose();
            }
        }
        debug!(executor = self.shared.id, "execution channel stopped");
    }

    fn handle_command(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Execute { run, options, reuse } => self.start(run, options, reuse),
            ChannelCommand::Reset => {
                self.run = None;
                self.kill_deadline = None;
            }
            ChannelCommand::Terminate { run_id, reply } => self.terminate(run_id, reply),
        }
    }

    fn start(&mut self, run: ActiveRun, options: ExecutionOptions, reuse: bool) {
        let label = run.task.display_label().to_string();
        self.last_run = run.run_id;
        self.run = Some(run);
        self.kill_deadline = None;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events = Some(events_rx);

        let reusable = reuse && !self.removed;
        let mut surface = match self.surface.take() {
            Some(surface) if reusable => surface,
            _ => match self.factory.create(self.shared.id, &options) {
                Ok(surface) => {
                    self.disposed = false;
                    self.removed = false;
                    surface
                }
                Err(err) => {
                    self.launch_failed(&label, err);
                    return;
                }
            },
        };

        info!(
            executor = self.shared.id,
            task = %label,
            reuse = reusable,
            cmd = %options.command_line(),
            "executing task"
        );

        surface.write_line(&format!("\x1b[1m> Executing task: {label} <\x1b[0m\n"));
        surface.write_line(&format!("\x1b[1m> Command: {} <\x1b[0m\n", options.command_line()));

        let launched = surface.launch(&options, events_tx);
        self.surface = Some(surface);
        if let Err(err) = launched {
            self.launch_failed(&label, err);
        }
    }

    fn launch_failed(&mut self, label: &str, err: EngineError) {
        error!(executor = self.shared.id, task = %label, error = %err, "failed to launch task process");
        if let Some(surface) = self.surface.as_mut() {
            surface.write_line(&format!("failed to launch task: {err}"));
        }
        self.finish_run(None);
    }

    fn handle_surface_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Attached { pid } => self.attached(pid),
            SurfaceEvent::Output(bytes) => match self.run.as_mut() {
                Some(run) => run.collector.process_output(&bytes),
                None => debug!(executor = self.shared.id, "output with no active run dropped"),
            },
            SurfaceEvent::Exited { code } => self.finish_run(code),
            SurfaceEvent::Removed => {
                info!(executor = self.shared.id, "surface removed externally");
                if self.run.is_some() && !self.disposed {
                    if let Some(surface) = self.surface.as_mut() {
                        surface.dispose();
                    }
                    self.disposed = true;
                }
                self.notify_removed();
            }
        }
    }

    /// The surface dropped its event sender. A run still waiting for its
    /// exit will never get one.
    fn events_closed(&mut self) {
        self.events = None;
        if self.run.is_some() {
            warn!(executor = self.shared.id, "surface closed its event stream before the process exited");
            self.finish_run(None);
        }
    }

    fn attached(&mut self, pid: Option<u32>) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let Some(ready) = run.ready.take() else {
            return;
        };

        self.shared.set_pid(pid);
        self.shared.set_state(ChannelState::Running);
        info!(executor = self.shared.id, task = %run.task, pid = ?pid, "task process attached");
        let _ = ready.send(pid);
    }

    /// Complete the active run: `Exited`, banners, exit notification and
    /// completion, then any pending terminations.
    fn finish_run(&mut self, code: Option<i32>) {
        self.kill_deadline = None;

        let Some(mut run) = self.run.take() else {
            debug!(executor = self.shared.id, exit_code = ?code, "exit with no active run ignored");
            return;
        };

        run.collector.flush();
        if let Some(ready) = run.ready.take() {
            let _ = ready.send(None);
        }

        self.shared.set_state(ChannelState::Exited);

        if let Some(surface) = self.surface.as_mut() {
            surface.disable_input();
            match code {
                Some(code) => surface.write_line(&format!("Process exited with code {code}")),
                None => surface.write_line("Process exited"),
            }
            surface.write_line("\r\n\x1b[1mTerminal will be reused by tasks.\x1b[0m");
        }

        info!(executor = self.shared.id, task = %run.task, exit_code = ?code, "task process exited");

        if let Some(exit) = run.exit.take() {
            let _ = exit.send(code);
        }
        run.completion.send_replace(Some(TaskExit { exit_code: code }));

        if !self.terminate_waiters.is_empty() {
            self.remove_surface();
            for waiter in self.terminate_waiters.drain(..) {
                let _ = waiter.send(true);
            }
        }
    }

    fn terminate(&mut self, run_id: u64, reply: oneshot::Sender<bool>) {
        if run_id != self.last_run {
            debug!(
                executor = self.shared.id,
                run_id,
                current = self.last_run,
                "terminate for a previous run; channel already moved on"
            );
            let _ = reply.send(true);
            return;
        }

        if !self.disposed {
            if let Some(surface) = self.surface.as_mut() {
                surface.dispose();
            }
            self.disposed = true;
        }

        if self.run.is_none() {
            self.remove_surface();
            let _ = reply.send(true);
            return;
        }

        info!(executor = self.shared.id, "waiting for task process to exit");
        self.terminate_waiters.push(reply);
        if self.kill_deadline.is_none() {
            let now = Instant::now();
            // Out of range for the clock: kill right away.
            self.kill_deadline = Some(now.checked_add(self.kill_timeout).unwrap_or(now));
        }
    }

    fn force_kill(&mut self) {
        self.kill_deadline = None;
        warn!(
            executor = self.shared.id,
            timeout = ?self.kill_timeout,
            "task process did not exit after dispose; killing"
        );
        if let Some(surface) = self.surface.as_mut() {
            surface.kill();
        }
        // The killed process may still report an exit later; ignore it.
        self.events = None;
        self.finish_run(None);
    }

    fn remove_surface(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            if !self.removed {
                surface.remove();
            }
        }
        self.notify_removed();
    }

    fn notify_removed(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        debug!(executor = self.shared.id, "surface removed; leaving the pool");
        let _ = self.removed_tx.send(self.shared.id);
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<SurfaceEvent>>) -> Option<SurfaceEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
