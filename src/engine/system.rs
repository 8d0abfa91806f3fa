// src/engine/system.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::engine::{TaskEvent, TaskExecuteKind, TaskExecuteResult, TerminateResponse};
use crate::errors::Result;
use crate::exec::{
    CompletionHandle, ExecuteRequest, ExecutionChannel, ExecutionOptions, ExecutionPool,
    SurfaceFactory,
};
use crate::matcher::{MatcherBinder, ProblemCollector, ProblemMatcherRegistry};
use crate::resolve::{CommandResolver, VariableResolver};
use crate::task::Task;

/// The orchestrator. Cheap to clone; all clones share one pool and one
/// active-task table.
#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    resolver: CommandResolver,
    binder: MatcherBinder,
    shell: String,
    events: broadcast::Sender<TaskEvent>,
    /// Never held across an `.await`.
    state: Mutex<EngineState>,
}

struct EngineState {
    pool: ExecutionPool,
    active: HashMap<String, ActiveExecution>,
    last_task: Option<Arc<Task>>,
}

#[derive(Clone)]
struct ActiveExecution {
    task: Arc<Task>,
    channel: ExecutionChannel,
    run_id: u64,
    completion: CompletionHandle,
}

impl ActiveExecution {
    /// Whether the channel is still busy with this entry's run.
    fn is_busy(&self) -> bool {
        self.channel.current_run() == self.run_id && self.channel.state().is_live()
    }
}

impl TaskEngine {
    /// Must be called within a Tokio runtime.
    pub fn new(
        settings: EngineSettings,
        factory: Arc<dyn SurfaceFactory>,
        variables: Arc<dyn VariableResolver>,
        matchers: Arc<dyn ProblemMatcherRegistry>,
    ) -> Self {
        Self::with_resolver(settings, factory, CommandResolver::new(variables), matchers)
    }

    /// Like [`TaskEngine::new`] with a preconfigured command resolver.
    pub fn with_resolver(
        settings: EngineSettings,
        factory: Arc<dyn SurfaceFactory>,
        resolver: CommandResolver,
        matchers: Arc<dyn ProblemMatcherRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let pool = ExecutionPool::new(factory, settings.kill_timeout);

        Self {
            inner: Arc::new(EngineInner {
                resolver,
                binder: MatcherBinder::new(matchers),
                shell: settings.shell,
                events,
                state: Mutex::new(EngineState {
                    pool,
                    active: HashMap::new(),
                    last_task: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TaskEvent) {
        debug!(kind = ?event.kind(), task = %event.task(), "task event");
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Subscribe to lifecycle events of every task run from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Run `task` on a reused or new channel.
    ///
    /// Returns once the process is attached (or failed to launch); use
    /// [`TaskExecuteResult::completion`] to wait for the exit. Fails only
    /// when the command cannot be resolved, before any channel is touched.
    pub async fn run(&self, task: Task) -> Result<TaskExecuteResult> {
        let task = Arc::new(task);
        self.state().last_task = Some(Arc::clone(&task));

        self.emit(TaskEvent::Start {
            task: Arc::clone(&task),
        });

        let (options, collector) = match self.prepare(&task) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(task = %task, error = %err, "cannot resolve task command");
                self.emit(TaskEvent::End {
                    task: Arc::clone(&task),
                });
                return Err(err);
            }
        };
        let problems = collector.sink();

        self.emit(TaskEvent::Active {
            task: Arc::clone(&task),
        });

        let (executor, reused, handles) = {
            let mut state = self.state();
            let acquired = state.pool.acquire();
            let request = ExecuteRequest {
                task: Arc::clone(&task),
                options,
                collector,
            };
            let handles = acquired.channel.execute(request, acquired.reused);

            let entry = ActiveExecution {
                task: Arc::clone(&task),
                channel: acquired.channel.clone(),
                run_id: handles.run_id,
                completion: handles.completion.clone(),
            };
            if state.active.insert(task.map_key().to_string(), entry).is_some() {
                debug!(task = %task, "replaced previous active entry for task");
            }

            (acquired.channel.id(), acquired.reused, handles)
        };

        info!(task = %task, executor, reused, "task submitted");

        // One watcher per run owns the process events, so they are emitted
        // even if this future is dropped before the process attaches.
        let (started_tx, started) = oneshot::channel();
        let engine = self.clone();
        let watched = Arc::clone(&task);
        let ready = handles.ready;
        let exit = handles.exit;
        tokio::spawn(async move {
            let pid = ready.await.unwrap_or(None);
            engine.emit(TaskEvent::ProcessStarted {
                task: Arc::clone(&watched),
                pid,
            });
            let _ = started_tx.send(());

            let exit_code = exit.await.unwrap_or(None);
            engine.emit(TaskEvent::ProcessEnded {
                task: Arc::clone(&watched),
                exit_code,
            });
            engine.emit(TaskEvent::End { task: watched });
        });
        let _ = started.await;

        Ok(TaskExecuteResult {
            task,
            kind: TaskExecuteKind::Started,
            executor,
            reused,
            completion: handles.completion,
            problems,
        })
    }

    fn prepare(&self, task: &Task) -> Result<(ExecutionOptions, ProblemCollector)> {
        let resolver = &self.inner.resolver;

        let matchers = self.inner.binder.resolve(&task.problem_matchers, resolver)?;
        let collector = ProblemCollector::new(matchers);

        let invocation = resolver.resolve_shell(task)?;
        let cwd = resolver.resolve_cwd(task.command.options.cwd.as_deref())?;

        let options = ExecutionOptions {
            name: format!("Task - {}", task.display_label()),
            shell: self.inner.shell.clone(),
            shell_args: invocation.args,
            env: task.command.options.env.clone(),
            cwd,
        };
        Ok((options, collector))
    }

    /// Run the most recently submitted task again. `None` if nothing has
    /// run yet.
    pub async fn rerun(&self) -> Option<Result<TaskExecuteResult>> {
        let last = self.state().last_task.clone()?;
        Some(self.run(Task::clone(&last)).await)
    }

    /// Terminate `task` if it is active.
    ///
    /// Waits for the process to exit (escalating to a kill after the
    /// configured timeout). Unknown tasks succeed with `task: None`.
    pub async fn terminate(&self, task: &Task) -> TerminateResponse {
        let key = task.map_key();
        let entry = self.state().active.get(key).cloned();

        let Some(entry) = entry else {
            debug!(task = %task, "terminate: task is not active");
            return TerminateResponse {
                success: true,
                task: None,
            };
        };

        info!(task = %entry.task, executor = entry.channel.id(), "terminating task");
        let success = entry.channel.terminate(entry.run_id).await;

        {
            let mut state = self.state();
            let same_run = state.active.get(key).is_some_and(|current| {
                current.run_id == entry.run_id && current.channel.id() == entry.channel.id()
            });
            if same_run {
                state.active.remove(key);
            }
            state.pool.prune_removed();
        }

        TerminateResponse {
            success,
            task: Some(entry.task),
        }
    }

    /// Terminate every active task concurrently.
    pub async fn terminate_all(&self) -> Vec<TerminateResponse> {
        let tasks = self.active_tasks();
        if tasks.is_empty() {
            return Vec::new();
        }
        info!(count = tasks.len(), "terminating all active tasks");

        let mut set = JoinSet::new();
        for task in tasks {
            let engine = self.clone();
            set.spawn(async move { engine.terminate(&task).await });
        }

        let mut responses = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(response) => responses.push(response),
                Err(err) => warn!(error = %err, "terminate task panicked"),
            }
        }
        responses
    }

    /// Tasks registered by `run` and not yet terminated, exited ones included.
    pub fn active_tasks(&self) -> Vec<Arc<Task>> {
        self.state()
            .active
            .values()
            .map(|entry| Arc::clone(&entry.task))
            .collect()
    }

    /// Active tasks whose process is still starting or running.
    pub fn busy_tasks(&self) -> Vec<Arc<Task>> {
        self.state()
            .active
            .values()
            .filter(|entry| entry.is_busy())
            .map(|entry| Arc::clone(&entry.task))
            .collect()
    }

    pub fn is_active(&self) -> bool {
        self.state().active.values().any(ActiveExecution::is_busy)
    }

    /// Completion of the task's latest run, if it is active.
    pub fn completion(&self, task: &Task) -> Option<CompletionHandle> {
        self.state()
            .active
            .get(task.map_key())
            .map(|entry| entry.completion.clone())
    }

    /// Number of channels in the pool.
    pub fn pool_size(&self) -> usize {
        let mut state = self.state();
        state.pool.prune_removed();
        state.pool.len()
    }
}
