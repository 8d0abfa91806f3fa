use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use taskexec::errors::{EngineError, Result};
use taskexec::exec::{
    ExecutionOptions, ExecutorId, Surface, SurfaceEvent, SurfaceEventSender, SurfaceFactory,
};

/// How fake processes behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    /// Processes attach and exit only when the test says so. Dispose ends a
    /// running process with no exit code.
    Manual,
    /// Every launch attaches, prints the configured output and exits right
    /// away with `exit_code`.
    Auto { exit_code: i32 },
    /// Like `Manual`, but dispose is ignored; only a kill stops the process.
    Stubborn,
    /// `SurfaceFactory::create` fails.
    FailCreate,
    /// `Surface::launch` fails.
    FailLaunch,
}

/// Everything observed on one surface (one executor id).
#[derive(Debug, Default, Clone)]
pub struct SurfaceRecord {
    pub lines: Vec<String>,
    pub launches: usize,
    pub dispose_count: usize,
    pub kill_count: usize,
    pub removed: bool,
    pub input_disabled: bool,
    pub pid: Option<u32>,
    running: bool,
    events: Option<SurfaceEventSender>,
}

#[derive(Default)]
struct FakeState {
    surfaces: BTreeMap<ExecutorId, SurfaceRecord>,
    launches: Vec<(ExecutorId, ExecutionOptions)>,
    created: usize,
}

struct Shared {
    state: Mutex<FakeState>,
    launched: watch::Sender<usize>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

/// Scriptable [`SurfaceFactory`] for engine tests.
///
/// Clones share state, so keep one clone in the test and hand another to the
/// engine.
#[derive(Clone)]
pub struct FakeSurfaceFactory {
    mode: FakeMode,
    output: Arc<Vec<String>>,
    shared: Arc<Shared>,
}

impl FakeSurfaceFactory {
    pub fn new(mode: FakeMode) -> Self {
        let (launched, _) = watch::channel(0);
        Self {
            mode,
            output: Arc::new(Vec::new()),
            shared: Arc::new(Shared {
                state: Mutex::new(FakeState::default()),
                launched,
            }),
        }
    }

    pub fn manual() -> Self {
        Self::new(FakeMode::Manual)
    }

    pub fn auto(exit_code: i32) -> Self {
        Self::new(FakeMode::Auto { exit_code })
    }

    pub fn stubborn() -> Self {
        Self::new(FakeMode::Stubborn)
    }

    /// Output chunks printed by every `Auto` launch before it exits.
    pub fn with_output<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output = Arc::new(chunks.into_iter().map(Into::into).collect());
        self
    }

    pub fn as_factory(&self) -> Arc<dyn SurfaceFactory> {
        Arc::new(self.clone())
    }

    /// Wait until at least `count` launches happened in total.
    pub async fn wait_for_launch(&self, count: usize) {
        let mut rx = self.shared.launched.subscribe();
        let _ = rx.wait_for(|launched| *launched >= count).await;
    }

    /// Report the process on `executor` as attached. Returns its pid.
    pub fn attach(&self, executor: ExecutorId) -> Option<u32> {
        let pid = self.record(executor).and_then(|r| r.pid);
        self.send(executor, SurfaceEvent::Attached { pid });
        pid
    }

    pub fn output(&self, executor: ExecutorId, text: &str) {
        self.output_bytes(executor, text.as_bytes());
    }

    /// Raw output, not necessarily valid UTF-8 on its own.
    pub fn output_bytes(&self, executor: ExecutorId, bytes: &[u8]) {
        self.send(executor, SurfaceEvent::Output(bytes.to_vec()));
    }

    pub fn exit(&self, executor: ExecutorId, code: i32) {
        if let Some(record) = self.shared.lock().surfaces.get_mut(&executor) {
            record.running = false;
        }
        self.send(executor, SurfaceEvent::Exited { code: Some(code) });
    }

    /// Drop the event sender of `executor` without reporting an exit.
    pub fn close_events(&self, executor: ExecutorId) {
        if let Some(record) = self.shared.lock().surfaces.get_mut(&executor) {
            record.events = None;
        }
    }

    /// Simulate the user tearing down the display.
    pub fn remove_externally(&self, executor: ExecutorId) {
        self.send(executor, SurfaceEvent::Removed);
    }

    fn send(&self, executor: ExecutorId, event: SurfaceEvent) {
        let sender = self
            .shared
            .lock()
            .surfaces
            .get(&executor)
            .and_then(|r| r.events.clone());
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    }

    pub fn record(&self, executor: ExecutorId) -> Option<SurfaceRecord> {
        self.shared.lock().surfaces.get(&executor).cloned()
    }

    pub fn launches(&self) -> Vec<(ExecutorId, ExecutionOptions)> {
        self.shared.lock().launches.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.shared.lock().launches.len()
    }

    /// Number of surfaces created through the factory.
    pub fn created(&self) -> usize {
        self.shared.lock().created
    }

    pub fn lines(&self, executor: ExecutorId) -> Vec<String> {
        self.record(executor).map(|r| r.lines).unwrap_or_default()
    }

    pub fn dispose_count(&self, executor: ExecutorId) -> usize {
        self.record(executor).map(|r| r.dispose_count).unwrap_or(0)
    }

    pub fn kill_count(&self, executor: ExecutorId) -> usize {
        self.record(executor).map(|r| r.kill_count).unwrap_or(0)
    }

    pub fn is_removed(&self, executor: ExecutorId) -> bool {
        self.record(executor).is_some_and(|r| r.removed)
    }
}

impl SurfaceFactory for FakeSurfaceFactory {
    fn create(&self, executor: ExecutorId, _options: &ExecutionOptions) -> Result<Box<dyn Surface>> {
        if self.mode == FakeMode::FailCreate {
            return Err(EngineError::Surface("fake surface creation failure".to_string()));
        }

        {
            let mut state = self.shared.lock();
            state.created += 1;
            // A fresh surface for this executor starts a fresh record.
            state.surfaces.insert(executor, SurfaceRecord::default());
        }

        Ok(Box::new(FakeSurface {
            executor,
            mode: self.mode,
            output: Arc::clone(&self.output),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeSurface {
    executor: ExecutorId,
    mode: FakeMode,
    output: Arc<Vec<String>>,
    shared: Arc<Shared>,
}

impl FakeSurface {
    fn with_record<R>(&self, f: impl FnOnce(&mut SurfaceRecord) -> R) -> R {
        let mut state = self.shared.lock();
        f(state.surfaces.entry(self.executor).or_default())
    }
}

impl Surface for FakeSurface {
    fn launch(&mut self, options: &ExecutionOptions, events: SurfaceEventSender) -> Result<()> {
        if self.mode == FakeMode::FailLaunch {
            return Err(EngineError::Surface("fake launch failure".to_string()));
        }

        let pid = {
            let mut state = self.shared.lock();
            state.launches.push((self.executor, options.clone()));
            let pid = 4000 + state.launches.len() as u32;

            let record = state.surfaces.entry(self.executor).or_default();
            record.launches += 1;
            record.running = true;
            record.input_disabled = false;
            record.pid = Some(pid);
            record.events = Some(events.clone());
            pid
        };
        self.shared.launched.send_modify(|launched| *launched += 1);

        if let FakeMode::Auto { exit_code } = self.mode {
            let _ = events.send(SurfaceEvent::Attached { pid: Some(pid) });
            for chunk in self.output.iter() {
                let _ = events.send(SurfaceEvent::Output(chunk.as_bytes().to_vec()));
            }
            self.with_record(|r| r.running = false);
            let _ = events.send(SurfaceEvent::Exited {
                code: Some(exit_code),
            });
        }
        Ok(())
    }

    fn write_line(&mut self, text: &str) {
        self.with_record(|r| r.lines.push(text.to_string()));
    }

    fn disable_input(&mut self) {
        self.with_record(|r| r.input_disabled = true);
    }

    fn dispose(&mut self) {
        let mode = self.mode;
        let exit = self.with_record(|r| {
            r.dispose_count += 1;
            if mode != FakeMode::Stubborn && r.running {
                r.running = false;
                r.events.clone()
            } else {
                None
            }
        });
        if let Some(events) = exit {
            let _ = events.send(SurfaceEvent::Exited { code: None });
        }
    }

    fn kill(&mut self) {
        self.with_record(|r| {
            r.kill_count += 1;
            r.running = false;
        });
    }

    fn remove(&mut self) {
        self.with_record(|r| r.removed = true);
    }
}
