pub mod builders;
pub mod fake_surface;

use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use taskexec::config::EngineSettings;
use taskexec::engine::{TaskEngine, TaskEvent, TaskExecuteResult};
use taskexec::exec::ExecutorId;
use taskexec::matcher::InMemoryMatcherRegistry;
use taskexec::resolve::{CommandResolver, MapVariableResolver};
use taskexec::task::Task;

pub use fake_surface::{FakeMode, FakeSurfaceFactory, SurfaceRecord};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Settings for engine tests: `sh`, a short kill timeout.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        shell: "sh".to_string(),
        kill_timeout: Duration::from_millis(200),
        event_capacity: 64,
    }
}

/// Variables used by engine tests: `workspaceFolder = /proj`.
pub fn test_variables() -> MapVariableResolver {
    MapVariableResolver::new().with_variable("workspaceFolder", "/proj")
}

/// Engine over `fake` with `/`-separated paths and the given registry.
pub fn engine_with_registry(
    fake: &FakeSurfaceFactory,
    registry: InMemoryMatcherRegistry,
) -> TaskEngine {
    let resolver = CommandResolver::new(Arc::new(test_variables())).with_separator('/');
    TaskEngine::with_resolver(test_settings(), fake.as_factory(), resolver, Arc::new(registry))
}

/// Engine over `fake` with an empty matcher registry.
pub fn engine_with(fake: &FakeSurfaceFactory) -> TaskEngine {
    engine_with_registry(fake, InMemoryMatcherRegistry::new())
}

/// Run `task` on a `Manual` fake: wait for its launch, attach the process
/// on `executor` and return the run result.
pub async fn run_attached(
    engine: &TaskEngine,
    fake: &FakeSurfaceFactory,
    task: Task,
    executor: ExecutorId,
) -> TaskExecuteResult {
    let launches = fake.launch_count() + 1;
    let handle = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run(task).await }
    });

    with_timeout(fake.wait_for_launch(launches)).await;
    fake.attach(executor);

    with_timeout(handle)
        .await
        .expect("run task panicked")
        .expect("run failed")
}

/// Poll `condition` until it holds (5 second limit).
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    with_timeout(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Receive events until `End` for the task with id `task_id`.
pub async fn events_until_end(
    rx: &mut broadcast::Receiver<TaskEvent>,
    task_id: &str,
) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    loop {
        let event = with_timeout(rx.recv()).await.expect("event stream closed");
        let done = matches!(&event, TaskEvent::End { task } if task.id == task_id);
        events.push(event);
        if done {
            return events;
        }
    }
}
