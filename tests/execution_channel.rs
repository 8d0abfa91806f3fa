// tests/execution_channel.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use taskexec::exec::{ChannelState, ExecuteRequest, ExecutionChannel, ExecutionOptions};
use taskexec::matcher::ProblemCollector;
use taskexec_test_utils::builders::TaskBuilder;
use taskexec_test_utils::{FakeSurfaceFactory, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn request(label: &str) -> ExecuteRequest {
    ExecuteRequest {
        task: Arc::new(TaskBuilder::new(label).build()),
        options: ExecutionOptions {
            name: format!("Task - {label}"),
            shell: "sh".to_string(),
            shell_args: vec!["-c".to_string(), label.to_string()],
            env: BTreeMap::new(),
            cwd: "/proj".to_string(),
        },
        collector: ProblemCollector::new(Vec::new()),
    }
}

#[tokio::test]
async fn channel_walks_through_its_states() -> TestResult {
    init_tracing();
    let fake = FakeSurfaceFactory::manual();
    let (removed_tx, _removed_rx) = mpsc::unbounded_channel();
    let channel = ExecutionChannel::spawn(7, fake.as_factory(), removed_tx, Duration::from_millis(200));

    assert_eq!(channel.state(), ChannelState::Init);
    assert!(!channel.reset());

    let handles = channel.execute(request("serve"), false);
    assert_eq!(channel.state(), ChannelState::Ready);
    assert_eq!(handles.run_id, 1);

    with_timeout(fake.wait_for_launch(1)).await;
    let pid = fake.attach(7);
    assert_eq!(with_timeout(handles.ready).await?, pid);
    assert_eq!(channel.state(), ChannelState::Running);
    assert_eq!(channel.process_id(), pid);

    fake.exit(7, 3);
    assert_eq!(with_timeout(handles.exit).await?, Some(3));
    assert_eq!(channel.state(), ChannelState::Exited);
    assert_eq!(handles.completion.try_result().map(|e| e.exit_code), Some(Some(3)));

    assert!(channel.reset());
    assert_eq!(channel.state(), ChannelState::Init);
    assert_eq!(channel.process_id(), None);
    assert!(!channel.reset());
    Ok(())
}

#[tokio::test]
async fn reused_channel_relaunches_on_the_same_surface() -> TestResult {
    init_tracing();
    let fake = FakeSurfaceFactory::auto(0);
    let (removed_tx, _removed_rx) = mpsc::unbounded_channel();
    let channel = ExecutionChannel::spawn(0, fake.as_factory(), removed_tx, Duration::from_millis(200));

    let first = channel.execute(request("one"), false);
    with_timeout(first.completion.wait()).await;

    assert!(channel.reset());
    let second = channel.execute(request("two"), true);
    with_timeout(second.completion.wait()).await;

    assert_eq!(second.run_id, 2);
    assert_eq!(channel.current_run(), 2);
    assert_eq!(fake.created(), 1);
    assert_eq!(fake.launch_count(), 2);
    Ok(())
}

#[tokio::test]
async fn removal_is_reported_exactly_once() -> TestResult {
    init_tracing();
    let fake = FakeSurfaceFactory::auto(0);
    let (removed_tx, mut removed_rx) = mpsc::unbounded_channel();
    let channel = ExecutionChannel::spawn(3, fake.as_factory(), removed_tx, Duration::from_millis(200));

    let handles = channel.execute(request("once"), false);
    with_timeout(handles.completion.wait()).await;

    assert!(with_timeout(channel.terminate(handles.run_id)).await);
    assert!(with_timeout(channel.terminate(handles.run_id)).await);
    fake.remove_externally(3);
    with_timeout(channel.wait_for_state(ChannelState::Exited)).await;

    assert_eq!(with_timeout(removed_rx.recv()).await, Some(3));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(removed_rx.try_recv().is_err());
    assert_eq!(fake.dispose_count(3), 1);
    assert!(fake.is_removed(3));
    Ok(())
}

#[tokio::test]
async fn stubborn_process_is_killed_after_the_timeout() -> TestResult {
    init_tracing();
    let fake = FakeSurfaceFactory::stubborn();
    let (removed_tx, _removed_rx) = mpsc::unbounded_channel();
    let channel = ExecutionChannel::spawn(0, fake.as_factory(), removed_tx, Duration::from_millis(50));

    let first = channel.execute(request("first"), false);
    with_timeout(fake.wait_for_launch(1)).await;
    fake.attach(0);
    with_timeout(first.ready).await?;

    // Stubborn process: terminate escalates to a kill and synthesizes the exit.
    assert!(with_timeout(channel.terminate(first.run_id)).await);
    assert_eq!(with_timeout(first.exit).await?, None);
    assert_eq!(fake.kill_count(0), 1);
    assert_eq!(channel.state(), ChannelState::Exited);
    Ok(())
}

#[tokio::test]
async fn closed_event_stream_finishes_the_run() -> TestResult {
    init_tracing();
    let fake = FakeSurfaceFactory::manual();
    let (removed_tx, _removed_rx) = mpsc::unbounded_channel();
    let channel = ExecutionChannel::spawn(2, fake.as_factory(), removed_tx, Duration::from_millis(200));

    let handles = channel.execute(request("vanish"), false);
    with_timeout(fake.wait_for_launch(1)).await;
    fake.attach(2);
    with_timeout(handles.ready).await?;

    fake.close_events(2);

    assert_eq!(with_timeout(handles.exit).await?, None);
    assert_eq!(handles.completion.try_result().map(|e| e.exit_code), Some(None));
    assert_eq!(channel.state(), ChannelState::Exited);
    Ok(())
}

#[tokio::test]
async fn out_of_range_kill_timeout_kills_at_once() -> TestResult {
    init_tracing();
    let fake = FakeSurfaceFactory::stubborn();
    let (removed_tx, _removed_rx) = mpsc::unbounded_channel();
    let channel = ExecutionChannel::spawn(0, fake.as_factory(), removed_tx, Duration::MAX);

    let handles = channel.execute(request("daemon"), false);
    with_timeout(fake.wait_for_launch(1)).await;
    fake.attach(0);
    with_timeout(handles.ready).await?;

    assert!(with_timeout(channel.terminate(handles.run_id)).await);
    assert_eq!(with_timeout(handles.exit).await?, None);
    assert_eq!(fake.kill_count(0), 1);
    Ok(())
}
