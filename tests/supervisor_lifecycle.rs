use std::error::Error;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use script_runner::config::SupervisorConfig;
use script_runner::events::EventKind;
use script_runner::exec::Supervisor;
use script_runner::fs::mock::MockFileSystem;
use script_runner_test_utils::fixtures::ScriptFixture;
use script_runner_test_utils::recorder::{EventRecorder, Recorded};
use script_runner_test_utils::{init_tracing, wait_until, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

async fn run_to_completion(supervisor: &Supervisor, recorder: &EventRecorder) {
    with_timeout(recorder.wait_for(&Recorded::AfterProcess, 1)).await;
    wait_until("supervisor idle", || !supervisor.busy()).await;
}

#[tokio::test]
async fn happy_path_emits_lifecycle_in_order() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("echo hello\n");
    let supervisor = Supervisor::new(script.config());
    let recorder = EventRecorder::attach(&supervisor);
    supervisor.start();

    assert!(supervisor.execute());
    run_to_completion(&supervisor, &recorder).await;

    assert_eq!(
        recorder.events(),
        vec![
            Recorded::Execute,
            Recorded::BeforeProcess,
            Recorded::BufferLine(1, "hello\n".to_string()),
            Recorded::AfterProcess,
        ]
    );
    assert_eq!(supervisor.last_exit_code(), Some(0));
    assert_eq!(supervisor.stdout(), "hello\n");
    assert_eq!(supervisor.stderr(), "");
    assert!(!supervisor.interrupted());
    assert!(supervisor.last_executed_at().is_some());
    assert!(supervisor.last_run_time_seconds().is_some_and(|t| t >= 0.0));

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stderr_lines_are_tagged_with_stream_two() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("echo oops 1>&2\nexit 3\n");
    let supervisor = Supervisor::spawn(script.config());
    let recorder = EventRecorder::attach(&supervisor);

    supervisor.execute();
    run_to_completion(&supervisor, &recorder).await;

    assert!(recorder.contains(&Recorded::BufferLine(2, "oops\n".to_string())));
    assert_eq!(supervisor.stderr(), "oops\n");
    assert_eq!(supervisor.stdout(), "");
    assert_eq!(supervisor.last_exit_code(), Some(3));

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn per_stream_line_order_is_preserved() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new(
        "for i in 1 2 3 4 5; do echo out$i; echo err$i 1>&2; done\nprintf 'tail'\n",
    );
    let supervisor = Supervisor::spawn(script.config());
    let recorder = EventRecorder::attach(&supervisor);

    supervisor.execute();
    run_to_completion(&supervisor, &recorder).await;

    let events = recorder.events();
    let stdout: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Recorded::BufferLine(1, line) => Some(line.clone()),
            _ => None,
        })
        .collect();
    let stderr: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Recorded::BufferLine(2, line) => Some(line.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(stdout, vec!["out1\n", "out2\n", "out3\n", "out4\n", "out5\n", "tail"]);
    assert_eq!(stderr, vec!["err1\n", "err2\n", "err3\n", "err4\n", "err5\n"]);

    // before-process precedes every line, after-process follows them all.
    let before = events.iter().position(|e| *e == Recorded::BeforeProcess);
    let after = events.iter().position(|e| *e == Recorded::AfterProcess);
    let first_line = events
        .iter()
        .position(|e| matches!(e, Recorded::BufferLine(..)));
    let last_line = events
        .iter()
        .rposition(|e| matches!(e, Recorded::BufferLine(..)));
    assert!(before < first_line);
    assert!(last_line < after);

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn large_output_is_capped_to_the_most_recent_bytes() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new(
        "i=0\nwhile [ $i -lt 3000 ]; do echo \"line $i\"; i=$((i+1)); done\n",
    );
    let supervisor = Supervisor::spawn(script.config());
    let recorder = EventRecorder::attach(&supervisor);

    supervisor.execute();
    run_to_completion(&supervisor, &recorder).await;

    let stdout = supervisor.stdout();
    assert!(stdout.len() <= 10_000);
    assert!(stdout.ends_with("line 2999\n"));
    assert!(!stdout.contains("line 0\n"));

    supervisor.clear_outputs();
    assert_eq!(supervisor.stdout(), "");
    assert_eq!(supervisor.stderr(), "");

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn execute_while_busy_is_dropped() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("echo started\nsleep 30\n");
    let supervisor = Supervisor::spawn(script.config());
    let recorder = EventRecorder::attach(&supervisor);

    assert!(supervisor.execute());
    with_timeout(recorder.wait_for(&Recorded::BufferLine(1, "started\n".to_string()), 1)).await;

    assert!(supervisor.busy());
    let executed_at = supervisor.last_executed_at();
    assert!(!supervisor.execute());
    assert_eq!(recorder.count(&Recorded::Execute), 1);
    assert_eq!(supervisor.last_executed_at(), executed_at);

    supervisor.interrupt();
    run_to_completion(&supervisor, &recorder).await;
    assert_eq!(recorder.count(&Recorded::BeforeProcess), 1);

    supervisor.shutdown().await;
    Ok(())
}

#[test]
fn concurrent_execute_calls_arm_exactly_one_run() {
    let script = ScriptFixture::new("true\n");
    // Worker not started: the trigger stays armed.
    let supervisor = Supervisor::new(script.config());
    let recorder = EventRecorder::attach(&supervisor);

    let armed: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| supervisor.execute()))
            .collect();
        handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum()
    });

    assert_eq!(armed, 1);
    assert_eq!(recorder.events(), vec![Recorded::Execute]);
    assert!(supervisor.busy());
}

#[tokio::test]
async fn missing_interpreter_reports_exception_then_finalizes() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("echo never\n");
    let config = SupervisorConfig::new(script.missing("no-such-interpreter"), script.path());
    let supervisor = Supervisor::spawn(config);
    let recorder = EventRecorder::attach(&supervisor);

    assert!(!supervisor.interpreter_exists());
    assert!(supervisor.script_path_exists());

    supervisor.execute();
    run_to_completion(&supervisor, &recorder).await;

    let events = recorder.events();
    assert_eq!(events.len(), 4, "unexpected events: {events:?}");
    assert_eq!(events[0], Recorded::Execute);
    assert_eq!(events[1], Recorded::BeforeProcess);
    assert!(matches!(events[2], Recorded::Exception(_)));
    assert_eq!(events[3], Recorded::AfterProcess);

    assert!(recorder.exceptions()[0].contains("no-such-interpreter"));
    assert_eq!(supervisor.last_exit_code(), None);
    assert!(supervisor.last_run_time_seconds().is_some());

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn missing_script_is_left_to_the_interpreter() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("");
    let config = SupervisorConfig::new("/bin/sh", script.missing("gone.sh"));
    let supervisor = Supervisor::spawn(config);
    let recorder = EventRecorder::attach(&supervisor);

    assert!(!supervisor.script_path_exists());

    supervisor.execute();
    run_to_completion(&supervisor, &recorder).await;

    assert!(recorder.exceptions().is_empty());
    assert!(supervisor.last_exit_code().is_some_and(|c| c != 0));
    assert!(!supervisor.stderr().is_empty());

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn failing_before_process_handler_aborts_the_run() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("echo should-not-run\n");
    let supervisor = Supervisor::spawn(script.config());
    supervisor.on(EventKind::BeforeProcess, |_| Err(anyhow!("refusing to start")));
    let recorder = EventRecorder::attach(&supervisor);

    supervisor.execute();
    run_to_completion(&supervisor, &recorder).await;

    assert!(recorder.exceptions()[0].contains("refusing to start"));
    assert!(!recorder.events().iter().any(|e| matches!(e, Recorded::BufferLine(..))));
    assert_eq!(supervisor.last_exit_code(), None);

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn worker_survives_a_failed_run() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("echo ok\n");
    let config = SupervisorConfig::new(script.missing("nope"), script.path());
    let supervisor = Supervisor::spawn(config);
    let recorder = EventRecorder::attach(&supervisor);

    for round in 1..=2 {
        assert!(supervisor.execute(), "round {round} should be accepted");
        with_timeout(recorder.wait_for(&Recorded::AfterProcess, round)).await;
        wait_until("supervisor idle", || !supervisor.busy()).await;
    }

    assert_eq!(recorder.exceptions().len(), 2);

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn panicking_handler_still_finalizes_the_run() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("echo ok\n");
    let supervisor = Supervisor::spawn(script.config());
    let recorder = EventRecorder::attach(&supervisor);
    let panicked = Arc::new(AtomicBool::new(false));
    {
        let panicked = Arc::clone(&panicked);
        supervisor.on(EventKind::BeforeProcess, move |_| {
            if !panicked.swap(true, Ordering::SeqCst) {
                panic!("handler bug");
            }
            Ok(())
        });
    }

    assert!(supervisor.execute());
    run_to_completion(&supervisor, &recorder).await;

    assert_eq!(
        recorder.events().last(),
        Some(&Recorded::AfterProcess),
        "after-process closes the aborted run"
    );
    assert_eq!(recorder.exceptions().len(), 1);
    assert!(recorder.exceptions()[0].contains("script run aborted"));
    assert!(supervisor.last_run_time_seconds().is_some());
    assert_eq!(supervisor.last_exit_code(), None);

    // The worker keeps serving runs afterwards.
    assert!(supervisor.execute());
    with_timeout(recorder.wait_for(&Recorded::AfterProcess, 2)).await;
    wait_until("supervisor idle", || !supervisor.busy()).await;
    assert_eq!(supervisor.last_exit_code(), Some(0));
    assert!(recorder.contains(&Recorded::BufferLine(1, "ok\n".to_string())));

    supervisor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn exit_code_is_overwritten_by_each_run() -> TestResult {
    init_tracing();

    let script = ScriptFixture::new("exit 7\n");
    let supervisor = Supervisor::spawn(script.config());
    let recorder = EventRecorder::attach(&supervisor);

    supervisor.execute();
    run_to_completion(&supervisor, &recorder).await;
    assert_eq!(supervisor.last_exit_code(), Some(7));

    std::fs::write(script.path(), "exit 0\n")?;
    supervisor.execute();
    with_timeout(recorder.wait_for(&Recorded::AfterProcess, 2)).await;
    wait_until("supervisor idle", || !supervisor.busy()).await;
    assert_eq!(supervisor.last_exit_code(), Some(0));

    supervisor.shutdown().await;
    Ok(())
}

#[test]
fn read_source_code_returns_script_text() {
    let script = ScriptFixture::new("#!/bin/sh\necho hi\n");
    let supervisor = Supervisor::new(script.config());
    assert_eq!(supervisor.read_source_code(), "#!/bin/sh\necho hi\n");

    let missing = Supervisor::new(SupervisorConfig::new("/bin/sh", script.missing("x.sh")));
    assert_eq!(missing.read_source_code(), "");
}

#[test]
fn read_source_code_swallows_read_errors() {
    let fs = MockFileSystem::new();
    fs.add_unreadable("/jobs/locked.sh", io::ErrorKind::PermissionDenied);
    fs.add_file("/jobs/open.sh", "echo open\n");
    fs.add_file("/bin/sh", "");

    let locked = Supervisor::with_file_system(
        SupervisorConfig::new("/bin/sh", "/jobs/locked.sh"),
        Arc::new(fs.clone()),
    );
    assert_eq!(locked.read_source_code(), "");
    assert!(locked.script_path_exists());
    assert!(locked.interpreter_exists());

    let open = Supervisor::with_file_system(
        SupervisorConfig::new("/bin/sh", "/jobs/open.sh"),
        Arc::new(fs),
    );
    assert_eq!(open.read_source_code(), "echo open\n");
}

#[test]
fn accessors_reflect_configuration() {
    let config = SupervisorConfig::new("/usr/bin/env", "/srv/job.sh");
    let supervisor = Supervisor::new(config);

    assert_eq!(supervisor.interpreter(), std::path::Path::new("/usr/bin/env"));
    assert_eq!(supervisor.script_path(), std::path::Path::new("/srv/job.sh"));
    assert_eq!(supervisor.user(), script_runner::exec::current_user());
    assert!(!supervisor.needs_sudo());
    assert!(!supervisor.busy());
    assert!(!supervisor.interrupted());
    assert_eq!(supervisor.last_exit_code(), None);
    assert_eq!(supervisor.last_executed_at(), None);
    assert_eq!(supervisor.last_run_time_seconds(), None);
}
