//! Executes validation jobs.
//!
//! Each job runs on its own tokio task which owns the active child process.
//! The registry only holds a cancellation token and a watch receiver for the
//! job's state, so a stop request never touches the process directly.

use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::ValidationError;
use crate::core::validation::events::{EventSink, OutputStream, ValidationEvent};
use crate::core::validation::job::{JobSnapshot, JobStatus, Step, ValidationJob};
use crate::core::validation::registry::{JobEntry, JobRegistry, StopOutcome};

/// Time a stopped process gets to exit after SIGTERM before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(2000);

/// Lower bound on how long buffered output is read after a step exits.
const OUTPUT_DRAIN_FLOOR: Duration = Duration::from_secs(5);

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("ANSI pattern is valid")
});

#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub grace_period: Duration,
    /// Remove terminal color/cursor sequences from log lines
    pub strip_ansi: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self { grace_period: DEFAULT_GRACE_PERIOD, strip_ansi: true }
    }
}

pub struct ValidationRunner {
    registry: Arc<JobRegistry>,
    options: RunnerOptions,
}

impl ValidationRunner {
    pub fn new(options: RunnerOptions) -> Self {
        Self::with_registry(Arc::new(JobRegistry::new()), options)
    }

    pub fn with_registry(registry: Arc<JobRegistry>, options: RunnerOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Register a job and run its steps in the background.
    ///
    /// Returns once the job is registered; the handle resolves to the terminal
    /// status after the `end` event has been emitted. Must be called from
    /// within a tokio runtime.
    pub fn start(
        &self,
        job_id: &str,
        working_dir: impl Into<PathBuf>,
        steps: Vec<Step>,
        sink: Arc<dyn EventSink>,
    ) -> Result<JoinHandle<JobStatus>, ValidationError> {
        let job = ValidationJob::new(job_id, working_dir, steps);
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(job.snapshot());

        self.registry
            .register(job_id, JobEntry { cancel: cancel.clone(), state: state_rx })?;
        info!(job_id, steps = job.steps.len(), dir = %job.working_dir.display(), "validation job started");

        let ctx = JobContext {
            sink,
            cancel,
            state: state_tx,
            registry: Arc::clone(&self.registry),
            options: self.options,
        };
        Ok(tokio::spawn(drive(job, ctx)))
    }

    /// Stop a live job. Unknown or finished ids are a no-op.
    pub async fn stop(&self, job_id: &str) -> StopOutcome {
        self.registry.stop(job_id).await
    }

    /// Stop every live job.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await
    }
}

struct JobContext {
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
    state: watch::Sender<JobSnapshot>,
    registry: Arc<JobRegistry>,
    options: RunnerOptions,
}

enum StepOutcome {
    Exited(Option<i32>),
    Cancelled(Option<i32>),
    Error(io::Error),
}

async fn drive(mut job: ValidationJob, ctx: JobContext) -> JobStatus {
    let id = job.id.clone();
    ctx.sink.emit(&id, ValidationEvent::Start { job_id: id.clone() });

    job.status = JobStatus::Running;
    ctx.state.send_replace(job.snapshot());

    let steps = job.steps.clone();
    let mut outcome = JobStatus::Passed;
    for (index, step) in steps.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            outcome = JobStatus::Cancelled;
            break;
        }
        job.current_step = index;
        ctx.state.send_replace(job.snapshot());
        ctx.sink
            .emit(&id, ValidationEvent::StepStart { step: step.name.clone(), index });
        debug!(job_id = %id, step = %step.name, command = %step.command, "step started");

        match run_step(&id, step, &job.working_dir, &ctx).await {
            StepOutcome::Exited(code) => {
                let ok = code == Some(0);
                ctx.sink.emit(
                    &id,
                    ValidationEvent::StepEnd { step: step.name.clone(), ok, exit_code: code },
                );
                if !ok {
                    debug!(job_id = %id, step = %step.name, ?code, "step failed");
                    outcome = JobStatus::Failed;
                    break;
                }
            }
            StepOutcome::Cancelled(code) => {
                ctx.sink.emit(
                    &id,
                    ValidationEvent::StepEnd { step: step.name.clone(), ok: false, exit_code: code },
                );
                outcome = JobStatus::Cancelled;
                break;
            }
            StepOutcome::Error(err) => {
                warn!(job_id = %id, step = %step.name, error = %err, "step could not run");
                ctx.sink.emit(
                    &id,
                    ValidationEvent::Error {
                        message: format!("{}: failed to run {}: {err}", step.name, step.command),
                    },
                );
                ctx.sink.emit(
                    &id,
                    ValidationEvent::StepEnd { step: step.name.clone(), ok: false, exit_code: None },
                );
                outcome = JobStatus::Failed;
                break;
            }
        }
    }

    job.status = outcome;
    ctx.sink.emit(
        &id,
        ValidationEvent::End { ok: outcome == JobStatus::Passed, status: outcome },
    );
    // Publish before removal so a concurrent stop sees the finished state.
    ctx.state.send_replace(job.snapshot());
    ctx.registry.remove(&id);
    info!(job_id = %id, status = %outcome, "validation job finished");
    outcome
}

async fn run_step(job_id: &str, step: &Step, dir: &Path, ctx: &JobContext) -> StepOutcome {
    let mut child = match build_command(step, dir).spawn() {
        Ok(child) => child,
        Err(err) => return StepOutcome::Error(err),
    };

    let (tx, mut rx) = unbounded_channel();
    let mut pumps = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        pumps.push(tokio::spawn(pump_lines(out, OutputStream::Stdout, tx.clone())));
    }
    if let Some(err) = child.stderr.take() {
        pumps.push(tokio::spawn(pump_lines(err, OutputStream::Stderr, tx.clone())));
    }
    drop(tx);

    let emit_line = |stream: OutputStream, line: String| {
        let line = if ctx.options.strip_ansi { strip_ansi(&line).into_owned() } else { line };
        ctx.sink
            .emit(job_id, ValidationEvent::Log { step: step.name.clone(), stream, line });
    };

    let outcome = loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                let code = terminate(&mut child, ctx.options.grace_period).await;
                break StepOutcome::Cancelled(code);
            }
            Some((stream, line)) = rx.recv() => emit_line(stream, line),
            status = child.wait() => {
                break match status {
                    Ok(status) => StepOutcome::Exited(status.code()),
                    Err(err) => StepOutcome::Error(err),
                };
            }
        }
    };

    // Read to EOF so every line the process wrote is delivered. Descendants
    // that inherited the pipes may hold them open, hence the bound, which is
    // independent of the kill grace period.
    let drain_bound = ctx.options.grace_period.max(OUTPUT_DRAIN_FLOOR);
    let drain = async {
        while let Some((stream, line)) = rx.recv().await {
            emit_line(stream, line);
        }
    };
    if tokio::time::timeout(drain_bound, drain).await.is_err() {
        debug!(job_id, step = %step.name, "output drain timed out");
    }
    for pump in pumps {
        pump.abort();
    }
    outcome
}

fn build_command(step: &Step, dir: &Path) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&step.command).args(&step.args);
        c
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = Command::new(&step.command);
        c.args(&step.args);
        c
    };

    cmd.current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group so a stop reaches the whole tree
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

async fn pump_lines<R>(reader: R, stream: OutputStream, tx: UnboundedSender<(OutputStream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send((stream, line)).is_err() {
                    break;
                }
            }
            Err(err) => {
                debug!(?stream, error = %err, "output read failed");
                break;
            }
        }
    }
}

/// SIGTERM the process group, then SIGKILL once the grace period is over.
async fn terminate(child: &mut Child, grace: Duration) -> Option<i32> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            let pgid = Pid::from_raw(pid as i32);
            if let Err(err) = killpg(pgid, Signal::SIGTERM) {
                debug!(pid, error = %err, "SIGTERM failed");
            }
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    // Reap stragglers left in the group
                    let _ = killpg(pgid, Signal::SIGKILL);
                    return status.code();
                }
                Ok(Err(err)) => warn!(pid, error = %err, "wait after SIGTERM failed"),
                Err(_) => {
                    debug!(pid, "grace period elapsed, sending SIGKILL");
                    let _ = killpg(pgid, Signal::SIGKILL);
                }
            }
        }
    }

    if let Err(err) = child.start_kill() {
        debug!(error = %err, "kill failed");
    }
    child.wait().await.ok().and_then(|s| s.code())
}

/// Remove ANSI escape sequences from a line of tool output.
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    if line.contains('\x1b') {
        ANSI_RE.replace_all(line, "")
    } else {
        Cow::Borrowed(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validation::events::EventBus;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn sh(name: &str, script: &str) -> Step {
        Step::new(name, "sh", ["-c", script])
    }

    fn runner() -> ValidationRunner {
        ValidationRunner::new(RunnerOptions {
            grace_period: Duration::from_millis(500),
            strip_ansi: true,
        })
    }

    async fn collect(mut rx: UnboundedReceiver<ValidationEvent>) -> Vec<ValidationEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m text"), "red text");
        assert!(matches!(strip_ansi("plain"), Cow::Borrowed("plain")));
    }

    #[tokio::test]
    async fn empty_pipeline_passes() {
        let runner = runner();
        let (tx, rx) = unbounded_channel();
        let handle = runner.start("empty", ".", Vec::new(), Arc::new(tx)).unwrap();

        assert_eq!(handle.await.unwrap(), JobStatus::Passed);
        let kinds: Vec<_> = collect(rx).await.iter().map(ValidationEvent::kind).collect();
        assert_eq!(kinds, ["start", "end"]);
        assert!(runner.registry().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn first_failing_step_stops_the_pipeline() {
        let runner = runner();
        let (tx, rx) = unbounded_channel();
        let steps = vec![
            sh("lint", "echo lint-ok"),
            sh("test", "echo boom >&2; exit 1"),
            sh("build", "echo never"),
        ];
        let handle = runner.start("ff", ".", steps, Arc::new(tx)).unwrap();
        assert_eq!(handle.await.unwrap(), JobStatus::Failed);

        let events = collect(rx).await;
        let kinds: Vec<_> = events.iter().map(ValidationEvent::kind).collect();
        assert_eq!(
            kinds,
            ["start", "step_start", "log", "step_end", "step_start", "log", "step_end", "end"]
        );
        assert_eq!(
            events[2],
            ValidationEvent::Log {
                step: "lint".into(),
                stream: OutputStream::Stdout,
                line: "lint-ok".into()
            }
        );
        assert_eq!(
            events[5],
            ValidationEvent::Log {
                step: "test".into(),
                stream: OutputStream::Stderr,
                line: "boom".into()
            }
        );
        assert_eq!(
            events[6],
            ValidationEvent::StepEnd { step: "test".into(), ok: false, exit_code: Some(1) }
        );
        assert_eq!(events[7], ValidationEvent::End { ok: false, status: JobStatus::Failed });
        assert!(events.iter().all(|e| !matches!(e, ValidationEvent::StepStart { step, .. } if step == "build")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn logs_keep_order_and_lose_ansi() {
        let runner = runner();
        let (tx, rx) = unbounded_channel();
        let steps = vec![sh("lint", "printf '\\033[32mone\\033[0m\\ntwo\\r\\nthree'")];
        runner.start("ord", ".", steps, Arc::new(tx)).unwrap().await.unwrap();

        let lines: Vec<_> = collect(rx)
            .await
            .into_iter()
            .filter_map(|e| match e {
                ValidationEvent::Log { line, .. } => Some(line),
                _ => None,
            })
            .collect();
        assert_eq!(lines, ["one", "two", "three"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_kills_the_running_step() {
        let runner = runner();
        let (tx, mut rx) = unbounded_channel();
        let steps = vec![Step::new("test", "sleep", ["30"]), sh("build", "echo never")];
        let handle = runner.start("long", ".", steps, Arc::new(tx)).unwrap();

        // Wait until the step is actually running
        loop {
            match rx.recv().await {
                Some(ValidationEvent::StepStart { .. }) => break,
                Some(_) => continue,
                None => panic!("job ended before its step started"),
            }
        }

        let started = std::time::Instant::now();
        assert_eq!(runner.stop("long").await, StopOutcome::Stopped(JobStatus::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(handle.await.unwrap(), JobStatus::Cancelled);

        let rest = collect(rx).await;
        assert!(matches!(rest[0], ValidationEvent::StepEnd { ok: false, .. }));
        assert_eq!(
            rest.last(),
            Some(&ValidationEvent::End { ok: false, status: JobStatus::Cancelled })
        );
        assert!(!runner.registry().contains("long"));
        assert_eq!(runner.stop("long").await, StopOutcome::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_command_fails_with_error_event() {
        let runner = runner();
        let (tx, rx) = unbounded_channel();
        let steps = vec![Step::new("lint", "devpilot-no-such-binary-xyz", Vec::<String>::new())];
        let handle = runner.start("spawn", ".", steps, Arc::new(tx)).unwrap();
        assert_eq!(handle.await.unwrap(), JobStatus::Failed);

        let events = collect(rx).await;
        assert!(events.iter().any(|e| e.kind() == "error"));
        assert!(events.contains(&ValidationEvent::StepEnd {
            step: "lint".into(),
            ok: false,
            exit_code: None
        }));
        assert_eq!(events.last().map(ValidationEvent::kind), Some("end"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn duplicate_job_id_is_rejected_while_live() {
        let runner = runner();
        let (tx, _rx) = unbounded_channel();
        let sink: Arc<dyn EventSink> = Arc::new(tx);
        let handle = runner
            .start("dup", ".", vec![Step::new("t", "sleep", ["30"])], Arc::clone(&sink))
            .unwrap();

        let again = runner.start("dup", ".", Vec::new(), sink);
        assert_eq!(again.err(), Some(ValidationError::DuplicateJob("dup".into())));

        runner.shutdown().await;
        assert_eq!(handle.await.unwrap(), JobStatus::Cancelled);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn concurrent_jobs_do_not_share_events() {
        let runner = runner();
        let bus = Arc::new(EventBus::new());
        let a_rx = bus.subscribe("a");
        let b_rx = bus.subscribe("b");

        let sink: Arc<dyn EventSink> = bus.clone();
        let ha = runner.start("a", ".", vec![sh("s", "echo from-a")], Arc::clone(&sink)).unwrap();
        let hb = runner.start("b", ".", vec![sh("s", "echo from-b")], sink).unwrap();
        assert_eq!(ha.await.unwrap(), JobStatus::Passed);
        assert_eq!(hb.await.unwrap(), JobStatus::Passed);

        let logs = |events: Vec<ValidationEvent>| -> Vec<String> {
            events
                .into_iter()
                .filter_map(|e| match e {
                    ValidationEvent::Log { line, .. } => Some(line),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(logs(collect(a_rx).await), ["from-a"]);
        assert_eq!(logs(collect(b_rx).await), ["from-b"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_grace_period_still_delivers_every_line() {
        let runner = ValidationRunner::new(RunnerOptions {
            grace_period: Duration::ZERO,
            strip_ansi: true,
        });
        let (tx, rx) = unbounded_channel();
        let script = "i=0; while [ $i -lt 3000 ]; do echo line$i; i=$((i+1)); done";
        let handle = runner.start("spam", ".", vec![sh("spam", script)], Arc::new(tx)).unwrap();
        assert_eq!(handle.await.unwrap(), JobStatus::Passed);

        let lines: Vec<_> = collect(rx)
            .await
            .into_iter()
            .filter_map(|e| match e {
                ValidationEvent::Log { line, .. } => Some(line),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 3000);
        assert_eq!(lines[0], "line0");
        assert_eq!(lines[2999], "line2999");
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_racing_completion_leaves_a_single_end() {
        let runner = runner();
        for round in 0..20 {
            let id = format!("race-{round}");
            let (tx, rx) = unbounded_channel();
            let handle = runner
                .start(&id, ".", vec![Step::new("t", "true", Vec::<String>::new())], Arc::new(tx))
                .unwrap();

            let outcome = runner.stop(&id).await;
            assert!(
                matches!(
                    outcome,
                    StopOutcome::NotFound
                        | StopOutcome::AlreadyFinished(_)
                        | StopOutcome::Stopped(JobStatus::Passed | JobStatus::Cancelled)
                ),
                "unexpected outcome {outcome:?}"
            );
            assert!(handle.await.unwrap().is_terminal());
            assert!(!runner.registry().contains(&id));

            let events = collect(rx).await;
            assert_eq!(events.iter().filter(|e| e.kind() == "end").count(), 1);
            assert_eq!(events.last().map(ValidationEvent::kind), Some("end"));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_after_completion_is_a_noop() {
        let runner = runner();
        let (tx, rx) = unbounded_channel();
        let handle = runner
            .start("done", ".", vec![Step::new("t", "true", Vec::<String>::new())], Arc::new(tx))
            .unwrap();
        assert_eq!(handle.await.unwrap(), JobStatus::Passed);

        assert_eq!(runner.stop("done").await, StopOutcome::NotFound);
        let kinds: Vec<_> = collect(rx).await.iter().map(ValidationEvent::kind).collect();
        assert_eq!(kinds, ["start", "step_start", "step_end", "end"]);
    }
}
