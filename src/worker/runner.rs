use crate::worker::invocation::build_invocation;
use crate::worker::{io_error, InvocationLog, WorkerCompletion, WorkerError, WorkerRequest};
use std::io::{BufReader, Read};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the worker to completion, blocking the calling thread.
///
/// Stdout and stderr are drained on helper threads so a chatty worker cannot
/// stall on a full pipe. Timeout and cancellation both kill the worker's
/// process group.
pub fn run_worker(request: &WorkerRequest) -> Result<WorkerCompletion, WorkerError> {
    let invocation = build_invocation(request);
    let worker_id = request.worker.worker_id.clone();

    let command_form = format!("{} {}", invocation.program, invocation.args.join(" "));
    let mut log = InvocationLog {
        run_id: request.run_id.to_string(),
        worker_id: worker_id.clone(),
        command_form,
        working_directory: invocation.cwd.clone(),
        input_count: request.staged_inputs.len(),
        query_provided: request.query.is_some(),
        exit_code: None,
        timed_out: false,
        canceled: false,
        duration_ms: 0,
    };

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &invocation.cwd {
        command.current_dir(cwd);
    }
    for key in &invocation.env_remove {
        command.env_remove(key);
    }
    for (key, value) in &invocation.env {
        command.env(key, value);
    }
    // Own process group, so a timeout or cancel also reaches anything the
    // worker forked.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let start = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(source) => {
            return Err(WorkerError::Spawn {
                worker_id,
                log: Box::new(log),
                source,
            })
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
        terminate(&mut child);
        return Err(io_error(
            &request.worker.script,
            std::io::Error::other("missing worker output pipe"),
        ));
    };
    let readers = OutputReaders::spawn(stdout, stderr);

    // The child may exit while descendants still hold the pipes open, so the
    // loop waits for both the exit status and the readers to finish.
    let mut exited = None;
    let exit_status = loop {
        if exited.is_none() {
            match child.try_wait() {
                Ok(status) => exited = status,
                Err(err) => {
                    terminate(&mut child);
                    let _ = readers.join();
                    return Err(io_error(&request.worker.script, err));
                }
            }
        }
        if let Some(status) = exited {
            if readers.is_finished() {
                break status;
            }
        }

        let canceled = request
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed));
        let timed_out = request
            .timeout
            .is_some_and(|timeout| start.elapsed() > timeout);
        if canceled || timed_out {
            let killed = terminate(&mut child);
            let (stdout, stderr) = readers.join();
            log.exit_code = exited.or(killed).and_then(|status| status.code());
            log.duration_ms = start.elapsed().as_millis() as u64;
            if canceled {
                log.canceled = true;
                return Err(WorkerError::Canceled {
                    worker_id,
                    stdout,
                    stderr,
                    log: Box::new(log),
                });
            }
            log.timed_out = true;
            return Err(WorkerError::Timeout {
                worker_id,
                timeout_ms: request.timeout.unwrap_or_default().as_millis() as u64,
                stdout,
                stderr,
                log: Box::new(log),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let (stdout, stderr) = readers.join();
    log.exit_code = exit_status.code();
    log.duration_ms = start.elapsed().as_millis() as u64;

    if !exit_status.success() {
        return Err(WorkerError::NonZeroExit {
            worker_id,
            exit_code: exit_status.code().unwrap_or(-1),
            stdout,
            stderr,
            log: Box::new(log),
        });
    }

    Ok(WorkerCompletion::new(
        request.run_id.clone(),
        stdout,
        stderr,
        log,
    ))
}

/// Kills the worker's whole process group, then reaps the worker itself.
fn terminate(child: &mut Child) -> Option<ExitStatus> {
    kill_process_group(child.id());
    let _ = child.kill();
    child.wait().ok()
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let _ = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{pgid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

struct OutputReaders {
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

impl OutputReaders {
    fn spawn(stdout: ChildStdout, stderr: ChildStderr) -> Self {
        Self {
            stdout: thread::spawn(move || drain(stdout)),
            stderr: thread::spawn(move || drain(stderr)),
        }
    }

    fn is_finished(&self) -> bool {
        self.stdout.is_finished() && self.stderr.is_finished()
    }

    fn join(self) -> (String, String) {
        (
            self.stdout.join().unwrap_or_default(),
            self.stderr.join().unwrap_or_default(),
        )
    }
}

fn drain(stream: impl Read) -> String {
    let mut buf = Vec::new();
    let mut reader = BufReader::new(stream);
    let _ = reader.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
