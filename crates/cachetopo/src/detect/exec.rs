use log::debug;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::errors::{Result, TopologyError};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The only way backends reach the outside world.
pub trait CommandRunner {
    /// Run `program args..`, returning captured stdout on a zero exit status.
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Spawns real processes, killing any that outlive `timeout`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    pub timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let start = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TopologyError::execution(program, e.to_string()))?;

        // Drain both pipes off-thread so a chatty child can't block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_or_kill(&mut child, self.timeout)
            .map_err(|e| TopologyError::execution(program, e.to_string()))?;
        let ms = start.elapsed().as_millis() as u64;
        debug!("[exec] {} {} ({ms} ms)", program, args.join(" "));

        let Some(status) = status else {
            return Err(TopologyError::execution(
                program,
                format!("timeout after {ms} ms, process killed"),
            ));
        };

        let stdout = collect(stdout);
        if !status.success() {
            let stderr = collect(stderr);
            let stderr = stderr.trim();
            let reason = if stderr.is_empty() {
                format!("exited with {status}")
            } else {
                format!("exited with {status}: {stderr}")
            };
            return Err(TopologyError::execution(program, reason));
        }
        Ok(stdout)
    }
}

/// `Ok(None)` when the deadline passed and the child was killed.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        buf
    })
}

fn collect(handle: JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}
