//! HTTP transport over the `curl` executable.

use crmsync_remote::HttpClient;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Posts JSON bodies by piping them to a `curl` child process.
#[derive(Debug, Clone)]
pub struct CurlClient {
    program: String,
    timeout: Duration,
}

impl CurlClient {
    /// Creates a client using `curl` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: "curl".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses another executable, e.g. an absolute path.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, url: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["--silent", "--show-error", "--location"])
            .args(["--max-time", &self.timeout.as_secs().max(1).to_string()])
            .args(["--request", "POST"])
            .args(["--header", "Content-Type: application/json"])
            .args(["--data-binary", "@-"])
            .arg(url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl Default for CurlClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for CurlClient {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let mut child = self
            .command(url)
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.program))?;

        // Error statuses still carry a JSON error payload, so only curl's own
        // exit status is checked.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&body)
                .map_err(|e| format!("failed to send request body: {e}"))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to wait for {}: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{} exited with {}: {}", self.program, output.status, stderr.trim()));
        }
        Ok(output.stdout)
    }

    fn is_healthy(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}
