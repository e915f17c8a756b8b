//! Local development server lifecycle.
//!
//! The client only needs three predicates from the dev server: start it,
//! stop it, and ask whether it is still running. [`ProcessDevServer`] is the
//! default and runs a configured program as a child process.

use std::process::{Child, Command, Stdio};

use tracing::{debug, info};

use super::ClientError;

pub const DEFAULT_DEV_SERVER_PROGRAM: &str = "volair-server";
pub const DEFAULT_DEV_SERVER_PORT: u16 = 7541;

/// A server the client can bring up on demand.
pub trait DevServer: Send {
    /// Launch the server. `redirect_output` discards its stdout/stderr.
    fn start(&mut self, redirect_output: bool) -> Result<(), ClientError>;

    fn stop(&mut self) -> Result<(), ClientError>;

    fn is_running(&mut self) -> bool;
}

/// Dev server run as a child process.
#[derive(Debug)]
pub struct ProcessDevServer {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl ProcessDevServer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }
}

impl Default for ProcessDevServer {
    fn default() -> Self {
        Self::new(
            DEFAULT_DEV_SERVER_PROGRAM,
            vec!["--port".to_string(), DEFAULT_DEV_SERVER_PORT.to_string()],
        )
    }
}

impl DevServer for ProcessDevServer {
    fn start(&mut self, redirect_output: bool) -> Result<(), ClientError> {
        if self.is_running() {
            debug!(program = %self.program, "dev server already running");
            return Ok(());
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if redirect_output {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd
            .spawn()
            .map_err(|e| ClientError::DevServer(format!("cannot start {}: {e}", self.program)))?;
        info!(program = %self.program, pid = child.id(), "dev server started");
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ClientError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let pid = child.id();
        if let Ok(None) = child.try_wait() {
            child
                .kill()
                .map_err(|e| ClientError::DevServer(format!("cannot stop pid {pid}: {e}")))?;
        }
        child
            .wait()
            .map_err(|e| ClientError::DevServer(format!("cannot reap pid {pid}: {e}")))?;
        info!(program = %self.program, pid, "dev server stopped");
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}
