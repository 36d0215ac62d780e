// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod launcher;
mod supervisor;

pub use launcher::launch;
pub use supervisor::{ConfiguredStatus, Restarted, RunningStatus, StopOutcome, Supervisor};

use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::{debug, warn};

use crate::Error;

/// How long a process is given to exit after SIGTERM before it is killed
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A live OS process started for a configured program
#[derive(Debug)]
pub struct ManagedProcess {
    name: String,
    pid: libc::pid_t,
    child: Child,
}

impl ManagedProcess {
    pub(crate) fn new(name: String, pid: libc::pid_t, child: Child) -> Self {
        Self { name, pid, child }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Checks without blocking; a failed check is reported as exited
    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(name = %self.name, pid = self.pid, %status, "process has exited");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(name = %self.name, pid = self.pid, error = %e, "could not check process");
                true
            }
        }
    }

    /// Asks the process to shut itself down
    pub fn terminate(&self) -> Result<(), Error> {
        kill(Pid::from_raw(self.pid), Signal::SIGTERM)?;
        Ok(())
    }

    /// Waits for the process to exit, for at most `timeout`
    ///
    /// Returns `None` if the timeout elapsed first.
    pub async fn wait_for_exit(&mut self, timeout: Duration) -> Result<Option<ExitStatus>, Error> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(name = %self.name, pid = self.pid, %status, "process exited");
                Ok(Some(status))
            }
            Err(_) => Ok(None),
        }
    }

    /// SIGKILL and reap
    pub async fn kill(&mut self) -> Result<(), Error> {
        self.child.kill().await?;
        Ok(())
    }
}
