// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::config::ApplicationDefinition;
use crate::error::ErrorKind;
use crate::procs::ManagedProcess;
use crate::Error;

struct StdIoConf {
    stdin: Stdio,
    stderr: Stdio,
    stdout: Stdio,
}

impl StdIoConf {
    fn for_application() -> Self {
        StdIoConf {
            // the console owns stdin, programs never read from it
            stdin: Stdio::null(),
            stderr: Stdio::inherit(),
            stdout: Stdio::inherit(),
        }
    }
}

/// Launch a configured program
///
/// Rules:
/// - `arguments` are split with shell quoting rules, no shell is involved
/// - the process outlives its handle, dropping it does not kill the program
/// - nothing is tracked here, that is the supervisor's job
pub fn launch(def: &ApplicationDefinition) -> Result<ManagedProcess, Error> {
    let launch_error = |reason: String| ErrorKind::Launch {
        name: def.name().to_string(),
        reason,
    };

    if def.name().is_empty() {
        return Err(launch_error("programs must have a name".to_string()).into());
    }

    let args = shell_words::split(def.arguments())
        .map_err(|e| launch_error(format!("invalid arguments: {}", e)))?;

    let stdio = StdIoConf::for_application();

    // FIXME: working directory and environment are inherited from appctl
    let child = Command::new(def.path())
        .args(&args)
        .kill_on_drop(false)
        .stdin(stdio.stdin)
        .stdout(stdio.stdout)
        .stderr(stdio.stderr)
        .spawn()
        .map_err(|e| launch_error(format!("{}: {}", def.path(), e)))?;

    let pid = child
        .id()
        .ok_or_else(|| launch_error("process exited before its pid was known".to_string()))?;

    debug!(name = %def.name(), path = %def.path(), ?args, pid, "spawned process");
    Ok(ManagedProcess::new(
        def.name().to_string(),
        pid as libc::pid_t,
        child,
    ))
}
