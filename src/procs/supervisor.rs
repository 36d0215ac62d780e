// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ApplicationDefinition;
use crate::error::ErrorKind;
use crate::procs::{self, ManagedProcess, DEFAULT_STOP_TIMEOUT};
use crate::registry::Registry;
use crate::Error;

/// How a tracked process left the supervisor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited on its own within the stop timeout after SIGTERM
    Graceful,
    /// Ignored SIGTERM and was killed
    Forced,
    /// Had already exited, no signal was sent
    AlreadyExited,
}

/// What a restart did, the stop is reported even if the start failed
#[derive(Debug)]
pub struct Restarted {
    /// `None` when nothing was tracked under the name
    pub stopped: Option<StopOutcome>,
    pub started: Result<libc::pid_t, Error>,
}

/// A configured program and its tracked pid, if any
#[derive(Clone, Debug)]
pub struct ConfiguredStatus<'a> {
    pub definition: &'a ApplicationDefinition,
    pub pid: Option<libc::pid_t>,
}

/// An entry of the live map, as of the moment it was listed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunningStatus {
    pub name: String,
    pub pid: libc::pid_t,
    pub exited: bool,
}

/// Launch and monitor processes
///
/// Rules:
///   - at most one tracked process per program name
///   - liveness is only checked when stopping or listing, never in the background
///   - a stop always removes the entry, whether the process left gracefully or not
///   - processes still tracked when the supervisor is dropped keep running
#[derive(Debug)]
pub struct Supervisor {
    running: BTreeMap<String, ManagedProcess>,
    stop_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_stop_timeout(DEFAULT_STOP_TIMEOUT)
    }

    /// Grace period between SIGTERM and SIGKILL
    pub fn with_stop_timeout(stop_timeout: Duration) -> Self {
        Self {
            running: BTreeMap::new(),
            stop_timeout,
        }
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.running.contains_key(name)
    }

    pub fn pid_of(&self, name: &str) -> Option<libc::pid_t> {
        self.running.get(name).map(ManagedProcess::pid)
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Launches the program and tracks it under its name
    ///
    /// An entry already tracked under the same name is replaced without being
    /// stopped; use `restart` to cycle a program.
    pub fn start(&mut self, def: &ApplicationDefinition) -> Result<libc::pid_t, Error> {
        let process = procs::launch(def)?;
        let pid = process.pid();

        if let Some(stale) = self.running.insert(def.name().to_string(), process) {
            warn!(
                name = %def.name(),
                pid = stale.pid(),
                "replaced a tracked process, the previous instance is no longer managed"
            );
        }

        info!(name = %def.name(), pid, "started");
        Ok(pid)
    }

    /// Stops the tracked process, escalating from SIGTERM to SIGKILL after the stop timeout
    pub async fn stop(&mut self, name: &str) -> Result<StopOutcome, Error> {
        let mut process = self
            .running
            .remove(name)
            .ok_or_else(|| ErrorKind::NotRunning(name.to_string()))?;

        if process.has_exited() {
            debug!(name, pid = process.pid(), "dropping entry for exited process");
            return Ok(StopOutcome::AlreadyExited);
        }

        // ESRCH here means it exited in the meantime, the wait below sees that
        if let Err(e) = process.terminate() {
            debug!(name, pid = process.pid(), error = %e, "SIGTERM failed");
        }

        match process.wait_for_exit(self.stop_timeout).await {
            Ok(Some(_)) => {
                info!(name, pid = process.pid(), "stopped");
                return Ok(StopOutcome::Graceful);
            }
            Ok(None) => warn!(
                name,
                pid = process.pid(),
                timeout_ms = self.stop_timeout.as_millis() as u64,
                "process did not exit in time, killing"
            ),
            Err(e) => warn!(name, pid = process.pid(), error = %e, "wait failed, killing"),
        }

        if let Err(e) = process.kill().await {
            warn!(name, pid = process.pid(), error = %e, "SIGKILL failed");
        }

        info!(name, pid = process.pid(), "force-stopped");
        Ok(StopOutcome::Forced)
    }

    /// Stops the program if it is tracked, then starts it again
    ///
    /// The start is attempted no matter how the stop went.
    pub async fn restart(&mut self, def: &ApplicationDefinition) -> Restarted {
        let stopped = if self.is_tracked(def.name()) {
            match self.stop(def.name()).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(name = %def.name(), error = %e, "stop before restart failed");
                    None
                }
            }
        } else {
            None
        };

        Restarted {
            stopped,
            started: self.start(def),
        }
    }

    /// Stops every tracked process, one result per name
    pub async fn stop_all(&mut self) -> Vec<(String, Result<StopOutcome, Error>)> {
        // taken before any stop, each stop removes from the map
        let names: Vec<String> = self.running.keys().cloned().collect();

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let result = self.stop(&name).await;
            results.push((name, result));
        }

        results
    }

    /// Every configured program, with the pid of its tracked process if there is one
    pub fn list_configured<'a>(&self, registry: &'a Registry) -> Vec<ConfiguredStatus<'a>> {
        registry
            .iter()
            .map(|definition| ConfiguredStatus {
                definition,
                pid: self.pid_of(definition.name()),
            })
            .collect()
    }

    /// Every tracked process, including those that exited but were not stopped yet
    pub fn list_running(&mut self) -> Vec<RunningStatus> {
        self.running
            .values_mut()
            .map(|process| RunningStatus {
                name: process.name().to_string(),
                pid: process.pid(),
                exited: process.has_exited(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    const SHORT_TIMEOUT: Duration = Duration::from_millis(500);

    fn sleeper(name: &str) -> ApplicationDefinition {
        ApplicationDefinition::new(name, "sleep", "30")
    }

    /// A shell that ignores SIGTERM
    fn stubborn(name: &str) -> ApplicationDefinition {
        ApplicationDefinition::new(name, "sh", "-c 'trap \"\" TERM; while true; do sleep 1; done'")
    }

    async fn wait_until_exited(supervisor: &mut Supervisor, name: &str) {
        for _ in 0..100 {
            if supervisor
                .list_running()
                .iter()
                .any(|status| status.name == name && status.exited)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never exited", name);
    }

    #[tokio::test]
    async fn test_stop_unknown_name() {
        let mut supervisor = Supervisor::new();
        supervisor.start(&sleeper("A")).expect("failed to start");

        let err = supervisor.stop("B").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotRunning(name) if name == "B"));
        assert_eq!(supervisor.len(), 1);

        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_start_tracks_process() {
        let mut supervisor = Supervisor::new();
        let pid = supervisor.start(&sleeper("A")).expect("failed to start");

        assert_eq!(
            supervisor.list_running(),
            vec![RunningStatus {
                name: "A".to_string(),
                pid,
                exited: false,
            }]
        );

        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_failed_start_leaves_map_alone() {
        let mut supervisor = Supervisor::new();
        let pid = supervisor.start(&sleeper("A")).expect("failed to start");

        let broken = ApplicationDefinition::new("A", "/definitely/not/a/program", "");
        let err = supervisor.start(&broken).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Launch { .. }));
        assert_eq!(supervisor.pid_of("A"), Some(pid));

        let err = supervisor
            .start(&ApplicationDefinition::new("B", "/definitely/not/a/program", ""))
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Launch { .. }));
        assert!(!supervisor.is_tracked("B"));

        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_start_replaces_entry() {
        let mut supervisor = Supervisor::new();
        let first = supervisor.start(&sleeper("A")).expect("failed to start");
        let second = supervisor.start(&sleeper("A")).expect("failed to start");

        assert_ne!(first, second);
        assert_eq!(supervisor.len(), 1);
        assert_eq!(supervisor.pid_of("A"), Some(second));

        supervisor.stop_all().await;
        // the replaced instance is untracked, clean it up by hand
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(first),
            nix::sys::signal::Signal::SIGKILL,
        )
        .ok();
    }

    #[tokio::test]
    async fn test_graceful_stop() {
        let mut supervisor = Supervisor::new();
        supervisor.start(&sleeper("A")).expect("failed to start");

        let outcome = supervisor.stop("A").await.expect("failed to stop");
        assert_eq!(outcome, StopOutcome::Graceful);
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_forced_stop() {
        let mut supervisor = Supervisor::with_stop_timeout(SHORT_TIMEOUT);
        supervisor.start(&stubborn("A")).expect("failed to start");

        // give the shell time to install its trap
        tokio::time::sleep(Duration::from_millis(300)).await;

        let outcome = supervisor.stop("A").await.expect("failed to stop");
        assert_eq!(outcome, StopOutcome::Forced);
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_stop_already_exited() {
        let mut supervisor = Supervisor::new();
        supervisor
            .start(&ApplicationDefinition::new("A", "true", ""))
            .expect("failed to start");

        wait_until_exited(&mut supervisor, "A").await;
        // still listed until stopped
        assert_eq!(supervisor.len(), 1);

        let outcome = supervisor.stop("A").await.expect("failed to stop");
        assert_eq!(outcome, StopOutcome::AlreadyExited);
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_restart_from_every_state() {
        let mut supervisor = Supervisor::new();

        // absent
        let restarted = supervisor.restart(&sleeper("A")).await;
        assert_eq!(restarted.stopped, None);
        let first = restarted.started.expect("restart");
        assert_eq!(supervisor.pid_of("A"), Some(first));

        // running
        let again = supervisor.restart(&sleeper("A")).await;
        assert_eq!(again.stopped, Some(StopOutcome::Graceful));
        let second = again.started.expect("restart");
        assert_ne!(second, first);
        assert_eq!(supervisor.pid_of("A"), Some(second));

        // already exited
        let quick = ApplicationDefinition::new("B", "true", "");
        supervisor.start(&quick).expect("failed to start");
        wait_until_exited(&mut supervisor, "B").await;
        let restarted = supervisor.restart(&quick).await;
        assert_eq!(restarted.stopped, Some(StopOutcome::AlreadyExited));
        restarted.started.expect("restart");
        assert!(supervisor.is_tracked("B"));

        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_restart_keeps_stop_outcome_when_start_fails() {
        let mut supervisor = Supervisor::new();
        supervisor.start(&sleeper("A")).expect("failed to start");

        let broken = ApplicationDefinition::new("A", "/definitely/not/a/program", "");
        let restarted = supervisor.restart(&broken).await;

        assert_eq!(restarted.stopped, Some(StopOutcome::Graceful));
        let err = restarted.started.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Launch { .. }));
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_stop_all() {
        let mut supervisor = Supervisor::with_stop_timeout(SHORT_TIMEOUT);
        supervisor.start(&sleeper("A")).expect("failed to start");
        supervisor.start(&sleeper("B")).expect("failed to start");
        supervisor.start(&stubborn("C")).expect("failed to start");
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut results = supervisor.stop_all().await;
        assert!(supervisor.is_empty());
        assert_eq!(results.len(), 3);

        results.sort_by(|a, b| a.0.cmp(&b.0));
        let outcomes: Vec<_> = results
            .into_iter()
            .map(|(name, result)| (name, result.expect("stop failed")))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("A".to_string(), StopOutcome::Graceful),
                ("B".to_string(), StopOutcome::Graceful),
                ("C".to_string(), StopOutcome::Forced),
            ]
        );

        assert!(supervisor.stop_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_configured() {
        let registry = Registry::new(
            Path::new("test.json"),
            vec![sleeper("A"), sleeper("B")],
        )
        .expect("registry");

        let mut supervisor = Supervisor::new();
        let pid = supervisor
            .start(registry.lookup("b").expect("configured"))
            .expect("failed to start");

        let listed: Vec<_> = supervisor
            .list_configured(&registry)
            .into_iter()
            .map(|status| (status.definition.name().to_string(), status.pid))
            .collect();
        assert_eq!(
            listed,
            vec![("A".to_string(), None), ("B".to_string(), Some(pid))]
        );

        supervisor.stop_all().await;
    }
}
