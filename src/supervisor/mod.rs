use std::fmt;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::process::Command;

/// One external command, kept as program plus argument vector so it never
/// passes through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    program: String,
    args: Vec<String>,
}

impl Directive {
    pub fn new<P: Into<String>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<A: Into<String>>(mut self, arg: A) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Signalled(i32),
    NotRunning,
}

pub trait Supervisor {
    /// Runs a one-shot directive to completion. `Ok(false)` means it ran and
    /// exited non-zero.
    async fn run_once(&self, directive: &Directive) -> Result<bool>;

    /// Launches a self-daemonizing process. The process writes its own pid
    /// file; nothing here waits for it to appear.
    async fn start_detached(&self, directive: &Directive, pid_file: &Path) -> Result<()>;

    /// Sends SIGTERM to the pid recorded in `pid_file`. A missing or
    /// unreadable pid file is `NotRunning`, not an error.
    async fn stop_by_pid_file(&self, pid_file: &Path) -> Result<StopOutcome>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSupervisor;

impl SystemSupervisor {
    pub fn new() -> Self {
        SystemSupervisor
    }
}

impl Supervisor for SystemSupervisor {
    async fn run_once(&self, directive: &Directive) -> Result<bool> {
        debug!("exec: {}", directive);
        let status = Command::new(directive.program())
            .args(directive.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("failed to spawn {}", directive.program()))?;

        if !status.success() {
            debug!("{} exited with {}", directive.program(), status);
        }
        Ok(status.success())
    }

    async fn start_detached(&self, directive: &Directive, pid_file: &Path) -> Result<()> {
        debug!("starting {} (pid file {})", directive.program(), pid_file.display());
        if !self.run_once(directive).await? {
            bail!("{} failed to start", directive.program());
        }
        Ok(())
    }

    async fn stop_by_pid_file(&self, pid_file: &Path) -> Result<StopOutcome> {
        let contents = match tokio::fs::read_to_string(pid_file).await {
            Ok(contents) => contents,
            Err(e) => {
                debug!("no pid file at {}: {}", pid_file.display(), e);
                return Ok(StopOutcome::NotRunning);
            }
        };

        let Some(pid) = parse_pid(&contents) else {
            debug!("unreadable pid file {}", pid_file.display());
            return Ok(StopOutcome::NotRunning);
        };

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => Ok(StopOutcome::Signalled(pid)),
            Err(Errno::ESRCH) => {
                debug!("pid {} from {} already gone", pid, pid_file.display());
                Ok(StopOutcome::NotRunning)
            }
            Err(e) => Err(e).with_context(|| format!("failed to signal pid {}", pid)),
        }
    }
}

fn parse_pid(contents: &str) -> Option<i32> {
    contents
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_test::assert_ok;

    #[test]
    fn test_directive_display() {
        let directive = Directive::new("iptables")
            .args(["-t", "nat"])
            .arg("-F");
        assert_eq!(directive.to_string(), "iptables -t nat -F");
        assert_eq!(directive.program(), "iptables");
        assert_eq!(directive.arguments().len(), 3);
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("1234\n"), Some(1234));
        assert_eq!(parse_pid("  42 "), Some(42));
        assert_eq!(parse_pid(""), None);
        assert_eq!(parse_pid("abc"), None);
        assert_eq!(parse_pid("0"), None);
        assert_eq!(parse_pid("-5"), None);
    }

    #[tokio::test]
    async fn test_stop_missing_pid_file() {
        let dir = tempdir().unwrap();
        let outcome = SystemSupervisor::new()
            .stop_by_pid_file(&dir.path().join("absent.pid"))
            .await;
        assert_eq!(assert_ok!(outcome), StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_garbage_pid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.pid");
        std::fs::write(&path, "not a pid").unwrap();
        let outcome = SystemSupervisor::new().stop_by_pid_file(&path).await;
        assert_eq!(assert_ok!(outcome), StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_run_once_reports_exit_status() {
        let supervisor = SystemSupervisor::new();
        assert!(supervisor.run_once(&Directive::new("true")).await.unwrap());
        assert!(!supervisor.run_once(&Directive::new("false")).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_once_missing_program() {
        let supervisor = SystemSupervisor::new();
        let result = supervisor
            .run_once(&Directive::new("/nonexistent/mitm-ap-test-binary"))
            .await;
        assert!(result.is_err());
    }
}
