//! Command channels that carry scheduler commands to the resource manager.
//!
//! A channel runs one shell command line at a time and reports its exit
//! code and captured output. It is a stateful, single-command resource:
//! callers that share one across threads must serialize access (the
//! session does this with a mutex).

use std::collections::VecDeque;
use std::process::{Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::endpoint::{Endpoint, TransportScheme};
use crate::error::{SchedError, SchedResult};

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was killed by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Successful command with the given standard output.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed command with the given exit code and standard error.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Check if the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Raw output to attach to an error: stderr and stdout, trimmed, in
    /// that order, whichever are non-empty.
    pub fn diagnostic(&self) -> String {
        let parts: Vec<&str> = [self.stderr.trim(), self.stdout.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            parts.join("\n")
        }
    }
}

/// Synchronous command execution against one endpoint.
pub trait CommandChannel: Send {
    /// Run `command` through a POSIX shell and wait for it.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`];
    /// `Err` is reserved for failures to run the command at all.
    fn run_sync(&mut self, command: &str) -> SchedResult<CommandOutput>;
}

impl<C: CommandChannel + ?Sized> CommandChannel for Box<C> {
    fn run_sync(&mut self, command: &str) -> SchedResult<CommandOutput> {
        (**self).run_sync(command)
    }
}

fn run_process(mut cmd: Command, display: &str) -> SchedResult<CommandOutput> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| SchedError::Transport {
            command: display.to_string(),
            message: e.to_string(),
        })?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs commands on the local host through `sh -c`.
#[derive(Debug, Clone, Default)]
pub struct LocalShell;

impl LocalShell {
    /// Create a local shell channel.
    pub fn new() -> Self {
        Self
    }
}

impl CommandChannel for LocalShell {
    fn run_sync(&mut self, command: &str) -> SchedResult<CommandOutput> {
        trace!("sh -c {}", command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        run_process(cmd, command)
    }
}

/// Runs commands on a remote host through `ssh` or `gsissh`.
///
/// Authentication is left entirely to the ssh client (agent, keys, GSI
/// proxy); the remote login shell interprets the command line.
#[derive(Debug, Clone)]
pub struct SshShell {
    program: String,
    destination: String,
    port: Option<u16>,
}

impl SshShell {
    /// Connect with plain ssh.
    pub fn ssh(destination: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            program: "ssh".to_string(),
            destination: destination.into(),
            port,
        }
    }

    /// Connect with GSI-enabled ssh.
    pub fn gsissh(destination: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            program: "gsissh".to_string(),
            destination: destination.into(),
            port,
        }
    }

    /// Arguments passed to the ssh client for `command`.
    pub fn args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(self.destination.clone());
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

impl CommandChannel for SshShell {
    fn run_sync(&mut self, command: &str) -> SchedResult<CommandOutput> {
        trace!("{} {}: {}", self.program, self.destination, command);
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(command));
        run_process(cmd, command)
    }
}

/// Open the channel matching an endpoint's transport scheme.
///
/// `default_port` applies when the endpoint URL has no explicit port.
pub fn open_channel(
    endpoint: &Endpoint,
    default_port: Option<u16>,
) -> SchedResult<Box<dyn CommandChannel>> {
    let destination = || -> SchedResult<String> {
        let host = endpoint.host().ok_or_else(|| SchedError::InvalidEndpoint {
            url: endpoint.to_string(),
            message: "missing host".to_string(),
        })?;
        Ok(match endpoint.username() {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        })
    };
    let port = endpoint.port().or(default_port);

    Ok(match endpoint.transport() {
        TransportScheme::Fork => Box::new(LocalShell::new()),
        TransportScheme::Ssh => Box::new(SshShell::ssh(destination()?, port)),
        TransportScheme::Gsissh => Box::new(SshShell::gsissh(destination()?, port)),
    })
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<(String, VecDeque<CommandOutput>)>,
    log: Vec<String>,
}

/// Channel with scripted responses, for driving the adaptor without a
/// cluster.
///
/// Responses are registered against a substring of the command line; the
/// first rule whose pattern occurs in the command answers it. Queued
/// responses for a rule are handed out in order and the last one repeats.
/// Unmatched commands answer with exit code 127. Clones share the same
/// rules and command log.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    /// Create a channel with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that answers cluster discovery: all PBS tools resolve under
    /// `/usr/bin`, `pbsnodes` lists one node per entry of `cores`, and
    /// `aprun` resolves only when `cray` is set.
    pub fn pbs_cluster(cores: &[u32], cray: bool) -> Self {
        let mock = Self::new();
        for tool in ["pbsnodes", "qstat", "qsub", "qdel"] {
            mock.respond(
                &format!("which {tool}"),
                CommandOutput::ok(format!("/usr/bin/{tool}\n")),
            );
            mock.respond(
                &format!("/usr/bin/{tool} --version"),
                CommandOutput::ok("version: 4.2.10\n"),
            );
        }
        if cray {
            mock.respond("which aprun", CommandOutput::ok("/opt/cray/bin/aprun\n"));
        } else {
            mock.respond(
                "which aprun",
                CommandOutput::failed(1, "which: no aprun in (/usr/bin:/bin)\n"),
            );
        }
        let nodes: String = cores.iter().map(|n| format!("     np = {n}\n")).collect();
        mock.respond("/usr/bin/pbsnodes -a", CommandOutput::ok(nodes));
        mock
    }

    /// Queue a response for commands containing `pattern`.
    pub fn respond(&self, pattern: &str, output: CommandOutput) -> &Self {
        let mut state = self.state.lock();
        match state.rules.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, queue)) => queue.push_back(output),
            None => state
                .rules
                .push((pattern.to_string(), VecDeque::from([output]))),
        }
        self
    }

    /// Drop all responses queued for `pattern`.
    pub fn forget(&self, pattern: &str) {
        self.state.lock().rules.retain(|(p, _)| p != pattern);
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Number of commands run so far.
    pub fn command_count(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Forget the command log, keeping the rules.
    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }
}

impl CommandChannel for MockChannel {
    fn run_sync(&mut self, command: &str) -> SchedResult<CommandOutput> {
        let mut state = self.state.lock();
        state.log.push(command.to_string());

        let response = state
            .rules
            .iter_mut()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .and_then(|(_, queue)| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });

        Ok(response.unwrap_or_else(|| {
            CommandOutput::failed(127, format!("sh: {command}: command not found"))
        }))
    }
}
