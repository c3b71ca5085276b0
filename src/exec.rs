//! Command execution
//!
//! Collection code only needs "run this, locally or on that host, and tell
//! me whether it worked". [`CommandExecutor`] is that capability; the
//! shipped [`ShellExecutor`] runs local commands through `sh -c` and remote
//! ones through the `ssh` binary, leaving authentication and timeouts to
//! ssh itself.

use std::fmt;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Default ssh options: quiet, non-interactive, no host key bookkeeping
pub const DEFAULT_SSH_OPTIONS: &[&str] = &[
    "LogLevel=quiet",
    "StrictHostKeyChecking=no",
    "UserKnownHostsFile=/dev/null",
];

/// Quote a word for `sh` so it reaches the command as a single argument
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return word.to_string();
    }

    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Where a command runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// On the machine running the collector
    Local,
    /// On a cluster host, through a remote shell
    Host(String),
}

impl Target {
    pub fn host(name: impl Into<String>) -> Self {
        Target::Host(name.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local => f.write_str("local"),
            Target::Host(host) => f.write_str(host),
        }
    }
}

/// A command together with the place it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub target: Target,
    pub command: String,
}

impl CommandSpec {
    pub fn local(command: impl Into<String>) -> Self {
        Self {
            target: Target::Local,
            command: command.into(),
        }
    }

    pub fn on(target: Target, command: impl Into<String>) -> Self {
        Self {
            target,
            command: command.into(),
        }
    }
}

/// Outcome of a single command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status was zero
    pub success: bool,

    /// Captured stdout on success, diagnostic output on failure
    pub output: Vec<u8>,
}

impl CommandOutput {
    pub fn ok(output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }

    /// Output decoded as text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Capability to execute possibly-remote commands
///
/// Implementations must not panic or error on ordinary command failure;
/// they report it through [`CommandOutput::success`].
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, spec: &CommandSpec) -> CommandOutput;
}

/// Executor backed by `sh -c` and the `ssh` binary
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    /// ssh program to invoke
    ssh_program: String,

    /// `-o` options passed to every ssh invocation
    ssh_options: Vec<String>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            ssh_options: DEFAULT_SSH_OPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add extra `-o` options (e.g. `ConnectTimeout=10`)
    pub fn with_ssh_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ssh_options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Build the process invocation for a command
    fn build(&self, spec: &CommandSpec) -> Command {
        match &spec.target {
            Target::Local => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(&spec.command);
                cmd
            }
            Target::Host(host) => {
                let mut cmd = Command::new(&self.ssh_program);
                for opt in &self.ssh_options {
                    cmd.arg("-o").arg(opt);
                }
                cmd.arg(host).arg(&spec.command);
                cmd
            }
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, spec: &CommandSpec) -> CommandOutput {
        match &spec.target {
            Target::Local => debug!(command = %spec.command, "CMD"),
            Target::Host(host) => debug!(host = %host, command = %spec.command, "SSH"),
        }

        let mut cmd = self.build(spec);
        cmd.stdin(Stdio::null());

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                return CommandOutput::failed(format!(
                    "failed to spawn command on {}: {}",
                    spec.target, e
                ));
            }
        };

        trace!(
            target_host = %spec.target,
            code = ?output.status.code(),
            stdout_len = output.stdout.len(),
            "Command finished"
        );

        if output.status.success() {
            CommandOutput::ok(output.stdout)
        } else if output.stderr.is_empty() {
            CommandOutput::failed(output.stdout)
        } else {
            CommandOutput::failed(output.stderr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_local_invocation() {
        let exec = ShellExecutor::new();
        let cmd = exec.build(&CommandSpec::local("uname -a"));
        assert_eq!(cmd.get_program(), "sh");
        assert_eq!(args(&cmd), vec!["-c", "uname -a"]);
    }

    #[test]
    fn test_ssh_invocation() {
        let exec = ShellExecutor::new().with_ssh_options(["ConnectTimeout=5"]);
        let cmd = exec.build(&CommandSpec::on(Target::host("h1"), "cat /proc/loadavg"));
        assert_eq!(cmd.get_program(), "ssh");

        let args = args(&cmd);
        assert_eq!(args.last().map(String::as_str), Some("cat /proc/loadavg"));
        assert_eq!(args[args.len() - 2], "h1");
        assert!(args.contains(&"ConnectTimeout=5".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
    }

    #[test]
    fn test_local_execution() {
        let exec = ShellExecutor::new();

        let out = exec.execute(&CommandSpec::local("echo hello"));
        assert!(out.success);
        assert_eq!(out.text().trim(), "hello");

        let out = exec.execute(&CommandSpec::local("echo oops >&2; exit 3"));
        assert!(!out.success);
        assert_eq!(out.text().trim(), "oops");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/out.tar.gz"), "/tmp/out.tar.gz");
        assert_eq!(shell_quote("my dump.tar.gz"), "'my dump.tar.gz'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_quoted_words_survive_the_shell() {
        let exec = ShellExecutor::new();

        for word in ["my dump.tar.gz", "a;b", "$(echo injected)", "it's here", "*"] {
            let out = exec.execute(&CommandSpec::local(format!("printf %s {}", shell_quote(word))));
            assert!(out.success);
            assert_eq!(out.text(), word);
        }
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::Local.to_string(), "local");
        assert_eq!(Target::host("node-7").to_string(), "node-7");
    }
}
