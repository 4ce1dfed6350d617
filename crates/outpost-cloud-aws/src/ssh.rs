//! Post-boot setup over the system ssh client
//!
//! Wraps `ssh` the same way the other provider wrappers drive their CLIs:
//! build argv, run it through `tokio::process`, surface stderr on failure.

use crate::error::{AwsError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Exit status ssh reports for its own connection failures
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Quote a value for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Commands run on a freshly booted server
///
/// `attributes_json` lands in `~/attributes.json`; `public_key` (when known)
/// is appended to `~/.ssh/authorized_keys`.
pub fn setup_commands(attributes_json: &str, public_key: Option<&str>) -> Vec<String> {
    let mut commands = vec![
        "mkdir -p ~/.ssh && chmod 700 ~/.ssh".to_string(),
        "sudo passwd -l \"$(whoami)\"".to_string(),
        format!("echo {} > ~/attributes.json", shell_quote(attributes_json)),
    ];
    if let Some(key) = public_key {
        commands.push(format!(
            "echo {} >> ~/.ssh/authorized_keys && chmod 600 ~/.ssh/authorized_keys",
            shell_quote(key.trim())
        ));
    }
    commands
}

/// Path of the public half of a private key (`<key>.pub`)
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut path = private_key.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// ssh connection to one host
#[derive(Debug, Clone)]
pub struct RemoteShell {
    host: String,
    user: String,
    keys: Vec<PathBuf>,
    connect_attempts: u32,
    retry_delay: Duration,
}

impl RemoteShell {
    pub fn new(host: impl Into<String>, user: impl Into<String>, keys: &[PathBuf]) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            keys: keys.to_vec(),
            connect_attempts: 20,
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// argv for running `command` remotely
    pub fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();
        for key in &self.keys {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        for option in [
            "StrictHostKeyChecking=no",
            "UserKnownHostsFile=/dev/null",
            "BatchMode=yes",
            "ConnectTimeout=10",
            "LogLevel=ERROR",
        ] {
            args.push("-o".to_string());
            args.push(option.to_string());
        }
        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());
        args
    }

    /// Run one command, returning stdout
    pub async fn run(&self, command: &str) -> Result<String> {
        let output = self.exec(command).await?;
        if !output.status.success() {
            return Err(AwsError::RemoteCommandFailed {
                host: self.host.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Retry a trivial command until sshd accepts the connection
    pub async fn wait_for_sshd(&self) -> Result<()> {
        for attempt in 1..=self.connect_attempts {
            let output = self.exec("true").await?;
            if output.status.success() {
                return Ok(());
            }
            if output.status.code() != Some(SSH_CONNECTION_FAILURE) {
                return Err(AwsError::RemoteCommandFailed {
                    host: self.host.clone(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            tracing::debug!(
                "ssh to {} not ready (attempt {}/{})",
                self.host,
                attempt,
                self.connect_attempts
            );
            if attempt < self.connect_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(AwsError::SshUnavailable {
            host: self.host.clone(),
            attempts: self.connect_attempts,
        })
    }

    async fn exec(&self, command: &str) -> Result<std::process::Output> {
        tracing::debug!("Running: ssh {}@{} {}", self.user, self.host, command);
        let output = Command::new("ssh")
            .args(self.ssh_args(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(output)
    }
}
