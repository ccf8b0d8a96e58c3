use std::fmt;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{Result, ScrapeError};

/// Environment variable holding the sudo password for the reset command.
/// It is read once at startup and removed from the environment.
pub const SUDO_PASSWORD_ENV: &str = "VPN_SUDO_PASSWORD";

/// External command that obtains a fresh IP address. Whether the reset
/// worked is only known from the next successful fetch.
#[derive(Clone)]
pub struct VpnHook {
    program: String,
    args: Vec<String>,
    sudo_password: Option<String>,
}

impl fmt::Debug for VpnHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VpnHook")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("sudo", &self.sudo_password.is_some())
            .finish()
    }
}

impl VpnHook {
    /// Split a whitespace-separated command line; `None` if it is blank
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self { program, args: parts.collect(), sudo_password: None })
    }

    /// Run the command through `sudo -S`, feeding it the password on stdin
    pub fn with_sudo_password(mut self, password: String) -> Self {
        self.sudo_password = Some(password);
        self
    }

    /// Take the sudo password out of the environment, if set
    pub fn with_sudo_password_from_env(self) -> Self {
        match std::env::var(SUDO_PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => {
                std::env::remove_var(SUDO_PASSWORD_ENV);
                self.with_sudo_password(password)
            }
            _ => self,
        }
    }

    fn command(&self) -> Command {
        let mut command = match &self.sudo_password {
            Some(_) => {
                let mut c = Command::new("sudo");
                c.args(["-S", "-p", ""]).arg(&self.program);
                c
            }
            None => Command::new(&self.program),
        };
        command.args(&self.args).stdout(Stdio::null()).stderr(Stdio::piped()).kill_on_drop(true);
        command.stdin(if self.sudo_password.is_some() { Stdio::piped() } else { Stdio::null() });
        command
    }

    /// Run the reset command to completion
    pub async fn reset(&self) -> Result<()> {
        info!("Resetting IP address via {}", self.program);
        let mut child = self.command().spawn()?;

        if let (Some(password), Some(mut stdin)) = (&self.sudo_password, child.stdin.take()) {
            stdin.write_all(format!("{password}\n").as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("IP reset command exited with {}: {}", output.status, stderr.trim());
        }
        Ok(())
    }
}

impl TryFrom<&str> for VpnHook {
    type Error = ScrapeError;

    fn try_from(command: &str) -> Result<Self> {
        Self::from_command_line(command)
            .ok_or_else(|| ScrapeError::InvalidConfig("VPN reset command is empty".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_line() {
        let hook = VpnHook::from_command_line("  nordvpn  connect us ").unwrap();
        assert_eq!(hook.program, "nordvpn");
        assert_eq!(hook.args, vec!["connect", "us"]);
        assert!(VpnHook::from_command_line("   ").is_none());
        assert!(VpnHook::try_from("").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let hook = VpnHook::from_command_line("reset").unwrap().with_sudo_password("hunter2".into());
        assert!(!format!("{hook:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_reset_runs_command() {
        let hook = VpnHook::from_command_line("true").unwrap();
        hook.reset().await.unwrap();
        // Non-zero exit is logged, not fatal
        VpnHook::from_command_line("false").unwrap().reset().await.unwrap();
    }
}
