use anyhow::{Context, Result};
use std::process::{Command, Stdio};

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{cmd} failed: {}", stderr.trim())
    }
}

/// Run a command silently and report whether it exited successfully
///
/// Unlike a failed exit, a command that cannot be started is an error.
pub fn run_check(cmd: &str, args: &[&str]) -> Result<bool> {
    let status = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_an_error() {
        assert!(run_check("/nonexistent/pvesync-test", &[]).is_err());
        assert!(run_capture("/nonexistent/pvesync-test", &["x"]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status() {
        assert!(run_check("true", &[]).unwrap());
        assert!(!run_check("false", &[]).unwrap());
        assert_eq!(run_capture("echo", &["hello"]).unwrap(), "hello");
    }
}
