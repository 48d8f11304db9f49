//! External command execution shared by the emulator and adb adapters

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Limit for adapters built without an explicit one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Run `program args...` to completion within `limit` and return trimmed stdout
pub async fn run(program: &str, args: &[&str], limit: Duration) -> Result<String> {
    let output = run_raw(program, args, limit).await?;
    Ok(String::from_utf8_lossy(&output).trim().to_string())
}

/// Run `program args...` to completion within `limit` and return raw stdout
///
/// The child is killed when the limit expires.
pub async fn run_raw(program: &str, args: &[&str], limit: Duration) -> Result<Vec<u8>> {
    debug!("exec: {} {}", program, args.join(" "));
    let name = args.first().copied().unwrap_or_default();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(limit, child)
        .await
        .map_err(|_| Error::timeout(format!("{} {} did not finish within {:?}", program, name, limit)))?
        .map_err(|e| Error::tool(format!("Failed to run {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool(format!(
            "{} {} exited with {}: {}",
            program,
            name,
            output.status,
            stderr.trim()
        )));
    }

    Ok(output.stdout)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_trimmed_stdout() {
        let out = run("sh", &["-c", "echo '  hello  '"], Duration::from_secs(10)).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_failing_command_is_tool_error() {
        let result = run("sh", &["-c", "echo oops >&2; exit 3"], Duration::from_secs(10)).await;
        match result {
            Err(Error::ToolInvocationFailed(msg)) => assert!(msg.contains("oops")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hung_command_times_out() {
        let started = std::time::Instant::now();
        let result = run("sleep", &["30"], Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
