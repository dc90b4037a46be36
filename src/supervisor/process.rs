use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },
}

/// Ask a process to stop. SIGTERM on Unix, `taskkill` without `/F` on Windows.
///
/// This is a request only; the caller escalates to a hard kill after its
/// grace period.
pub fn request_stop(pid: u32) -> Result<(), ProcessError> {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        let output = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .map_err(|e| ProcessError::SignalFailed {
                pid,
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ProcessError::SignalFailed {
                pid,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| ProcessError::SignalFailed {
            pid,
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

/// Non-blocking wrapper; `taskkill` waits on a child process.
pub async fn request_stop_async(pid: u32) -> Result<(), ProcessError> {
    tokio::task::spawn_blocking(move || request_stop(pid))
        .await
        .unwrap_or_else(|e| {
            Err(ProcessError::SignalFailed {
                pid,
                reason: e.to_string(),
            })
        })
}
