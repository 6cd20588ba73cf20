use crate::player::traits::ControlPort;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const HELPER_TIMEOUT: Duration = Duration::from_secs(2);
const WAIT_STEP: Duration = Duration::from_millis(20);

/// Control port that shells out to a media-controller helper:
/// `<helper> <command> [arg]`, exit code 0 meaning success.
#[derive(Debug, Clone)]
pub struct ProcessController {
    executable: PathBuf,
    timeout: Duration,
}

impl ProcessController {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: HELPER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn run(&self, command: &str, args: &[String]) -> Result<()> {
        if !self.executable.exists() {
            anyhow::bail!("media-controller not found at {}", self.executable.display());
        }

        let mut cmd = launcher(&self.executable);
        cmd.arg(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.executable.display()))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    debug!(command, "media-controller succeeded");
                    return Ok(());
                }
                anyhow::bail!("media-controller '{}' exited with {}", command, status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                anyhow::bail!("media-controller '{}' timed out after {:?}", command, self.timeout);
            }
            std::thread::sleep(WAIT_STEP);
        }
    }
}

/// `.dll` builds of the helpers run through the dotnet host.
pub(crate) fn launcher(executable: &Path) -> Command {
    let is_dll = executable
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("dll"))
        .unwrap_or(false);

    if is_dll {
        let mut cmd = Command::new("dotnet");
        cmd.arg(executable);
        cmd
    } else {
        Command::new(executable)
    }
}

/// Seek targets are whole, non-negative seconds on the helper's side.
fn seek_argument(seconds: f64) -> i64 {
    if seconds.is_finite() {
        seconds.round().max(0.0) as i64
    } else {
        0
    }
}

impl ControlPort for ProcessController {
    fn next(&self) -> Result<()> {
        self.run("next", &[])?;
        info!("Command 'next' executed");
        Ok(())
    }

    fn previous(&self) -> Result<()> {
        self.run("previous", &[])?;
        info!("Command 'previous' executed");
        Ok(())
    }

    fn play_pause(&self) -> Result<()> {
        self.run("playpause", &[])?;
        info!("Command 'playpause' executed");
        Ok(())
    }

    fn seek_to_seconds(&self, seconds: f64) -> Result<()> {
        let target = seek_argument(seconds);
        self.run("seek", &[target.to_string()]).map_err(|e| {
            warn!("Seek command failed via media-controller: {}", e);
            e
        })?;
        info!(target, "Command 'seek' executed");
        Ok(())
    }

    fn focus_source(&self) -> Result<()> {
        self.run("focussource", &[])?;
        info!("Command 'focussource' executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_argument_rounds_and_clamps() {
        assert_eq!(seek_argument(12.4), 12);
        assert_eq!(seek_argument(12.5), 13);
        assert_eq!(seek_argument(-4.0), 0);
        assert_eq!(seek_argument(f64::INFINITY), 0);
    }

    #[test]
    fn test_missing_helper_is_an_error() {
        let controller = ProcessController::new("/definitely/not/here/media-controller");
        let err = controller.next().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_launcher_uses_dotnet_for_dll() {
        let cmd = launcher(Path::new("tools/media-controller.dll"));
        assert_eq!(cmd.get_program(), "dotnet");

        let cmd = launcher(Path::new("tools/media-controller"));
        assert_eq!(cmd.get_program(), "tools/media-controller");
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn helper(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("media-controller.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_helper_receives_command_and_argument() {
            let dir = tempfile::tempdir().unwrap();
            let args = dir.path().join("args");
            let path = helper(dir.path(), &format!("echo \"$@\" > {}", args.display()));
            let controller = ProcessController::new(path);

            controller.seek_to_seconds(41.6).unwrap();
            assert_eq!(std::fs::read_to_string(&args).unwrap().trim(), "seek 42");

            controller.play_pause().unwrap();
            assert_eq!(std::fs::read_to_string(&args).unwrap().trim(), "playpause");
        }

        #[test]
        fn test_non_zero_exit_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let controller = ProcessController::new(helper(dir.path(), "exit 3"));

            let err = controller.next().unwrap_err();
            assert!(err.to_string().contains("exited with"), "{err}");
        }

        #[test]
        fn test_hung_helper_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let controller = ProcessController::new(helper(dir.path(), "exec sleep 30"))
                .with_timeout(Duration::from_millis(200));

            let started = Instant::now();
            let err = controller.previous().unwrap_err();
            assert!(err.to_string().contains("timed out"), "{err}");
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }
}
