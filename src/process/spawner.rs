use crate::config::ServerConfig;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};

/// Handle on the running server process
///
/// The child inherits the launcher's stdio so the server console stays
/// attached. It is killed if the handle is dropped while still running.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    pid: u32,
    exit_status: Option<ExitStatus>,
}

/// Spawn the server described by `config`
///
/// Errors are returned unwrapped so the caller can tell a first start from a
/// restart.
pub fn spawn_server(config: &ServerConfig) -> io::Result<ServerProcess> {
    let mut command = Command::new(&config.java_exe);
    command
        .args(config.args())
        .current_dir(&config.server_dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let child = command.spawn()?;

    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "spawned process has no PID"))?;

    Ok(ServerProcess {
        child,
        pid,
        exit_status: None,
    })
}

/// Return code of an exited process; a process killed by a signal reports
/// the negated signal number
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

impl ServerProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking check: the return code if the process has exited
    pub fn poll(&mut self) -> io::Result<Option<i32>> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait()?;
        }
        Ok(self.exit_status.as_ref().map(exit_code))
    }

    /// Whether the process is still running
    pub fn is_alive(&mut self) -> io::Result<bool> {
        Ok(self.poll()?.is_none())
    }

    /// Ask the process to exit (SIGTERM); no-op once it has exited
    pub fn terminate(&mut self) -> io::Result<()> {
        if self.exit_status.is_some() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            match signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(io::Error::from(e)),
            }
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    /// Block until the process exits
    ///
    /// With a timeout, a process still running when it elapses is killed
    /// and reaped.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> io::Result<i32> {
        if let Some(ref status) = self.exit_status {
            return Ok(exit_code(status));
        }

        let status = match timeout {
            None => self.child.wait().await?,
            Some(limit) => match tokio::time::timeout(limit, self.child.wait()).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(
                        "Server process {} did not exit within {:?}, killing it",
                        self.pid,
                        limit
                    );
                    self.child.start_kill()?;
                    self.child.wait().await?
                }
            },
        };

        self.exit_status = Some(status);
        Ok(exit_code(&status))
    }

    /// Terminate then wait
    pub async fn stop(&mut self, timeout: Option<Duration>) -> io::Result<i32> {
        self.terminate()?;
        self.wait(timeout).await
    }
}
