use crate::backup::{handle_backups, BackupPolicy};
use crate::config::{ConfigProvider, ServerConfig, SupervisorSettings};
use crate::error::{chain, LauncherError, Result};
use crate::process::schedule::{Clock, RestartSchedule};
use crate::process::spawner::{spawn_server, ServerProcess};
use crate::process::types::{ServerStats, SupervisorState};
use chrono::NaiveDateTime;
use std::future::Future;
use tracing::{error, info, warn};

/// Result of a single supervision step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do until the next check
    Waiting,
    /// The scheduled restart ran
    Restarted,
}

/// Supervises the server process: starts it, watches it, restarts it once
/// a day at the configured time with a backup cycle in between, and always
/// stops it on the way out
pub struct ServerSupervisor {
    provider: Box<dyn ConfigProvider>,
    clock: Box<dyn Clock>,
    state: SupervisorState,
    server: ServerConfig,
    settings: SupervisorSettings,
    schedule: RestartSchedule,
    /// The only server handle; replaced only once the previous one has exited
    process: Option<ServerProcess>,
    stats: Option<ServerStats>,
    clean_exit_reported: bool,
}

impl ServerSupervisor {
    /// Read the server, loop and schedule settings
    ///
    /// The restart schedule starts with today as its last restart date, so
    /// the first restart happens tomorrow at the earliest.
    pub fn new(provider: Box<dyn ConfigProvider>, clock: Box<dyn Clock>) -> Result<Self> {
        let server = ServerConfig::load(provider.as_ref())?;
        let settings = SupervisorSettings::load(provider.as_ref())?;
        let time_of_day = RestartSchedule::load_time(provider.as_ref())?;
        let schedule = RestartSchedule::new(time_of_day, clock.now().date());

        Ok(Self {
            provider,
            clock,
            state: SupervisorState::Starting,
            server,
            settings,
            schedule,
            process: None,
            stats: None,
            clean_exit_reported: false,
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn stats(&self) -> Option<&ServerStats> {
        self.stats.as_ref()
    }

    pub fn schedule(&self) -> &RestartSchedule {
        &self.schedule
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.server
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Whether the server process is currently running
    pub fn is_server_alive(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => process.is_alive().unwrap_or(false),
            None => false,
        }
    }

    /// Supervise until a fatal error or until SIGINT/SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Supervise until a fatal error or until `shutdown` completes
    ///
    /// Whatever ends the loop, a server still running is stopped before
    /// this returns.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Starting server supervision");

        let result = self.supervise(shutdown).await;
        if let Err(ref e) = result {
            error!("Server supervision had to be interrupted -> {}", chain(e));
        }

        self.shutdown().await;
        self.state = SupervisorState::Stopped;
        result
    }

    async fn supervise<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        tokio::pin!(shutdown);

        loop {
            match self.tick().await? {
                TickOutcome::Restarted => continue,
                TickOutcome::Waiting => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                        _ = &mut shutdown => {
                            info!("Shutdown requested");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Spawn the server for the first time
    pub fn start(&mut self) -> Result<()> {
        self.state = SupervisorState::Starting;
        let command = self.server.command_line();

        let process = spawn_server(&self.server).map_err(|source| {
            self.state = SupervisorState::ShuttingDown;
            LauncherError::StartupFailure {
                command: command.clone(),
                source,
            }
        })?;

        let now = self.clock.now();
        info!(
            "Server started at {} (PID: {}) with command {}",
            now,
            process.pid(),
            command
        );
        self.stats = Some(ServerStats::new(process.pid(), now));
        self.process = Some(process);
        self.state = SupervisorState::Running;
        self.log_next_restart();
        Ok(())
    }

    /// One supervision step: check the server, then restart it if the
    /// scheduled time has come
    ///
    /// Starts the server first if it was never started.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let Some(process) = self.process.as_mut() else {
            self.start()?;
            return Ok(TickOutcome::Waiting);
        };

        // A return code of 0 is not treated as a failure
        if let Some(code) = process.poll()? {
            if code != 0 {
                self.state = SupervisorState::ShuttingDown;
                return Err(LauncherError::UnexpectedExit(code));
            }
            if !self.clean_exit_reported {
                warn!(
                    "Server process {} exited with return code 0; it will be started again at the next scheduled restart",
                    process.pid()
                );
                self.clean_exit_reported = true;
            }
        }

        let now = self.clock.now();
        if self.schedule.is_due(&now) {
            self.restart(now).await?;
            return Ok(TickOutcome::Restarted);
        }

        Ok(TickOutcome::Waiting)
    }

    /// Stop, back up, reload, respawn
    async fn restart(&mut self, now: NaiveDateTime) -> Result<()> {
        self.state = SupervisorState::Restarting;
        info!(
            "It is {} after {}: stopping the server...",
            self.schedule.time_of_day(),
            self.schedule.last_restart_date()
        );
        self.schedule.mark_restarted(now.date());
        if let Some(stats) = self.stats.as_mut() {
            stats.record_restart(now);
        }

        if let Err(e) = self.restart_cycle().await {
            self.state = SupervisorState::ShuttingDown;
            return Err(e);
        }

        self.state = SupervisorState::Running;
        self.log_next_restart();
        Ok(())
    }

    async fn restart_cycle(&mut self) -> Result<()> {
        if let Some(process) = self.process.as_mut() {
            let pid = process.pid();
            process
                .stop(self.settings.stop_timeout)
                .await
                .map_err(|source| LauncherError::StopFailure { pid, source })?;
            info!("Server stopped");
        }

        self.provider.refresh()?;
        let policy = BackupPolicy::load(self.provider.as_ref())?;
        handle_backups(&policy, self.clock.now()).await?;

        self.reload()?;

        let command = self.server.command_line();
        let process = spawn_server(&self.server).map_err(|source| {
            LauncherError::RestartFailure {
                command: command.clone(),
                source,
            }
        })?;

        let now = self.clock.now();
        let pid = process.pid();
        self.process = Some(process);
        self.clean_exit_reported = false;

        let stats = self.stats.get_or_insert_with(|| ServerStats::new(pid, now));
        stats.record_spawn(pid, now);
        info!(
            "Server restarted (restart #{}) at {} (PID: {}) with command {}",
            stats.restarts,
            now,
            pid,
            command
        );
        Ok(())
    }

    /// Re-read the settings that may change between two restarts
    ///
    /// Only called from a restart; the poll loop never re-reads them.
    fn reload(&mut self) -> Result<()> {
        let server = ServerConfig::load(self.provider.as_ref())?;
        let settings = SupervisorSettings::load(self.provider.as_ref())?;
        let time_of_day = RestartSchedule::load_time(self.provider.as_ref())?;

        if server != self.server {
            info!("Server configuration changed: {}", server.command_line());
        }
        if time_of_day != self.schedule.time_of_day() {
            info!(
                "Restart time changed from {} to {}",
                self.schedule.time_of_day(),
                time_of_day
            );
        }

        self.server = server;
        self.settings = settings;
        self.schedule.set_time_of_day(time_of_day);
        Ok(())
    }

    /// Stop the server if it is still running
    pub async fn shutdown(&mut self) {
        self.state = SupervisorState::ShuttingDown;

        let Some(process) = self.process.as_mut() else {
            return;
        };

        match process.is_alive() {
            Ok(true) => {
                info!("Attempting a graceful shutdown of the server...");
                match process.stop(self.settings.stop_timeout).await {
                    Ok(code) => info!("Server shut down (return code {})", code),
                    Err(e) => error!("Failed to shut down server process {}: {}", process.pid(), e),
                }
            }
            Ok(false) => {}
            Err(e) => error!("Failed to check server process {}: {}", process.pid(), e),
        }
    }

    fn log_next_restart(&self) {
        info!(
            "Waiting for {} after {} for the next automatic restart...",
            self.schedule.time_of_day(),
            self.schedule.last_restart_date()
        );
    }
}

/// Completes on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
