use chrono::NaiveDateTime;

/// Lifecycle state of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Restarting,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Restarting => write!(f, "restarting"),
            SupervisorState::ShuttingDown => write!(f, "shutting down"),
            SupervisorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters about the supervised server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub pid: u32,
    pub started_at: NaiveDateTime,
    pub restarts: usize,
    pub last_restart: Option<NaiveDateTime>,
}

impl ServerStats {
    pub fn new(pid: u32, started_at: NaiveDateTime) -> Self {
        Self {
            pid,
            started_at,
            restarts: 0,
            last_restart: None,
        }
    }

    /// Count a restart as soon as it begins, whether or not it completes
    pub fn record_restart(&mut self, at: NaiveDateTime) {
        self.restarts += 1;
        self.last_restart = Some(at);
    }

    pub fn record_spawn(&mut self, new_pid: u32, at: NaiveDateTime) {
        self.started_at = at;
        self.pid = new_pid;
    }
}
