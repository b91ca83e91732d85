// Process module - Supervised server lifecycle and restart scheduling

pub mod schedule;
pub mod spawner;
pub mod supervisor;
pub mod types;

pub use schedule::{Clock, RestartSchedule, RestartTime, SystemClock};
pub use spawner::{spawn_server, ServerProcess};
pub use supervisor::{shutdown_signal, ServerSupervisor, TickOutcome};
pub use types::{ServerStats, SupervisorState};
