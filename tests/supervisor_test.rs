#![cfg(unix)]

use chrono::{NaiveDate, NaiveDateTime};
use server_launcher::config::{keys, FileProvider};
use server_launcher::error::LauncherError;
use server_launcher::process::{Clock, ServerSupervisor, SupervisorState, TickOutcome};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Clock driven by the test
#[derive(Clone)]
struct ManualClock(Arc<Mutex<NaiveDateTime>>);

impl ManualClock {
    fn at(now: NaiveDateTime) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, day)
        .unwrap()
        .and_hms_opt(hour, minute, second)
        .unwrap()
}

struct Fixture {
    _temp_dir: TempDir,
    server_dir: PathBuf,
    backups_dir: PathBuf,
    config_path: PathBuf,
    script: PathBuf,
}

impl Fixture {
    /// A server directory holding a fake runtime that runs `body`
    fn new(body: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let server_dir = temp_dir.path().join("server");
        let backups_dir = temp_dir.path().join("backups");
        fs::create_dir_all(&server_dir).unwrap();

        let script = temp_dir.path().join("fake-java.sh");
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();

        let fixture = Self {
            config_path: temp_dir.path().join("launcher.toml"),
            _temp_dir: temp_dir,
            server_dir,
            backups_dir,
            script,
        };
        fixture.write_config(&fixture.script, 4, "04:00");
        fixture
    }

    fn write_config(&self, java_exe: &Path, max_ram_gb: u32, restart_time: &str) {
        let contents = format!(
            r#"
{server} = "{server_dir}"
{backups} = "{backups_dir}"
{days} = 7
{hours} = 2
{time} = "{restart_time}"
{java} = "{java_exe}"
{max_ram} = {max_ram_gb}
{min_ram} = 1
{jar} = "server.jar"
{interval} = 1
{stop_timeout} = 5
{service} = "test"
"#,
            server = keys::SERVER_PATH,
            server_dir = self.server_dir.display(),
            backups = keys::BACKUPS_PATH,
            backups_dir = self.backups_dir.display(),
            days = keys::NB_DAYS_BEFORE_DELETE_BACKUP,
            hours = keys::NB_HOURS_BEFORE_NEW_BACKUP,
            time = keys::TIME_WHEN_REBOOT,
            restart_time = restart_time,
            java = keys::JAVA_EXE_PATH,
            java_exe = java_exe.display(),
            max_ram = keys::MAX_RAM_GB,
            max_ram_gb = max_ram_gb,
            min_ram = keys::MIN_RAM_GB,
            jar = keys::SERVER_JAR_PATH,
            interval = keys::SECONDS_BETWEEN_CHECKS,
            stop_timeout = keys::STOP_TIMEOUT_SECS,
            service = keys::SERVICE_NAME,
        );
        fs::write(&self.config_path, contents).unwrap();
    }

    fn supervisor(&self, clock: &ManualClock) -> ServerSupervisor {
        let provider = FileProvider::from_file(&self.config_path).unwrap();
        ServerSupervisor::new(Box::new(provider), Box::new(clock.clone())).unwrap()
    }

    fn launches(&self) -> Vec<String> {
        fs::read_to_string(self.server_dir.join("launches.txt"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn archives(&self) -> Vec<String> {
        match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

const LONG_RUNNING: &str = "echo \"$@\" >> launches.txt\nexec sleep 30";

fn pid_is_running(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[tokio::test]
async fn test_restart_fires_once_at_scheduled_time() {
    let fixture = Fixture::new(LONG_RUNNING);
    let clock = ManualClock::at(at(1, 3, 59, 0));
    let mut supervisor = fixture.supervisor(&clock);

    supervisor.start().unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);
    let first_pid = supervisor.stats().unwrap().pid;

    // Same day as the start: never due, even at the scheduled minute
    clock.set(at(1, 4, 0, 0));
    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Waiting);

    // Next day, one minute early
    clock.set(at(2, 3, 59, 30));
    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Waiting);

    clock.set(at(2, 4, 0, 5));
    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Restarted);
    assert_eq!(supervisor.state(), SupervisorState::Running);

    let stats = supervisor.stats().unwrap().clone();
    assert_eq!(stats.restarts, 1);
    assert_eq!(stats.last_restart, Some(at(2, 4, 0, 5)));
    assert_ne!(stats.pid, first_pid);
    assert!(!pid_is_running(first_pid));
    assert_eq!(supervisor.schedule().last_restart_date(), at(2, 0, 0, 0).date());

    // Second tick in the same minute of the same day
    clock.set(at(2, 4, 0, 35));
    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Waiting);
    assert_eq!(supervisor.stats().unwrap().restarts, 1);

    // Past the minute the next day: equality only
    clock.set(at(3, 4, 1, 0));
    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Waiting);

    supervisor.shutdown().await;
    assert!(!pid_is_running(stats.pid));
}

#[tokio::test]
async fn test_restart_creates_backup_and_reloads_configuration() {
    let fixture = Fixture::new(LONG_RUNNING);
    let clock = ManualClock::at(at(1, 12, 0, 0));
    let mut supervisor = fixture.supervisor(&clock);

    supervisor.start().unwrap();
    // Let the fake runtime record its arguments
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Edited while running: must not be picked up before the restart
    fixture.write_config(&fixture.script, 6, "05:30");
    clock.set(at(1, 13, 0, 0));
    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Waiting);
    assert_eq!(supervisor.server_config().max_ram_gb, 4);

    clock.set(at(2, 4, 0, 0));
    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Restarted);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let launches = fixture.launches();
    assert_eq!(launches.len(), 2);
    assert!(launches[0].starts_with("-Xmx4G -Xms1G"));
    assert!(launches[1].starts_with("-Xmx6G -Xms1G"));

    assert_eq!(supervisor.server_config().max_ram_gb, 6);
    assert_eq!(supervisor.settings().poll_interval, Duration::from_secs(1));
    assert_eq!(supervisor.settings().stop_timeout, Some(Duration::from_secs(5)));
    assert_eq!(supervisor.schedule().time_of_day().to_string(), "05:30");

    // Empty backup directory: exactly one archive, named from the clock
    assert_eq!(
        fixture.archives(),
        vec!["backup_test_20240902_040000.tar.gz".to_string()]
    );

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_unexpected_exit_ends_run_with_error() {
    let fixture = Fixture::new("exit 1");
    let clock = ManualClock::at(at(1, 12, 0, 0));
    let mut supervisor = fixture.supervisor(&clock);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run_until(std::future::pending()),
    )
    .await
    .expect("supervisor should stop on its own");

    assert!(matches!(result, Err(LauncherError::UnexpectedExit(1))));
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn test_clean_exit_is_not_fatal() {
    let fixture = Fixture::new("exit 0");
    let clock = ManualClock::at(at(1, 12, 0, 0));
    let mut supervisor = fixture.supervisor(&clock);

    supervisor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Waiting);
    assert_eq!(supervisor.tick().await.unwrap(), TickOutcome::Waiting);
    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert!(!supervisor.is_server_alive());
}

#[tokio::test]
async fn test_shutdown_stops_running_server() {
    let fixture = Fixture::new(LONG_RUNNING);
    let clock = ManualClock::at(at(1, 12, 0, 0));
    let mut supervisor = fixture.supervisor(&clock);

    let result = supervisor
        .run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await;

    assert!(result.is_ok());
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    let pid = supervisor.stats().unwrap().pid;
    assert!(!pid_is_running(pid));
}

#[tokio::test]
async fn test_restart_failure_is_fatal() {
    let fixture = Fixture::new(LONG_RUNNING);
    let clock = ManualClock::at(at(1, 12, 0, 0));
    let mut supervisor = fixture.supervisor(&clock);

    supervisor.start().unwrap();
    let pid = supervisor.stats().unwrap().pid;

    fixture.write_config(Path::new("/nonexistent/java"), 4, "04:00");
    clock.set(at(2, 4, 0, 0));

    let result = supervisor.tick().await;
    assert!(matches!(result, Err(LauncherError::RestartFailure { .. })));
    assert_eq!(supervisor.state(), SupervisorState::ShuttingDown);

    // The aborted cycle still counts as a restart
    let stats = supervisor.stats().unwrap();
    assert_eq!(stats.restarts, 1);
    assert_eq!(stats.last_restart, Some(at(2, 4, 0, 0)));
    assert_eq!(stats.pid, pid);

    // The previous server was stopped before the failed respawn
    assert!(!pid_is_running(pid));
    assert!(!supervisor.is_server_alive());
}

#[tokio::test]
async fn test_backup_failure_aborts_restart() {
    let fixture = Fixture::new(LONG_RUNNING);
    let clock = ManualClock::at(at(1, 12, 0, 0));
    let mut supervisor = fixture.supervisor(&clock);

    supervisor.start().unwrap();

    // A plain file where the backup directory should be
    fs::write(&fixture.backups_dir, b"not a directory").unwrap();
    clock.set(at(2, 4, 0, 0));

    let result = supervisor.tick().await;
    assert!(matches!(result, Err(LauncherError::RetentionFailure { .. })));
    assert_eq!(supervisor.stats().unwrap().restarts, 1);
    assert_eq!(fixture.launches().len(), 1);
    assert!(!supervisor.is_server_alive());
}
