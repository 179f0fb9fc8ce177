// src/sim_interface/session.rs
// Owns one simulator process and its control connection. Before every launch the
// UnrealCV init file beside the binary is rewritten with a fresh port, so a restarted
// instance never collides with a previous one that has not released its socket yet.

// Dependencies
use super::Transport;
use super::client::{self, UnrealClient};
use crate::{UcvConfig, UcvError};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

/// Everything a session needs to launch and reach its simulator
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Directory holding the binary and its init file
    pub binary_dir: PathBuf,
    /// Binary file name
    pub binary_name: String,
    /// Init file name
    pub init_file_name: String,
    /// Host to connect to
    pub host: String,
    /// Observation width declared in the init file
    pub width: u32,
    /// Observation height declared in the init file
    pub height: u32,
    /// Lowest port; the port wraps back here past `u16::MAX`
    pub port_floor: u16,
    /// Runtime of the one-off launch that creates a missing init file
    pub init_launch: Duration,
    /// Pause between init file and launch
    pub pre_launch: Duration,
    /// Pause between launch and connect
    pub launch_settle: Duration,
    /// Pause after connecting
    pub connect_settle: Duration,
    /// Connect and round-trip timeout
    pub timeout: Option<Duration>,
}

impl SessionSettings {
    /// Settings for the given worker slot
    pub fn from_config(config: &UcvConfig, worker: usize) -> Result<Self, UcvError> {
        let sim = &config.simulator;
        Ok(SessionSettings {
            binary_dir: config.binary_dir(worker)?.to_path_buf(),
            binary_name: sim.binary_name.clone(),
            init_file_name: sim.init_file_name.clone(),
            host: sim.host.clone(),
            width: sim.observation_width,
            height: sim.observation_height,
            port_floor: sim.port_range.0,
            init_launch: Duration::from_millis(sim.init_launch_ms),
            pre_launch: Duration::from_millis(sim.pre_launch_ms),
            launch_settle: Duration::from_millis(sim.launch_settle_ms),
            connect_settle: Duration::from_millis(sim.connect_settle_ms),
            timeout: sim.request_timeout_ms.map(Duration::from_millis),
        })
    }

    /// Full path of the simulator binary
    pub fn binary_path(&self) -> PathBuf {
        self.binary_dir.join(&self.binary_name)
    }

    /// Full path of the init file
    pub fn init_file_path(&self) -> PathBuf {
        self.binary_dir.join(&self.init_file_name)
    }
}

/// Writes the `[UnrealCV.Core]` section declaring port and resolution
pub fn write_init_file(path: &Path, port: u16, width: u32, height: u32) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "[UnrealCV.Core]")?;
    writeln!(file, "Port={}", port)?;
    writeln!(file, "Width={}", width)?;
    writeln!(file, "Height={}", height)?;
    file.flush()
}

/// Live pairing of a simulator process and its control connection
pub struct SimSession {
    name: String,
    settings: SessionSettings,
    port: u16,
    process: Option<Child>,
    client: Option<UnrealClient>,
}

impl SimSession {
    /// Creates a stopped session; the first `start` connects on `initial_port + 1`
    pub fn new(name: impl Into<String>, settings: SessionSettings, initial_port: u16) -> Self {
        SimSession {
            name: name.into(),
            settings,
            port: initial_port,
            process: None,
            client: None,
        }
    }

    /// Session for a worker slot with a port drawn from the configured range
    pub fn from_config(config: &UcvConfig, worker: usize, name: &str) -> Result<Self, UcvError> {
        let settings = SessionSettings::from_config(config, worker)?;
        let (low, high) = config.simulator.port_range;
        let port = fastrand::u16(low..high);
        Ok(SimSession::new(name, settings, port))
    }

    /// Session settings
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn launch(&self) -> io::Result<Child> {
        Command::new(self.settings.binary_path())
            .current_dir(&self.settings.binary_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
    }

    // A missing init file means the simulator never ran here; one launch creates it
    fn prepare_init_file(&self) -> Result<(), UcvError> {
        let path = self.settings.init_file_path();
        let (width, height) = (self.settings.width, self.settings.height);

        let err = match write_init_file(&path, self.port, width, height) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!(
            "[{}] cannot write {} ({}), launching simulator to create it",
            self.name,
            path.display(),
            err
        );

        let mut sim = self.launch().map_err(|launch_err| {
            UcvError::SessionUnavailable(format!(
                "{} could not be written ({}) and {} failed to launch: {}",
                path.display(),
                err,
                self.settings.binary_path().display(),
                launch_err
            ))
        })?;
        thread::sleep(self.settings.init_launch);
        terminate(&mut sim);

        write_init_file(&path, self.port, width, height).map_err(|retry_err| {
            UcvError::SessionUnavailable(format!(
                "{} still not writable after first launch: {}",
                path.display(),
                retry_err
            ))
        })
    }

    fn next_port(&self) -> u16 {
        self.port.checked_add(1).unwrap_or(self.settings.port_floor)
    }
}

impl Transport for SimSession {
    fn start(&mut self) -> Result<bool, UcvError> {
        self.stop();
        self.port = self.next_port();
        self.prepare_init_file()?;
        thread::sleep(self.settings.pre_launch);

        info!("[{}] Connection attempt on PORT {}.", self.name, self.port);
        let process = self.launch().map_err(|err| {
            UcvError::SessionUnavailable(format!(
                "failed to launch {}: {}",
                self.settings.binary_path().display(),
                err
            ))
        })?;
        self.process = Some(process);
        thread::sleep(self.settings.launch_settle);

        match UnrealClient::connect(&self.settings.host, self.port, self.settings.timeout) {
            Ok(client) => {
                thread::sleep(self.settings.connect_settle);
                info!("[{}] {}", self.name, client.greeting());
                self.client = Some(client);
                Ok(true)
            }
            Err(err) => {
                warn!("[{}] no connection on port {}: {}", self.name, self.port, err);
                self.stop();
                Ok(false)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(client) = self.client.take() {
            client.disconnect();
        }
        if let Some(mut process) = self.process.take() {
            terminate(&mut process);
            debug!("[{}] simulator process stopped", self.name);
        }
    }

    fn request(&mut self, message: &str) -> Result<Option<Vec<u8>>, UcvError> {
        let Some(connection) = self.client.as_mut() else {
            return Ok(None);
        };

        match connection.request(message) {
            Ok(Some(reply)) => Ok(Some(reply)),
            Ok(None) => {
                // Keep process and connection torn down together
                self.stop();
                Ok(None)
            }
            Err(err) if client::is_timeout(&err) => Err(UcvError::Timeout(format!(
                "`{}` on port {}: {}",
                message, self.port, err
            ))),
            Err(err) => Err(UcvError::Io(err)),
        }
    }

    fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for SimSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn terminate(process: &mut Child) {
    if let Err(err) = process.kill() {
        debug!("Simulator already exited: {}", err);
    }
    let _ = process.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ucv_nav_{}_{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn settings(dir: PathBuf) -> SessionSettings {
        SessionSettings {
            binary_dir: dir,
            binary_name: "missing_simulator".to_string(),
            init_file_name: "unrealcv.ini".to_string(),
            host: "127.0.0.1".to_string(),
            width: 84,
            height: 84,
            port_floor: 2000,
            init_launch: Duration::ZERO,
            pre_launch: Duration::ZERO,
            launch_settle: Duration::ZERO,
            connect_settle: Duration::ZERO,
            timeout: Some(Duration::from_millis(200)),
        }
    }

    #[test]
    fn init_file_declares_port_and_resolution() {
        let dir = scratch_dir("ini");
        let path = dir.join("unrealcv.ini");
        write_init_file(&path, 4321, 84, 84).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "[UnrealCV.Core]\nPort=4321\nWidth=84\nHeight=84\n");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn unwritable_init_file_without_binary_is_unavailable() {
        let dir = std::env::temp_dir().join("ucv_nav_no_such_dir").join("deeper");
        let mut session = SimSession::new("worker_0", settings(dir), 3000);

        assert!(matches!(session.start(), Err(UcvError::SessionUnavailable(_))));
        assert!(!session.is_connected());
    }

    #[test]
    fn each_start_moves_to_the_next_port() {
        let dir = scratch_dir("port");
        let mut session = SimSession::new("worker_0", settings(dir.clone()), 3000);

        // Init file is written, then the launch fails
        assert!(matches!(session.start(), Err(UcvError::SessionUnavailable(_))));
        assert_eq!(session.port(), 3001);
        assert!(matches!(session.start(), Err(UcvError::SessionUnavailable(_))));
        assert_eq!(session.port(), 3002);

        let contents = fs::read_to_string(dir.join("unrealcv.ini")).unwrap();
        assert!(contents.contains("Port=3002"));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn stopped_session_reports_dead_replies() {
        let mut session = SimSession::new("worker_0", settings(scratch_dir("dead")), 3000);
        session.stop();
        session.stop();
        assert_eq!(session.request("vget /camera/0/location").unwrap(), None);
    }

    #[test]
    fn port_wraps_to_floor() {
        let session = SimSession::new("worker_0", settings(scratch_dir("wrap")), u16::MAX);
        assert_eq!(session.next_port(), 2000);
    }
}
