// src/sim_interface/gateway.rs
// Reliable request/response on top of a Transport. An empty reply means the simulator
// died; the gateway restarts the session, puts the agent back at its last known pose
// and resends the command until a real reply arrives.

// Dependencies
use super::{CancelToken, Transport, protocol};
use crate::UcvError;
use crate::core::Pose;
use log::{error, info, warn};

/// Command gateway for one worker
pub struct CommandGateway {
    name: String,
    transport: Box<dyn Transport + Send>,
    max_restarts: Option<u32>,
    cancel: CancelToken,
    restarts: u64,
}

impl CommandGateway {
    /// Wraps a transport; call [`CommandGateway::connect`] before sending
    pub fn new(
        name: impl Into<String>,
        transport: Box<dyn Transport + Send>,
        max_restarts: Option<u32>,
        cancel: CancelToken,
    ) -> Self {
        CommandGateway {
            name: name.into(),
            transport,
            max_restarts,
            cancel,
            restarts: 0,
        }
    }

    /// Starts the session until the connection is live
    pub fn connect(&mut self) -> Result<(), UcvError> {
        let mut attempts = 0;
        loop {
            self.cancel.check()?;
            if self.transport.start()? {
                return Ok(());
            }
            attempts += 1;
            self.check_ceiling(attempts)?;
        }
    }

    /// Sends a command and returns its reply.
    ///
    /// A dead reply restarts the session and, when `resume_from` is given, re-teleports
    /// the agent there before the command is resent. This repeats until a reply arrives,
    /// the configured restart ceiling is hit or the worker is cancelled.
    pub fn send(&mut self, message: &str, resume_from: Option<&Pose>) -> Result<Vec<u8>, UcvError> {
        let mut reply = self.transport.request(message)?;
        let mut attempts = 0;

        loop {
            if let Some(bytes) = reply.take().filter(|bytes| !bytes.is_empty()) {
                return Ok(bytes);
            }
            self.cancel.check()?;
            warn!("[{}] sim error while trying to request {}", self.name, message);
            self.check_ceiling(attempts)?;
            attempts += 1;
            self.restarts += 1;

            if self.transport.start()? {
                if let Some(pose) = resume_from {
                    self.resume_after_restart(pose)?;
                }
                reply = self.transport.request(message)?;
            }
        }
    }

    /// [`CommandGateway::send`] for textual replies
    pub fn send_text(&mut self, message: &str, resume_from: Option<&Pose>) -> Result<String, UcvError> {
        let reply = self.send(message, resume_from)?;
        Ok(String::from_utf8_lossy(&reply).trim().to_string())
    }

    /// Re-issues rotation and location of `pose` after a forced restart.
    ///
    /// Not retried: continuing with an unknown pose would desynchronize the tracker
    /// from the simulator, so a rejection is fatal for the request.
    pub fn resume_after_restart(&mut self, pose: &Pose) -> Result<(), UcvError> {
        for command in [protocol::set_rotation(&pose.rotation), protocol::set_location(&pose.location)] {
            let reply = self.transport.request(&command)?.unwrap_or_default();
            let reply = String::from_utf8_lossy(&reply).trim().to_string();
            if !protocol::is_ok(&reply) {
                error!("[{}] resume rejected: `{}` -> `{}`", self.name, command, reply);
                return Err(UcvError::ResumeRejected(format!("`{}` answered `{}`", command, reply)));
            }
        }
        info!(
            "[{}] resumed at x={:.2} y={:.2} z={:.2} yaw={:.3}",
            self.name,
            pose.location.x,
            pose.location.y,
            pose.location.z,
            pose.yaw()
        );
        Ok(())
    }

    /// Disconnects and terminates the simulator
    pub fn shut_down(&mut self) {
        self.transport.stop();
        info!("[{}] simulator shut down", self.name);
    }

    /// Restarts performed so far
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Port of the current session
    pub fn port(&self) -> u16 {
        self.transport.port()
    }

    /// Token that aborts this gateway's retry loop
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn check_ceiling(&self, attempts: u32) -> Result<(), UcvError> {
        match self.max_restarts {
            Some(max) if attempts >= max => {
                error!("[{}] giving up after {} restart attempts", self.name, attempts);
                Err(UcvError::ConnectionLost { attempts })
            }
            _ => Ok(()),
        }
    }
}

// Weaknesses:
// - Restart thrashing is only bounded by `max_restarts`; there is no backoff.
