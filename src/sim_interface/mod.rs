//! Simulator interface for UcvNav
//!
//! This module handles all communication with the UnrealCV simulator, including:
//! - Launching the simulator binary and owning its process
//! - The framed request/response wire client
//! - Command strings and reply parsing
//! - Restart-and-resend recovery on dead replies

pub mod client;
pub mod gateway;
pub mod protocol;
pub mod session;

use crate::UcvError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use client::UnrealClient;
pub use gateway::CommandGateway;
pub use session::{SessionSettings, SimSession};

/// One simulator process plus one control connection.
///
/// `request` returns `Ok(None)` (or an empty payload) when the session is dead;
/// the gateway answers that with a restart. Errors are reserved for failures
/// that a restart cannot fix, such as an I/O timeout.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Tear down any previous instance, launch a fresh one and connect.
    /// Returns whether the connection came up live.
    fn start(&mut self) -> Result<bool, UcvError>;

    /// Disconnect and terminate the process. Safe to call repeatedly.
    fn stop(&mut self);

    /// Send one command and wait for its reply.
    fn request(&mut self, message: &str) -> Result<Option<Vec<u8>>, UcvError>;

    /// Port of the current (or next) connection attempt.
    fn port(&self) -> u16;
}

/// Shared flag an outer caller flips to abort a worker's retry loops.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), UcvError> {
        if self.is_cancelled() {
            Err(UcvError::Cancelled)
        } else {
            Ok(())
        }
    }
}
