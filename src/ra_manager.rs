use error_stack::Report;
use log::{debug, trace, warn};
use std::time::Duration;
use thiserror::Error;

use crate::command_payload::RaCommand;

#[derive(Debug, Error)]
pub enum RaManagerError {
    #[error("Invalid zone number {0} (valid zones are 1-32)")]
    InvalidZone(i64),

    #[error("Invalid level {0} (valid levels are 0-100)")]
    InvalidLevel(i64),

    #[error("No reply from RadioRA interface within {0:?}")]
    SerialTimeout(Duration),

    #[error("Unexpected RadioRA reply '{reply}' (expected '{expected}...')")]
    SerialDesync { expected: &'static str, reply: String },

    #[error("Zone map '{frame}' has no entry for zone {zone}")]
    MalformedStatusFrame { zone: i64, frame: String },

    #[error("UART error: {0}")]
    Uart(
        #[from]
        #[source]
        rppal::uart::Error,
    ),

    #[error("RadioRA command queue is not running")]
    QueueClosed,

    #[error("In context of '{0}'")]
    Context(String),
}

pub type Result<T> = std::result::Result<T, Report<RaManagerError>>;

/// Line oriented access to a RadioRA RS-232 interface
pub trait RadioRaController: Send {
    /// Send one command line (the terminator is added by the controller)
    fn write_command(&mut self, command: &str) -> Result<()>;

    /// Read one reply line, failing with `SerialTimeout` if no complete line arrives in time
    fn read_line(&mut self, timeout: Duration) -> Result<String>;

    /// Discard any pending input
    fn drain(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub read_timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            read_timeout: Duration::from_millis(2000),
            retries: 2,
            backoff: Duration::from_millis(100),
        }
    }
}

pub struct RaManager {
    controller: Box<dyn RadioRaController>,
    policy: RetryPolicy,
}

impl RaManager {
    pub fn new(controller: Box<dyn RadioRaController>, policy: RetryPolicy) -> RaManager {
        RaManager { controller, policy }
    }

    fn is_transient(error: &Report<RaManagerError>) -> bool {
        matches!(
            error.current_context(),
            RaManagerError::SerialTimeout(_) | RaManagerError::Uart(_)
        )
    }

    fn transact(&mut self, line: &str) -> Result<String> {
        self.controller.write_command(line)?;
        self.controller.read_line(self.policy.read_timeout)
    }

    /// Send a command and return the raw reply line.
    ///
    /// Timeouts and UART errors are retried with linear backoff. A reply that does not
    /// carry the expected prefix is a desync: pending input is drained and the error is
    /// returned without retrying.
    pub fn execute(&mut self, command: &RaCommand) -> Result<String> {
        let line = command.frame();
        let mut attempt = 0;

        let reply = loop {
            match self.transact(&line) {
                Ok(reply) => break reply,
                Err(e) if RaManager::is_transient(&e) && attempt < self.policy.retries => {
                    attempt += 1;
                    let backoff = self.policy.backoff * attempt;

                    warn!("{line}: {e} - retry {attempt}/{} in {backoff:?}", self.policy.retries);
                    std::thread::sleep(backoff);
                    self.controller.drain()?;
                }
                Err(e) => return Err(e),
            }
        };

        trace!("{line} -> {reply}");

        if let Some(expected) = command.expected_reply_prefix() {
            if !reply.starts_with(expected) {
                debug!("Reply to {line} out of sync ({reply}), draining input");
                self.controller.drain()?;
                return Err(RaManagerError::SerialDesync { expected, reply }.into());
            }
        }

        Ok(reply)
    }
}
