use error_stack::ResultExt;
use log::{debug, info, log_enabled, trace, Level::Trace};
use rppal::uart::{Parity, Uart};
use std::ascii::escape_default;
use std::time::{Duration, Instant};

use crate::config_payload::SerialConfig;
use crate::get_version;
use crate::ra_manager::{RaManagerError, RadioRaController, Result};

/// RadioRA RS-232 interface attached to a UART
pub struct RaSerial {
    uart: Uart,
    debug_write_buffer: Vec<u8>,
}

impl RadioRaController for RaSerial {
    fn write_command(&mut self, command: &str) -> Result<()> {
        self.do_write(command.as_bytes())?;
        self.do_write(&[RaSerial::LINE_TERMINATOR])?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let mut line = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            if remaining.is_zero() {
                trace!(
                    "Wait for reply timeout (partial reply: '{}')",
                    RaSerial::to_nice_string(&line)
                );
                return Err(RaManagerError::SerialTimeout(timeout).into());
            }

            self.uart
                .set_read_mode(0, RaSerial::read_wait(remaining))
                .map_err(RaManagerError::from)?;

            let mut byte_buffer = [0u8];
            let bytes_read = self.uart.read(&mut byte_buffer).map_err(RaManagerError::from)?;

            if bytes_read == 0 {
                continue;
            }

            match byte_buffer[0] {
                b'\r' | b'\n' => {
                    // Skip the empty line between \r and \n
                    if !line.is_empty() {
                        break;
                    }
                }
                b => line.push(b),
            }
        }

        trace!("Got reply {}", RaSerial::to_nice_string(&line));
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    fn drain(&mut self) -> Result<()> {
        debug!("Start waiting for idle");
        loop {
            self.uart
                .set_read_mode(0, Duration::from_millis(RaSerial::IDLE_TIME_MILLISECONDS))
                .map_err(RaManagerError::from)?;

            let mut buffer = [0u8; 1];
            if self.uart.read(&mut buffer).map_err(RaManagerError::from)? == 0 {
                // If timeout, we're idle
                debug!("interface is idle");
                return Ok(());
            } else {
                debug!("Not idle, discarding byte {}", buffer[0]);
            }
        }
    }
}

impl RaSerial {
    const IDLE_TIME_MILLISECONDS: u64 = 100;
    const LINE_TERMINATOR: u8 = b'\r';
    // Read timeouts have 0.1s resolution; anything shorter becomes a non-blocking read
    const MIN_READ_WAIT: Duration = Duration::from_millis(100);
    // Longest read timeout the UART driver accepts
    const MAX_READ_WAIT: Duration = Duration::from_millis(25_500);

    pub fn try_new(config: &SerialConfig) -> Result<Box<dyn RadioRaController>> {
        let into_context =
            || RaManagerError::Context(format!("Opening RadioRA interface on {}", config.device));

        let mut uart = Uart::with_path(&config.device, config.baud_rate, Parity::None, 8, 1)
            .change_context_lazy(into_context)?;
        uart.set_write_mode(true).change_context_lazy(into_context)?;

        println!("{}", get_version());
        println!("RadioRA interface: {} at {} baud", config.device, config.baud_rate);

        info!("Started: {}", get_version());
        info!("RadioRA interface: {} at {} baud", config.device, config.baud_rate);

        let mut serial = RaSerial {
            uart,
            debug_write_buffer: Vec::new(),
        };

        // Read any pending characters
        serial.drain().change_context_lazy(into_context)?;

        Ok(Box::new(serial))
    }

    fn read_wait(remaining: Duration) -> Duration {
        remaining.clamp(RaSerial::MIN_READ_WAIT, RaSerial::MAX_READ_WAIT)
    }

    fn to_nice_string(bs: &[u8]) -> String {
        bs.iter().flat_map(|b| escape_default(*b)).map(char::from).collect()
    }

    fn flush_debug_write(&mut self) {
        trace!(
            "UART sent: {}",
            RaSerial::to_nice_string(self.debug_write_buffer.as_slice())
        );
        self.debug_write_buffer.clear();
    }

    fn do_write(&mut self, buffer: &[u8]) -> Result<usize> {
        if log_enabled!(Trace) {
            for b in buffer {
                self.debug_write_buffer.push(*b);
                if *b == RaSerial::LINE_TERMINATOR {
                    self.flush_debug_write();
                }
            }
        }

        let mut written = 0;
        while written < buffer.len() {
            written += self.uart.write(&buffer[written..]).map_err(RaManagerError::from)?;
        }

        Ok(written)
    }
}
