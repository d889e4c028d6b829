use log::{debug, trace};
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;

use crate::command_payload::{MAX_LEVEL, ZONE_COUNT, ZONE_MAP_PREFIX};
use crate::config_payload::EmulationConfig;
use crate::ra_manager::{RaManagerError, RadioRaController, Result};

const ALL_ON_BUTTON: &str = "16";
const ALL_OFF_BUTTON: &str = "17";

#[derive(Debug)]
struct ZoneEmulator {
    zone: u8,
    assigned: bool,
    level: u8,
}

impl ZoneEmulator {
    fn set_level(&mut self, level: u8, debug: bool) {
        if self.assigned {
            if debug { println!("RadioRA zone {} level set to {}", self.zone, level); }
            self.level = level;
        } else if debug {
            println!("RadioRA zone {} is not assigned, ignoring level {}", self.zone, level);
        }
    }

    fn status(&self) -> char {
        match (self.assigned, self.level) {
            (false, _) => 'X',
            (true, 0) => '0',
            (true, _) => '1',
        }
    }
}

/// In-process stand-in for a RadioRA master control, replying with the zone map
pub struct RadioRaEmulator {
    zones: Vec<ZoneEmulator>,
    flashing: bool,
    pending_replies: VecDeque<String>,
    dropped_replies: u32,
    debug: bool,
}

impl RadioRaEmulator {
    pub fn new(assigned_zones: &[u8], debug: bool) -> RadioRaEmulator {
        let zones = (1..=ZONE_COUNT)
            .map(|zone| ZoneEmulator {
                zone,
                assigned: assigned_zones.contains(&zone),
                level: 0,
            })
            .collect();

        RadioRaEmulator {
            zones,
            flashing: false,
            pending_replies: VecDeque::new(),
            dropped_replies: 0,
            debug,
        }
    }

    /// Start with every assigned zone randomly on or off
    pub fn with_random_state(mut self) -> RadioRaEmulator {
        let mut rng = rand::thread_rng();

        for zone in self.zones.iter_mut().filter(|zone| zone.assigned) {
            zone.level = if rng.gen_bool(0.5) { rng.gen_range(1..=MAX_LEVEL) } else { 0 };
        }

        self
    }

    /// The next `count` commands get no reply (the caller sees a timeout)
    #[cfg(test)]
    pub fn with_dropped_replies(mut self, count: u32) -> RadioRaEmulator {
        self.dropped_replies = count;
        self
    }

    pub fn try_new(config: &EmulationConfig) -> Result<Box<dyn RadioRaController>> {
        if let Some(zone) = config.assigned_zones.iter().find(|zone| !(1..=ZONE_COUNT).contains(*zone)) {
            return Err(RaManagerError::InvalidZone(*zone as i64).into());
        }

        let emulator = RadioRaEmulator::new(&config.assigned_zones, config.debug);

        Ok(Box::new(if config.randomize { emulator.with_random_state() } else { emulator }))
    }

    pub fn zone_map(&self) -> String {
        let mut reply = String::from(ZONE_MAP_PREFIX);
        reply.extend(self.zones.iter().map(ZoneEmulator::status));
        reply
    }

    fn zone_mut(&mut self, zone: &str) -> Option<&mut ZoneEmulator> {
        let zone: u8 = zone.parse().ok()?;
        self.zones.iter_mut().find(|z| z.zone == zone)
    }

    fn set_all(&mut self, level: u8) {
        let debug = self.debug;
        for zone in self.zones.iter_mut() {
            zone.set_level(level, debug);
        }
    }

    fn set_zone(&mut self, zone: &str, level: u8) -> Option<()> {
        let debug = self.debug;
        self.zone_mut(zone)?.set_level(level, debug);
        Some(())
    }

    fn set_flashing(&mut self, flashing: bool) {
        if self.debug && self.flashing != flashing { println!("RadioRA flash mode {}", if flashing { "on" } else { "off" }); }
        self.flashing = flashing;
    }

    /// Execute a command line and return the reply line
    fn command(&mut self, line: &str) -> Option<String> {
        let parts: Vec<&str> = line.split(',').collect();

        match parts.as_slice() {
            ["ZMPI"] => {}
            ["SDL", zone, level, ..] => {
                let level: u8 = level.parse().ok().filter(|l| *l <= MAX_LEVEL)?;
                self.set_zone(zone, level)?;
            }
            ["SSL", zone, "ON", ..] => self.set_zone(zone, MAX_LEVEL)?,
            ["SSL", zone, "OFF", ..] => self.set_zone(zone, 0)?,
            ["BP", ALL_ON_BUTTON, "ON"] => self.set_all(MAX_LEVEL),
            ["BP", ALL_OFF_BUTTON, "OFF"] => self.set_all(0),
            ["SFM", ALL_ON_BUTTON, "ON"] => self.set_flashing(true),
            ["SFM", ALL_OFF_BUTTON, "OFF"] => self.set_flashing(false),
            _ => return None,
        }

        Some(self.zone_map())
    }
}

impl RadioRaController for RadioRaEmulator {
    fn write_command(&mut self, command: &str) -> Result<()> {
        if self.debug { println!("RadioRA emulator received {}", command); }

        let reply = self.command(command).unwrap_or_else(|| {
            debug!("RadioRA emulator - unsupported command {}", command);
            String::from("ERROR")
        });

        if self.dropped_replies > 0 {
            self.dropped_replies -= 1;
            trace!("RadioRA emulator dropping reply {}", reply);
        } else {
            self.pending_replies.push_back(reply);
        }

        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String> {
        self.pending_replies
            .pop_front()
            .ok_or_else(|| RaManagerError::SerialTimeout(timeout).into())
    }

    fn drain(&mut self) -> Result<()> {
        self.pending_replies.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(10);

    fn transact(emulator: &mut RadioRaEmulator, command: &str) -> String {
        emulator.write_command(command).unwrap();
        emulator.read_line(TIMEOUT).unwrap()
    }

    #[test]
    fn test_initial_zone_map() {
        let mut emulator = RadioRaEmulator::new(&[1, 2, 5], false);

        let reply = transact(&mut emulator, "ZMPI");

        assert_eq!(reply.len(), 3 + ZONE_COUNT as usize);
        assert!(reply.starts_with("ZMP00XX0XXX"));
    }

    #[test]
    fn test_dim_and_switch() {
        let mut emulator = RadioRaEmulator::new(&[1, 2, 3], false);

        transact(&mut emulator, "SDL,2,40");
        transact(&mut emulator, "SSL,3,ON");
        let reply = transact(&mut emulator, "SSL,2,OFF");

        assert!(reply.starts_with("ZMP001X"));
    }

    #[test]
    fn test_unassigned_zone_ignores_commands() {
        let mut emulator = RadioRaEmulator::new(&[1], false);

        let reply = transact(&mut emulator, "SSL,2,ON");

        assert!(reply.starts_with("ZMP0X"));
    }

    #[test]
    fn test_all_on_off() {
        let mut emulator = RadioRaEmulator::new(&[1, 3], false);

        assert!(transact(&mut emulator, "BP,16,ON").starts_with("ZMP1X1X"));
        assert!(transact(&mut emulator, "BP,17,OFF").starts_with("ZMP0X0X"));
    }

    #[test]
    fn test_flash() {
        let mut emulator = RadioRaEmulator::new(&[1], false);

        transact(&mut emulator, "SFM,16,ON");
        assert!(emulator.flashing);
        transact(&mut emulator, "SFM,17,OFF");
        assert!(!emulator.flashing);
    }

    #[test]
    fn test_invalid_commands() {
        let mut emulator = RadioRaEmulator::new(&[1], false);

        assert_eq!(transact(&mut emulator, "SDL,1,101"), "ERROR");
        assert_eq!(transact(&mut emulator, "SDL,40,10"), "ERROR");
        assert_eq!(transact(&mut emulator, "HELLO"), "ERROR");
    }

    #[test]
    fn test_dropped_reply_times_out() {
        let mut emulator = RadioRaEmulator::new(&[1], false).with_dropped_replies(1);

        emulator.write_command("ZMPI").unwrap();
        let error = emulator.read_line(TIMEOUT).unwrap_err();
        assert!(matches!(error.current_context(), RaManagerError::SerialTimeout(_)));

        assert!(transact(&mut emulator, "ZMPI").starts_with("ZMP0"));
    }

    #[test]
    fn test_random_state_keeps_unassigned() {
        let mut emulator = RadioRaEmulator::new(&[1, 2], false).with_random_state();

        let reply = transact(&mut emulator, "ZMPI");

        assert!(reply[5..].chars().all(|c| c == 'X'));
        assert!(reply[3..5].chars().all(|c| c == '0' || c == '1'));
    }

    #[test]
    fn test_config_with_invalid_zone() {
        let config = EmulationConfig {
            assigned_zones: vec![1, 40],
            randomize: false,
            debug: false,
        };

        assert!(RadioRaEmulator::try_new(&config).is_err());
    }
}
