use std::fmt;

use crate::ra_manager::{RaManagerError, Result};

/// Number of zones reported in a single (non bridged) zone map
pub const ZONE_COUNT: u8 = 32;
pub const MAX_LEVEL: u8 = 100;

/// Prefix of the reply to the zone map query
pub const ZONE_MAP_PREFIX: &str = "ZMP";

// Phantom buttons programmed on the master control as "all on" and "all off"
const ALL_ON_BUTTON: u8 = 16;
const ALL_OFF_BUTTON: u8 = 17;

/// Hardware zone number (1-32)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneNumber(u8);

impl ZoneNumber {
    pub fn new(zone: i64) -> Result<ZoneNumber> {
        if (1..=ZONE_COUNT as i64).contains(&zone) {
            Ok(ZoneNumber(zone as u8))
        } else {
            Err(RaManagerError::InvalidZone(zone).into())
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Dimmer level in percent (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level(u8);

impl Level {
    pub fn new(level: i64) -> Result<Level> {
        if (0..=MAX_LEVEL as i64).contains(&level) {
            Ok(Level(level as u8))
        } else {
            Err(RaManagerError::InvalidLevel(level).into())
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Switch::On => write!(f, "ON"),
            Switch::Off => write!(f, "OFF"),
        }
    }
}

/// Commands understood by the RadioRA RS-232 interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaCommand {
    QueryZoneMap,
    SetDimmerLevel { zone: ZoneNumber, level: Level },
    SetSwitchLevel { zone: ZoneNumber, state: Switch },
    AllOn,
    AllOff,
    FlashOn,
    FlashOff,
}

impl RaCommand {
    pub fn dim(zone: i64, level: i64) -> Result<RaCommand> {
        Ok(RaCommand::SetDimmerLevel {
            zone: ZoneNumber::new(zone)?,
            level: Level::new(level)?,
        })
    }

    pub fn switch(zone: i64, state: Switch) -> Result<RaCommand> {
        Ok(RaCommand::SetSwitchLevel {
            zone: ZoneNumber::new(zone)?,
            state,
        })
    }

    /// Prefix a well formed reply must start with, if the command has a structured reply
    pub fn expected_reply_prefix(&self) -> Option<&'static str> {
        match self {
            RaCommand::QueryZoneMap => Some(ZONE_MAP_PREFIX),
            _ => None,
        }
    }

    /// The literal ASCII command line (without terminator)
    pub fn frame(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaCommand::QueryZoneMap => write!(f, "ZMPI"),
            // SDL,<Zone Number>,<Dimmer Level>(,<Fade Time>)(,<System>)
            RaCommand::SetDimmerLevel { zone, level } => write!(f, "SDL,{},{}", zone.get(), level.get()),
            // SSL,<Zone Number>,<State>(,<Delay Time>)(,<System>)
            RaCommand::SetSwitchLevel { zone, state } => write!(f, "SSL,{},{}", zone.get(), state),
            RaCommand::AllOn => write!(f, "BP,{},ON", ALL_ON_BUTTON),
            RaCommand::AllOff => write!(f, "BP,{},OFF", ALL_OFF_BUTTON),
            RaCommand::FlashOn => write!(f, "SFM,{},ON", ALL_ON_BUTTON),
            RaCommand::FlashOff => write!(f, "SFM,{},OFF", ALL_OFF_BUTTON),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_framing() {
        let command = RaCommand::dim(3, 40).unwrap();

        assert_eq!(command.frame(), "SDL,3,40");
        assert_eq!(command.expected_reply_prefix(), None);
    }

    #[test]
    fn test_switch_framing() {
        assert_eq!(RaCommand::switch(7, Switch::On).unwrap().frame(), "SSL,7,ON");
        assert_eq!(RaCommand::switch(32, Switch::Off).unwrap().frame(), "SSL,32,OFF");
    }

    #[test]
    fn test_broadcast_framing() {
        assert_eq!(RaCommand::AllOn.frame(), "BP,16,ON");
        assert_eq!(RaCommand::AllOff.frame(), "BP,17,OFF");
        assert_eq!(RaCommand::FlashOn.frame(), "SFM,16,ON");
        assert_eq!(RaCommand::FlashOff.frame(), "SFM,17,OFF");
    }

    #[test]
    fn test_zone_map_query() {
        assert_eq!(RaCommand::QueryZoneMap.frame(), "ZMPI");
        assert_eq!(RaCommand::QueryZoneMap.expected_reply_prefix(), Some("ZMP"));
    }

    #[test]
    fn test_invalid_zone_rejected() {
        for zone in [0, 33, -1] {
            let error = RaCommand::dim(zone, 50).unwrap_err();
            assert!(matches!(error.current_context(), RaManagerError::InvalidZone(z) if *z == zone));
        }
    }

    #[test]
    fn test_invalid_level_rejected() {
        let error = RaCommand::dim(1, 101).unwrap_err();
        assert!(matches!(error.current_context(), RaManagerError::InvalidLevel(101)));

        assert_eq!(RaCommand::dim(1, 0).unwrap().frame(), "SDL,1,0");
        assert_eq!(RaCommand::dim(1, 100).unwrap().frame(), "SDL,1,100");
    }
}
