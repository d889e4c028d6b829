use log::trace;

use crate::command_payload::ZONE_MAP_PREFIX;
use crate::ra_manager::{RaManagerError, Result};
use crate::zone_payload::{Zone, ZoneState, ZONE_TYPE_UNASSIGNED};

/// Status of a single zone as reported in the zone map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStatus {
    Off,
    On,
    Unassigned,
    Other(char),
}

impl From<char> for ZoneStatus {
    fn from(c: char) -> Self {
        match c {
            '0' => ZoneStatus::Off,
            '1' => ZoneStatus::On,
            'X' => ZoneStatus::Unassigned,
            c => ZoneStatus::Other(c),
        }
    }
}

/// Zone map snapshot, one character per zone. Zone numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFrame(Vec<char>);

impl StatusFrame {
    pub fn new(frame: &str) -> StatusFrame {
        StatusFrame(frame.chars().collect())
    }

    /// Build a frame from a raw `ZMP...` reply line
    pub fn from_reply(reply: &str) -> Result<StatusFrame> {
        let reply = reply.trim_end();

        match reply.strip_prefix(ZONE_MAP_PREFIX) {
            Some(frame) => Ok(StatusFrame::new(frame)),
            None => Err(RaManagerError::SerialDesync {
                expected: ZONE_MAP_PREFIX,
                reply: reply.to_owned(),
            }
            .into()),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn zone_status(&self, zone: i64) -> Result<ZoneStatus> {
        let c = usize::try_from(zone)
            .ok()
            .and_then(|zone| zone.checked_sub(1))
            .and_then(|index| self.0.get(index));

        match c {
            Some(c) => Ok(ZoneStatus::from(*c)),
            None => Err(RaManagerError::MalformedStatusFrame {
                zone,
                frame: self.to_string(),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for StatusFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().collect::<String>())
    }
}

/// The hardware reports this zone as not wired, so its configured type is overridden (in memory only)
pub fn reconcile_unassigned(zone: &mut Zone) {
    zone.zonetypeid = ZONE_TYPE_UNASSIGNED;
}

/// Set the runtime state of each zone from the zone map.
///
/// All zones are checked against the frame before any is modified, so a zone number
/// outside the frame leaves the whole slice untouched.
pub fn merge_zone_states(zones: &mut [Zone], frame: &StatusFrame) -> Result<()> {
    let statuses = zones
        .iter()
        .map(|zone| frame.zone_status(zone.zone))
        .collect::<Result<Vec<_>>>()?;

    for (zone, status) in zones.iter_mut().zip(statuses) {
        zone.state = Some(match status {
            ZoneStatus::Off => ZoneState::Off,
            ZoneStatus::On => ZoneState::On,
            ZoneStatus::Unassigned => {
                reconcile_unassigned(zone);
                ZoneState::Unknown
            }
            ZoneStatus::Other(c) => {
                trace!("Zone {}: unexpected zone map character '{}'", zone.zone, c.escape_default());
                ZoneState::Unknown
            }
        });
    }

    Ok(())
}
