use serde::{Deserialize, Serialize};

pub const ZONE_TYPE_UNASSIGNED: i64 = 0;
pub const ZONE_TYPE_DIMMER: i64 = 2;

/// Runtime state of a zone, derived from the live zone map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneState {
    #[serde(rename = "off")]
    Off,
    #[serde(rename = "on")]
    On,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Zone {
    pub id: i64,
    pub name: String,
    pub zone: i64,                  // Hardware zone number (1-32)
    pub zonetypeid: i64,
    pub default_level: i64,
    #[sqlx(skip)]
    #[serde(default)]
    pub state: Option<ZoneState>,   // Not persisted
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ZoneType {
    pub id: i64,
    pub name: String,
}

fn default_zone_type() -> i64 {
    ZONE_TYPE_DIMMER
}

fn default_level() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneCreate {
    pub name: String,
    pub zone: i64,
    #[serde(default = "default_zone_type")]
    pub zonetypeid: i64,
    #[serde(default = "default_level")]
    pub default_level: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoneUpdate {
    pub name: Option<String>,
    pub zonetypeid: Option<i64>,
    pub default_level: Option<i64>,
}
