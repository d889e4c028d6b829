use log::info;
use std::{fs::File, io, io::Write, path::Path};

use crate::command_payload::ZONE_COUNT;
use crate::config_payload::BridgeConfig;
use crate::gateway::RaGateway;
use crate::zone_payload::{Zone, ZoneCreate, ZoneUpdate, ZONE_TYPE_DIMMER};
use crate::zone_state::{merge_zone_states, StatusFrame, ZoneStatus};
use crate::zone_store::ZoneStore;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Setup aborted by user")]
    UserQuit,
}

pub enum SetupAction {
    Quit,
    Start,
}

/// Location of the JSON configuration file
pub struct Config {
    pub config_filename: String,
}

impl Config {
    pub fn new(config_filename: &str) -> Config {
        Config { config_filename: config_filename.to_owned() }
    }

    pub fn exists(&self) -> bool {
        Path::new(&self.config_filename).exists()
    }

    pub fn load(&self) -> Result<BridgeConfig, SetupError> {
        let file = File::open(Path::new(&self.config_filename))?;
        let config: BridgeConfig = serde_json::from_reader(file)?;

        Ok(config)
    }

    pub fn save(&self, config: &BridgeConfig) -> Result<(), SetupError> {
        let file = File::create(Path::new(&self.config_filename))?;

        serde_json::to_writer_pretty(file, config)?;
        info!("Configuration saved to {}", self.config_filename);
        Ok(())
    }
}

fn display_prompt<T: std::fmt::Display>(prompt: &str, default_value: &Option<T>) -> Result<(), SetupError> {
    if let Some(default_value) = default_value {
        print!("{} [{}]: ", prompt, default_value);
    } else {
        print!("{}: ", prompt);
    }

    io::stdout().flush()?;
    Ok(())
}

fn get_input() -> Result<String, SetupError> {
    let mut value = String::new();

    if io::stdin().read_line(&mut value)? == 0 {
        return Err(SetupError::UserQuit);    // EOF
    }

    Ok(value.trim().to_owned())
}

pub fn prompt_for_string(prompt: &str, default_value: Option<&str>) -> Result<String, SetupError> {
    loop {
        display_prompt(prompt, &default_value)?;
        let value = get_input()?;

        match (value.is_empty(), default_value) {
            (false, _) => return Ok(value),
            (true, Some(default_value)) => return Ok(default_value.to_owned()),
            (true, None) => println!("Value cannot be empty"),
        }
    }
}

/// Empty input takes the default, or quits the current prompt if there is none
pub fn prompt_for_number<T: std::str::FromStr + std::fmt::Display + Copy>(
    prompt: &str,
    default_value: &Option<T>,
) -> Result<T, SetupError> {
    loop {
        display_prompt(prompt, default_value)?;
        let value = get_input()?;

        if value.is_empty() {
            return default_value.ok_or(SetupError::UserQuit);
        }

        match value.parse() {
            Ok(v) => return Ok(v),
            Err(_) => println!("Invalid value"),
        }
    }
}

/// Hardware zones reported as assigned that have no configuration yet
pub fn importable_zones(frame: &StatusFrame, zones: &[Zone]) -> Vec<i64> {
    // A bridged system appends ",S<n>" after the 32 zones
    (1..=frame.len().min(ZONE_COUNT as usize) as i64)
        .filter(|number| !matches!(frame.zone_status(*number), Ok(ZoneStatus::Unassigned) | Err(_)))
        .filter(|number| zones.iter().all(|zone| zone.zone != *number))
        .collect()
}

fn display_zones(zones: &[Zone], frame: Option<&StatusFrame>) {
    match frame {
        Some(frame) => println!("Zones (zone map: {}):", frame),
        None => println!("Zones (zone map not available):"),
    }

    if zones.is_empty() {
        println!("  No zones");
    }

    for zone in zones {
        let state = zone.state.map(|s| format!("{:?}", s)).unwrap_or_default();
        println!(
            "  #{:<3} zone {:>2}  {:24} type {}  default {:>3}  {}",
            zone.id, zone.zone, zone.name, zone.zonetypeid, zone.default_level, state
        );
    }
}

pub struct Setup<'a> {
    store: &'a ZoneStore,
    gateway: &'a RaGateway,
}

impl<'a> Setup<'a> {
    pub fn new(store: &'a ZoneStore, gateway: &'a RaGateway) -> Setup<'a> {
        Setup { store, gateway }
    }

    async fn load_zones(&self) -> (Vec<Zone>, Option<StatusFrame>) {
        let mut zones = match self.store.list_zones().await {
            Ok(zones) => zones,
            Err(e) => {
                println!("Cannot read zones: {}", e.current_context());
                Vec::new()
            }
        };

        let frame = match self.gateway.zone_states().await {
            Ok(frame) => Some(frame),
            Err(e) => {
                println!("Cannot read zone map: {}", e.current_context());
                None
            }
        };

        if let Some(frame) = &frame {
            if let Err(e) = merge_zone_states(&mut zones, frame) {
                println!("{}", e.current_context());
            }
        }

        (zones, frame)
    }

    async fn import_zones(&self, zones: &[Zone], frame: Option<&StatusFrame>) -> Result<(), SetupError> {
        let Some(frame) = frame else {
            println!("Zone map is not available, cannot import");
            return Ok(());
        };

        let numbers = importable_zones(frame, zones);
        if numbers.is_empty() {
            println!("All assigned zones are already configured");
        }

        for number in numbers {
            let name = prompt_for_string(&format!("Name for zone {}", number), Some(&format!("Zone {}", number)))?;
            let zonetypeid = prompt_for_number("Zone type (1=switch, 2=dimmer, 3=other)", &Some(ZONE_TYPE_DIMMER))?;

            let create = ZoneCreate { name, zone: number, zonetypeid, default_level: 100 };
            if let Err(e) = self.store.create_zone(create).await {
                println!("{}", e.current_context());
            }
        }

        Ok(())
    }

    async fn update_zone(&self, update: impl FnOnce() -> Result<ZoneUpdate, SetupError>) -> Result<(), SetupError> {
        let id = match prompt_for_number::<i64>("Zone #", &None) {
            Ok(id) => id,
            Err(SetupError::UserQuit) => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.store.get_zone(id).await {
            println!("{}", e.current_context());
            return Ok(());
        }

        let update = match update() {
            Ok(update) => update,
            Err(SetupError::UserQuit) => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.store.update_zone(id, update).await {
            println!("{}", e.current_context());
        }

        Ok(())
    }

    async fn delete_zone(&self) -> Result<(), SetupError> {
        if let Ok(id) = prompt_for_number::<i64>("Delete zone #", &None) {
            if let Err(e) = self.store.delete_zone(id).await {
                println!("{}", e.current_context());
            }
        }

        Ok(())
    }

    pub async fn interactive_setup(&self) -> Result<SetupAction, SetupError> {
        loop {
            let (zones, frame) = self.load_zones().await;
            display_zones(&zones, frame.as_ref());

            let command = prompt_for_string(
                "Command (i=import, r=rename, t=type, l=default level, d=delete, q=quit, s=start)",
                Some("s"),
            )?;

            match command.chars().next() {
                Some('s') => return Ok(SetupAction::Start),
                Some('q') => return Ok(SetupAction::Quit),
                Some('i') => self.import_zones(&zones, frame.as_ref()).await?,
                Some('r') => {
                    self.update_zone(|| {
                        Ok(ZoneUpdate { name: Some(prompt_for_string("Name", None)?), ..Default::default() })
                    })
                    .await?
                }
                Some('t') => {
                    self.update_zone(|| {
                        let zonetypeid = prompt_for_number("Zone type (0=unassigned, 1=switch, 2=dimmer, 3=other)", &None)?;
                        Ok(ZoneUpdate { zonetypeid: Some(zonetypeid), ..Default::default() })
                    })
                    .await?
                }
                Some('l') => {
                    self.update_zone(|| {
                        let default_level = prompt_for_number("Default level (0-100)", &Some(100))?;
                        Ok(ZoneUpdate { default_level: Some(default_level), ..Default::default() })
                    })
                    .await?
                }
                Some('d') => self.delete_zone().await?,
                _ => println!("Invalid command"),
            }
        }
    }
}
