use error_stack::{Report, ResultExt};
use log::info;
use rustop::opts;

mod api;
mod command_payload;
mod config_payload;
mod gateway;
mod ra_manager;
mod setup;
mod zone_payload;
mod zone_state;
mod zone_store;

mod ra_emulator;
mod ra_serial;

use crate::api::AppState;
use crate::config_payload::BridgeConfig;
use crate::gateway::RaGateway;
use crate::ra_emulator::RadioRaEmulator;
use crate::ra_manager::RaManager;
use crate::ra_serial::RaSerial;
use crate::setup::{Config, Setup, SetupAction, SetupError};
use crate::zone_store::ZoneStore;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error("Configuration file {0}")]
    Config(String),

    #[error("Error when initializing RadioRA interface - is serial port enabled? (enable using raspi-config)")]
    Controller,

    #[error("Zone database")]
    Database,

    #[error("Setup failed")]
    Setup,

    #[error("HTTP server on {0}")]
    Http(String),
}

#[tokio::main]
async fn main() -> Result<(), Report<BridgeError>> {
    let (args, _) = opts! {
        synopsis "RadioRA REST bridge";
        opt emulation:bool = false, desc: "Use hardware emulation (for debugging)";
        opt setup:bool=false, desc: "Setup mode";
        opt config: String = String::from("radiora.json"), desc: "Configuration filename (radiora.json)";
    }.parse_or_exit();

    let d = tracing_init::TracingInit::builder("radiora_bridge")
        .log_to_file(true)
        .log_to_server(true)
        .log_file_prefix("radiora")
        .log_file_path("logs")
        .init()
        .map_err(|e| BridgeError::Logging(format!("{:?}", e)))?
        .to_string();

    println!("Logging: {}", d);

    let config = Config::new(&args.config);
    let into_config_context = || BridgeError::Config(args.config.clone());

    println!("Loading configuration from {}", config.config_filename);

    let bridge_config = if !config.exists() {
        let bridge_config = BridgeConfig::new("RadioRA");
        config.save(&bridge_config).change_context_lazy(into_config_context)?;
        println!("Configuration: defaults written");
        bridge_config
    } else {
        config.load().change_context_lazy(into_config_context)?
    };

    println!("Configuration: loaded");

    let controller = if args.emulation {
        RadioRaEmulator::try_new(&bridge_config.emulation)
    } else {
        RaSerial::try_new(&bridge_config.serial)
    }
    .change_context(BridgeError::Controller)?;

    let manager = RaManager::new(controller, bridge_config.serial.retry_policy());
    let (gateway, _worker) = RaGateway::spawn(manager, bridge_config.serial.queue_depth);

    let store = ZoneStore::open(&bridge_config.database).await.change_context(BridgeError::Database)?;

    if args.setup {
        match Setup::new(&store, &gateway).interactive_setup().await {
            Ok(SetupAction::Start) => {}
            Ok(SetupAction::Quit) | Err(SetupError::UserQuit) => std::process::exit(0),
            Err(e) => return Err(Report::new(e).change_context(BridgeError::Setup)),
        }
    }

    let into_http_context = || BridgeError::Http(bridge_config.http.listen.clone());
    let listener = tokio::net::TcpListener::bind(&bridge_config.http.listen)
        .await
        .change_context_lazy(into_http_context)?;

    info!("{} ({}) listening on {}", get_version(), bridge_config.name, bridge_config.http.listen);
    println!("Listening on {}", bridge_config.http.listen);

    axum::serve(listener, api::router(AppState { gateway, store }))
        .await
        .change_context_lazy(into_http_context)?;

    Ok(())
}

pub fn get_version() -> String {
    format!("radiora_bridge: {} (built at {})", built_info::PKG_VERSION, built_info::BUILT_TIME_UTC)
}
// Include the generated-file as a separate module
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
