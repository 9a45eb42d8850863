//! Smart apartment scenario.
//!
//! Loads `smart_apartment.yaml` (or the file given as the first argument),
//! runs it and prints loop latencies, device energy and network usage.
//!
//! ```text
//! cargo run --example smart_apartment
//! cargo run --example smart_apartment -- demos/smart_apartment.yaml edgeward
//! ```
//!
//! The optional second argument selects the deployment:
//! - `cloud` keeps the apartment controller in the cloud (the file's mapping)
//! - `edgeward` pins only the user interface and lets the rest move to the edge

use std::error::Error;

use kiri::config::{PlacementKind, ScenarioConfig};
use kiri::placement::ModuleMapping;

const DEFAULT_SCENARIO: &str = include_str!("smart_apartment.yaml");

fn load(path: Option<&str>) -> Result<ScenarioConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => ScenarioConfig::from_file(path)?,
        None => ScenarioConfig::from_yaml(DEFAULT_SCENARIO)?,
    };
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = load(args.first().map(String::as_str))?;
    kiri::init_logging(&config.simulation.log_level);

    let mode = args.get(1).map(String::as_str).unwrap_or("cloud");
    match mode {
        "cloud" => {}
        "edgeward" => {
            let mut pinned = ModuleMapping::new();
            pinned.add_module_to_device("user_interface", "cloud");
            config.placement.strategy = PlacementKind::Edgeward;
            config.placement.mapping = pinned;
        }
        other => return Err(format!("unknown deployment mode: {}", other).into()),
    }

    println!("Starting Smart Apartment ({} deployment)...", mode);
    println!(
        "  devices: {}, sensors: {}, actuators: {}, horizon: {}",
        config.devices.len(),
        config.sensors.len(),
        config.actuators.len(),
        config.simulation.horizon
    );
    println!();

    let mut controller = config.into_controller()?;
    if let Some(placement) = controller.placement() {
        for (module, devices) in placement.iter() {
            let names: Vec<&str> = devices
                .iter()
                .filter_map(|&d| controller.topology().device(d).map(|dev| dev.name()))
                .collect();
            println!("  {:<22} -> {}", module, names.join(", "));
        }
        println!();
    }

    let results = controller.run()?;
    results.write_summary(std::io::stdout())?;

    println!();
    println!("Per-loop latencies (CSV):");
    print!("{}", results.loops_to_csv());
    Ok(())
}
