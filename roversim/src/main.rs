//! Runs the exploration controller against the simulated robot.
//!
//! Usage: `roversim [config.toml]`

use std::path::Path;

use rovercore::{error::Result, Explorer, RoverConfig};
use roversim::{SimRobot, SimulationConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uom::si::{angle::degree, length::meter};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rovercore=info,roversim=info")),
        )
        .init();

    let (config, simulation) = match std::env::args().nth(1) {
        Some(path) => {
            let path = Path::new(&path);
            info!("Loading configuration from {:?}", path);
            (RoverConfig::load(path)?, SimulationConfig::load(path)?)
        }
        None => {
            info!("Using default configuration");
            (RoverConfig::default(), SimulationConfig::default())
        }
    };

    let robot = SimRobot::from_config(&simulation);
    let mut explorer = Explorer::from_config(robot, &config);

    if let Err(e) = explorer.run() {
        error!("exploration failed: {}", e);
        return Err(e);
    }

    let estimate = explorer.pose();
    let truth = explorer.robot().truth();
    info!(
        "estimate ({:.2}, {:.2}) m heading {:.0} deg, truth ({:.2}, {:.2}) m, {} commands",
        estimate.x.get::<meter>(),
        estimate.y.get::<meter>(),
        estimate.heading.get::<degree>(),
        truth.x.get::<meter>(),
        truth.y.get::<meter>(),
        explorer.robot().commands().len(),
    );
    Ok(())
}
