use anyhow::Result;
use std::env;
use tracing_subscriber::EnvFilter;

use eager_loading_demo::{open_store, populate, run_scenario, DemoConfig, OutputFormat, Scenario};

fn main() -> Result<()> {
    init_logging();

    let config = DemoConfig::from_args(env::args().skip(1))?;

    // Fresh in-memory store on every run
    let conn = open_store()?;
    populate(&conn, config.rows)?;

    for scenario in Scenario::ALL {
        let report = run_scenario(&conn, scenario)?;

        match config.format {
            OutputFormat::Text => print!("{}", report.render_text()),
            OutputFormat::Json => println!("{}", report.to_json()?),
        }
    }

    Ok(())
}

// Diagnostics go to stderr so stdout carries only the reports
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
