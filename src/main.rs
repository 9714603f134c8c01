mod data;
mod display;
mod monitor;
mod query;
mod resolve;

use std::error::Error;
use std::process;

use clap::Parser;

use crate::display::render_table;
use crate::monitor::NvmlTelemetry;
use crate::query::QueryEngine;
use crate::resolve::SystemResolver;

/// Query NVIDIA GPU telemetry and the processes using each device.
#[derive(Parser)]
#[command(name = "gpuq", version, about)]
struct Args {
    /// Print machine-readable JSON instead of the table
    #[arg(long)]
    json: bool,

    /// Comma-separated device indices to include, e.g. "0,2" (default: all)
    #[arg(long, value_name = "IDS")]
    id: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("gpuq: {err}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let selected = parse_ids(args.id.as_deref())?;

    // NVML is held for exactly one query; dropping the engine releases it
    // on every exit path, fatal errors included.
    let telemetry =
        NvmlTelemetry::init().map_err(|err| format!("failed to initialize NVML: {err}"))?;
    let mut engine = QueryEngine::new(telemetry, SystemResolver::new());
    let mut records = engine.query()?;
    drop(engine);

    if let Some(selected) = selected {
        records.retain(|record| selected.contains(&record.index));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", render_table(&records));
    }
    Ok(())
}

fn parse_ids(raw: Option<&str>) -> Result<Option<Vec<u32>>, Box<dyn Error>> {
    let Some(raw) = raw else { return Ok(None) };
    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = part
            .parse::<u32>()
            .map_err(|_| format!("invalid device index {part:?}"))?;
        ids.push(id);
    }
    Ok(Some(ids))
}
