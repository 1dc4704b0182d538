//! Config validation CLI tool
//!
//! Validates an arcaded tariff file and reports any errors.

use arcade_util::{default_config_path, format_minutes};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [tariff-file]");
            eprintln!();
            eprintln!("Validates an arcaded tariff file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Tariff file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match arcade_config::load_config(&config_path) {
        Ok(tariff) => {
            println!("✓ Tariff is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", arcade_config::CURRENT_CONFIG_VERSION);
            println!(
                "  Extensions: {} to {}",
                format_minutes(i64::from(tariff.billing.min_extension_minutes)),
                format_minutes(i64::from(tariff.billing.max_extension_minutes))
            );
            println!(
                "  Closed sessions kept: {}",
                format_minutes(tariff.service.closed_retention.as_secs() as i64 / 60)
            );

            if !tariff.stations.is_empty() {
                println!();
                println!("Stations:");
                for station in &tariff.stations {
                    let state = if station.disabled { " (disabled)" } else { "" };
                    println!(
                        "  - {}: {} @ {}/h{}",
                        station.id, station.label, station.hourly_rate, state
                    );
                }
            }

            if !tariff.plans.is_empty() {
                println!();
                println!("Plans:");
                for plan in &tariff.plans {
                    println!(
                        "  - {}: {} = {} for {}",
                        plan.id,
                        plan.label,
                        plan.price,
                        format_minutes(i64::from(plan.duration_minutes))
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Tariff validation failed");
            eprintln!();
            match &e {
                arcade_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                arcade_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                arcade_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                arcade_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        arcade_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
