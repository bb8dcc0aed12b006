//! Command line surface: argument parsing and text/JSON rendering.

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use std::path::PathBuf;

use netatmo_thermostat::client::{ClientError, NetatmoClient};
use netatmo_thermostat::models::netatmo::ThermostatStatus;
use netatmo_thermostat::services::history::{self, Statistics};
use netatmo_thermostat::services::resolver::resolve_thermostat;
use netatmo_thermostat::services::thermostat::{self, DEFAULT_HISTORY_DAYS};
use netatmo_thermostat::transport::Transport;

#[derive(Parser, Debug)]
#[command(
    name = "netatmo-thermostat",
    version,
    about = "Control the Netatmo thermostat connected to your boiler"
)]
pub struct CliArgs {
    /// Read environment variables from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    pub env_file: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
    /// Verbose diagnostics on stderr
    #[arg(long, global = true)]
    pub debug: bool,
    /// Print the session's refresh token on stderr when done
    #[arg(long, global = true)]
    pub show_refresh_token: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show the thermostat status
    Status,
    /// Set the target temperature (manual mode)
    Set {
        /// Target temperature in °C
        #[arg(allow_negative_numbers = true)]
        temperature: f64,
    },
    /// Turn frost guard on or off
    FrostGuard { state: Toggle },
    /// Show the temperature history
    History {
        /// Number of days
        #[arg(long, default_value_t = DEFAULT_HISTORY_DAYS)]
        days: u32,
    },
    /// Show temperature statistics
    Stats {
        /// Number of days
        #[arg(long, default_value_t = DEFAULT_HISTORY_DAYS)]
        days: u32,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

/// Ordered key/value result of a command.
pub type Fields = Vec<(&'static str, Value)>;

pub fn format_temperature(value: Option<f64>) -> String {
    value.map(|t| format!("{t:.1}°C")).unwrap_or_else(|| "N/A".to_string())
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "N/A".to_string(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("\n  {}: {}", k, plain(v)))
            .collect(),
        other => other.to_string(),
    }
}

pub fn format_output(fields: &Fields, as_json: bool) -> String {
    if as_json {
        let object: serde_json::Map<String, Value> = fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        return serde_json::to_string_pretty(&Value::Object(object)).unwrap_or_default();
    }
    fields
        .iter()
        .map(|(k, v)| format!("{}: {}", k, plain(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn status_fields(status: &ThermostatStatus) -> Fields {
    vec![
        ("module_name", json!(status.module_name)),
        ("current_temperature", json!(format_temperature(status.current_temperature))),
        ("target_temperature", json!(format_temperature(status.target_temperature))),
        (
            "setpoint_mode",
            json!(status.setpoint_mode.map(|m| m.as_str()).unwrap_or("N/A")),
        ),
        ("boiler_status", json!(if status.boiler_status { "ON" } else { "OFF" })),
        ("heating_power_request", json!(status.heating_power_request)),
    ]
}

pub fn stats_fields(days: u32, stats: &Statistics) -> Fields {
    vec![
        ("period_days", json!(days)),
        ("average_temperature", json!(format_temperature(stats.average))),
        ("min_temperature", json!(format_temperature(stats.min))),
        ("max_temperature", json!(format_temperature(stats.max))),
        ("data_points", json!(stats.count)),
    ]
}

pub fn history_text(raw: &Value, days: u32) -> String {
    let mut lines = vec![
        format!("Temperature history (last {} days):", days),
        "-".repeat(50),
    ];
    let samples = history::flatten_samples(raw);
    if samples.is_empty() {
        lines.push("No data available".to_string());
    }
    for sample in samples {
        let when = DateTime::from_timestamp(sample.timestamp, 0)
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| sample.timestamp.to_string());
        lines.push(format!("{}: {:.1}°C", when, sample.temperature));
    }
    lines.join("\n")
}

/// Run one command and return what should be printed on stdout.
pub fn execute<T: Transport>(client: &NetatmoClient<T>, command: &Command, as_json: bool) -> Result<String, ClientError> {
    let fields = match command {
        Command::Status => status_fields(&resolve_thermostat(client)?),
        Command::Set { temperature } => {
            thermostat::set_temperature(client, *temperature)?;
            vec![
                ("status", json!("success")),
                ("temperature_set", json!(temperature)),
                ("message", json!(format!("Temperature set to {}°C", temperature))),
            ]
        }
        Command::FrostGuard { state } => {
            let enabled = *state == Toggle::On;
            thermostat::set_frost_guard(client, enabled)?;
            vec![
                ("status", json!("success")),
                ("frost_guard", json!(if enabled { "enabled" } else { "disabled" })),
                (
                    "message",
                    json!(format!("Frost guard {}", if enabled { "enabled" } else { "disabled" })),
                ),
            ]
        }
        Command::History { days } => {
            let raw = thermostat::fetch_history(client, *days)?;
            if as_json {
                return Ok(serde_json::to_string_pretty(&raw).unwrap_or_default());
            }
            return Ok(history_text(&raw, *days));
        }
        Command::Stats { days } => stats_fields(*days, &thermostat::compute_statistics(client, *days)?),
    };
    Ok(format_output(&fields, as_json))
}
