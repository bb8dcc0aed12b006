//! High-level thermostat operations. Each one re-resolves the thermostat so it
//! acts on the account as it is now, not as it was on a previous call.

use crate::client::{ClientError, NetatmoClient};
use crate::models::netatmo::{HomeId, ModuleId, SetpointChange, SetpointMode};
use crate::services::history::{self, Statistics};
use crate::services::resolver::resolve_thermostat;
use crate::transport::Transport;
use crate::utils::debug_payload;
use log::info;
use serde_json::Value;

pub const DEFAULT_HISTORY_DAYS: u32 = 7;
const HISTORY_SCALE: &str = "1hour";

fn apply_setpoint<T: Transport>(
    client: &NetatmoClient<T>,
    mode: SetpointMode,
    temperature: Option<f64>,
) -> Result<SetpointChange, ClientError> {
    let status = resolve_thermostat(client)?;
    client.set_thermpoint(&status.home_id, &status.room_id, mode, temperature)?;
    info!(
        "Setpoint of room {} in home {} set to {}{}",
        status.room_id.0,
        status.home_id.0,
        mode,
        temperature.map(|t| format!(" ({t}°C)")).unwrap_or_default()
    );
    Ok(SetpointChange {
        home_id: status.home_id,
        room_id: status.room_id,
        mode,
        temperature,
    })
}

/// Manual setpoint at `value` °C.
pub fn set_temperature<T: Transport>(client: &NetatmoClient<T>, value: f64) -> Result<SetpointChange, ClientError> {
    apply_setpoint(client, SetpointMode::Manual, Some(value))
}

/// Frost guard on, or back to the weekly program when turned off.
pub fn set_frost_guard<T: Transport>(client: &NetatmoClient<T>, enabled: bool) -> Result<SetpointChange, ClientError> {
    let mode = if enabled {
        SetpointMode::FrostGuard
    } else {
        SetpointMode::Program
    };
    apply_setpoint(client, mode, None)
}

fn find_bridge<T: Transport>(
    client: &NetatmoClient<T>,
    home_id: &HomeId,
    module_id: &ModuleId,
) -> Result<ModuleId, ClientError> {
    let homes = client.get_homes_data()?.body.homes;
    homes
        .iter()
        .find(|h| h.id.as_ref() == Some(home_id))
        .and_then(|h| h.modules.iter().find(|m| m.id.as_ref() == Some(module_id)))
        .and_then(|m| m.bridge.clone())
        .ok_or_else(|| ClientError::NotFound(format!("no bridge id found for thermostat module {}", module_id.0)))
}

/// Hourly temperature measures of the thermostat over the last `days` days, as returned by the API.
pub fn fetch_history<T: Transport>(client: &NetatmoClient<T>, days: u32) -> Result<Value, ClientError> {
    let status = resolve_thermostat(client)?;
    let bridge = find_bridge(client, &status.home_id, &status.module_id)?;

    let end = client.now().timestamp();
    let begin = end - i64::from(days) * 24 * 3600;

    // Bridged thermostats are addressed through their relay: device_id is the
    // relay, module_id the thermostat itself.
    let raw = client.get_measure(
        &bridge,
        &status.module_id,
        HISTORY_SCALE,
        &["Temperature"],
        Some(begin),
        Some(end),
    )?;
    if history::flatten_samples(&raw).is_empty() {
        debug_payload("getmeasure response without samples", &raw, None);
    }
    Ok(raw)
}

pub fn compute_statistics<T: Transport>(client: &NetatmoClient<T>, days: u32) -> Result<Statistics, ClientError> {
    let raw = fetch_history(client, days)?;
    Ok(history::compute_statistics(&raw))
}
