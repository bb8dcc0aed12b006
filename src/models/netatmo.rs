//! Models for the subset of the Netatmo Energy API used by the thermostat client.
//!
//! The provider omits fields freely depending on account configuration, so
//! nearly everything is optional and collections default to empty.

use core::fmt;
use serde::{Deserialize, Serialize};

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HomeId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub String);

// =====================
// Enums
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    /// Relay that bridges thermostats to the cloud.
    #[serde(rename = "NAPlug")]
    Relay,
    #[serde(rename = "NATherm1")]
    Thermostat,
    /// Smart radiator valve.
    #[serde(rename = "NRV")]
    Valve,
    #[serde(rename = "OTM")]
    OpenTherm,
    #[serde(rename = "OTM-C")]
    OpenThermConnected,
    #[serde(other)]
    Unknown,
}

impl ModuleType {
    pub fn is_thermostat(self) -> bool {
        matches!(
            self,
            ModuleType::Thermostat | ModuleType::Valve | ModuleType::OpenTherm | ModuleType::OpenThermConnected
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetpointMode {
    Manual,
    Program,
    /// Frost guard ("hors gel").
    #[serde(rename = "hg")]
    FrostGuard,
    Away,
    Off,
    Max,
    Home,
    Schedule,
    #[serde(other)]
    Unknown,
}

impl SetpointMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SetpointMode::Manual => "manual",
            SetpointMode::Program => "program",
            SetpointMode::FrostGuard => "hg",
            SetpointMode::Away => "away",
            SetpointMode::Off => "off",
            SetpointMode::Max => "max",
            SetpointMode::Home => "home",
            SetpointMode::Schedule => "schedule",
            SetpointMode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SetpointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =====================
// /api/homesdata (static topology)
// =====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomesData {
    #[serde(default)]
    pub body: HomesDataBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomesDataBody {
    #[serde(default)]
    pub homes: Vec<Home>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Home {
    pub id: Option<HomeId>,
    pub name: Option<String>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Room {
    pub id: Option<RoomId>,
    pub name: Option<String>,
    #[serde(default)]
    pub module_ids: Vec<ModuleId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub id: Option<ModuleId>,
    #[serde(rename = "type")]
    pub module_type: Option<ModuleType>,
    pub name: Option<String>,
    pub room_id: Option<RoomId>,
    /// Relay the module reports through; used as `device_id` for measures.
    pub bridge: Option<ModuleId>,
}

// =====================
// /api/homestatus (live state)
// =====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeStatus {
    #[serde(default)]
    pub body: HomeStatusBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeStatusBody {
    #[serde(default)]
    pub home: LiveHome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveHome {
    pub id: Option<HomeId>,
    #[serde(default)]
    pub rooms: Vec<RoomStatus>,
    #[serde(default)]
    pub modules: Vec<ModuleStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomStatus {
    pub id: Option<RoomId>,
    pub therm_measured_temperature: Option<f64>,
    pub therm_setpoint_temperature: Option<f64>,
    pub therm_setpoint_mode: Option<SetpointMode>,
    pub heating_power_request: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub id: Option<ModuleId>,
    #[serde(rename = "type")]
    pub module_type: Option<ModuleType>,
    pub name: Option<String>,
    pub boiler_status: Option<bool>,
}

// =====================
// Derived results
// =====================

/// The thermostat located in the account, with its room's live readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermostatStatus {
    pub home_id: HomeId,
    pub room_id: RoomId,
    pub module_id: ModuleId,
    pub module_name: String,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub setpoint_mode: Option<SetpointMode>,
    pub boiler_status: bool,
    pub heating_power_request: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetpointChange {
    pub home_id: HomeId,
    pub room_id: RoomId,
    pub mode: SetpointMode,
    pub temperature: Option<f64>,
}
