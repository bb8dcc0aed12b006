use crate::client::{ClientError, NetatmoClient};
use crate::models::netatmo::{Home, HomeId, LiveHome, ModuleId, RoomId, RoomStatus, ThermostatStatus};
use crate::transport::Transport;
use crate::utils::debug_payload;
use log::{debug, warn};
use std::collections::HashMap;

const DEFAULT_MODULE_NAME: &str = "Thermostat";

/// Room membership as declared by the static home listing.
///
/// The provider describes membership twice (each module's `room_id`, and each
/// room's `module_ids`) and the two do not always agree, so both are kept.
struct RoomIndex<'a> {
    module_room: HashMap<&'a ModuleId, &'a RoomId>,
    room_modules: HashMap<&'a RoomId, &'a [ModuleId]>,
    module_names: HashMap<&'a ModuleId, &'a str>,
}

impl<'a> RoomIndex<'a> {
    fn build(home: &'a Home) -> Self {
        let mut module_room = HashMap::new();
        let mut module_names = HashMap::new();
        for module in &home.modules {
            let Some(id) = module.id.as_ref() else { continue };
            if let Some(room_id) = module.room_id.as_ref() {
                module_room.insert(id, room_id);
            }
            if let Some(name) = module.name.as_deref() {
                module_names.insert(id, name);
            }
        }

        let room_modules = home
            .rooms
            .iter()
            .filter_map(|r| r.id.as_ref().map(|id| (id, r.module_ids.as_slice())))
            .collect();

        RoomIndex {
            module_room,
            room_modules,
            module_names,
        }
    }

    /// Picks the live room that owns `module_id`:
    /// the module's declared room, then a room listing the module,
    /// then the first live room.
    fn owning_room<'r>(&self, module_id: &ModuleId, live_rooms: &'r [RoomStatus]) -> Option<&'r RoomStatus> {
        let declared = self.module_room.get(module_id).and_then(|room_id| {
            live_rooms
                .iter()
                .find(|r| r.id.as_ref() == Some(*room_id))
        });
        if declared.is_some() {
            return declared;
        }

        let listed = live_rooms.iter().find(|r| {
            r.id.as_ref()
                .and_then(|id| self.room_modules.get(id))
                .is_some_and(|members| members.contains(module_id))
        });
        if listed.is_some() {
            return listed;
        }

        let first = live_rooms.first();
        if let Some(room) = first {
            warn!(
                "No room declares thermostat module {}; assuming first room {:?}",
                module_id.0,
                room.id.as_ref().map(|r| r.0.as_str())
            );
        }
        first
    }
}

/// Locate the thermostat in one home, given its static listing and live status.
pub fn resolve_in_home(home_id: &HomeId, home: &Home, live: &LiveHome) -> Option<ThermostatStatus> {
    let module = live
        .modules
        .iter()
        .find(|m| m.id.is_some() && m.module_type.is_some_and(|t| t.is_thermostat()))?;
    let module_id = module.id.as_ref()?;

    // A room without an id cannot be targeted by setpoint changes.
    let live_rooms: Vec<RoomStatus> = live.rooms.iter().filter(|r| r.id.is_some()).cloned().collect();

    let index = RoomIndex::build(home);
    let room = index.owning_room(module_id, &live_rooms)?;
    let room_id = room.id.clone()?;

    let module_name = index
        .module_names
        .get(module_id)
        .copied()
        .or(module.name.as_deref())
        .unwrap_or(DEFAULT_MODULE_NAME)
        .to_string();

    Some(ThermostatStatus {
        home_id: home_id.clone(),
        room_id,
        module_id: module_id.clone(),
        module_name,
        current_temperature: room.therm_measured_temperature,
        target_temperature: room.therm_setpoint_temperature,
        setpoint_mode: room.therm_setpoint_mode,
        boiler_status: module.boiler_status.unwrap_or(false),
        heating_power_request: room.heating_power_request.unwrap_or(0.0),
    })
}

/// Walk the homes in listed order and return the first thermostat found.
///
/// Homes whose live status cannot be fetched are skipped; later homes are not
/// queried once a match is found.
pub fn resolve_across_homes<F>(homes: &[Home], mut fetch_status: F) -> Result<ThermostatStatus, ClientError>
where
    F: FnMut(&HomeId) -> Result<LiveHome, ClientError>,
{
    if homes.is_empty() {
        return Err(ClientError::NotFound("no homes found in the Netatmo account".to_string()));
    }

    for home in homes {
        let Some(home_id) = home.id.as_ref() else {
            debug!("Skipping home without id (name={:?})", home.name);
            continue;
        };

        let live = match fetch_status(home_id) {
            Ok(live) => live,
            Err(e) => {
                debug!("Skipping home {}: status unavailable: {}", home_id.0, e);
                continue;
            }
        };

        match resolve_in_home(home_id, home, &live) {
            Some(status) => {
                debug!(
                    "Thermostat {} found in home {} room {}",
                    status.module_id.0, status.home_id.0, status.room_id.0
                );
                return Ok(status);
            }
            None => debug!(
                "No thermostat in home {} (module types: {:?}, rooms: {})",
                home_id.0,
                live.modules.iter().map(|m| m.module_type).collect::<Vec<_>>(),
                live.rooms.len()
            ),
        }
    }

    Err(ClientError::NotFound(
        "no thermostat found in any Netatmo home".to_string(),
    ))
}

/// Fetch the account topology and resolve the thermostat.
pub fn resolve_thermostat<T: Transport>(client: &NetatmoClient<T>) -> Result<ThermostatStatus, ClientError> {
    let homes = client.get_homes_data()?.body.homes;
    let resolved = resolve_across_homes(&homes, |home_id| {
        client.get_home_status(home_id).map(|status| status.body.home)
    });
    if let Err(ClientError::NotFound(_)) = &resolved {
        debug_payload("Account structure without a thermostat", &homes, None);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::authed_client;
    use crate::models::netatmo::SetpointMode;
    use crate::testing::json_response;
    use http::{Method, StatusCode};
    use serde_json::{json, Value};

    fn home(value: Value) -> Home {
        serde_json::from_value(value).unwrap()
    }

    fn live(value: Value) -> LiveHome {
        serde_json::from_value(value).unwrap()
    }

    fn hid(s: &str) -> HomeId {
        HomeId(s.to_string())
    }

    #[test]
    fn declared_room_wins() {
        let h = home(json!({
            "id": "h1",
            "modules": [
                {"id": "relay", "type": "NAPlug"},
                {"id": "therm", "type": "NATherm1", "name": "Living thermostat", "room_id": "r2", "bridge": "relay"}
            ],
            "rooms": [{"id": "r1", "module_ids": ["therm"]}, {"id": "r2", "module_ids": []}]
        }));
        let l = live(json!({
            "rooms": [
                {"id": "r1", "therm_measured_temperature": 17.0},
                {"id": "r2", "therm_measured_temperature": 19.5, "therm_setpoint_temperature": 20.0,
                 "therm_setpoint_mode": "program", "heating_power_request": 40}
            ],
            "modules": [
                {"id": "relay", "type": "NAPlug"},
                {"id": "therm", "type": "NATherm1", "name": "live name", "boiler_status": true}
            ]
        }));

        let status = resolve_in_home(&hid("h1"), &h, &l).unwrap();
        assert_eq!(status.room_id, RoomId("r2".into()));
        assert_eq!(status.module_id, ModuleId("therm".into()));
        assert_eq!(status.module_name, "Living thermostat");
        assert_eq!(status.current_temperature, Some(19.5));
        assert_eq!(status.target_temperature, Some(20.0));
        assert_eq!(status.setpoint_mode, Some(SetpointMode::Program));
        assert!(status.boiler_status);
        assert_eq!(status.heating_power_request, 40.0);
    }

    #[test]
    fn room_membership_list_is_second_choice() {
        let h = home(json!({
            "id": "h1",
            "modules": [{"id": "valve", "type": "NRV", "room_id": "gone"}],
            "rooms": [{"id": "r1", "module_ids": []}, {"id": "r2", "module_ids": ["valve"]}]
        }));
        let l = live(json!({
            "rooms": [{"id": "r1"}, {"id": "r2"}],
            "modules": [{"id": "valve", "type": "NRV", "name": "Valve live"}]
        }));

        let status = resolve_in_home(&hid("h1"), &h, &l).unwrap();
        assert_eq!(status.room_id, RoomId("r2".into()));
        // No static name, so the live one is used.
        assert_eq!(status.module_name, "Valve live");
        assert!(!status.boiler_status);
        assert_eq!(status.heating_power_request, 0.0);
    }

    #[test]
    fn first_live_room_is_last_resort() {
        let h = home(json!({"id": "h1"}));
        let l = live(json!({
            "rooms": [{"therm_measured_temperature": 1.0}, {"id": "rA"}, {"id": "rB"}],
            "modules": [{"id": "otm", "type": "OTM"}]
        }));

        let status = resolve_in_home(&hid("h1"), &h, &l).unwrap();
        assert_eq!(status.room_id, RoomId("rA".into()));
        assert_eq!(status.module_name, "Thermostat");
    }

    #[test]
    fn home_without_rooms_yields_nothing() {
        let h = home(json!({"id": "h1", "modules": [{"id": "t", "type": "NATherm1", "room_id": "r1"}]}));
        let l = live(json!({"rooms": [], "modules": [{"id": "t", "type": "NATherm1"}]}));
        assert!(resolve_in_home(&hid("h1"), &h, &l).is_none());
    }

    #[test]
    fn first_thermostat_in_listed_order_is_chosen() {
        let h = home(json!({"id": "h1"}));
        let l = live(json!({
            "rooms": [{"id": "r1"}],
            "modules": [
                {"id": "cam", "type": "NACamera"},
                {"type": "NATherm1"},
                {"id": "v1", "type": "NRV"},
                {"id": "t1", "type": "NATherm1"}
            ]
        }));
        assert_eq!(
            resolve_in_home(&hid("h1"), &h, &l).unwrap().module_id,
            ModuleId("v1".into())
        );
    }

    #[test]
    fn unreachable_home_is_skipped() {
        let homes = vec![
            home(json!({"id": "h1"})),
            home(json!({"id": "h2", "modules": [{"id": "t", "type": "NATherm1", "room_id": "r"}]})),
        ];
        let mut queried = Vec::new();
        let status = resolve_across_homes(&homes, |id| {
            queried.push(id.0.clone());
            if id.0 == "h1" {
                Err(ClientError::Transport("connection reset".into()))
            } else {
                Ok(live(json!({"rooms": [{"id": "r"}], "modules": [{"id": "t", "type": "NATherm1"}]})))
            }
        })
        .unwrap();
        assert_eq!(status.home_id, hid("h2"));
        assert_eq!(queried, vec!["h1", "h2"]);
    }

    #[test]
    fn no_homes_is_not_found() {
        let err = resolve_across_homes(&[], |_| unreachable!()).unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[test]
    fn second_home_wins_and_third_is_never_queried() {
        let client = authed_client();
        let transport = client.transport();
        transport.respond_to(
            Method::GET,
            "/api/homesdata",
            json_response(
                StatusCode::OK,
                json!({"body": {"homes": [
                    {"id": "h1", "modules": [{"id": "relay1", "type": "NAPlug"}], "rooms": [{"id": "a"}]},
                    {"id": "h2", "modules": [{"id": "t2", "type": "NATherm1", "name": "Upstairs", "room_id": "b"}],
                     "rooms": [{"id": "b", "module_ids": ["t2"]}]},
                    {"id": "h3", "modules": [{"id": "t3", "type": "NATherm1", "room_id": "c"}], "rooms": [{"id": "c"}]}
                ]}}),
            ),
        );
        transport.respond_to_query(
            "/api/homestatus",
            "home_id",
            "h1",
            json_response(
                StatusCode::OK,
                json!({"body": {"home": {"id": "h1", "rooms": [{"id": "a"}], "modules": [{"id": "relay1", "type": "NAPlug"}]}}}),
            ),
        );
        transport.respond_to_query(
            "/api/homestatus",
            "home_id",
            "h2",
            json_response(
                StatusCode::OK,
                json!({"body": {"home": {"id": "h2",
                    "rooms": [{"id": "b", "therm_measured_temperature": 18.2, "therm_setpoint_temperature": 19.0,
                               "therm_setpoint_mode": "manual"}],
                    "modules": [{"id": "t2", "type": "NATherm1", "boiler_status": false}]}}}),
            ),
        );

        let status = resolve_thermostat(&client).unwrap();
        assert_eq!(status.home_id, hid("h2"));
        assert_eq!(status.room_id, RoomId("b".into()));
        assert_eq!(status.module_name, "Upstairs");
        assert_eq!(status.current_temperature, Some(18.2));
        assert_eq!(status.setpoint_mode, Some(SetpointMode::Manual));

        let queried: Vec<String> = transport
            .requests_to("/api/homestatus")
            .iter()
            .filter_map(|r| r.query_param("home_id").map(str::to_string))
            .collect();
        assert_eq!(queried, vec!["h1", "h2"]);
    }

    #[test]
    fn account_without_thermostat_is_not_found() {
        let client = authed_client();
        let transport = client.transport();
        transport.respond_to(
            Method::GET,
            "/api/homesdata",
            json_response(StatusCode::OK, json!({"body": {"homes": [{"id": "h1"}, {"id": "h2"}]}})),
        );
        transport.respond_to(
            Method::GET,
            "/api/homestatus",
            json_response(
                StatusCode::OK,
                json!({"body": {"home": {"rooms": [{"id": "r"}], "modules": [{"id": "p", "type": "NAPlug"}]}}}),
            ),
        );

        let err = resolve_thermostat(&client).unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)), "{err:?}");
        assert_eq!(transport.requests_to("/api/homestatus").len(), 2);
    }

    #[test]
    fn failing_home_status_does_not_abort_resolution() {
        let client = authed_client();
        let transport = client.transport();
        transport.respond_to(
            Method::GET,
            "/api/homesdata",
            json_response(StatusCode::OK, json!({"body": {"homes": [{"id": "h1"}, {"id": "h2"}]}})),
        );
        transport.fail_query("/api/homestatus", "home_id", "h1", "connection refused");
        transport.respond_to_query(
            "/api/homestatus",
            "home_id",
            "h2",
            json_response(
                StatusCode::OK,
                json!({"body": {"home": {"rooms": [{"id": "r"}], "modules": [{"id": "t", "type": "NRV"}]}}}),
            ),
        );

        assert_eq!(resolve_thermostat(&client).unwrap().home_id, hid("h2"));
    }
}
