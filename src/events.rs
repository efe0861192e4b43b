use crate::engine::Engine;
use crate::{Error, LinkId, Result, Units};
use log::{debug, warn};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A scheduled change to edges and vehicles, with times in s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDef {
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<EdgeEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicles: Option<VehicleEffect>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeEffect {
    /// Edges or lanes.
    pub edge_ids: Vec<String>,
    #[serde(default)]
    pub actions: EdgeActions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeActions {
    /// Speed limit while the event is active, in the simulation's units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
}

/// The vehicles affected by an event: given by ID, or those on `locations`
/// when the event starts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
    /// How long vehicles stay affected, in s; until the event ends by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_duration: Option<f64>,
    #[serde(default)]
    pub actions: VehicleActions,
    /// Remove the vehicles from the network when the effect ends.
    #[serde(default)]
    pub remove_affected_vehicles: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleActions {
    /// Speed cap in the simulation's units. Zero stops the vehicles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

/// Reads event definitions from a JSON file.
pub fn load_events(path: impl AsRef<Path>) -> Result<BTreeMap<String, EventDef>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// An incident: vehicles stopped in place for a while, optionally with their
/// edges slowed down.
#[derive(Clone, Debug, PartialEq)]
pub struct IncidentSpec {
    /// In s.
    pub duration: f64,
    /// The vehicles to stop; random vehicles are chosen when `None`.
    pub vehicle_ids: Option<Vec<String>>,
    /// How many random vehicles to stop.
    pub n_vehicles: usize,
    /// Speed limit on the affected edges, in the simulation's units.
    pub edge_speed: Option<f64>,
    pub highlight: Option<String>,
    pub incident_id: Option<String>,
}

impl IncidentSpec {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            vehicle_ids: None,
            n_vehicles: 1,
            edge_speed: None,
            highlight: Some("FF0000".into()),
            incident_id: None,
        }
    }

    pub fn vehicles<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.vehicle_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn n_vehicles(mut self, n: usize) -> Self {
        self.n_vehicles = n;
        self
    }

    pub fn edge_speed(mut self, speed: f64) -> Self {
        self.edge_speed = Some(speed);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.incident_id = Some(id.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Active,
    Completed,
}

/// An event and what happened to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event: EventDef,
    pub status: EventStatus,
    pub affected_vehicles: Vec<String>,
}

#[derive(Clone, Debug)]
struct Event {
    def: EventDef,
    status: EventStatus,
    /// The lanes slowed down by the event.
    links: Vec<LinkId>,
    affected: Vec<String>,
    released: bool,
}

/// Starts and ends events as simulation time passes.
#[derive(Clone, Debug, Default)]
pub(crate) struct EventScheduler {
    events: BTreeMap<String, Event>,
    incidents: usize,
}

impl EventScheduler {
    /// Schedules an event, checking its edges exist.
    pub fn add(&mut self, id: &str, def: EventDef, engine: &Engine) -> Result<()> {
        if self.events.contains_key(id) {
            return Err(Error::Config(format!("event '{}' already exists", id)));
        }
        if !(def.end_time > def.start_time) {
            return Err(Error::Config(format!("event '{}' must end after it starts", id)));
        }
        let mut links = vec![];
        for edge in def.edges.iter().flat_map(|e| &e.edge_ids) {
            links.extend(engine.network().resolve_geometry(edge)?);
        }
        self.events.insert(
            id.to_string(),
            Event {
                def,
                status: EventStatus::Scheduled,
                links,
                affected: vec![],
                released: false,
            },
        );
        Ok(())
    }

    pub fn defs(&self) -> BTreeMap<String, EventDef> {
        self.events
            .iter()
            .map(|(id, event)| (id.clone(), event.def.clone()))
            .collect()
    }

    pub fn data(&self) -> BTreeMap<String, EventData> {
        self.events
            .iter()
            .map(|(id, event)| {
                let data = EventData {
                    event: event.def.clone(),
                    status: event.status,
                    affected_vehicles: event.affected.clone(),
                };
                (id.clone(), data)
            })
            .collect()
    }

    /// Builds and starts an incident right away, returning its event ID.
    pub fn cause_incident(
        &mut self,
        spec: &IncidentSpec,
        engine: &mut Engine,
        units: Units,
    ) -> Result<String> {
        let vehicle_ids = match &spec.vehicle_ids {
            Some(ids) => {
                for id in ids {
                    engine.vehicle_id(id)?;
                }
                ids.clone()
            }
            None => {
                let mut candidates: Vec<String> = engine
                    .iter_vehicles()
                    .map(|v| v.name().to_string())
                    .collect();
                candidates.sort();
                let chosen: Vec<String> = candidates
                    .choose_multiple(engine.rng(), spec.n_vehicles)
                    .cloned()
                    .collect();
                if chosen.len() < spec.n_vehicles {
                    warn!(
                        "Incident wanted {} vehicles but only {} are in the network",
                        spec.n_vehicles,
                        chosen.len()
                    );
                }
                chosen
            }
        };
        if vehicle_ids.is_empty() {
            return Err(Error::NoIncidentVehicles);
        }

        let time = engine.time();
        let edges = match spec.edge_speed {
            Some(speed) => {
                let mut edge_ids = vec![];
                for name in &vehicle_ids {
                    let vehicle = engine.vehicle(engine.vehicle_id(name)?);
                    let edge = engine.network().edge_name(vehicle.edge()).to_string();
                    if !edge_ids.contains(&edge) {
                        edge_ids.push(edge);
                    }
                }
                Some(EdgeEffect {
                    edge_ids,
                    actions: EdgeActions {
                        max_speed: Some(speed),
                    },
                })
            }
            None => None,
        };
        let def = EventDef {
            start_time: time,
            end_time: time + spec.duration,
            edges,
            vehicles: Some(VehicleEffect {
                vehicle_ids: Some(vehicle_ids),
                actions: VehicleActions {
                    speed: Some(0.0),
                    highlight: spec.highlight.clone(),
                },
                ..VehicleEffect::default()
            }),
        };

        let id = match &spec.incident_id {
            Some(id) => id.clone(),
            None => loop {
                let id = format!("incident_{}", self.incidents);
                self.incidents += 1;
                if !self.events.contains_key(&id) {
                    break id;
                }
            },
        };
        self.add(&id, def, engine)?;
        self.update(engine, units)?;
        Ok(id)
    }

    /// Starts and ends events due at the current simulation time.
    pub fn update(&mut self, engine: &mut Engine, units: Units) -> Result<()> {
        let time = engine.time();
        for (id, event) in &mut self.events {
            if event.status == EventStatus::Scheduled && time >= event.def.start_time {
                debug!("Event '{}' started", id);
                start(id, event, engine, units)?;
                event.status = EventStatus::Active;
            }
            if event.status != EventStatus::Active {
                continue;
            }
            if let Some(effect) = &event.def.vehicles {
                let duration = effect.effect_duration.unwrap_or(f64::INFINITY);
                if !event.released && time >= event.def.start_time + duration {
                    release(event, engine)?;
                }
            }
            if time >= event.def.end_time {
                debug!("Event '{}' ended", id);
                for link in &event.links {
                    engine.network_mut().clear_lane_speed_limit(*link, &owner(id));
                }
                if !event.released {
                    release(event, engine)?;
                }
                event.status = EventStatus::Completed;
            }
        }
        Ok(())
    }
}

/// The owner of an event's speed limit overrides, kept apart from controller IDs.
fn owner(id: &str) -> String {
    format!("event:{}", id)
}

fn start(id: &str, event: &mut Event, engine: &mut Engine, units: Units) -> Result<()> {
    if let Some(max_speed) = event.def.edges.as_ref().and_then(|e| e.actions.max_speed) {
        let limit = units.speed_to_ms(max_speed);
        for link in &event.links {
            engine.network_mut().set_lane_speed_limit(*link, &owner(id), limit);
        }
    }

    let Some(effect) = &event.def.vehicles else {
        event.released = true;
        return Ok(());
    };
    let names = match (&effect.vehicle_ids, &effect.locations) {
        (Some(ids), _) => ids.clone(),
        (None, Some(locations)) => {
            let mut names = vec![];
            for location in locations {
                for link in engine.network().resolve_geometry(location)? {
                    for id in engine.network().links()[link].vehicles() {
                        names.push(engine.vehicle(*id).name().to_string());
                    }
                }
            }
            names
        }
        (None, None) => vec![],
    };

    for name in names {
        let Ok(vehicle_id) = engine.vehicle_id(&name) else {
            warn!("Event vehicle '{}' is not in the network", name);
            continue;
        };
        match effect.actions.speed {
            Some(speed) if speed <= 0.0 => engine.set_vehicle_frozen(vehicle_id, true),
            Some(speed) => engine.set_vehicle_speed_cap(vehicle_id, Some(units.speed_to_ms(speed))),
            None => {}
        }
        if effect.actions.highlight.is_some() {
            engine.set_vehicle_colour(vehicle_id, effect.actions.highlight.clone());
        }
        event.affected.push(name);
    }
    Ok(())
}

/// Ends the effect on the event's vehicles still in the network.
fn release(event: &mut Event, engine: &mut Engine) -> Result<()> {
    event.released = true;
    let remove = event
        .def
        .vehicles
        .as_ref()
        .map_or(false, |v| v.remove_affected_vehicles);
    for name in &event.affected {
        let Ok(vehicle_id) = engine.vehicle_id(name) else {
            continue;
        };
        if remove {
            engine.remove_vehicle(name)?;
            continue;
        }
        engine.set_vehicle_frozen(vehicle_id, false);
        engine.set_vehicle_speed_cap(vehicle_id, None);
        engine.set_vehicle_colour(vehicle_id, None);
    }
    Ok(())
}
