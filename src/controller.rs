use crate::engine::Engine;
use crate::simulation::Simulation;
use crate::util::mean;
use crate::{Error, LinkId, Result, Units};
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn full_diversion() -> f64 {
    1.0
}

/// Where a route guidance controller sends the vehicles it diverts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    /// An edge, reached by the quickest route.
    Destination(String),
    /// A named route.
    Route(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RgParams {
    /// Detectors or edges where vehicles are diverted.
    pub detector_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_route: Option<String>,
    /// The fraction of detected vehicles to divert.
    #[serde(default = "full_diversion")]
    pub diversion_pct: f64,
    /// Colour given to diverted vehicles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    /// Only divert vehicles of these types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<Vec<String>>,
}

impl RgParams {
    pub fn target(&self) -> Result<RouteTarget> {
        match (&self.new_destination, &self.new_route) {
            (Some(edge), None) => Ok(RouteTarget::Destination(edge.clone())),
            (None, Some(route)) => Ok(RouteTarget::Route(route.clone())),
            _ => Err(Error::Config(
                "route guidance needs exactly one of new_destination and new_route".into(),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VslParams {
    /// Edges or lanes (`<edge>_<index>`) whose speed limit is controlled.
    pub geometry_ids: Vec<String>,
}

/// A controller definition, tagged by `"type": "RG" | "VSL"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControllerParams {
    #[serde(rename = "RG")]
    RouteGuidance(RgParams),
    #[serde(rename = "VSL")]
    SpeedLimit(VslParams),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Toggle {
    pub time: f64,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diversion {
    pub time: f64,
    pub vehicle_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitChange {
    pub time: f64,
    /// `None` when the default limits were restored.
    pub speed_limit: Option<f64>,
}

/// Everything recorded about a controller, speeds in the simulation's units.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerData {
    /// `RG` or `VSL`.
    pub controller_type: String,
    pub activation_times: Vec<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diverted: Option<Vec<Diversion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_limits: Option<Vec<LimitChange>>,
    /// Mean speed on the controlled geometry per recorded step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_speeds: Option<Vec<Option<f64>>>,
}

#[derive(Clone, Debug)]
enum Kind {
    RouteGuidance {
        target: RouteTarget,
        /// Vehicles already considered for diversion.
        seen: HashSet<String>,
    },
    SpeedLimit {
        links: Vec<LinkId>,
        /// The last limit set, in m/s.
        limit: Option<f64>,
    },
}

/// A route guidance or variable speed limit controller.
#[derive(Clone, Debug)]
pub(crate) struct Controller {
    id: String,
    params: ControllerParams,
    kind: Kind,
    active: bool,
    units: Units,
    data: ControllerData,
}

impl Controller {
    pub fn new(id: &str, params: ControllerParams, engine: &Engine, units: Units) -> Result<Self> {
        let (kind, data) = match &params {
            ControllerParams::RouteGuidance(rg) => {
                let target = rg.target()?;
                for id in &rg.detector_ids {
                    if engine.detector(id).is_err() && !engine.network().has_edge(id) {
                        return Err(Error::unknown("detector or edge", id.as_str()));
                    }
                }
                match &target {
                    RouteTarget::Destination(edge) => {
                        engine.network().edge_id(edge)?;
                    }
                    RouteTarget::Route(route) => {
                        engine.route(route)?;
                    }
                }
                if !(0.0..=1.0).contains(&rg.diversion_pct) {
                    return Err(Error::Config(format!(
                        "diversion_pct of '{}' must be within [0, 1]",
                        id
                    )));
                }
                let kind = Kind::RouteGuidance {
                    target,
                    seen: HashSet::new(),
                };
                let data = ControllerData {
                    controller_type: "RG".into(),
                    diverted: Some(vec![]),
                    ..ControllerData::default()
                };
                (kind, data)
            }
            ControllerParams::SpeedLimit(vsl) => {
                let mut links = vec![];
                for geometry in &vsl.geometry_ids {
                    links.extend(engine.network().resolve_geometry(geometry)?);
                }
                let kind = Kind::SpeedLimit { links, limit: None };
                let data = ControllerData {
                    controller_type: "VSL".into(),
                    speed_limits: Some(vec![]),
                    avg_speeds: Some(vec![]),
                    ..ControllerData::default()
                };
                (kind, data)
            }
        };
        Ok(Self {
            id: id.to_string(),
            params,
            kind,
            active: false,
            units,
            data,
        })
    }

    pub fn params(&self) -> &ControllerParams {
        &self.params
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn data(&self) -> &ControllerData {
        &self.data
    }

    fn toggle(&mut self, time: f64, active: bool) {
        debug!(
            "Controller '{}' {}",
            self.id,
            if active { "activated" } else { "deactivated" }
        );
        self.active = active;
        self.data.activation_times.push(Toggle { time, active });
    }

    /// Starts the controller. A speed limit controller reapplies its last limit.
    pub fn activate(&mut self, engine: &mut Engine, time: f64) -> Result<()> {
        if let Kind::SpeedLimit { limit, .. } = &self.kind {
            let limit = limit.ok_or_else(|| Error::UnsupportedOperation {
                id: self.id.clone(),
                operation: "activation before a speed limit is set",
            })?;
            return self.apply_limit(engine, time, limit);
        }
        if !self.active {
            self.toggle(time, true);
        }
        Ok(())
    }

    /// Stops the controller. A speed limit controller drops its limit overrides.
    pub fn deactivate(&mut self, engine: &mut Engine, time: f64) {
        if let Kind::SpeedLimit { links, .. } = &self.kind {
            for link in links {
                engine.network_mut().clear_lane_speed_limit(*link, &self.id);
            }
            if let Some(limits) = &mut self.data.speed_limits {
                limits.push(LimitChange {
                    time,
                    speed_limit: None,
                });
            }
        }
        if self.active {
            self.toggle(time, false);
        }
    }

    /// Sets and applies a speed limit given in the simulation's units.
    pub fn set_speed_limit(&mut self, engine: &mut Engine, time: f64, limit: f64) -> Result<()> {
        if !(limit >= 0.0) {
            return Err(Error::Config(format!("invalid speed limit {}", limit)));
        }
        let limit = self.units.speed_to_ms(limit);
        self.apply_limit(engine, time, limit)
    }

    fn apply_limit(&mut self, engine: &mut Engine, time: f64, limit_ms: f64) -> Result<()> {
        let Kind::SpeedLimit { links, limit } = &mut self.kind else {
            return Err(Error::UnsupportedOperation {
                id: self.id.clone(),
                operation: "speed limits",
            });
        };
        *limit = Some(limit_ms);
        for link in links.iter() {
            engine.network_mut().set_lane_speed_limit(*link, &self.id, limit_ms);
        }
        if let Some(limits) = &mut self.data.speed_limits {
            limits.push(LimitChange {
                time,
                speed_limit: Some(self.units.speed_from_ms(limit_ms)),
            });
        }
        if !self.active {
            self.toggle(time, true);
        }
        Ok(())
    }

    /// Updates the controller after a step.
    pub fn update(&mut self, engine: &mut Engine, time: f64, record: bool) -> Result<()> {
        match &mut self.kind {
            Kind::RouteGuidance { target, seen } => {
                if !self.active {
                    return Ok(());
                }
                let ControllerParams::RouteGuidance(params) = &self.params else {
                    return Ok(());
                };
                for (name, vehicle_type) in detected(engine, &params.detector_ids)? {
                    if !seen.insert(name.clone()) {
                        continue;
                    }
                    if let Some(types) = &params.vehicle_type {
                        if !types.contains(&vehicle_type) {
                            continue;
                        }
                    }
                    if !engine.rng().gen_bool(params.diversion_pct) {
                        continue;
                    }
                    let Ok(vehicle_id) = engine.vehicle_id(&name) else {
                        continue;
                    };
                    let result = match target {
                        RouteTarget::Destination(edge) => engine
                            .network()
                            .edge_id(edge)
                            .and_then(|dst| engine.reroute_to(vehicle_id, dst)),
                        RouteTarget::Route(route) => engine.assign_route(vehicle_id, route),
                    };
                    if let Err(err) = result {
                        warn!("Controller '{}' could not divert '{}': {}", self.id, name, err);
                        continue;
                    }
                    if params.highlight.is_some() {
                        engine.set_vehicle_colour(vehicle_id, params.highlight.clone());
                    }
                    if let Some(diverted) = &mut self.data.diverted {
                        diverted.push(Diversion {
                            time,
                            vehicle_id: name,
                        });
                    }
                }
            }
            Kind::SpeedLimit { links, .. } => {
                if record {
                    let network = engine.network();
                    let speeds = links
                        .iter()
                        .flat_map(|link| network.links()[*link].vehicles())
                        .map(|id| engine.vehicle(*id).vel());
                    let speed = mean(speeds).map(|s| self.units.speed_from_ms(s));
                    if let Some(avg_speeds) = &mut self.data.avg_speeds {
                        avg_speeds.push(speed);
                    }
                }
            }
        }
        Ok(())
    }
}

/// The `(name, vehicle type)` of vehicles seen at detectors, or on edges, this step.
fn detected(engine: &Engine, ids: &[String]) -> Result<Vec<(String, String)>> {
    let mut vehicles = vec![];
    for id in ids {
        if let Ok(detector) = engine.detector(id) {
            vehicles.extend(
                detector
                    .reading()
                    .vehicles
                    .iter()
                    .map(|v| (v.name.clone(), v.vehicle_type.clone())),
            );
            continue;
        }
        let network = engine.network();
        let edge = network.edge(network.edge_id(id)?);
        for link in edge.lanes() {
            vehicles.extend(network.links()[*link].vehicles().iter().map(|v| {
                let vehicle = engine.vehicle(*v);
                (vehicle.name().to_string(), vehicle.vehicle_type().to_string())
            }));
        }
    }
    Ok(vehicles)
}

/// Operates a controller of a running simulation.
pub struct ControllerHandle<'a> {
    sim: &'a mut Simulation,
    id: String,
}

impl<'a> ControllerHandle<'a> {
    pub(crate) fn new(sim: &'a mut Simulation, id: &str) -> Self {
        Self {
            sim,
            id: id.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn activate(&mut self) -> Result<()> {
        let (controller, engine, time) = self.sim.controller_parts(&self.id)?;
        controller.activate(engine, time)
    }

    pub fn deactivate(&mut self) -> Result<()> {
        let (controller, engine, time) = self.sim.controller_parts(&self.id)?;
        controller.deactivate(engine, time);
        Ok(())
    }

    /// Sets the limit of a speed limit controller, in the simulation's units.
    pub fn set_speed_limit(&mut self, limit: f64) -> Result<()> {
        let (controller, engine, time) = self.sim.controller_parts(&self.id)?;
        controller.set_speed_limit(engine, time, limit)
    }

    pub fn is_active(&self) -> Result<bool> {
        self.sim.controller_active(&self.id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_params() {
        let rg: ControllerParams = serde_json::from_value(json!({
            "type": "RG",
            "detector_ids": ["d"],
            "new_destination": "out",
            "highlight": "00FF00"
        }))
        .unwrap();
        let ControllerParams::RouteGuidance(rg) = rg else {
            panic!("expected route guidance");
        };
        assert_eq!(rg.diversion_pct, 1.0);
        assert_eq!(rg.target().unwrap(), RouteTarget::Destination("out".into()));

        let vsl: ControllerParams =
            serde_json::from_value(json!({"type": "VSL", "geometry_ids": ["a", "b_0"]})).unwrap();
        assert!(matches!(vsl, ControllerParams::SpeedLimit(_)));
    }

    #[test]
    fn needs_one_target() {
        let rg = RgParams {
            detector_ids: vec![],
            new_destination: Some("a".into()),
            new_route: Some("r".into()),
            diversion_pct: 1.0,
            highlight: None,
            vehicle_type: None,
        };
        assert!(rg.target().is_err());
    }
}
