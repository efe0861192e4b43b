use crate::config::ScenarioConfig;
use crate::demand::{Flow, FlowDef};
use crate::detector::{Detector, DetectorVals};
use crate::light::{LightState, PhasePlan, TrafficLight};
use crate::link::{Link, TrafficControl};
use crate::network::{Network, NetworkDef};
use crate::vehicle::acceleration::MIN_GAP;
use crate::vehicle::routing::shortest_path;
use crate::vehicle::{Advance, Departure, Vehicle, VehicleType, VehicleVals};
use crate::{EdgeId, Error, LinkId, Result, Units, VehicleId, VehicleSet};
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Warn about the insertion backlog once it grows past this many vehicles.
const BACKLOG_WARNING: usize = 50;

/// Which lane of its first edge a vehicle departs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepartLane {
    /// The rightmost lane.
    First,
    /// A lane chosen at random.
    Random,
    /// The lane with the most free space at its start.
    #[default]
    Best,
    /// A specific lane index.
    Index(usize),
}

/// A vehicle waiting for space to enter the network.
#[derive(Clone, Debug)]
pub(crate) struct PendingVehicle {
    pub name: String,
    pub vehicle_type: String,
    pub route: Vec<EdgeId>,
    pub route_id: Option<String>,
    pub lane: DepartLane,
}

/// A vehicle which left the network, at the end of its route or by removal.
#[derive(Clone, Debug)]
pub(crate) struct ExitedVehicle {
    pub name: String,
    /// The edge the vehicle left from.
    pub destination: EdgeId,
    pub removed: bool,
}

/// What happened during a step.
#[derive(Clone, Debug, Default)]
pub(crate) struct StepEvents {
    pub entered: Vec<VehicleId>,
    pub exited: Vec<ExitedVehicle>,
}

/// The microscopic traffic model: vehicles moving through the network,
/// controlled by traffic lights and observed by detectors.
pub(crate) struct Engine {
    /// The road network.
    network: Network,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// Vehicle IDs by name.
    names: HashMap<String, VehicleId>,
    /// Traffic lights by name.
    lights: BTreeMap<String, TrafficLight>,
    /// Detectors by name.
    detectors: BTreeMap<String, Detector>,
    vehicle_types: BTreeMap<String, VehicleType>,
    /// Named routes.
    routes: BTreeMap<String, Vec<EdgeId>>,
    flows: Vec<Flow>,
    /// Vehicles waiting for space to enter the network.
    pending: VecDeque<PendingVehicle>,
    /// Vehicles removed from the network and not yet reported.
    removed: Vec<ExitedVehicle>,
    /// The set of "frozen" vehicles, which will not move.
    frozen_vehs: Vec<VehicleId>,
    rng: XorShiftRng,
    /// The length of a step in s.
    step_length: f64,
    /// The number of steps simulated.
    step: usize,
}

impl Engine {
    /// Builds the network and demand of a scenario.
    pub fn new(
        network_def: &NetworkDef,
        config: &ScenarioConfig,
        flows: &[FlowDef],
        seed: u64,
    ) -> Result<Self> {
        if !(config.step_length > 0.0) {
            return Err(Error::Config("step_length must be positive".into()));
        }
        let network = Network::from_def(network_def)?;

        let mut lights = BTreeMap::new();
        for (id, def) in &network_def.traffic_lights {
            let signals = def
                .controlled
                .iter()
                .map(|lane| network.lane(&lane.edge, lane.lane))
                .collect::<Result<Vec<_>>>()?;
            let mut light = TrafficLight::new(id, signals);
            if let Some(plan) = &def.program {
                light.set_plan(plan.clone())?;
            }
            lights.insert(id.clone(), light);
        }

        let detectors = network_def
            .detectors
            .iter()
            .map(|(id, def)| Ok((id.clone(), Detector::new(id, def, &network)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let mut vehicle_types = VehicleType::builtin();
        vehicle_types.extend(config.vehicle_types.clone());

        let mut engine = Self {
            network,
            vehicles: VehicleSet::with_key(),
            names: HashMap::new(),
            lights,
            detectors,
            vehicle_types,
            routes: BTreeMap::new(),
            flows: vec![],
            pending: VecDeque::new(),
            removed: vec![],
            frozen_vehs: vec![],
            rng: XorShiftRng::seed_from_u64(seed),
            step_length: config.step_length,
            step: 0,
        };
        for light in engine.lights.values() {
            light.apply(engine.network.links_mut());
        }
        for (id, edges) in &config.routes {
            engine.add_route(id, edges)?;
        }
        for def in flows {
            engine.add_flow(def)?;
        }
        Ok(engine)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub(crate) fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    /// The number of steps simulated so far.
    pub fn curr_step(&self) -> usize {
        self.step
    }

    /// The simulation time in s.
    pub fn time(&self) -> f64 {
        self.step as f64 * self.step_length
    }

    pub(crate) fn rng(&mut self) -> &mut XorShiftRng {
        &mut self.rng
    }

    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// The number of vehicles waiting to enter the network.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn vehicle(&self, id: VehicleId) -> &Vehicle {
        &self.vehicles[id]
    }

    /// Looks up a vehicle in the network by name.
    pub fn vehicle_id(&self, name: &str) -> Result<VehicleId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::unknown("vehicle", name))
    }

    pub fn vehicle_vals(&self, name: &str, units: Units) -> Result<VehicleVals> {
        let id = self.vehicle_id(name)?;
        Ok(self.vehicles[id].vals(&self.network, units))
    }

    pub fn has_vehicle_type(&self, name: &str) -> bool {
        self.vehicle_types.contains_key(name)
    }

    pub fn detector(&self, id: &str) -> Result<&Detector> {
        self.detectors
            .get(id)
            .ok_or_else(|| Error::unknown("detector", id))
    }

    pub fn iter_detectors(&self) -> impl Iterator<Item = &Detector> {
        self.detectors.values()
    }

    /// Gets the latest readings of a detector.
    pub fn detector_vals(&self, id: &str, units: Units) -> Result<DetectorVals> {
        let detector = self.detector(id)?;
        let reading = detector.reading();
        Ok(DetectorVals {
            detector_id: id.to_string(),
            detector_type: if detector.is_loop() {
                "induction_loop"
            } else {
                "lane_area"
            }
            .to_string(),
            edge: self.network.edge_name(detector.edge()).to_string(),
            vehicle_count: reading.vehicles.len(),
            vehicle_ids: reading.vehicles.iter().map(|v| v.name.clone()).collect(),
            halting_count: reading.halting,
            mean_speed: reading.mean_speed.map(|s| units.speed_from_ms(s)),
            occupancy: 100.0 * reading.occupancy,
        })
    }

    pub fn light(&self, id: &str) -> Result<&TrafficLight> {
        self.lights
            .get(id)
            .ok_or_else(|| Error::unknown("traffic light", id))
    }

    pub fn has_light(&self, id: &str) -> bool {
        self.lights.contains_key(id)
    }

    /// Starts running a phase plan on a traffic light.
    pub fn set_phase_plan(&mut self, id: &str, plan: PhasePlan) -> Result<()> {
        let light = self
            .lights
            .get_mut(id)
            .ok_or_else(|| Error::unknown("traffic light", id))?;
        light.set_plan(plan)?;
        light.apply(self.network.links_mut());
        Ok(())
    }

    /// Fixes a traffic light in the given state, e.g. "GGrr".
    pub fn set_light_state(&mut self, id: &str, state: &str) -> Result<()> {
        let light = self
            .lights
            .get_mut(id)
            .ok_or_else(|| Error::unknown("traffic light", id))?;
        light.set_state(state)?;
        light.apply(self.network.links_mut());
        Ok(())
    }

    /// Registers a named route, checking that its edges are connected.
    pub fn add_route(&mut self, id: &str, edges: &[String]) -> Result<()> {
        let route = self.resolve_route(edges)?;
        self.routes.insert(id.to_string(), route);
        Ok(())
    }

    /// Resolves a list of edge names, checking each leads to the next.
    pub fn resolve_route<S: AsRef<str>>(&self, edges: &[S]) -> Result<Vec<EdgeId>> {
        let route = edges
            .iter()
            .map(|e| self.network.edge_id(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if route.is_empty() {
            return Err(Error::Config("a route needs at least one edge".into()));
        }
        for pair in route.windows(2) {
            if !self.network.edge(pair[0]).successors().contains(&pair[1]) {
                return Err(Error::NoPath {
                    from: self.network.edge_name(pair[0]).to_string(),
                    to: self.network.edge_name(pair[1]).to_string(),
                });
            }
        }
        Ok(route)
    }

    pub fn route(&self, id: &str) -> Result<&[EdgeId]> {
        self.routes
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::unknown("route", id))
    }

    /// The quickest route between two edges.
    pub fn route_between(&self, origin: &str, destination: &str) -> Result<Vec<EdgeId>> {
        let src = self.network.edge_id(origin)?;
        let dst = self.network.edge_id(destination)?;
        shortest_path(&self.network, src, dst).ok_or_else(|| Error::NoPath {
            from: origin.to_string(),
            to: destination.to_string(),
        })
    }

    /// Adds a flow of vehicles.
    pub fn add_flow(&mut self, def: &FlowDef) -> Result<()> {
        let route = match (&def.route_id, &def.origin, &def.destination) {
            (Some(route_id), _, _) => self.route(route_id)?.to_vec(),
            (None, Some(origin), Some(destination)) => self.route_between(origin, destination)?,
            _ => {
                return Err(Error::Config(
                    "flows need either a route ID or an origin and destination".into(),
                ))
            }
        };
        if let Some(vtype) = def.vehicle_types.iter().find(|t| !self.has_vehicle_type(t)) {
            return Err(Error::unknown("vehicle type", vtype.as_str()));
        }
        let taken = |id: &str| self.flows.iter().any(|f| f.id() == id);
        let id = match &def.id {
            Some(id) if taken(id) => {
                return Err(Error::Config(format!("flow '{}' already exists", id)));
            }
            Some(id) => id.clone(),
            None => {
                let mut n = self.flows.len();
                while taken(&format!("flow_{}", n)) {
                    n += 1;
                }
                format!("flow_{}", n)
            }
        };
        self.flows.push(Flow::new(id, def, route)?);
        Ok(())
    }

    /// Queues a vehicle to enter the network as soon as there is space.
    pub fn queue_vehicle(&mut self, vehicle: PendingVehicle) -> Result<()> {
        if self.names.contains_key(&vehicle.name)
            || self.pending.iter().any(|p| p.name == vehicle.name)
        {
            return Err(Error::DuplicateVehicle(vehicle.name));
        }
        if !self.has_vehicle_type(&vehicle.vehicle_type) {
            return Err(Error::unknown("vehicle type", vehicle.vehicle_type));
        }
        let Some(first) = vehicle.route.first() else {
            return Err(Error::Config(format!("vehicle '{}' has no route", vehicle.name)));
        };
        if let DepartLane::Index(lane) = vehicle.lane {
            if lane >= self.network.edge(*first).lanes().len() {
                let edge = self.network.edge_name(*first);
                return Err(Error::unknown("lane", format!("{}_{}", edge, lane)));
            }
        }
        self.pending.push_back(vehicle);
        Ok(())
    }

    /// Removes a vehicle from the network, or from the insertion queue.
    /// Vehicles taken out of the network are kept for [Engine::take_removed].
    pub fn remove_vehicle(&mut self, name: &str) -> Result<()> {
        if let Some(id) = self.names.remove(name) {
            if let Some(vehicle) = self.vehicles.remove(id) {
                self.network.links_mut()[vehicle.link_id()].remove_vehicle(id);
                self.removed.push(ExitedVehicle {
                    name: name.to_string(),
                    destination: vehicle.edge(),
                    removed: true,
                });
            }
            return Ok(());
        }
        let before = self.pending.len();
        self.pending.retain(|p| p.name != name);
        if self.pending.len() == before {
            return Err(Error::unknown("vehicle", name));
        }
        Ok(())
    }

    /// The vehicles removed from the network since the last call.
    pub(crate) fn take_removed(&mut self) -> Vec<ExitedVehicle> {
        std::mem::take(&mut self.removed)
    }

    /// Sets the `frozen` attribute of a vehicle. When a vehicle is frozen,
    /// it will maximally decelerate until its velocity is zero and remain stopped
    /// until it is no longer frozen.
    pub fn set_vehicle_frozen(&mut self, vehicle_id: VehicleId, frozen: bool) {
        let idx = self.frozen_vehs.iter().position(|id| *id == vehicle_id);
        match (frozen, idx) {
            (true, None) => {
                self.frozen_vehs.push(vehicle_id);
            }
            (false, Some(idx)) => {
                self.frozen_vehs.remove(idx);
            }
            _ => {}
        }
    }

    /// Gets the `frozen` attribute of a vehicle. [Read more](Self::set_vehicle_frozen).
    pub fn get_vehicle_frozen(&self, vehicle_id: VehicleId) -> bool {
        self.frozen_vehs.iter().any(|id| *id == vehicle_id)
    }

    pub(crate) fn set_vehicle_colour(&mut self, vehicle_id: VehicleId, colour: Option<String>) {
        self.vehicles[vehicle_id].set_colour(colour);
    }

    /// Caps a vehicle's speed, in m/s.
    pub(crate) fn set_vehicle_speed_cap(&mut self, vehicle_id: VehicleId, cap: Option<f64>) {
        self.vehicles[vehicle_id].set_speed_cap(cap);
    }

    /// Sends a vehicle to a new destination edge along the quickest route.
    pub fn reroute_to(&mut self, vehicle_id: VehicleId, dst: EdgeId) -> Result<()> {
        let vehicle = &self.vehicles[vehicle_id];
        let src = vehicle.edge();
        let route = shortest_path(&self.network, src, dst).ok_or_else(|| Error::NoPath {
            from: self.network.edge_name(src).to_string(),
            to: self.network.edge_name(dst).to_string(),
        })?;
        self.vehicles[vehicle_id].set_route(route, None);
        Ok(())
    }

    /// Makes a vehicle follow a named route, joining it by the quickest path
    /// if the vehicle is not already on it.
    pub fn assign_route(&mut self, vehicle_id: VehicleId, route_id: &str) -> Result<()> {
        let route = self.route(route_id)?.to_vec();
        let src = self.vehicles[vehicle_id].edge();
        let new_route = match route.iter().position(|e| *e == src) {
            Some(idx) => route[idx..].to_vec(),
            None => {
                let mut path =
                    shortest_path(&self.network, src, route[0]).ok_or_else(|| Error::NoPath {
                        from: self.network.edge_name(src).to_string(),
                        to: self.network.edge_name(route[0]).to_string(),
                    })?;
                path.extend_from_slice(&route[1..]);
                path
            }
        };
        self.vehicles[vehicle_id].set_route(new_route, Some(route_id.to_string()));
        Ok(())
    }

    /// Advances the simulation by one step.
    pub fn step(&mut self) -> StepEvents {
        let dt = self.step_length;
        self.generate_demand();
        self.apply_accelerations();
        self.integrate(dt);
        let exited = self.advance_vehicles();
        self.update_detectors();
        let exited = self.remove_vehicles(exited);
        self.update_lights(dt);
        let entered = self.insert_pending();
        self.step += 1;
        StepEvents { entered, exited }
    }

    /// Queues the vehicles generated by the flows this step. Names already in
    /// use are skipped.
    fn generate_demand(&mut self) {
        let time = self.time();
        for flow in &mut self.flows {
            for (name, vehicle_type) in flow.step(time, self.step_length, &mut self.rng) {
                if self.names.contains_key(&name) || self.pending.iter().any(|p| p.name == name) {
                    warn!("Flow '{}' skipped vehicle '{}', the ID is taken", flow.id(), name);
                    continue;
                }
                self.pending.push_back(PendingVehicle {
                    name,
                    vehicle_type,
                    route: flow.route().to_vec(),
                    route_id: flow.route_id().map(String::from),
                    lane: DepartLane::Best,
                });
            }
        }
    }

    /// Calculates the accelerations of the vehicles.
    fn apply_accelerations(&mut self) {
        for vehicle in self.vehicles.values() {
            vehicle.begin_step();
        }
        for link in self.network.links().values() {
            let on_link = link.vehicles();
            for (idx, veh_id) in on_link.iter().enumerate() {
                let vehicle = &self.vehicles[*veh_id];
                vehicle.cruise(link.speed_limit());
                match on_link.get(idx + 1) {
                    Some(leader) => {
                        let leader = &self.vehicles[*leader];
                        vehicle.follow_vehicle(leader.pos_rear(), leader.vel());
                    }
                    None => self.apply_link_end(link, vehicle),
                }
            }
        }
        self.apply_frozen_vehicles();
    }

    /// Applies the stop line at the end of the link, and the vehicle ahead
    /// on the next link, to the frontmost vehicle on a link.
    fn apply_link_end(&self, link: &Link, vehicle: &Vehicle) {
        let length = link.length();
        if vehicle.pos_front() <= length {
            let must_stop = match link.control() {
                TrafficControl::Signal(LightState::Red) => true,
                TrafficControl::Signal(LightState::Amber) => vehicle.can_stop(length),
                _ => false,
            };
            if must_stop {
                vehicle.stop_at_line(length);
                return;
            }
        }

        if let Some(next_edge) = vehicle.next_edge() {
            let next = &self.network.links()[self.network.next_link(link.id(), next_edge)];
            vehicle.slow_for(next.speed_limit(), length);
            if let Some(leader) = next.last_vehicle() {
                let leader = &self.vehicles[leader];
                vehicle.follow_vehicle(length + leader.pos_rear(), leader.vel());
            }
        }
    }

    /// Applies a large negative acceleration to all frozen vehicles.
    fn apply_frozen_vehicles(&mut self) {
        self.frozen_vehs.retain(|vehicle_id| {
            if let Some(vehicle) = self.vehicles.get(*vehicle_id) {
                vehicle.emergency_stop();
                true
            } else {
                false
            }
        })
    }

    /// Integrates the velocities and positions of all vehicles.
    fn integrate(&mut self, dt: f64) {
        for (_, vehicle) in &mut self.vehicles {
            vehicle.integrate(dt);
        }
    }

    /// Find vehicles that have advanced their link and move them to their new link.
    /// Returns the vehicles that reached the end of their route.
    fn advance_vehicles(&mut self) -> Vec<VehicleId> {
        let mut advanced = vec![];
        let mut exited = vec![];

        for (vehicle_id, vehicle) in &mut self.vehicles {
            match vehicle.advance(&self.network) {
                Advance::Stayed => {}
                Advance::Moved { from } => advanced.push((vehicle_id, from)),
                Advance::Exited => exited.push(vehicle_id),
            }
        }

        let links = self.network.links_mut();
        for (vehicle_id, from) in advanced {
            links[from].remove_vehicle(vehicle_id);
            let to = self.vehicles[vehicle_id].link_id();
            links[to].insert_vehicle(&self.vehicles, vehicle_id);
        }
        for link in links.values_mut() {
            link.sort_vehicles(&self.vehicles);
        }

        exited
    }

    fn update_detectors(&mut self) {
        for detector in self.detectors.values_mut() {
            detector.update(&self.vehicles);
        }
    }

    /// Removes vehicles which have left the network.
    fn remove_vehicles(&mut self, ids: Vec<VehicleId>) -> Vec<ExitedVehicle> {
        ids.into_iter()
            .filter_map(|id| {
                let vehicle = self.vehicles.remove(id)?;
                self.network.links_mut()[vehicle.link_id()].remove_vehicle(id);
                self.names.remove(vehicle.name());
                Some(ExitedVehicle {
                    name: vehicle.name().to_string(),
                    destination: vehicle.destination(),
                    removed: false,
                })
            })
            .collect()
    }

    /// Updates the traffic lights.
    fn update_lights(&mut self, dt: f64) {
        for light in self.lights.values_mut() {
            light.step(dt);
            light.apply(self.network.links_mut());
        }
    }

    /// Inserts queued vehicles wherever there is space for them.
    fn insert_pending(&mut self) -> Vec<VehicleId> {
        let mut entered = vec![];
        let mut waiting = VecDeque::new();
        while let Some(pending) = self.pending.pop_front() {
            match self.try_insert(&pending) {
                Some(id) => entered.push(id),
                None => waiting.push_back(pending),
            }
        }
        if waiting.len() > BACKLOG_WARNING && self.step % 100 == 0 {
            warn!("{} vehicles are waiting to enter the network", waiting.len());
        }
        self.pending = waiting;
        entered
    }

    /// Places a vehicle at the start of its first edge, if there is space.
    fn try_insert(&mut self, pending: &PendingVehicle) -> Option<VehicleId> {
        let vtype = self.vehicle_types.get(&pending.vehicle_type)?.clone();
        let lanes = self.network.edge(pending.route[0]).lanes().to_vec();
        let candidates = match pending.lane {
            DepartLane::First => vec![lanes[0]],
            DepartLane::Index(idx) => vec![lanes[idx]],
            DepartLane::Random => lanes.choose(&mut self.rng).copied().into_iter().collect(),
            DepartLane::Best => {
                let mut lanes = lanes;
                lanes.sort_by(|a, b| self.free_space(*b).total_cmp(&self.free_space(*a)));
                lanes
            }
        };

        let speed_factor = Normal::new(1.0, vtype.speed_dev)
            .map(|distr| distr.sample(&mut self.rng).clamp(0.75, 1.25))
            .unwrap_or(1.0);

        for link_id in candidates {
            let link = &self.network.links()[link_id];
            let mut vel = f64::min(link.speed_limit() * speed_factor, vtype.max_speed);
            if let Some(leader) = link.last_vehicle() {
                vel = f64::min(vel, self.vehicles[leader].vel());
            }
            let required = vtype.length + MIN_GAP + vel * vtype.time_headway;
            if self.free_space(link_id) < required {
                continue;
            }

            let departure = Departure {
                name: pending.name.clone(),
                vehicle_type: pending.vehicle_type.clone(),
                route: pending.route.clone(),
                route_id: pending.route_id.clone(),
                link: link_id,
                vel,
                time: self.time(),
                speed_factor,
            };
            let vehicle_id = self.vehicles.insert(Vehicle::new(&vtype, departure));
            self.network.links_mut()[link_id].insert_vehicle(&self.vehicles, vehicle_id);
            self.names.insert(pending.name.clone(), vehicle_id);
            debug!("Inserted vehicle '{}'", pending.name);
            return Some(vehicle_id);
        }
        None
    }

    /// The distance from the start of a link to the rear of its last vehicle.
    fn free_space(&self, link_id: LinkId) -> f64 {
        match self.network.links()[link_id].last_vehicle() {
            Some(id) => self.vehicles[id].pos_rear(),
            None => f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::test::corridor;

    fn engine() -> Engine {
        let config = ScenarioConfig {
            step_length: 0.5,
            ..Default::default()
        };
        Engine::new(&corridor(), &config, &[], 7).unwrap()
    }

    fn pending(engine: &Engine, name: &str, route: &[&str]) -> PendingVehicle {
        PendingVehicle {
            name: name.to_string(),
            vehicle_type: "cars".to_string(),
            route: route
                .iter()
                .map(|e| engine.network().edge_id(e).unwrap())
                .collect(),
            route_id: None,
            lane: DepartLane::First,
        }
    }

    #[test]
    fn vehicle_travels_route_and_exits() {
        let mut engine = engine();
        let vehicle = pending(&engine, "v", &["a", "b", "c"]);
        engine.queue_vehicle(vehicle).unwrap();

        let events = engine.step();
        assert_eq!(events.entered.len(), 1);
        assert_eq!(engine.vehicle_count(), 1);

        let mut exited = vec![];
        for _ in 0..400 {
            exited.extend(engine.step().exited);
        }
        assert_eq!(exited.len(), 1);
        assert_eq!(exited[0].name, "v");
        assert_eq!(exited[0].destination, engine.network().edge_id("c").unwrap());
        assert!(!exited[0].removed);
        assert_eq!(engine.vehicle_count(), 0);
        assert!(engine.vehicle_id("v").is_err());
    }

    #[test]
    fn routes_must_be_connected() {
        let engine = engine();
        assert_eq!(engine.resolve_route(&["a", "b", "c"]).unwrap().len(), 3);
        assert!(matches!(
            engine.resolve_route(&["a", "c"]),
            Err(Error::NoPath { .. })
        ));
        assert!(engine.resolve_route::<&str>(&[]).is_err());
        assert!(engine.resolve_route(&["a", "nowhere"]).is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut engine = engine();
        engine.queue_vehicle(pending(&engine, "v", &["a"])).unwrap();
        let again = pending(&engine, "v", &["a"]);
        assert!(matches!(
            engine.queue_vehicle(again),
            Err(Error::DuplicateVehicle(_))
        ));
    }

    #[test]
    fn removed_vehicles_are_reported_once() {
        let mut engine = engine();
        engine.queue_vehicle(pending(&engine, "v", &["a", "b", "c"])).unwrap();
        engine.queue_vehicle(pending(&engine, "w", &["a", "b", "c"])).unwrap();
        engine.step();
        engine.remove_vehicle("v").unwrap();
        engine.remove_vehicle("w").unwrap();

        let removed = engine.take_removed();
        assert_eq!(removed[0].name, "v");
        assert_eq!(removed[0].destination, engine.network().edge_id("a").unwrap());
        assert!(removed.iter().all(|v| v.removed));
        assert!(engine.take_removed().is_empty());
        assert!(engine.remove_vehicle("v").is_err());
    }

    fn flow(id: Option<&str>) -> FlowDef {
        FlowDef {
            id: id.map(String::from),
            route_id: None,
            origin: Some("a".into()),
            destination: Some("c".into()),
            vehicle_types: vec!["cars".into()],
            vehicle_type_dists: None,
            rate: 3600.0,
            start_time: 0.0,
            end_time: None,
        }
    }

    #[test]
    fn flow_ids_are_unique() {
        let mut engine = engine();
        engine.add_flow(&flow(Some("f"))).unwrap();
        assert!(matches!(engine.add_flow(&flow(Some("f"))), Err(Error::Config(_))));

        engine.add_flow(&flow(Some("flow_2"))).unwrap();
        engine.add_flow(&flow(None)).unwrap();
        assert!(engine.add_flow(&flow(Some("flow_3"))).is_err());
    }

    #[test]
    fn generated_vehicles_skip_taken_ids() {
        let mut engine = engine();
        engine.queue_vehicle(pending(&engine, "f.0", &["a", "b"])).unwrap();
        engine.add_flow(&flow(Some("f"))).unwrap();
        for _ in 0..6 {
            engine.step();
        }
        let mut names: Vec<_> = engine.iter_vehicles().map(|v| v.name().to_string()).collect();
        names.sort();
        let count = names.len();
        names.dedup();
        assert_eq!(names.len(), count);
        assert!(names.contains(&"f.1".to_string()));
        let manual = engine.vehicle_id("f.0").unwrap();
        assert_eq!(engine.vehicle(manual).destination(), engine.network().edge_id("b").unwrap());
    }

    #[test]
    fn frozen_vehicle_stops() {
        let mut engine = engine();
        engine.queue_vehicle(pending(&engine, "v", &["a", "b", "c"])).unwrap();
        for _ in 0..10 {
            engine.step();
        }
        let id = engine.vehicle_id("v").unwrap();
        assert!(engine.vehicle(id).vel() > 1.0);
        engine.set_vehicle_frozen(id, true);
        for _ in 0..20 {
            engine.step();
        }
        assert!(engine.vehicle(id).has_stopped());
        engine.set_vehicle_frozen(id, false);
        for _ in 0..10 {
            engine.step();
        }
        assert!(engine.vehicle(id).vel() > 1.0);
    }

    #[test]
    fn reroutes_onto_reachable_destination() {
        let mut engine = engine();
        engine.queue_vehicle(pending(&engine, "v", &["a", "b"])).unwrap();
        engine.step();
        let id = engine.vehicle_id("v").unwrap();
        let c = engine.network().edge_id("c").unwrap();
        engine.reroute_to(id, c).unwrap();
        assert_eq!(engine.vehicle(id).destination(), c);
        assert_eq!(engine.vehicle(id).origin(), engine.network().edge_id("a").unwrap());

        let s = engine.network().edge_id("s").unwrap();
        assert!(engine.reroute_to(id, s).is_err());
    }
}
