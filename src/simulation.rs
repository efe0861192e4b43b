use crate::config::{random_seed, ScenarioConfig, StartOptions};
use crate::controller::{Controller, ControllerHandle, ControllerParams};
use crate::data::{DetectorSeries, SimData, Trip};
use crate::demand::{self, FlowDef};
use crate::detector::DetectorVals;
use crate::engine::{Engine, PendingVehicle, StepEvents};
use crate::events::{self, EventDef, EventScheduler, IncidentSpec};
use crate::junction::{metering_plan, JunctionParams, MeterTiming, TrackedJunction};
use crate::light::PhasePlan;
use crate::objects::SimObjects;
use crate::summary::Summary;
use crate::tracking::TrackedEdge;
use crate::vehicle::VehicleVals;
use crate::{Error, Result, Units};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::Path;

pub use crate::engine::DepartLane;

/// A function called for every vehicle entering or leaving the network.
pub type VehicleCallback = Box<dyn FnMut(&Simulation, &VehicleEvent)>;

/// Identifies a registered vehicle callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(usize);

/// A vehicle entering or leaving the network. Only `curr_step` and
/// `vehicle_id` are set for vehicles leaving it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VehicleEvent {
    pub curr_step: usize,
    pub vehicle_id: String,
    pub route_id: Option<String>,
    pub vehicle_type: Option<String>,
    /// In s.
    pub departure: Option<f64>,
    pub origin: Option<String>,
    pub destination: Option<String>,
}

/// How a new vehicle finds its way through the network.
#[derive(Clone, Debug, PartialEq)]
pub enum Routing {
    /// A named route.
    Route(String),
    /// The quickest route between an origin and a destination edge.
    Between(String, String),
    /// An explicit list of connected edges.
    Edges(Vec<String>),
}

/// A vehicle to add to the network.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleSpec {
    pub vehicle_id: String,
    pub vehicle_type: String,
    pub routing: Routing,
    pub origin_lane: DepartLane,
}

impl VehicleSpec {
    pub fn new(vehicle_id: impl Into<String>, vehicle_type: impl Into<String>, routing: Routing) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            vehicle_type: vehicle_type.into(),
            routing,
            origin_lane: DepartLane::default(),
        }
    }

    pub fn origin_lane(mut self, lane: DepartLane) -> Self {
        self.origin_lane = lane;
        self
    }
}

/// A traffic simulation with junction tracking, ramp metering, controllers,
/// events and data collection on top.
pub struct Simulation {
    /// The running model; `None` before the simulation starts and after it ends.
    engine: Option<Engine>,
    ended: bool,
    units: Units,
    individual_vehicle_data: bool,
    /// The number of steps simulated.
    step: usize,
    junctions: BTreeMap<String, TrackedJunction>,
    /// The phase plans set on each junction.
    phases: BTreeMap<String, PhasePlan>,
    controllers: BTreeMap<String, Controller>,
    tracked_edges: BTreeMap<String, TrackedEdge>,
    events: EventScheduler,
    /// Routes added after the start, as edge names.
    routes: BTreeMap<String, Vec<String>>,
    in_callbacks: Vec<(CallbackId, VehicleCallback)>,
    out_callbacks: Vec<(CallbackId, VehicleCallback)>,
    next_callback: usize,
    /// Network-wide, detector and trip data; everything else is gathered
    /// from the tracked objects on demand.
    data: SimData,
    recording: bool,
}

impl Simulation {
    /// Creates a simulation for a named scenario.
    pub fn new(scenario_name: &str, scenario_desc: &str) -> Self {
        Self {
            engine: None,
            ended: false,
            units: Units::default(),
            individual_vehicle_data: false,
            step: 0,
            junctions: BTreeMap::new(),
            phases: BTreeMap::new(),
            controllers: BTreeMap::new(),
            tracked_edges: BTreeMap::new(),
            events: EventScheduler::default(),
            routes: BTreeMap::new(),
            in_callbacks: vec![],
            out_callbacks: vec![],
            next_callback: 0,
            data: SimData {
                scenario_name: scenario_name.to_string(),
                scenario_desc: scenario_desc.to_string(),
                ..SimData::default()
            },
            recording: false,
        }
    }

    /// Starts the simulation from the scenario file in `opts`.
    pub fn start(&mut self, opts: &StartOptions) -> Result<()> {
        let config = ScenarioConfig::load(&opts.config_file)?;
        let base_dir = opts
            .config_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        self.start_with_config(&config, &base_dir, opts)
    }

    /// Starts the simulation from a scenario already in memory. Relative
    /// paths in the scenario are resolved against `base_dir`.
    pub fn start_with_config(
        &mut self,
        config: &ScenarioConfig,
        base_dir: &Path,
        opts: &StartOptions,
    ) -> Result<()> {
        if self.engine.is_some() || self.ended {
            return Err(Error::AlreadyStarted);
        }
        if opts.gui {
            warn!("No graphical interface is available, running headless");
        }
        let seed = opts.seed.unwrap_or_else(random_seed);
        let network = config.network_def(base_dir)?;
        let flows = config.all_flows(base_dir)?;
        let engine = Engine::new(&network, config, &flows, seed)?;

        self.units = opts.units;
        self.individual_vehicle_data = opts.get_individual_vehicle_data;
        self.data.sim_start = Some(chrono::Local::now().to_rfc3339());
        self.data.step_length = engine.step_length();
        self.data.units = opts.units;
        self.data.seed = Some(seed);
        for detector in engine.iter_detectors() {
            let series = DetectorSeries {
                detector_type: if detector.is_loop() {
                    "induction_loop"
                } else {
                    "lane_area"
                }
                .to_string(),
                edge: engine.network().edge_name(detector.edge()).to_string(),
                ..DetectorSeries::default()
            };
            self.data.detectors.insert(detector.id().to_string(), series);
        }
        info!(
            "Started '{}' with {} edges, seed {}",
            self.data.scenario_name,
            engine.network().iter_edges().count(),
            seed
        );
        self.engine = Some(engine);
        Ok(())
    }

    fn engine(&self) -> Result<&Engine> {
        running(&self.engine, self.ended)
    }

    fn engine_mut(&mut self) -> Result<&mut Engine> {
        running_mut(&mut self.engine, self.ended)
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Adds the flows in a demand CSV file.
    pub fn load_demand(&mut self, path: impl AsRef<Path>) -> Result<()> {
        for flow in demand::load_csv(path)? {
            self.add_demand(&flow)?;
        }
        Ok(())
    }

    pub fn add_demand(&mut self, flow: &FlowDef) -> Result<()> {
        self.engine_mut()?.add_flow(flow)
    }

    /// Starts tracking junctions. Meters with an `init_rate` start metering at once.
    pub fn add_tracked_junctions(&mut self, junctions: BTreeMap<String, JunctionParams>) -> Result<()> {
        for (id, params) in junctions {
            let init_rate = params.meter_params.as_ref().and_then(|m| m.init_rate);
            let junction = TrackedJunction::new(&id, params, self.engine()?)?;
            self.junctions.insert(id.clone(), junction);
            if let Some(rate) = init_rate {
                self.set_tl_metering_rate(&id, rate)?;
            }
        }
        Ok(())
    }

    /// Sets junction phase plans, restarting them from their first phase.
    /// With `overwrite`, the given plans replace every stored plan. Otherwise
    /// only the given junctions change, and an empty `phases` or `times`
    /// keeps the junction's current one.
    pub fn set_phases(&mut self, plans: BTreeMap<String, PhasePlan>, overwrite: bool) -> Result<()> {
        let mut merged = BTreeMap::new();
        for (id, plan) in plans {
            let plan = match self.phases.get(&id) {
                Some(current) if !overwrite => PhasePlan {
                    phases: if plan.phases.is_empty() {
                        current.phases.clone()
                    } else {
                        plan.phases
                    },
                    times: if plan.times.is_empty() {
                        current.times.clone()
                    } else {
                        plan.times
                    },
                },
                _ => plan,
            };
            let light = self.engine()?.light(&id)?;
            plan.parse(&id, light.num_signals())?;
            merged.insert(id, plan);
        }

        if overwrite {
            self.phases.clear();
        }
        for (id, plan) in merged {
            self.engine_mut()?.set_phase_plan(&id, plan.clone())?;
            self.phases.insert(id, plan);
        }
        Ok(())
    }

    /// Fixes a junction's signals in a state such as `"GGrr"`.
    pub fn set_tl_colour(&mut self, junction_id: &str, state: &str) -> Result<()> {
        self.engine_mut()?.set_light_state(junction_id, state)?;
        self.phases.remove(junction_id);
        Ok(())
    }

    /// Sets the rate of a ramp meter in veh/h with the default signal timings,
    /// returning the rate applied after clamping.
    pub fn set_tl_metering_rate(&mut self, meter_id: &str, rate: f64) -> Result<f64> {
        self.set_tl_metering_rate_with(meter_id, rate, &MeterTiming::default())
    }

    pub fn set_tl_metering_rate_with(
        &mut self,
        meter_id: &str,
        rate: f64,
        timing: &MeterTiming,
    ) -> Result<f64> {
        let engine = running_mut(&mut self.engine, self.ended)?;
        let junction = self
            .junctions
            .get_mut(meter_id)
            .ok_or_else(|| Error::NotAMeter(meter_id.to_string()))?;
        let params = junction
            .meter_params()
            .ok_or_else(|| Error::NotAMeter(meter_id.to_string()))?;
        let num_signals = engine.light(meter_id)?.num_signals();
        let (rate, plan) = metering_plan(rate, params, timing, num_signals);
        engine.set_phase_plan(meter_id, plan.clone())?;
        junction.set_rate(engine.time(), rate);
        self.phases.insert(meter_id.to_string(), plan);
        Ok(rate)
    }

    /// The current metering rate of a meter, in veh/h.
    pub fn metering_rate(&self, meter_id: &str) -> Option<f64> {
        self.junctions.get(meter_id).and_then(|j| j.rate())
    }

    pub fn add_controllers(&mut self, controllers: BTreeMap<String, ControllerParams>) -> Result<()> {
        for (id, params) in controllers {
            if self.controllers.contains_key(&id) {
                return Err(Error::Config(format!("controller '{}' already exists", id)));
            }
            let controller = Controller::new(&id, params, self.engine()?, self.units)?;
            self.controllers.insert(id, controller);
        }
        Ok(())
    }

    /// Gets a handle to operate a controller.
    pub fn controller(&mut self, id: &str) -> Result<ControllerHandle<'_>> {
        if !self.controllers.contains_key(id) {
            return Err(Error::unknown("controller", id));
        }
        Ok(ControllerHandle::new(self, id))
    }

    pub(crate) fn controller_parts(&mut self, id: &str) -> Result<(&mut Controller, &mut Engine, f64)> {
        let engine = running_mut(&mut self.engine, self.ended)?;
        let controller = self
            .controllers
            .get_mut(id)
            .ok_or_else(|| Error::unknown("controller", id))?;
        let time = engine.time();
        Ok((controller, engine, time))
    }

    pub(crate) fn controller_active(&self, id: &str) -> Result<bool> {
        self.controllers
            .get(id)
            .map(Controller::is_active)
            .ok_or_else(|| Error::unknown("controller", id))
    }

    /// Starts recording measurements on edges.
    pub fn add_tracked_edges<S: AsRef<str>>(&mut self, edges: impl IntoIterator<Item = S>) -> Result<()> {
        for id in edges {
            let id = id.as_ref();
            let edge = TrackedEdge::new(id, self.engine()?, self.units)?;
            self.tracked_edges.insert(id.to_string(), edge);
        }
        Ok(())
    }

    pub fn add_events(&mut self, events: BTreeMap<String, EventDef>) -> Result<()> {
        let engine = running(&self.engine, self.ended)?;
        for (id, def) in events {
            self.events.add(&id, def, engine)?;
        }
        Ok(())
    }

    /// Adds the events in a JSON file.
    pub fn add_events_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.add_events(events::load_events(path)?)
    }

    /// Adds a named route along the quickest path between two edges.
    pub fn add_route(&mut self, origin: &str, destination: &str, route_id: &str) -> Result<()> {
        let engine = self.engine()?;
        let edges = engine.route_between(origin, destination)?;
        let names = edges
            .iter()
            .map(|e| engine.network().edge_name(*e).to_string())
            .collect::<Vec<_>>();
        self.add_route_edges(&names, route_id)
    }

    /// Adds a named route along a list of connected edges.
    pub fn add_route_edges<S: AsRef<str>>(&mut self, edges: &[S], route_id: &str) -> Result<()> {
        let names = edges.iter().map(|e| e.as_ref().to_string()).collect::<Vec<_>>();
        self.engine_mut()?.add_route(route_id, &names)?;
        self.routes.insert(route_id.to_string(), names);
        Ok(())
    }

    /// Registers everything in an objects file.
    pub fn load_objects(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let objects = SimObjects::load(path)?;
        for (id, edges) in &objects.routes {
            self.add_route_edges(edges.as_slice(), id)?;
        }
        self.add_tracked_junctions(objects.junctions)?;
        self.set_phases(objects.phases, false)?;
        self.add_controllers(objects.controllers)?;
        self.add_tracked_edges(&objects.edges)?;
        self.add_events(objects.events)
    }

    /// The objects registered with the simulation.
    pub fn objects(&self) -> SimObjects {
        SimObjects {
            edges: self.tracked_edges.keys().cloned().collect(),
            junctions: self
                .junctions
                .iter()
                .map(|(id, j)| (id.clone(), j.params().clone()))
                .collect(),
            phases: self.phases.clone(),
            controllers: self
                .controllers
                .iter()
                .map(|(id, c)| (id.clone(), c.params().clone()))
                .collect(),
            events: self.events.defs(),
            routes: self.routes.clone(),
        }
    }

    pub fn save_objects(&self, path: impl AsRef<Path>) -> Result<()> {
        self.objects().save(path)
    }

    pub fn add_vehicle_in_function(
        &mut self,
        f: impl FnMut(&Simulation, &VehicleEvent) + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        self.in_callbacks.push((id, Box::new(f)));
        id
    }

    pub fn add_vehicle_out_function(
        &mut self,
        f: impl FnMut(&Simulation, &VehicleEvent) + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        self.out_callbacks.push((id, Box::new(f)));
        id
    }

    pub fn remove_vehicle_in_function(&mut self, id: CallbackId) -> Result<()> {
        remove_callback(&mut self.in_callbacks, id)
    }

    pub fn remove_vehicle_out_function(&mut self, id: CallbackId) -> Result<()> {
        remove_callback(&mut self.out_callbacks, id)
    }

    /// The length of a step in s.
    pub fn step_length(&self) -> f64 {
        self.data.step_length
    }

    /// The number of steps simulated so far.
    pub fn curr_step(&self) -> usize {
        self.step
    }

    /// The simulation time in s.
    pub fn curr_time(&self) -> f64 {
        self.step as f64 * self.data.step_length
    }

    /// Simulates `n_steps` steps, recording data only if `keep_data` is set.
    pub fn step_through(&mut self, n_steps: usize, keep_data: bool) -> Result<()> {
        for _ in 0..n_steps {
            self.step_once(keep_data)?;
        }
        Ok(())
    }

    /// Simulates at least `seconds` of simulation time.
    pub fn step_seconds(&mut self, seconds: f64, keep_data: bool) -> Result<()> {
        let n_steps = (seconds / self.step_length()).ceil() as usize;
        self.step_through(n_steps, keep_data)
    }

    fn step_once(&mut self, record: bool) -> Result<()> {
        let units = self.units;
        let engine = running_mut(&mut self.engine, self.ended)?;
        let step_before = engine.curr_step();
        let StepEvents { entered, exited } = engine.step();
        self.step = engine.curr_step();
        let time = engine.time();

        let mut in_events = vec![];
        for id in entered {
            let vals = engine.vehicle(id).vals(engine.network(), units);
            self.data.trips.incomplete.insert(
                vals.vehicle_id.clone(),
                Trip {
                    vehicle_type: vals.vehicle_type.clone(),
                    departure: vals.departure,
                    arrival: None,
                    origin: vals.origin.clone(),
                    destination: vals.destination.clone(),
                    route_id: vals.route_id.clone(),
                    removed: false,
                },
            );
            in_events.push(VehicleEvent {
                curr_step: self.step,
                vehicle_id: vals.vehicle_id,
                route_id: vals.route_id,
                vehicle_type: Some(vals.vehicle_type),
                departure: Some(vals.departure),
                origin: Some(vals.origin),
                destination: Some(vals.destination),
            });
        }
        self.events.update(engine, units)?;

        let mut out_events = vec![];
        for vehicle in exited.into_iter().chain(engine.take_removed()) {
            let destination = engine.network().edge_name(vehicle.destination).to_string();
            if let Some(mut trip) = self.data.trips.incomplete.remove(&vehicle.name) {
                trip.arrival = Some(time);
                trip.destination = destination.clone();
                trip.removed = vehicle.removed;
                self.data.trips.completed.insert(vehicle.name.clone(), trip);
            }
            out_events.push(VehicleEvent {
                curr_step: self.step,
                vehicle_id: vehicle.name,
                destination: Some(destination),
                ..VehicleEvent::default()
            });
        }
        for controller in self.controllers.values_mut() {
            controller.update(engine, time, record)?;
        }
        for junction in self.junctions.values_mut() {
            junction.update(engine, record)?;
        }
        for edge in self.tracked_edges.values_mut() {
            edge.update(engine, record);
        }

        if record {
            if !self.recording {
                self.recording = true;
                self.data.start_step = step_before;
            }
            self.data.end_step = self.step;
            record_network(&mut self.data, engine, units, self.individual_vehicle_data)?;
        }

        dispatch(self, CallbackKind::In, &in_events);
        dispatch(self, CallbackKind::Out, &out_events);
        Ok(())
    }

    /// Queues a vehicle to enter the network at the next step.
    pub fn add_vehicle(&mut self, spec: VehicleSpec) -> Result<()> {
        let engine = self.engine_mut()?;
        let (route, route_id) = match spec.routing {
            Routing::Route(id) => (engine.route(&id)?.to_vec(), Some(id)),
            Routing::Between(origin, destination) => {
                (engine.route_between(&origin, &destination)?, None)
            }
            Routing::Edges(edges) => (engine.resolve_route(&edges)?, None),
        };
        engine.queue_vehicle(PendingVehicle {
            name: spec.vehicle_id,
            vehicle_type: spec.vehicle_type,
            route,
            route_id,
            lane: spec.origin_lane,
        })
    }

    /// Removes a vehicle from the network, or from the queue waiting to enter it.
    /// A vehicle taken out of the network ends its trip at the next step, with
    /// an out event.
    pub fn remove_vehicle(&mut self, vehicle_id: &str) -> Result<()> {
        self.engine_mut()?.remove_vehicle(vehicle_id)
    }

    /// The IDs of every vehicle in the network, sorted.
    pub fn vehicle_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .engine()?
            .iter_vehicles()
            .map(|v| v.name().to_string())
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn vehicle_exists(&self, vehicle_id: &str) -> bool {
        self.engine()
            .map_or(false, |engine| engine.vehicle_id(vehicle_id).is_ok())
    }

    pub fn get_vehicle_vals(&self, vehicle_id: &str) -> Result<VehicleVals> {
        self.engine()?.vehicle_vals(vehicle_id, self.units)
    }

    pub fn get_detector_vals(&self, detector_id: &str) -> Result<DetectorVals> {
        self.engine()?.detector_vals(detector_id, self.units)
    }

    /// The speed limit currently in force on an edge, in the simulation's units.
    pub fn edge_speed_limit(&self, edge_id: &str) -> Result<f64> {
        let network = self.engine()?.network();
        let limit = network.edge_speed_limit(network.edge_id(edge_id)?);
        Ok(self.units.speed_from_ms(limit))
    }

    /// Whether a vehicle is currently frozen by an incident or event.
    pub fn vehicle_frozen(&self, vehicle_id: &str) -> Result<bool> {
        let engine = self.engine()?;
        Ok(engine.get_vehicle_frozen(engine.vehicle_id(vehicle_id)?))
    }

    /// The current signal states of a junction, e.g. `"GGrr"`.
    pub fn tl_state(&self, junction_id: &str) -> Result<String> {
        Ok(self.engine()?.light(junction_id)?.state_string())
    }

    /// Stops vehicles in place, returning the ID of the event created.
    pub fn cause_incident(&mut self, spec: &IncidentSpec) -> Result<String> {
        let units = self.units;
        let engine = running_mut(&mut self.engine, self.ended)?;
        self.events.cause_incident(spec, engine, units)
    }

    /// Ends the simulation. Recorded data stays available.
    pub fn end(&mut self) -> Result<()> {
        self.engine()?;
        self.engine = None;
        self.ended = true;
        self.data.sim_end = Some(chrono::Local::now().to_rfc3339());
        info!(
            "Ended '{}' after {} steps",
            self.data.scenario_name, self.step
        );
        Ok(())
    }

    /// All data recorded so far.
    pub fn data(&self) -> SimData {
        let mut data = self.data.clone();
        data.junctions = self
            .junctions
            .iter()
            .map(|(id, j)| (id.clone(), j.data().clone()))
            .collect();
        data.controllers = self
            .controllers
            .iter()
            .map(|(id, c)| (id.clone(), c.data().clone()))
            .collect();
        data.edges = self
            .tracked_edges
            .iter()
            .map(|(id, e)| (id.clone(), e.data().clone()))
            .collect();
        data.events = self.events.data();
        data
    }

    /// Saves the recorded data; the format follows the extension
    /// (`.json`, `.bson` or `.bson.lz4`).
    pub fn save_data(&self, path: impl AsRef<Path>) -> Result<()> {
        self.data().save(path)
    }

    /// Prints a summary of the run, and writes it to `save_file` if given.
    pub fn print_summary(&self, save_file: Option<&Path>) -> Result<()> {
        let data = self.data();
        let objects = self.objects();
        let summary = Summary {
            data: &data,
            objects: &objects,
        }
        .to_string();
        println!("{}", summary);
        if let Some(path) = save_file {
            std::fs::write(path, summary)?;
            info!("Saved summary to '{}'", path.display());
        }
        Ok(())
    }
}

fn running(engine: &Option<Engine>, ended: bool) -> Result<&Engine> {
    match (engine, ended) {
        (_, true) => Err(Error::Ended),
        (Some(engine), false) => Ok(engine),
        (None, false) => Err(Error::NotStarted),
    }
}

fn running_mut(engine: &mut Option<Engine>, ended: bool) -> Result<&mut Engine> {
    match (engine, ended) {
        (_, true) => Err(Error::Ended),
        (Some(engine), false) => Ok(engine),
        (None, false) => Err(Error::NotStarted),
    }
}

#[derive(Clone, Copy)]
enum CallbackKind {
    In,
    Out,
}

/// Runs callbacks for vehicle events. Callbacks only see the simulation
/// immutably, so none can be registered or removed while they run.
fn dispatch(sim: &mut Simulation, kind: CallbackKind, events: &[VehicleEvent]) {
    if events.is_empty() {
        return;
    }
    let slot = match kind {
        CallbackKind::In => &mut sim.in_callbacks,
        CallbackKind::Out => &mut sim.out_callbacks,
    };
    let mut callbacks = std::mem::take(slot);
    for event in events {
        for (_, callback) in &mut callbacks {
            callback(sim, event);
        }
    }
    match kind {
        CallbackKind::In => sim.in_callbacks = callbacks,
        CallbackKind::Out => sim.out_callbacks = callbacks,
    }
}

fn remove_callback(callbacks: &mut Vec<(CallbackId, VehicleCallback)>, id: CallbackId) -> Result<()> {
    let idx = callbacks
        .iter()
        .position(|(cb, _)| *cb == id)
        .ok_or_else(|| Error::unknown("callback", format!("{:?}", id)))?;
    callbacks.remove(idx);
    Ok(())
}

/// Records network-wide and detector measurements for the last step.
fn record_network(data: &mut SimData, engine: &Engine, units: Units, vehicles: bool) -> Result<()> {
    let dt = engine.step_length();
    let network = engine.network();
    let mut waiting = 0;
    let mut delay = 0.0;
    for vehicle in engine.iter_vehicles() {
        if vehicle.has_stopped() {
            waiting += 1;
        }
        let desired = vehicle.desired_speed(network.links()[vehicle.link_id()].speed_limit());
        if desired > 0.0 {
            delay += dt * f64::max(1.0 - vehicle.vel() / desired, 0.0);
        }
    }
    data.all_vehicles.push(engine.vehicle_count());
    data.waiting_vehicles.push(waiting);
    data.to_depart.push(engine.pending_count());
    data.tts.push(engine.vehicle_count() as f64 * dt);
    data.delay.push(delay);

    for (id, series) in data.detectors.iter_mut() {
        let vals = engine.detector_vals(id, units)?;
        series.vehicle_counts.push(vals.vehicle_count);
        series.vehicle_ids.push(vals.vehicle_ids);
        series.halting_counts.push(vals.halting_count);
        series.speeds.push(vals.mean_speed);
        series.occupancies.push(vals.occupancy);
    }

    if vehicles {
        let snapshot = engine
            .iter_vehicles()
            .map(|v| v.vals(network, units))
            .collect();
        data.vehicles.get_or_insert_with(Vec::new).push(snapshot);
    }
    Ok(())
}
