//! A traffic microsimulation with the control layer usually bolted on top of one:
//! tracked junctions, ramp meters, route guidance and variable speed limit controllers,
//! scheduled events, incidents and data export.

pub use cgmath;
pub use config::{parse_seed, random_seed, NetworkSource, ScenarioConfig, StartOptions};
pub use controller::{ControllerData, ControllerHandle, ControllerParams, RgParams, RouteTarget, VslParams};
pub use data::{DetectorSeries, SimData, Trip, Trips};
pub use demand::FlowDef;
pub use detector::{DetectorDef, DetectorVals};
pub use error::{Error, Result};
pub use events::{EventData, EventDef, EventStatus, IncidentSpec};
pub use junction::{FlowParams, JunctionData, JunctionParams, MeterParams, MeterTiming};
pub use light::{LightState, PhasePlan};
pub use network::NetworkDef;
pub use objects::SimObjects;
pub use simulation::{
    CallbackId, DepartLane, Routing, Simulation, VehicleCallback, VehicleEvent, VehicleSpec,
};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use tracking::EdgeData;
pub use units::Units;
pub use util::Interval;
pub use vehicle::{VehicleType, VehicleVals};

mod config;
mod controller;
mod data;
mod demand;
mod detector;
mod engine;
mod error;
mod events;
mod junction;
mod light;
mod link;
pub mod math;
mod network;
mod objects;
mod simulation;
mod summary;
mod tracking;
mod units;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of an [Edge](network::Edge).
    pub struct EdgeId;
    /// Unique ID of a lane.
    pub struct LinkId;
    /// Unique ID of a vehicle.
    pub struct VehicleId;
}

type LinkSet = SlotMap<LinkId, link::Link>;
type VehicleSet = SlotMap<VehicleId, vehicle::Vehicle>;
