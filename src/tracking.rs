use crate::engine::Engine;
use crate::util::mean;
use crate::{EdgeId, Result, Units, VehicleId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A vehicle on a tracked edge, for space-time diagrams.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeVehicle {
    pub vehicle_id: String,
    /// Position of the vehicle's centre as a fraction of the edge length.
    pub position: f64,
    pub speed: f64,
    pub lane: usize,
}

/// Per recorded step measurements of an edge, in the simulation's units.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub length: f64,
    pub lanes: usize,
    pub step_vehicles: Vec<Vec<EdgeVehicle>>,
    pub vehicle_counts: Vec<usize>,
    pub speeds: Vec<Option<f64>>,
    /// Percentage of the road surface covered by vehicles.
    pub occupancies: Vec<f64>,
    /// Vehicles per unit distance per lane.
    pub densities: Vec<f64>,
    /// Vehicles entering the edge, in veh/h.
    pub flows: Vec<f64>,
}

#[derive(Clone, Debug)]
pub(crate) struct TrackedEdge {
    edge: EdgeId,
    prev: HashSet<VehicleId>,
    units: Units,
    data: EdgeData,
}

impl TrackedEdge {
    pub fn new(id: &str, engine: &Engine, units: Units) -> Result<Self> {
        let edge = engine.network().edge_id(id)?;
        let def = engine.network().edge(edge);
        Ok(Self {
            edge,
            prev: HashSet::new(),
            units,
            data: EdgeData {
                length: units.dist_from_m(def.length()),
                lanes: def.lanes().len(),
                ..EdgeData::default()
            },
        })
    }

    pub fn data(&self) -> &EdgeData {
        &self.data
    }

    pub fn update(&mut self, engine: &Engine, record: bool) {
        let network = engine.network();
        let edge = network.edge(self.edge);
        let ids: Vec<VehicleId> = edge
            .lanes()
            .iter()
            .flat_map(|link| network.links()[*link].vehicles())
            .copied()
            .collect();
        let entered = ids.iter().filter(|id| !self.prev.contains(id)).count();
        self.prev = ids.iter().copied().collect();
        if !record {
            return;
        }

        let units = self.units;
        let vehicles: Vec<_> = ids.iter().map(|id| engine.vehicle(*id)).collect();
        let surface = edge.length() * edge.lanes().len() as f64;
        let covered: f64 = vehicles.iter().map(|v| v.length()).sum();
        let data = &mut self.data;
        data.step_vehicles.push(
            vehicles
                .iter()
                .map(|v| EdgeVehicle {
                    vehicle_id: v.name().to_string(),
                    position: v.pos_mid() / edge.length(),
                    speed: units.speed_from_ms(v.vel()),
                    lane: network.links()[v.link_id()].index(),
                })
                .collect(),
        );
        data.vehicle_counts.push(vehicles.len());
        data.speeds
            .push(mean(vehicles.iter().map(|v| v.vel())).map(|s| units.speed_from_ms(s)));
        data.occupancies.push(f64::min(100.0 * covered / surface, 100.0));
        data.densities
            .push(vehicles.len() as f64 / (data.length * data.lanes as f64));
        data.flows
            .push(entered as f64 * 3600.0 / engine.step_length());
    }
}
