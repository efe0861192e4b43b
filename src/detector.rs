use crate::network::Network;
use crate::util::{mean, Interval};
use crate::vehicle::HALTING_SPEED;
use crate::{EdgeId, Error, LinkId, Result, VehicleSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A detector, as stored in the network file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorDef {
    /// Detects vehicles passing a point. Covers every lane unless `lane` is given.
    InductionLoop {
        edge: String,
        #[serde(default)]
        lane: Option<usize>,
        /// Position along the edge in m; negative values count back from its end.
        pos: f64,
    },
    /// Detects vehicles within a stretch of road, by default the whole edge.
    LaneArea {
        edge: String,
        #[serde(default)]
        lanes: Option<Vec<usize>>,
        #[serde(default)]
        start: Option<f64>,
        #[serde(default)]
        end: Option<f64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum DetectorKind {
    Loop { pos: f64 },
    Area { range: Interval<f64> },
}

/// A vehicle seen by a detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Detected {
    pub name: String,
    pub vehicle_type: String,
}

/// What a detector saw during the last step.
#[derive(Clone, Debug, Default)]
pub(crate) struct Reading {
    /// Vehicles that passed (loops) or are inside (areas).
    pub vehicles: Vec<Detected>,
    /// The number of those vehicles that are halting.
    pub halting: usize,
    /// Mean speed of those vehicles, in m/s.
    pub mean_speed: Option<f64>,
    /// Fraction of the detector currently covered by vehicles.
    pub occupancy: f64,
}

/// A detector placed in the network.
#[derive(Clone, Debug)]
pub struct Detector {
    id: String,
    edge: EdgeId,
    kind: DetectorKind,
    links: SmallVec<[LinkId; 4]>,
    reading: Reading,
}

/// A detector's readings from the last step, in the simulation's units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorVals {
    pub detector_id: String,
    /// `induction_loop` or `lane_area`.
    pub detector_type: String,
    pub edge: String,
    pub vehicle_count: usize,
    pub vehicle_ids: Vec<String>,
    pub halting_count: usize,
    pub mean_speed: Option<f64>,
    /// Percentage of the detector covered by vehicles.
    pub occupancy: f64,
}

impl Detector {
    /// Places a detector in the network.
    pub(crate) fn new(id: &str, def: &DetectorDef, network: &Network) -> Result<Self> {
        let (edge_name, lanes, kind) = match def {
            DetectorDef::InductionLoop { edge, lane, pos } => {
                let edge_id = network.edge_id(edge)?;
                let length = network.edge(edge_id).length();
                let pos = if *pos < 0.0 { length + pos } else { *pos };
                (edge, lane.map(|l| vec![l]), DetectorKind::Loop { pos: pos.clamp(0.0, length) })
            }
            DetectorDef::LaneArea { edge, lanes, start, end } => {
                let length = network.edge(network.edge_id(edge)?).length();
                let range = Interval::new(
                    start.unwrap_or(0.0).clamp(0.0, length),
                    end.unwrap_or(length).clamp(0.0, length),
                );
                (edge, lanes.clone(), DetectorKind::Area { range })
            }
        };
        let edge = network.edge_id(edge_name)?;
        let links = match lanes {
            Some(lanes) => lanes
                .into_iter()
                .map(|l| network.lane(edge_name, l))
                .collect::<Result<_>>()?,
            None => network.edge(edge).lanes().iter().copied().collect(),
        };
        if let DetectorKind::Area { range } = kind {
            if range.length() <= 0.0 {
                return Err(Error::Config(format!("detector '{}' has an empty range", id)));
            }
        }
        Ok(Self {
            id: id.to_string(),
            edge,
            kind,
            links,
            reading: Reading::default(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn edge(&self) -> EdgeId {
        self.edge
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.kind, DetectorKind::Loop { .. })
    }

    pub(crate) fn reading(&self) -> &Reading {
        &self.reading
    }

    /// Updates the reading with the vehicles' movement over the last step.
    pub(crate) fn update(&mut self, vehicles: &VehicleSet) {
        let covers = |link: LinkId| self.links.contains(&link);
        let mut seen = vec![];
        let mut covered = 0.0;

        for (id, vehicle) in vehicles {
            let extent = Interval::new(vehicle.pos_rear(), vehicle.pos_front());
            let on_detector = covers(vehicle.link_id());
            match self.kind {
                DetectorKind::Loop { pos } => {
                    if vehicle.trail().iter().any(|s| covers(s.link) && s.range.crossed(pos)) {
                        seen.push(id);
                    }
                    if on_detector && extent.contains(pos) {
                        covered += 1.0;
                    }
                }
                DetectorKind::Area { range } => {
                    if on_detector && extent.overlaps(&range) {
                        seen.push(id);
                        covered += extent.overlap_with(&range);
                    }
                }
            }
        }

        let capacity = match self.kind {
            DetectorKind::Loop { .. } => self.links.len() as f64,
            DetectorKind::Area { range } => range.length() * self.links.len() as f64,
        };
        self.reading = Reading {
            halting: seen
                .iter()
                .filter(|id| vehicles[**id].vel() < HALTING_SPEED)
                .count(),
            mean_speed: mean(seen.iter().map(|id| vehicles[*id].vel())),
            occupancy: f64::min(covered / capacity, 1.0),
            vehicles: seen
                .iter()
                .map(|id| Detected {
                    name: vehicles[*id].name().to_string(),
                    vehicle_type: vehicles[*id].vehicle_type().to_string(),
                })
                .collect(),
        };
    }
}
