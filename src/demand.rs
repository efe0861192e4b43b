use crate::{EdgeId, Error, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A stream of vehicles entering the network at a constant rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowDef {
    /// Prefix for the generated vehicle IDs.
    #[serde(default)]
    pub id: Option<String>,
    /// A named route to follow; otherwise `origin` and `destination` are routed between.
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    /// Vehicle types to draw from, by default `cars`.
    #[serde(default = "default_vehicle_types")]
    pub vehicle_types: Vec<String>,
    /// Relative weight of each vehicle type; uniform when omitted.
    #[serde(default)]
    pub vehicle_type_dists: Option<Vec<f64>>,
    /// Vehicles per hour.
    pub rate: f64,
    /// In s.
    #[serde(default)]
    pub start_time: f64,
    /// In s; the flow runs forever when omitted.
    #[serde(default)]
    pub end_time: Option<f64>,
}

fn default_vehicle_types() -> Vec<String> {
    vec!["cars".to_string()]
}

/// A row of a demand CSV file.
#[derive(Debug, Deserialize)]
struct DemandRecord {
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    route_id: Option<String>,
    #[serde(default)]
    start_time: Option<f64>,
    #[serde(default)]
    end_time: Option<f64>,
    #[serde(rename = "veh/hour")]
    rate: f64,
    /// Semicolon separated.
    #[serde(default)]
    vehicle_types: Option<String>,
    /// Semicolon separated.
    #[serde(default)]
    vehicle_type_dists: Option<String>,
}

/// Reads flows from a CSV file with the columns `origin`, `destination`, `route_id`,
/// `start_time`, `end_time`, `veh/hour`, `vehicle_types` and `vehicle_type_dists`.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<FlowDef>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    reader
        .deserialize::<DemandRecord>()
        .map(|record| {
            let record = record?;
            let split = |s: Option<String>| -> Vec<String> {
                s.iter()
                    .flat_map(|s| s.split(';'))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            };
            let dists = split(record.vehicle_type_dists)
                .iter()
                .map(|d| {
                    d.parse::<f64>()
                        .map_err(|_| Error::Config(format!("invalid vehicle type weight '{}'", d)))
                })
                .collect::<Result<Vec<_>>>()?;
            let vehicle_types = split(record.vehicle_types);
            let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
            Ok(FlowDef {
                id: None,
                route_id: non_empty(record.route_id),
                origin: non_empty(record.origin),
                destination: non_empty(record.destination),
                vehicle_types: if vehicle_types.is_empty() {
                    default_vehicle_types()
                } else {
                    vehicle_types
                },
                vehicle_type_dists: (!dists.is_empty()).then_some(dists),
                rate: record.rate,
                start_time: record.start_time.unwrap_or(0.0),
                end_time: record.end_time,
            })
        })
        .collect()
}

/// A flow resolved against the network, generating vehicles as time passes.
#[derive(Clone, Debug)]
pub(crate) struct Flow {
    id: String,
    route: Vec<EdgeId>,
    route_id: Option<String>,
    vehicle_types: Vec<String>,
    type_dist: WeightedIndex<f64>,
    rate: f64,
    start_time: f64,
    end_time: f64,
    /// Fractional vehicles owed but not yet generated.
    owed: f64,
    /// The number of vehicles generated so far.
    generated: usize,
}

impl Flow {
    pub fn new(
        id: String,
        def: &FlowDef,
        route: Vec<EdgeId>,
    ) -> Result<Self> {
        let weights = def
            .vehicle_type_dists
            .clone()
            .unwrap_or_else(|| vec![1.0; def.vehicle_types.len()]);
        if weights.len() != def.vehicle_types.len() {
            return Err(Error::Config(format!(
                "flow '{}' has {} vehicle types but {} weights",
                id,
                def.vehicle_types.len(),
                weights.len()
            )));
        }
        let type_dist = WeightedIndex::new(&weights)
            .map_err(|e| Error::Config(format!("flow '{}': {}", id, e)))?;
        if !(def.rate >= 0.0) {
            return Err(Error::Config(format!("flow '{}' has a negative rate", id)));
        }
        Ok(Self {
            id,
            route,
            route_id: def.route_id.clone(),
            vehicle_types: def.vehicle_types.clone(),
            type_dist,
            rate: def.rate,
            start_time: def.start_time,
            end_time: def.end_time.unwrap_or(f64::INFINITY),
            owed: 0.0,
            generated: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn route(&self) -> &[EdgeId] {
        &self.route
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    /// Advances the flow over the step starting at `time`, returning the
    /// `(name, vehicle type)` of every vehicle it generates.
    pub fn step(&mut self, time: f64, dt: f64, rng: &mut impl Rng) -> Vec<(String, String)> {
        let active = (time + dt).min(self.end_time) - time.max(self.start_time);
        if active <= 0.0 {
            return vec![];
        }
        self.owed += self.rate * active / 3600.0;
        let mut vehicles = vec![];
        while self.owed >= 1.0 {
            self.owed -= 1.0;
            let vehicle_type = self.vehicle_types[self.type_dist.sample(rng)].clone();
            vehicles.push((format!("{}.{}", self.id, self.generated), vehicle_type));
            self.generated += 1;
        }
        vehicles
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use std::io::Write;

    fn def(rate: f64) -> FlowDef {
        FlowDef {
            id: None,
            route_id: None,
            origin: Some("a".into()),
            destination: Some("c".into()),
            vehicle_types: vec!["cars".into(), "lorries".into()],
            vehicle_type_dists: Some(vec![1.0, 0.0]),
            rate,
            start_time: 10.0,
            end_time: Some(20.0),
        }
    }

    #[test]
    fn generates_at_rate_within_window() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let mut flow = Flow::new("f".into(), &def(3600.0), vec![]).unwrap();
        let mut names = vec![];
        for step in 0..40 {
            for (name, vtype) in flow.step(step as f64, 1.0, &mut rng) {
                assert_eq!(vtype, "cars");
                names.push(name);
            }
        }
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "f.0");
    }

    #[test]
    fn rejects_mismatched_weights() {
        let mut bad = def(100.0);
        bad.vehicle_type_dists = Some(vec![1.0]);
        assert!(Flow::new("f".into(), &bad, vec![]).is_err());
    }

    #[test]
    fn reads_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "origin,destination,route_id,start_time,end_time,veh/hour,vehicle_types,vehicle_type_dists\n\
             a,c,,0,600,1200,cars;lorries,0.9;0.1\n\
             ,,main,,,300,,"
        )
        .unwrap();
        let flows = load_csv(file.path()).unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].vehicle_types, ["cars", "lorries"]);
        assert_eq!(flows[0].vehicle_type_dists, Some(vec![0.9, 0.1]));
        assert_eq!(flows[0].end_time, Some(600.0));
        assert_eq!(flows[1].route_id.as_deref(), Some("main"));
        assert_eq!(flows[1].origin, None);
        assert_eq!(flows[1].vehicle_types, ["cars"]);
    }
}
