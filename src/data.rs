use crate::controller::ControllerData;
use crate::events::EventData;
use crate::junction::JunctionData;
use crate::tracking::EdgeData;
use crate::{Error, Result, Units, VehicleVals};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Readings of a detector, per recorded step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorSeries {
    pub detector_type: String,
    pub edge: String,
    pub vehicle_counts: Vec<usize>,
    pub vehicle_ids: Vec<Vec<String>>,
    pub halting_counts: Vec<usize>,
    pub speeds: Vec<Option<f64>>,
    pub occupancies: Vec<f64>,
}

/// A vehicle's journey through the network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub vehicle_type: String,
    /// In s.
    pub departure: f64,
    /// In s, once the vehicle has left the network.
    #[serde(default)]
    pub arrival: Option<f64>,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub route_id: Option<String>,
    /// Taken out of the network before reaching its destination.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trips {
    pub incomplete: BTreeMap<String, Trip>,
    pub completed: BTreeMap<String, Trip>,
}

/// Everything recorded during a simulation, in the simulation's units.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimData {
    pub scenario_name: String,
    pub scenario_desc: String,
    /// Wall-clock start and end, RFC 3339.
    pub sim_start: Option<String>,
    pub sim_end: Option<String>,
    /// The first recorded step, and the step after the last one.
    pub start_step: usize,
    pub end_step: usize,
    pub step_length: f64,
    pub units: Units,
    #[serde(default, with = "seed_format")]
    pub seed: Option<u64>,

    /// Vehicles in the network per recorded step.
    pub all_vehicles: Vec<usize>,
    /// Halting vehicles per recorded step.
    pub waiting_vehicles: Vec<usize>,
    /// Vehicles waiting to enter the network per recorded step.
    pub to_depart: Vec<usize>,
    /// Total time spent in the network during each recorded step, in s.
    pub tts: Vec<f64>,
    /// Time lost to travelling below the desired speed during each recorded step, in s.
    pub delay: Vec<f64>,

    pub detectors: BTreeMap<String, DetectorSeries>,
    pub edges: BTreeMap<String, EdgeData>,
    pub junctions: BTreeMap<String, JunctionData>,
    pub controllers: BTreeMap<String, ControllerData>,
    pub events: BTreeMap<String, EventData>,
    pub trips: Trips,
    /// Snapshots of every vehicle per recorded step, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicles: Option<Vec<Vec<VehicleVals>>>,
}

/// The on-disk formats of [SimData], chosen by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Format {
    Json,
    Bson,
    /// BSON compressed with LZ4, size prepended.
    Lz4Bson,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy();
        if name.ends_with(".bson.lz4") {
            Ok(Format::Lz4Bson)
        } else if name.ends_with(".bson") {
            Ok(Format::Bson)
        } else if name.ends_with(".json") {
            Ok(Format::Json)
        } else {
            Err(Error::UnsupportedFormat(name.into_owned()))
        }
    }
}

impl SimData {
    /// The number of recorded steps.
    pub fn num_steps(&self) -> usize {
        self.end_step - self.start_step
    }

    /// Writes the data as JSON, BSON or LZ4 compressed BSON, depending on
    /// whether `path` ends with `.json`, `.bson` or `.bson.lz4`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match Format::from_path(path)? {
            Format::Json => {
                let writer = BufWriter::new(File::create(path)?);
                serde_json::to_writer_pretty(writer, self)?;
            }
            Format::Bson => std::fs::write(path, bson::to_vec(self)?)?,
            Format::Lz4Bson => {
                std::fs::write(path, compress_prepend_size(&bson::to_vec(self)?))?
            }
        }
        log::info!("Saved simulation data to '{}'", path.display());
        Ok(())
    }

    /// Reads data written by [SimData::save].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Format::from_path(path)? {
            Format::Json => {
                let reader = BufReader::new(File::open(path)?);
                Ok(serde_json::from_reader(reader)?)
            }
            Format::Bson => Ok(bson::from_slice(&std::fs::read(path)?)?),
            Format::Lz4Bson => {
                let content = decompress_size_prepended(&std::fs::read(path)?)?;
                Ok(bson::from_slice(&content)?)
            }
        }
    }
}

/// BSON has no unsigned 64-bit integers, so seeds above `i64::MAX` are
/// written as decimal strings.
mod seed_format {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Int(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(seed: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match *seed {
            None => s.serialize_none(),
            Some(seed) => match i64::try_from(seed) {
                Ok(seed) => s.serialize_some(&seed),
                Err(_) => s.serialize_some(&seed.to_string()),
            },
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        match Option::<Stored>::deserialize(d)? {
            None => Ok(None),
            Some(Stored::Int(seed)) => u64::try_from(seed).map(Some).map_err(D::Error::custom),
            Some(Stored::Text(seed)) => seed.parse().map(Some).map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> SimData {
        let mut data = SimData {
            scenario_name: "test".into(),
            start_step: 10,
            end_step: 13,
            step_length: 0.5,
            seed: Some(42),
            all_vehicles: vec![1, 2, 2],
            tts: vec![0.5, 1.0, 1.0],
            ..SimData::default()
        };
        data.trips.completed.insert(
            "v".into(),
            Trip {
                vehicle_type: "cars".into(),
                departure: 5.0,
                arrival: Some(6.5),
                origin: "a".into(),
                destination: "c".into(),
                route_id: None,
                removed: false,
            },
        );
        data.detectors.insert(
            "loop".into(),
            DetectorSeries {
                detector_type: "induction_loop".into(),
                speeds: vec![None, Some(12.5), None],
                ..DetectorSeries::default()
            },
        );
        data
    }

    #[test]
    fn survives_every_format() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample();
        for name in ["data.json", "data.bson", "data.bson.lz4"] {
            let path = dir.path().join(name);
            data.save(&path).unwrap();
            assert_eq!(SimData::load(&path).unwrap(), data, "{}", name);
        }
        assert_eq!(data.num_steps(), 3);
    }

    #[test]
    fn large_seeds_survive_bson() {
        let dir = tempfile::tempdir().unwrap();
        for seed in [u64::MAX - 5, i64::MAX as u64 + 1, 7] {
            let data = SimData {
                seed: Some(seed),
                ..sample()
            };
            for name in ["data.json", "data.bson", "data.bson.lz4"] {
                let path = dir.path().join(name);
                data.save(&path).unwrap();
                assert_eq!(SimData::load(&path).unwrap().seed, Some(seed), "{}", name);
            }
        }
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(matches!(
            sample().save("data.pkl"),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
