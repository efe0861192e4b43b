use crate::demand::{self, FlowDef};
use crate::network::NetworkDef;
use crate::vehicle::VehicleType;
use crate::{Error, Result, Units};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

fn default_step_length() -> f64 {
    0.5
}

/// Where a scenario's network comes from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkSource {
    /// A network file, relative to the scenario file.
    Path(PathBuf),
    Inline(NetworkDef),
}

impl Default for NetworkSource {
    fn default() -> Self {
        NetworkSource::Inline(NetworkDef::default())
    }
}

/// A scenario: the network, demand and simulation settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub network: NetworkSource,
    /// The length of a simulation step in s.
    #[serde(default = "default_step_length")]
    pub step_length: f64,
    /// Vehicle types, added to or overriding the built-in ones.
    #[serde(default)]
    pub vehicle_types: BTreeMap<String, VehicleType>,
    /// Named routes as lists of edge IDs.
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub flows: Vec<FlowDef>,
    /// A demand CSV file, relative to the scenario file.
    #[serde(default)]
    pub demand: Option<PathBuf>,
}

impl ScenarioConfig {
    /// Reads a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Resolves the network definition, reading it from disk if needed.
    pub fn network_def(&self, base_dir: &Path) -> Result<NetworkDef> {
        match &self.network {
            NetworkSource::Inline(def) => Ok(def.clone()),
            NetworkSource::Path(path) => {
                let file = File::open(base_dir.join(path))?;
                Ok(serde_json::from_reader(BufReader::new(file))?)
            }
        }
    }

    /// All flows of the scenario, including those in its demand file.
    pub fn all_flows(&self, base_dir: &Path) -> Result<Vec<FlowDef>> {
        let mut flows = self.flows.clone();
        if let Some(path) = &self.demand {
            flows.extend(demand::load_csv(base_dir.join(path))?);
        }
        Ok(flows)
    }
}

/// Options for starting a simulation.
#[derive(Clone, Debug)]
pub struct StartOptions {
    /// The scenario file.
    pub config_file: PathBuf,
    /// Request a graphical interface. Simulations always run headless.
    pub gui: bool,
    /// Random seed; drawn from entropy when `None`.
    pub seed: Option<u64>,
    pub units: Units,
    /// Record a snapshot of every vehicle at every step.
    pub get_individual_vehicle_data: bool,
}

impl StartOptions {
    pub fn new(config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            gui: false,
            seed: Some(1),
            units: Units::Metric,
            get_individual_vehicle_data: false,
        }
    }
}

/// Draws a seed that every export format stores as a plain integer.
pub fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..=i64::MAX as u64)
}

/// Parses a seed given as an integer or `random`.
pub fn parse_seed(seed: &str) -> Result<Option<u64>> {
    if seed.eq_ignore_ascii_case("random") {
        return Ok(None);
    }
    seed.parse()
        .map(Some)
        .map_err(|_| Error::Config(format!("invalid seed '{}'", seed)))
}
