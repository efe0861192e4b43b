use crate::controller::ControllerParams;
use crate::events::EventDef;
use crate::junction::JunctionParams;
use crate::light::PhasePlan;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// The objects registered with a simulation, so they can be
/// registered again in one go.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimObjects {
    /// Tracked edges.
    pub edges: Vec<String>,
    /// Tracked junctions.
    pub junctions: BTreeMap<String, JunctionParams>,
    pub phases: BTreeMap<String, PhasePlan>,
    pub controllers: BTreeMap<String, ControllerParams>,
    pub events: BTreeMap<String, EventDef>,
    pub routes: BTreeMap<String, Vec<String>>,
}

impl SimObjects {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)?;
        log::info!("Saved simulation objects to '{}'", path.as_ref().display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
            && self.junctions.is_empty()
            && self.phases.is_empty()
            && self.controllers.is_empty()
            && self.events.is_empty()
            && self.routes.is_empty()
    }
}
