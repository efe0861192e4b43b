use crate::engine::Engine;
use crate::light::PhasePlan;
use crate::vehicle::HALTING_SPEED;
use crate::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// What to track at a junction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JunctionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_params: Option<FlowParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_params: Option<MeterParams>,
}

/// Detectors counting the vehicles entering and leaving a junction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowParams {
    pub inflow_detectors: Vec<String>,
    pub outflow_detectors: Vec<String>,
    /// Only count these vehicle types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_types: Option<Vec<String>>,
}

/// Marks a junction as a ramp meter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterParams {
    /// veh/h
    pub min_rate: f64,
    /// veh/h
    pub max_rate: f64,
    /// A lane-area detector covering the queue on the ramp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_detector: Option<String>,
    /// The ramp edges, upstream first, used to measure the queue and spillback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramp_edges: Option<Vec<String>>,
    /// Rate applied when the meter is added, in veh/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_rate: Option<f64>,
}

/// Signal timings used to turn a metering rate into a phase plan, in s.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeterTiming {
    pub g_time: f64,
    pub y_time: f64,
    pub min_red: f64,
    /// Vehicles released per green; one per signal index by default.
    pub vehs_per_cycle: Option<usize>,
    /// The duration of the plan when the meter shows a single colour.
    pub control_interval: f64,
}

impl Default for MeterTiming {
    fn default() -> Self {
        Self {
            g_time: 1.0,
            y_time: 1.0,
            min_red: 1.0,
            vehs_per_cycle: None,
            control_interval: 60.0,
        }
    }
}

/// Turns a metering rate in veh/h into a phase plan for `num_signals` signals.
/// Returns the rate after clamping to the meter's limits.
pub(crate) fn metering_plan(
    rate: f64,
    params: &MeterParams,
    timing: &MeterTiming,
    num_signals: usize,
) -> (f64, PhasePlan) {
    let rate = rate.clamp(params.min_rate, params.max_rate);
    let vpc = timing.vehs_per_cycle.unwrap_or(num_signals) as f64;
    let max_flow = 3600.0 / (timing.g_time + timing.y_time + timing.min_red) * vpc;
    let all = |c: &str| c.repeat(num_signals);

    let plan = if rate >= max_flow {
        PhasePlan::new([all("G")], &[timing.control_interval])
    } else if rate <= 0.0 {
        PhasePlan::new([all("r")], &[timing.control_interval])
    } else {
        let cycle = 3600.0 * vpc / rate;
        let red = f64::max(cycle - timing.g_time - timing.y_time, timing.min_red);
        PhasePlan::new(
            [all("G"), all("y"), all("r")],
            &[timing.g_time, timing.y_time, red],
        )
    };
    (rate, plan)
}

/// A run of one colour at a signal index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalRun {
    pub colour: String,
    /// In s.
    pub duration: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeterRate {
    pub time: f64,
    pub rate: f64,
}

/// Vehicle counts at a junction's detectors, per recorded step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
    pub inflow: Vec<usize>,
    pub outflow: Vec<usize>,
    pub inflow_by_type: BTreeMap<String, Vec<usize>>,
    pub outflow_by_type: BTreeMap<String, Vec<usize>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterData {
    pub min_rate: f64,
    pub max_rate: f64,
    pub rates: Vec<MeterRate>,
    /// Vehicles queuing on the ramp, per recorded step.
    pub queue_lengths: Vec<usize>,
    /// Time spent halting in the queue during each recorded step, in s.
    pub queue_delays: Vec<f64>,
    /// Halting vehicles on the most upstream ramp edge, per recorded step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spillback_vehs: Option<Vec<usize>>,
}

/// Everything recorded at a tracked junction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JunctionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<FlowData>,
    /// One run-length history per signal index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_history: Option<Vec<Vec<SignalRun>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter: Option<MeterData>,
}

/// A junction whose flows, signals or metering are being recorded.
#[derive(Clone, Debug)]
pub(crate) struct TrackedJunction {
    id: String,
    params: JunctionParams,
    /// Vehicles seen at the inflow and outflow detectors during the previous step.
    prev_in: HashSet<String>,
    prev_out: HashSet<String>,
    /// The metering rate in force, in veh/h.
    rate: Option<f64>,
    data: JunctionData,
}

impl TrackedJunction {
    /// Validates the parameters against the network. Signal history is kept
    /// whenever the junction has a traffic light.
    pub fn new(id: &str, params: JunctionParams, engine: &Engine) -> Result<Self> {
        let has_light = engine.has_light(id);
        if !has_light && (params.meter_params.is_some() || params.flow_params.is_none()) {
            return Err(Error::unknown("junction", id));
        }
        let mut data = JunctionData::default();

        if let Some(flow) = &params.flow_params {
            for detector in flow.inflow_detectors.iter().chain(&flow.outflow_detectors) {
                engine.detector(detector)?;
            }
            let types = flow.vehicle_types.iter().flatten();
            let by_type = types.map(|t| (t.clone(), vec![])).collect::<BTreeMap<_, _>>();
            data.flows = Some(FlowData {
                inflow_by_type: by_type.clone(),
                outflow_by_type: by_type,
                ..FlowData::default()
            });
        }
        if has_light {
            let num_signals = engine.light(id)?.num_signals();
            data.signal_history = Some(vec![vec![]; num_signals]);
        }
        if let Some(meter) = &params.meter_params {
            if !(meter.min_rate >= 0.0 && meter.min_rate <= meter.max_rate) {
                return Err(Error::Config(format!(
                    "meter '{}' needs 0 <= min_rate <= max_rate",
                    id
                )));
            }
            if let Some(detector) = &meter.queue_detector {
                engine.detector(detector)?;
            }
            for edge in meter.ramp_edges.iter().flatten() {
                engine.network().edge_id(edge)?;
            }
            data.meter = Some(MeterData {
                min_rate: meter.min_rate,
                max_rate: meter.max_rate,
                spillback_vehs: meter.ramp_edges.as_ref().map(|_| vec![]),
                ..MeterData::default()
            });
        }

        Ok(Self {
            id: id.to_string(),
            params,
            prev_in: HashSet::new(),
            prev_out: HashSet::new(),
            rate: None,
            data,
        })
    }

    pub fn params(&self) -> &JunctionParams {
        &self.params
    }

    pub fn meter_params(&self) -> Option<&MeterParams> {
        self.params.meter_params.as_ref()
    }

    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    pub fn data(&self) -> &JunctionData {
        &self.data
    }

    /// Records a new metering rate.
    pub fn set_rate(&mut self, time: f64, rate: f64) {
        debug!("Metering rate of '{}' set to {:.0} veh/h", self.id, rate);
        self.rate = Some(rate);
        if let Some(meter) = &mut self.data.meter {
            meter.rates.push(MeterRate { time, rate });
        }
    }

    /// Updates the tracked data after a step. Counts are only recorded when `record` is set.
    pub fn update(&mut self, engine: &Engine, record: bool) -> Result<()> {
        let dt = engine.step_length();

        if let (Some(params), Some(flows)) = (&self.params.flow_params, &mut self.data.flows) {
            let types = params.vehicle_types.as_deref();
            let (inflow, in_types, seen_in) =
                count_new(engine, &params.inflow_detectors, &self.prev_in, types)?;
            let (outflow, out_types, seen_out) =
                count_new(engine, &params.outflow_detectors, &self.prev_out, types)?;
            self.prev_in = seen_in;
            self.prev_out = seen_out;
            if record {
                let recorded = flows.inflow.len();
                flows.inflow.push(inflow);
                flows.outflow.push(outflow);
                push_by_type(&mut flows.inflow_by_type, &in_types, recorded);
                push_by_type(&mut flows.outflow_by_type, &out_types, recorded);
            }
        }

        if !record {
            return Ok(());
        }

        if let Some(history) = &mut self.data.signal_history {
            let light = engine.light(&self.id)?;
            for (runs, state) in history.iter_mut().zip(light.states()) {
                let colour = state.to_char().to_string();
                match runs.last_mut() {
                    Some(run) if run.colour == colour => run.duration += dt,
                    _ => runs.push(SignalRun {
                        colour,
                        duration: dt,
                    }),
                }
            }
        }

        if let (Some(params), Some(meter)) = (&self.params.meter_params, &mut self.data.meter) {
            let (queue, halting) = queue_length(engine, params)?;
            meter.queue_lengths.push(queue);
            meter.queue_delays.push(halting as f64 * dt);
            if let (Some(spillback), Some(edges)) = (&mut meter.spillback_vehs, &params.ramp_edges) {
                let halting = match edges.first() {
                    Some(edge) => halting_on_edge(engine, edge)?,
                    None => 0,
                };
                spillback.push(halting);
            }
        }
        Ok(())
    }
}

/// Counts vehicles at a set of detectors that were not there in the previous step.
fn count_new(
    engine: &Engine,
    detectors: &[String],
    prev: &HashSet<String>,
    types: Option<&[String]>,
) -> Result<(usize, BTreeMap<String, usize>, HashSet<String>)> {
    let mut seen = HashSet::new();
    let mut by_type = BTreeMap::new();
    let mut count = 0;
    for id in detectors {
        for vehicle in &engine.detector(id)?.reading().vehicles {
            if let Some(types) = types {
                if !types.contains(&vehicle.vehicle_type) {
                    continue;
                }
            }
            if seen.insert(vehicle.name.clone()) && !prev.contains(&vehicle.name) {
                count += 1;
                *by_type.entry(vehicle.vehicle_type.clone()).or_insert(0) += 1;
            }
        }
    }
    Ok((count, by_type, seen))
}

/// Appends one step of counts. Types seen for the first time are padded with
/// zeros for the `recorded` steps before.
fn push_by_type(
    series: &mut BTreeMap<String, Vec<usize>>,
    counts: &BTreeMap<String, usize>,
    recorded: usize,
) {
    for vehicle_type in counts.keys() {
        series
            .entry(vehicle_type.clone())
            .or_insert_with(|| vec![0; recorded]);
    }
    for (vehicle_type, values) in series.iter_mut() {
        values.push(counts.get(vehicle_type).copied().unwrap_or(0));
    }
}

/// The number of vehicles queuing at a meter, and how many of them are halting.
fn queue_length(engine: &Engine, params: &MeterParams) -> Result<(usize, usize)> {
    if let Some(id) = &params.queue_detector {
        let reading = engine.detector(id)?.reading();
        return Ok((reading.vehicles.len(), reading.halting));
    }
    let mut halting = 0;
    for edge in params.ramp_edges.iter().flatten() {
        halting += halting_on_edge(engine, edge)?;
    }
    Ok((halting, halting))
}

fn halting_on_edge(engine: &Engine, edge: &str) -> Result<usize> {
    let network = engine.network();
    let edge = network.edge(network.edge_id(edge)?);
    Ok(edge
        .lanes()
        .iter()
        .flat_map(|link| network.links()[*link].vehicles())
        .filter(|id| engine.vehicle(**id).vel() < HALTING_SPEED)
        .count())
}
