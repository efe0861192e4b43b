use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use traffic_control::{
    parse_seed, random_seed, ControllerParams, DepartLane, FlowParams, IncidentSpec, JunctionParams,
    MeterParams, PhasePlan, RgParams, Routing, Simulation, StartOptions, Units, VehicleSpec,
    VslParams,
};

/// Runs the A20 demonstration: two ramp meters, a signalised junction,
/// route guidance, a variable speed limit and an incident.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Flags {
    /// Random seed, or `random`.
    #[arg(long, default_value = "1")]
    seed: String,
    /// Request a graphical interface.
    #[arg(long)]
    gui: bool,
    /// The scenario file.
    #[arg(long, default_value = "scenario/a20.json")]
    config: PathBuf,
    /// Where to write the objects, data and summary files.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

/// Accepts the single-dash spellings `-seed` and `-gui`.
fn normalise_args(args: impl Iterator<Item = String>) -> Vec<String> {
    args.map(|arg| match arg.as_str() {
        "-seed" | "-gui" => format!("-{}", arg),
        _ => arg,
    })
    .collect()
}

/// The seed for a run, drawn once when the flag says `random`.
fn demo_seed(flag: &str) -> traffic_control::Result<u64> {
    Ok(parse_seed(flag)?.unwrap_or_else(random_seed))
}

/// Appends a vehicle's ID and current speed to `arr`.
fn add_to_vehicle_arr(
    sim: &Simulation,
    vehicle_id: &str,
    arr: &mut Vec<(String, f64)>,
) -> traffic_control::Result<()> {
    let speed = sim.get_vehicle_vals(vehicle_id)?.speed;
    arr.push((vehicle_id.to_string(), speed));
    Ok(())
}

fn strings<const N: usize>(ids: [&str; N]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    let flags = Flags::parse_from(normalise_args(std::env::args()));

    // One seed drives both the simulation and the metering rates below.
    let seed = demo_seed(&flags.seed)?;
    let mut rng = XorShiftRng::seed_from_u64(seed);

    let mut sim = Simulation::new(
        "A20_ITCS",
        "Example traffic controllers, with 2 ramp meters, 1 VSL controller and 1 route guidance controller.",
    );
    sim.start(&StartOptions {
        config_file: flags.config.clone(),
        gui: flags.gui,
        seed: Some(seed),
        units: Units::Metric,
        get_individual_vehicle_data: false,
    })?;

    // The junction "utsc" tracks signal phases and flows.
    sim.add_tracked_junctions(BTreeMap::from([(
        "utsc".to_string(),
        JunctionParams {
            flow_params: Some(FlowParams {
                inflow_detectors: strings(["utsc_n_in_1", "utsc_n_in_2", "utsc_w_in", "utsc_e_in"]),
                outflow_detectors: strings(["utsc_w_out", "utsc_e_out"]),
                vehicle_types: Some(strings(["cars", "lorries", "motorcycles", "vans"])),
            }),
            meter_params: None,
        },
    )]))?;

    sim.set_phases(
        BTreeMap::from([(
            "utsc".to_string(),
            PhasePlan::new(["GGrr", "yyrr", "rrGG", "rryy"], &[27.0, 3.0, 17.0, 3.0]),
        )]),
        true,
    )?;

    let meter = |queue: &str, inflow: [&str; 2], outflow: &str| JunctionParams {
        meter_params: Some(MeterParams {
            min_rate: 200.0,
            max_rate: 2000.0,
            queue_detector: Some(queue.to_string()),
            ..MeterParams::default()
        }),
        flow_params: Some(FlowParams {
            inflow_detectors: strings(inflow),
            outflow_detectors: strings([outflow]),
            vehicle_types: None,
        }),
    };
    sim.add_tracked_junctions(BTreeMap::from([
        (
            "crooswijk_meter".to_string(),
            meter("cw_ramp_queue", ["cw_ramp_inflow", "cw_rm_upstream"], "cw_rm_downstream"),
        ),
        (
            "a13_meter".to_string(),
            meter("a13_ramp_queue", ["a13_ramp_inflow", "a13_rm_upstream"], "a13_rm_downstream"),
        ),
    ]))?;

    sim.add_controllers(BTreeMap::from([
        (
            "rerouter".to_string(),
            ControllerParams::RouteGuidance(RgParams {
                detector_ids: strings(["rerouter_2"]),
                new_destination: Some("urban_out_w".to_string()),
                new_route: None,
                diversion_pct: 1.0,
                highlight: Some("00FF00".to_string()),
                vehicle_type: None,
            }),
        ),
        (
            "vsl".to_string(),
            ControllerParams::SpeedLimit(VslParams {
                geometry_ids: strings(["126729982", "126730069", "126730059"]),
            }),
        ),
    ]))?;

    sim.add_tracked_edges([
        "126730026",
        "1191885773",
        "1191885771",
        "126730171",
        "1191885772",
        "948542172",
        "70944365",
        "308977078",
        "1192621075",
    ])?;

    let scenario_dir = flags.config.parent().map(PathBuf::from).unwrap_or_default();
    sim.add_events_from_file(scenario_dir.join("example_incident.json"))?;

    sim.add_route("urban_in_e", "urban_out_w", "new_route")?;

    sim.save_objects(flags.out_dir.join("objects.json"))?;

    let vehicle_ids = Rc::new(RefCell::new(vec![]));
    let arr = Rc::clone(&vehicle_ids);
    sim.add_vehicle_in_function(move |sim, event| {
        if let Err(err) = add_to_vehicle_arr(sim, &event.vehicle_id, &mut arr.borrow_mut()) {
            warn!("Could not record '{}': {}", event.vehicle_id, err);
        }
    });

    let step_length = sim.step_length();
    let steps = |seconds: f64| (seconds / step_length).round() as usize;
    let (sim_dur, warmup) = (steps(500.0), steps(0.0));
    let interval = steps(50.0).max(1);
    let mut new_veh_idx = 0;

    if warmup > 0 {
        sim.step_through(warmup, false)?;
    }

    while sim.curr_step() < sim_dur + warmup {
        if sim.curr_step() % interval == 0 {
            sim.set_tl_metering_rate("crooswijk_meter", rng.gen_range(1200..=2000) as f64)?;
            sim.set_tl_metering_rate("a13_meter", rng.gen_range(1200..=2000) as f64)?;
        }

        sim.step_seconds(1.0, true)?;

        // New vehicles from "urban_in_e" to "urban_out_w" on the route added above.
        if sim.curr_step() % interval == 0 {
            let route = Routing::Route("new_route".to_string());
            sim.add_vehicle(
                VehicleSpec::new(format!("lorry_{}", new_veh_idx), "lorries", route.clone())
                    .origin_lane(DepartLane::First),
            )?;
            sim.add_vehicle(VehicleSpec::new(format!("car_{}", new_veh_idx), "cars", route))?;
            new_veh_idx += 1;
        }

        if sim.curr_step() == steps(100.0) {
            sim.cause_incident(&IncidentSpec::new(100.0).n_vehicles(2).edge_speed(5.0))?;
        }

        if sim.curr_step() == steps(250.0) {
            sim.controller("rerouter")?.activate()?;
            sim.controller("vsl")?.set_speed_limit(60.0)?;
            sim.set_phases(
                BTreeMap::from([(
                    "utsc".to_string(),
                    PhasePlan::new(["GGrr", "yyrr", "rrGG", "rryy"], &[37.0, 3.0, 7.0, 3.0]),
                )]),
                false,
            )?;
        }

        if sim.curr_step() == steps(400.0) {
            sim.controller("vsl")?.set_speed_limit(40.0)?;
        }

        if sim.curr_step() == steps(450.0) {
            sim.controller("rerouter")?.deactivate()?;
            sim.controller("vsl")?.deactivate()?;
        }
    }

    sim.end()?;
    info!("Recorded {} vehicles entering the network", vehicle_ids.borrow().len());

    sim.save_data(flags.out_dir.join("example_data.json"))?;
    sim.save_data(flags.out_dir.join("example_data.bson"))?;
    let summary = flags.out_dir.join("example_summary.txt");
    sim.print_summary(Some(summary.as_path()))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use traffic_control::{NetworkSource, ScenarioConfig};

    fn running_sim() -> Simulation {
        sim_with_seed(1)
    }

    fn sim_with_seed(seed: u64) -> Simulation {
        let network = serde_json::from_value(json!({
            "nodes": {"a": {"x": 0.0, "y": 0.0}, "b": {"x": 500.0, "y": 0.0}},
            "edges": {"road": {"from": "a", "to": "b", "speed_limit": 20.0}}
        }))
        .unwrap();
        let config = ScenarioConfig {
            network: NetworkSource::Inline(network),
            step_length: 0.5,
            ..ScenarioConfig::default()
        };
        let opts = StartOptions {
            seed: Some(seed),
            ..StartOptions::new("test.json")
        };
        let mut sim = Simulation::new("test", "");
        sim.start_with_config(&config, Path::new("."), &opts).unwrap();
        sim
    }

    #[test]
    fn appends_one_tuple_per_call() {
        let mut sim = running_sim();
        let spec = VehicleSpec::new("v", "cars", Routing::Edges(vec!["road".into()]));
        sim.add_vehicle(spec).unwrap();
        sim.step_through(1, true).unwrap();

        let mut arr = vec![("existing".to_string(), 1.0)];
        add_to_vehicle_arr(&sim, "v", &mut arr).unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[1].0, "v");
        assert_eq!(arr[1].1, sim.get_vehicle_vals("v").unwrap().speed);
    }

    #[test]
    fn unknown_vehicle_leaves_array_alone() {
        let sim = running_sim();
        let mut arr = vec![];
        assert!(add_to_vehicle_arr(&sim, "ghost", &mut arr).is_err());
        assert!(arr.is_empty());
    }

    #[test]
    fn accepts_single_dash_flags() {
        let args = ["demo", "-seed", "7", "-gui"].map(String::from);
        let flags = Flags::parse_from(normalise_args(args.into_iter()));
        assert_eq!(flags.seed, "7");
        assert!(flags.gui);
    }

    #[test]
    fn random_seeds_are_drawn_once_and_stay_storable() {
        assert_eq!(demo_seed("7").unwrap(), 7);
        let seed = demo_seed("random").unwrap();
        assert!(seed <= i64::MAX as u64);
        assert_eq!(sim_with_seed(seed).data().seed, Some(seed));
    }
}
