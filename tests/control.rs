//! Tests of the control layer: meters, signals, controllers, events and recorded data.

use assert_approx_eq::assert_approx_eq;
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use traffic_control::{
    ControllerParams, Error, EventDef, EventStatus, FlowDef, FlowParams, IncidentSpec,
    JunctionParams, MeterParams, NetworkSource, PhasePlan, RgParams, Routing, ScenarioConfig,
    SimData, SimObjects, Simulation, StartOptions, VehicleSpec, VslParams,
};

/// A two-lane road `up -> down` with a branch `exit` and an on-ramp `ramp`,
/// all meeting at node `n1`.
fn config() -> ScenarioConfig {
    let network = serde_json::from_value(json!({
        "nodes": {
            "n0": {"x": 0.0, "y": 0.0},
            "n1": {"x": 600.0, "y": 0.0},
            "n2": {"x": 1200.0, "y": 0.0},
            "n3": {"x": 900.0, "y": -300.0},
            "r0": {"x": 300.0, "y": -200.0}
        },
        "edges": {
            "up": {"from": "n0", "to": "n1", "lanes": 2, "speed_limit": 25.0},
            "down": {"from": "n1", "to": "n2", "lanes": 2, "speed_limit": 25.0},
            "exit": {"from": "n1", "to": "n3", "speed_limit": 15.0},
            "ramp": {"from": "r0", "to": "n1", "speed_limit": 15.0}
        },
        "detectors": {
            "up_loop": {"type": "induction_loop", "edge": "up", "pos": 200.0},
            "down_loop": {"type": "induction_loop", "edge": "down", "pos": 100.0},
            "ramp_queue": {"type": "lane_area", "edge": "ramp"}
        },
        "traffic_lights": {
            "meter": {"controlled": [{"edge": "ramp", "lane": 0}]},
            "sig": {"controlled": [{"edge": "up", "lane": 0}, {"edge": "up", "lane": 1}]}
        }
    }))
    .unwrap();
    ScenarioConfig {
        network: NetworkSource::Inline(network),
        step_length: 0.5,
        ..ScenarioConfig::default()
    }
}

fn start(seed: u64) -> Simulation {
    let mut sim = Simulation::new("control", "control layer tests");
    let opts = StartOptions {
        seed: Some(seed),
        ..StartOptions::new("control.json")
    };
    sim.start_with_config(&config(), Path::new("."), &opts).unwrap();
    sim
}

fn along(edges: &[&str]) -> Routing {
    Routing::Edges(edges.iter().map(|e| e.to_string()).collect())
}

fn meter_junction() -> BTreeMap<String, JunctionParams> {
    BTreeMap::from([(
        "meter".to_string(),
        JunctionParams {
            meter_params: Some(MeterParams {
                min_rate: 200.0,
                max_rate: 2000.0,
                queue_detector: Some("ramp_queue".to_string()),
                ..MeterParams::default()
            }),
            flow_params: None,
        },
    )])
}

#[test]
fn metering_rates_are_clamped_and_recorded() {
    let mut sim = start(1);
    sim.add_tracked_junctions(meter_junction()).unwrap();

    assert_approx_eq!(sim.set_tl_metering_rate("meter", 5000.0).unwrap(), 2000.0);
    assert_eq!(sim.metering_rate("meter"), Some(2000.0));
    sim.step_through(10, true).unwrap();
    assert_approx_eq!(sim.set_tl_metering_rate("meter", 0.0).unwrap(), 200.0);
    sim.step_through(10, true).unwrap();
    assert_eq!(sim.tl_state("meter").unwrap().len(), 1);

    let data = sim.data();
    let meter = data.junctions["meter"].meter.as_ref().unwrap();
    assert_eq!(meter.rates.len(), 2);
    assert_approx_eq!(meter.rates[1].time, 5.0);
    assert_eq!(meter.queue_lengths.len(), 20);

    assert!(matches!(
        sim.set_tl_metering_rate("sig", 1000.0),
        Err(Error::NotAMeter(_))
    ));
}

#[test]
fn red_signal_holds_traffic_until_green() {
    let mut sim = start(1);
    sim.set_tl_colour("sig", "rr").unwrap();
    sim.add_vehicle(VehicleSpec::new("veh", "cars", along(&["up", "down"])))
        .unwrap();

    sim.step_seconds(90.0, false).unwrap();
    let vals = sim.get_vehicle_vals("veh").unwrap();
    assert_eq!(vals.edge, "up");
    assert!(vals.speed < 1.0);
    assert!(vals.lane_position < 0.6);

    sim.set_tl_colour("sig", "GG").unwrap();
    sim.step_seconds(20.0, false).unwrap();
    let passed = sim
        .get_vehicle_vals("veh")
        .map_or(true, |vals| vals.edge == "down");
    assert!(passed);
}

#[test]
fn phase_plans_merge_unless_overwritten() {
    let mut sim = start(1);
    let plan = |phases: &[&str], times: &[f64]| PhasePlan::new(phases.iter().copied(), times);
    sim.set_phases(
        BTreeMap::from([("sig".to_string(), plan(&["GG", "yy", "rr"], &[20.0, 3.0, 10.0]))]),
        true,
    )
    .unwrap();
    assert_eq!(sim.tl_state("sig").unwrap(), "GG");

    sim.set_phases(
        BTreeMap::from([("sig".to_string(), plan(&[], &[30.0, 3.0, 5.0]))]),
        false,
    )
    .unwrap();
    let phases = &sim.objects().phases["sig"];
    assert_eq!(phases.phases, ["GG", "yy", "rr"]);
    assert_eq!(phases.times, [30.0, 3.0, 5.0]);

    sim.step_seconds(31.0, false).unwrap();
    assert_eq!(sim.tl_state("sig").unwrap(), "yy");

    let bad = BTreeMap::from([("sig".to_string(), plan(&["GGG"], &[10.0]))]);
    assert!(matches!(
        sim.set_phases(bad, true),
        Err(Error::InvalidPhasePlan { .. })
    ));
}

#[test]
fn junctions_count_flows_and_record_signal_runs() {
    let mut sim = start(1);
    sim.add_tracked_junctions(BTreeMap::from([(
        "sig".to_string(),
        JunctionParams {
            flow_params: Some(FlowParams {
                inflow_detectors: vec!["up_loop".to_string()],
                outflow_detectors: vec!["down_loop".to_string()],
                vehicle_types: None,
            }),
            meter_params: None,
        },
    )]))
    .unwrap();
    let plan = PhasePlan::new(["GG", "yy", "rr"], &[50.0, 3.0, 7.0]);
    sim.set_phases(BTreeMap::from([("sig".to_string(), plan)]), true)
        .unwrap();
    sim.add_vehicle(VehicleSpec::new("car", "cars", along(&["up", "down"])))
        .unwrap();
    sim.add_vehicle(VehicleSpec::new("lorry", "lorries", along(&["up", "down"])))
        .unwrap();
    sim.step_seconds(60.0, true).unwrap();
    assert_approx_eq!(sim.curr_time(), 60.0);
    assert_eq!(sim.get_detector_vals("up_loop").unwrap().detector_type, "induction_loop");

    let data = sim.data();
    let junction = &data.junctions["sig"];
    let flows = junction.flows.as_ref().unwrap();
    assert_eq!(flows.inflow.len(), 120);
    assert_eq!(flows.inflow.iter().sum::<usize>(), 2);
    assert_eq!(flows.outflow.iter().sum::<usize>(), 2);
    for vehicle_type in ["cars", "lorries"] {
        let counts = &flows.inflow_by_type[vehicle_type];
        assert_eq!(counts.len(), 120);
        assert_eq!(counts.iter().sum::<usize>(), 1);
    }

    let history = junction.signal_history.as_ref().unwrap();
    assert_eq!(history.len(), 2);
    let colours: Vec<_> = history[0].iter().map(|run| run.colour.as_str()).collect();
    assert_eq!(colours, ["G", "y", "r", "G"]);
    assert_approx_eq!(history[0][1].duration, 3.0);
    assert_approx_eq!(history[0][2].duration, 7.0);
    let total: f64 = history[1].iter().map(|run| run.duration).sum();
    assert_approx_eq!(total, 60.0);
}

#[test]
fn speed_limit_controller_sets_and_restores_limits() {
    let mut sim = start(1);
    sim.add_controllers(BTreeMap::from([(
        "vsl".to_string(),
        ControllerParams::SpeedLimit(VslParams {
            geometry_ids: vec!["down".to_string()],
        }),
    )]))
    .unwrap();
    assert_approx_eq!(sim.edge_speed_limit("down").unwrap(), 90.0);

    assert!(sim.controller("vsl").unwrap().activate().is_err());
    sim.controller("vsl").unwrap().set_speed_limit(60.0).unwrap();
    assert!(sim.controller("vsl").unwrap().is_active().unwrap());
    assert_approx_eq!(sim.edge_speed_limit("down").unwrap(), 60.0);
    assert_approx_eq!(sim.edge_speed_limit("up").unwrap(), 90.0);

    sim.step_seconds(10.0, true).unwrap();
    sim.controller("vsl").unwrap().deactivate().unwrap();
    assert!(!sim.controller("vsl").unwrap().is_active().unwrap());
    assert_approx_eq!(sim.edge_speed_limit("down").unwrap(), 90.0);

    let data = sim.data();
    let vsl = &data.controllers["vsl"];
    assert_eq!(vsl.controller_type, "VSL");
    let limits = vsl.speed_limits.as_ref().unwrap();
    assert_eq!(limits.len(), 2);
    assert_eq!(limits[1].speed_limit, None);
    assert_eq!(vsl.avg_speeds.as_ref().unwrap().len(), 20);

    assert!(sim.controller("nope").is_err());
}

#[test]
fn route_guidance_diverts_detected_vehicles() {
    let mut sim = start(1);
    sim.add_controllers(BTreeMap::from([(
        "rerouter".to_string(),
        ControllerParams::RouteGuidance(RgParams {
            detector_ids: vec!["up_loop".to_string()],
            new_destination: Some("exit".to_string()),
            new_route: None,
            diversion_pct: 1.0,
            highlight: Some("00FF00".to_string()),
            vehicle_type: None,
        }),
    )]))
    .unwrap();
    sim.controller("rerouter").unwrap().activate().unwrap();
    sim.add_vehicle(VehicleSpec::new("veh", "cars", along(&["up", "down"])))
        .unwrap();

    let mut diverted = false;
    for _ in 0..120 {
        sim.step_through(1, false).unwrap();
        let Ok(vals) = sim.get_vehicle_vals("veh") else {
            break;
        };
        if vals.destination == "exit" {
            assert_eq!(vals.route, ["up", "exit"]);
            assert_eq!(vals.colour.as_deref(), Some("00FF00"));
            diverted = true;
            break;
        }
    }
    assert!(diverted);
    assert_eq!(sim.get_vehicle_vals("veh").unwrap().origin, "up");
    sim.step_seconds(120.0, false).unwrap();
    assert!(!sim.vehicle_exists("veh"));

    let data = sim.data();
    let diversions = data.controllers["rerouter"].diverted.as_ref().unwrap();
    assert_eq!(diversions.len(), 1);
    assert_eq!(diversions[0].vehicle_id, "veh");
    let trip = &data.trips.completed["veh"];
    assert_eq!(trip.origin, "up");
    assert_eq!(trip.destination, "exit");
    assert!(!trip.removed);
}

#[test]
fn route_guidance_can_assign_named_routes() {
    let mut sim = start(1);
    sim.add_route_edges(&["up", "exit"], "to_exit").unwrap();
    assert!(sim.add_route_edges(&["exit", "up"], "broken").is_err());
    sim.add_controllers(BTreeMap::from([(
        "rerouter".to_string(),
        ControllerParams::RouteGuidance(RgParams {
            detector_ids: vec!["up_loop".to_string()],
            new_destination: None,
            new_route: Some("to_exit".to_string()),
            diversion_pct: 1.0,
            highlight: None,
            vehicle_type: Some(vec!["cars".to_string()]),
        }),
    )]))
    .unwrap();
    sim.controller("rerouter").unwrap().activate().unwrap();
    sim.add_vehicle(VehicleSpec::new("car", "cars", along(&["up", "down"])))
        .unwrap();
    sim.add_vehicle(VehicleSpec::new("lorry", "lorries", along(&["up", "down"])))
        .unwrap();
    sim.step_seconds(15.0, false).unwrap();

    let car = sim.get_vehicle_vals("car").unwrap();
    assert_eq!(car.route_id.as_deref(), Some("to_exit"));
    assert_eq!(car.route, ["up", "exit"]);
    let lorry = sim.get_vehicle_vals("lorry").unwrap();
    assert_eq!(lorry.route_id, None);
    assert_eq!(lorry.destination, "down");
}

#[test]
fn scheduled_events_select_release_and_remove_vehicles() {
    let mut sim = start(1);
    sim.add_vehicle(VehicleSpec::new("a", "cars", along(&["up", "down"])))
        .unwrap();
    sim.add_vehicle(VehicleSpec::new("b", "cars", along(&["ramp", "down"])))
        .unwrap();
    let event = |value| -> EventDef { serde_json::from_value(value).unwrap() };
    sim.add_events(BTreeMap::from([
        (
            "slowdown".to_string(),
            event(json!({
                "start_time": 2.0, "end_time": 30.0,
                "vehicles": {"locations": ["up"], "effect_duration": 5.0,
                             "actions": {"speed": 0.0}}
            })),
        ),
        (
            "breakdown".to_string(),
            event(json!({
                "start_time": 2.0, "end_time": 8.0,
                "vehicles": {"vehicle_ids": ["b"], "remove_affected_vehicles": true,
                             "actions": {"speed": 0.0, "highlight": "FF0000"}}
            })),
        ),
    ]))
    .unwrap();

    sim.step_seconds(3.0, false).unwrap();
    assert!(sim.vehicle_frozen("a").unwrap());
    assert!(sim.vehicle_frozen("b").unwrap());
    assert_eq!(sim.get_vehicle_vals("b").unwrap().colour.as_deref(), Some("FF0000"));

    sim.step_seconds(3.0, false).unwrap();
    assert!(sim.vehicle_frozen("a").unwrap());

    sim.step_seconds(2.0, false).unwrap();
    assert!(!sim.vehicle_frozen("a").unwrap());
    assert!(!sim.vehicle_exists("b"));

    let data = sim.data();
    assert_eq!(data.events["slowdown"].affected_vehicles, ["a"]);
    assert_eq!(data.events["slowdown"].status, EventStatus::Active);
    assert_eq!(data.events["breakdown"].status, EventStatus::Completed);
    let trip = &data.trips.completed["b"];
    assert!(trip.removed);
    assert_eq!(trip.destination, "ramp");
}

#[test]
fn incidents_freeze_vehicles_until_they_end() {
    let mut sim = start(1);
    assert!(matches!(
        sim.cause_incident(&IncidentSpec::new(10.0)),
        Err(Error::NoIncidentVehicles)
    ));

    sim.add_vehicle(VehicleSpec::new("veh", "cars", along(&["up", "down"])))
        .unwrap();
    sim.step_seconds(5.0, false).unwrap();
    let id = sim
        .cause_incident(&IncidentSpec::new(10.0).vehicles(["veh"]).edge_speed(20.0))
        .unwrap();
    assert_eq!(id, "incident_0");
    assert!(sim.vehicle_frozen("veh").unwrap());
    assert_approx_eq!(sim.edge_speed_limit("up").unwrap(), 20.0);

    sim.step_seconds(8.0, false).unwrap();
    assert!(sim.get_vehicle_vals("veh").unwrap().speed < 0.5);
    assert!(sim.vehicle_frozen("veh").unwrap());

    sim.step_seconds(3.0, true).unwrap();
    assert!(!sim.vehicle_frozen("veh").unwrap());
    assert_approx_eq!(sim.edge_speed_limit("up").unwrap(), 90.0);

    let data = sim.data();
    assert_eq!(data.events[&id].status, EventStatus::Completed);
    assert_eq!(data.events[&id].affected_vehicles, ["veh"]);
}

#[test]
fn overlapping_limits_fall_back_to_the_ones_still_in_force() {
    let mut sim = start(1);
    sim.add_events(BTreeMap::from([(
        "roadworks".to_string(),
        serde_json::from_value(json!({
            "start_time": 0.0, "end_time": 60.0,
            "edges": {"edge_ids": ["up"], "actions": {"max_speed": 70.0}}
        }))
        .unwrap(),
    )]))
    .unwrap();
    sim.add_controllers(BTreeMap::from([(
        "vsl".to_string(),
        ControllerParams::SpeedLimit(VslParams {
            geometry_ids: vec!["up".to_string()],
        }),
    )]))
    .unwrap();
    sim.add_vehicle(VehicleSpec::new("veh", "cars", along(&["up", "down"])))
        .unwrap();
    sim.step_seconds(5.0, false).unwrap();
    assert_approx_eq!(sim.edge_speed_limit("up").unwrap(), 70.0);

    sim.controller("vsl").unwrap().set_speed_limit(50.0).unwrap();
    sim.cause_incident(&IncidentSpec::new(10.0).vehicles(["veh"]).edge_speed(20.0))
        .unwrap();
    assert_approx_eq!(sim.edge_speed_limit("up").unwrap(), 20.0);

    // The incident ends while the roadworks and the controller are still in force.
    sim.step_seconds(12.0, false).unwrap();
    assert_approx_eq!(sim.edge_speed_limit("up").unwrap(), 50.0);
    sim.controller("vsl").unwrap().deactivate().unwrap();
    assert_approx_eq!(sim.edge_speed_limit("up").unwrap(), 70.0);

    sim.step_seconds(50.0, false).unwrap();
    assert_approx_eq!(sim.edge_speed_limit("up").unwrap(), 90.0);
}

#[test]
fn callbacks_see_vehicles_enter_and_leave() {
    let mut sim = start(1);
    let entered = Rc::new(RefCell::new(vec![]));
    let left = Rc::new(RefCell::new(vec![]));

    let log = Rc::clone(&entered);
    let in_id = sim.add_vehicle_in_function(move |sim, event| {
        let speed = sim.get_vehicle_vals(&event.vehicle_id).unwrap().speed;
        log.borrow_mut().push((event.vehicle_id.clone(), speed));
    });
    let log = Rc::clone(&left);
    sim.add_vehicle_out_function(move |_, event| {
        log.borrow_mut().push(event.vehicle_id.clone());
    });

    sim.add_vehicle(VehicleSpec::new("veh", "cars", along(&["up", "down"])))
        .unwrap();
    sim.step_seconds(120.0, true).unwrap();

    assert_eq!(entered.borrow().len(), 1);
    assert_eq!(entered.borrow()[0].0, "veh");
    assert_eq!(*left.borrow(), ["veh"]);
    assert!(sim.data().trips.completed.contains_key("veh"));

    sim.remove_vehicle_in_function(in_id).unwrap();
    assert!(sim.remove_vehicle_in_function(in_id).is_err());
    sim.add_vehicle(VehicleSpec::new("late", "cars", along(&["up"])))
        .unwrap();
    sim.step_through(2, false).unwrap();
    assert_eq!(entered.borrow().len(), 1);
}

#[test]
fn removed_vehicles_end_their_trips() {
    let mut sim = start(1);
    let left = Rc::new(RefCell::new(vec![]));
    let log = Rc::clone(&left);
    sim.add_vehicle_out_function(move |_, event| {
        log.borrow_mut().push((event.vehicle_id.clone(), event.destination.clone()));
    });
    sim.add_vehicle(VehicleSpec::new("veh", "cars", along(&["up", "down"])))
        .unwrap();
    sim.step_seconds(5.0, true).unwrap();
    sim.remove_vehicle("veh").unwrap();
    assert!(!sim.vehicle_exists("veh"));
    sim.step_through(1, true).unwrap();

    assert_eq!(*left.borrow(), [("veh".to_string(), Some("up".to_string()))]);
    let data = sim.data();
    assert!(!data.trips.incomplete.contains_key("veh"));
    let trip = &data.trips.completed["veh"];
    assert!(trip.removed);
    assert_eq!(trip.destination, "up");
    assert!(trip.arrival.unwrap() > 5.0);
}

#[test]
fn objects_can_be_saved_and_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("objects.json");

    let mut sim = start(1);
    sim.add_tracked_junctions(meter_junction()).unwrap();
    sim.add_controllers(BTreeMap::from([(
        "vsl".to_string(),
        ControllerParams::SpeedLimit(VslParams {
            geometry_ids: vec!["down_0".to_string()],
        }),
    )]))
    .unwrap();
    sim.add_tracked_edges(["up", "down"]).unwrap();
    sim.add_route("ramp", "down", "merge").unwrap();
    sim.save_objects(&path).unwrap();

    let saved = SimObjects::load(&path).unwrap();
    assert_eq!(saved.routes["merge"], ["ramp", "down"]);

    let mut copy = start(1);
    copy.load_objects(&path).unwrap();
    assert_eq!(copy.objects(), sim.objects());
}

#[test]
fn recorded_data_survives_saving() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = start(3);
    sim.add_tracked_edges(["up"]).unwrap();
    for i in 0..5 {
        let name = format!("car_{}", i);
        sim.add_vehicle(VehicleSpec::new(name, "cars", along(&["up", "down"])))
            .unwrap();
    }
    sim.step_through(4, false).unwrap();
    sim.step_seconds(30.0, true).unwrap();
    sim.end().unwrap();
    assert!(matches!(sim.step_through(1, true), Err(Error::Ended)));

    let data = sim.data();
    assert_eq!(data.start_step, 4);
    assert_eq!(data.num_steps(), 60);
    assert_eq!(data.all_vehicles.len(), 60);
    assert_eq!(data.edges["up"].speeds.len(), 60);
    assert_eq!(data.detectors["up_loop"].vehicle_counts.len(), 60);
    assert_eq!(data.seed, Some(3));

    let path = dir.path().join("data.bson.lz4");
    sim.save_data(&path).unwrap();
    assert_eq!(SimData::load(&path).unwrap(), data);

    let summary = dir.path().join("summary.txt");
    sim.print_summary(Some(summary.as_path())).unwrap();
    let text = std::fs::read_to_string(summary).unwrap();
    assert!(text.contains("control layer tests"));
    assert!(text.contains("60 steps of 0.5 s"));
}

#[test]
fn seeds_above_i64_max_can_be_exported() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = start(u64::MAX - 5);
    sim.step_seconds(5.0, true).unwrap();
    for name in ["data.bson", "data.bson.lz4", "data.json"] {
        let path = dir.path().join(name);
        sim.save_data(&path).unwrap();
        assert_eq!(SimData::load(&path).unwrap().seed, Some(u64::MAX - 5));
    }
}

#[test]
fn flows_never_share_vehicle_ids() {
    let mut sim = start(1);
    let flow = |id: &str| -> FlowDef {
        serde_json::from_value(json!({
            "id": id, "origin": "up", "destination": "down", "rate": 3600.0
        }))
        .unwrap()
    };
    sim.add_demand(&flow("f")).unwrap();
    assert!(matches!(sim.add_demand(&flow("f")), Err(Error::Config(_))));
    sim.add_demand(&flow("g")).unwrap();
    sim.step_seconds(10.0, false).unwrap();

    let ids = sim.vehicle_ids().unwrap();
    let mut unique = ids.clone();
    unique.dedup();
    assert_eq!(ids, unique);
    assert!(ids.iter().any(|id| id.starts_with("f.")));
    assert!(ids.iter().any(|id| id.starts_with("g.")));
}

#[test]
fn individual_vehicle_data_is_recorded_per_step() {
    let opts = StartOptions {
        seed: Some(1),
        get_individual_vehicle_data: true,
        ..StartOptions::new("control.json")
    };
    let mut sim = Simulation::new("snapshots", "");
    sim.start_with_config(&config(), Path::new("."), &opts).unwrap();
    sim.add_vehicle(VehicleSpec::new("veh", "cars", along(&["up", "down"])))
        .unwrap();
    sim.step_through(1, false).unwrap();
    sim.step_through(4, true).unwrap();

    let data = sim.data();
    let snapshots = data.vehicles.as_ref().unwrap();
    assert_eq!(snapshots.len(), 4);
    assert!(snapshots.iter().all(|step| step.len() == 1 && step[0].vehicle_id == "veh"));
    assert!(snapshots[3][0].lane_position > snapshots[0][0].lane_position);
    assert!(start(1).data().vehicles.is_none());
}

#[test]
fn demand_is_read_from_csv() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "origin,destination,route_id,start_time,end_time,veh/hour,vehicle_types,vehicle_type_dists\n\
         up,down,,0,,1800,cars,\n\
         ramp,down,,0,,900,cars;lorries,0.5;0.5"
    )
    .unwrap();
    let mut sim = start(1);
    sim.load_demand(file.path()).unwrap();
    sim.step_seconds(20.0, false).unwrap();

    let ids = sim.vehicle_ids().unwrap();
    assert!(ids.iter().any(|id| id.starts_with("flow_0.")));
    assert!(ids.iter().any(|id| id.starts_with("flow_1.")));
    assert!(sim.load_demand("missing.csv").is_err());
}

#[test]
fn same_seed_same_run() {
    let run = |seed| {
        let mut sim = start(seed);
        sim.add_demand(&serde_json::from_value(json!({
            "origin": "up", "destination": "down",
            "vehicle_types": ["cars", "lorries"], "rate": 1800.0
        })).unwrap())
        .unwrap();
        sim.step_seconds(60.0, true).unwrap();
        sim.data().all_vehicles
    };
    let first = run(7);
    assert!(first.iter().any(|n| *n > 0));
    assert_eq!(first, run(7));
}
