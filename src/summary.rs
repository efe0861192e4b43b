use crate::data::SimData;
use crate::events::EventStatus;
use crate::objects::SimObjects;
use itertools::Itertools;
use std::fmt;

/// A plain-text report of a simulation run.
pub(crate) struct Summary<'a> {
    pub data: &'a SimData,
    pub objects: &'a SimObjects,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data;
        let dist = data.units.dist_label();
        let speed = data.units.speed_label();

        writeln!(f, "SIMULATION SUMMARY")?;
        writeln!(f, "==================")?;
        writeln!(f, "Scenario:         {}", data.scenario_name)?;
        if !data.scenario_desc.is_empty() {
            writeln!(f, "Description:      {}", data.scenario_desc)?;
        }
        writeln!(
            f,
            "Run:              {} to {}",
            data.sim_start.as_deref().unwrap_or("-"),
            data.sim_end.as_deref().unwrap_or("-")
        )?;
        writeln!(
            f,
            "Recorded steps:   {}..{} ({} steps of {} s, {:.1} s)",
            data.start_step,
            data.end_step,
            data.num_steps(),
            data.step_length,
            data.num_steps() as f64 * data.step_length
        )?;
        writeln!(f, "Units:            {}", data.units)?;
        match data.seed {
            Some(seed) => writeln!(f, "Seed:             {}", seed)?,
            None => writeln!(f, "Seed:             random")?,
        }

        writeln!(f)?;
        writeln!(f, "VEHICLES")?;
        let peak = data.all_vehicles.iter().max().copied().unwrap_or(0);
        let mean = if data.all_vehicles.is_empty() {
            0.0
        } else {
            data.all_vehicles.iter().sum::<usize>() as f64 / data.all_vehicles.len() as f64
        };
        writeln!(f, "  Peak in network:    {}", peak)?;
        writeln!(f, "  Mean in network:    {:.1}", mean)?;
        writeln!(f, "  Total time spent:   {:.1} s", data.tts.iter().sum::<f64>())?;
        writeln!(f, "  Total delay:        {:.1} s", data.delay.iter().sum::<f64>())?;
        let durations = data
            .trips
            .completed
            .values()
            .filter_map(|t| Some(t.arrival? - t.departure))
            .collect_vec();
        write!(f, "  Trips completed:    {}", durations.len())?;
        if !durations.is_empty() {
            let mean = durations.iter().sum::<f64>() / durations.len() as f64;
            write!(f, " (mean duration {:.1} s)", mean)?;
        }
        writeln!(f)?;
        writeln!(f, "  Trips incomplete:   {}", data.trips.incomplete.len())?;

        if !data.edges.is_empty() {
            writeln!(f)?;
            writeln!(f, "TRACKED EDGES ({})", data.edges.len())?;
            for (id, edge) in &data.edges {
                let speeds = edge.speeds.iter().flatten().collect_vec();
                let mean_speed = if speeds.is_empty() {
                    "-".to_string()
                } else {
                    format!("{:.1}", speeds.iter().copied().sum::<f64>() / speeds.len() as f64)
                };
                writeln!(
                    f,
                    "  {}: {:.2} {}, {} lanes, mean speed {} {}",
                    id, edge.length, dist, edge.lanes, mean_speed, speed
                )?;
            }
        }

        if !data.detectors.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "DETECTORS ({}): {}",
                data.detectors.len(),
                data.detectors.keys().join(", ")
            )?;
        }

        if !data.junctions.is_empty() {
            writeln!(f)?;
            writeln!(f, "JUNCTIONS")?;
            for (id, junction) in &data.junctions {
                let mut parts = vec![];
                if let Some(history) = &junction.signal_history {
                    parts.push(format!("{} signals tracked", history.len()));
                }
                if let Some(flows) = &junction.flows {
                    parts.push(format!(
                        "inflow {} veh, outflow {} veh",
                        flows.inflow.iter().sum::<usize>(),
                        flows.outflow.iter().sum::<usize>()
                    ));
                }
                if let Some(meter) = &junction.meter {
                    let rates = meter.rates.iter().map(|r| format!("{:.0}", r.rate)).join("/");
                    parts.push(format!(
                        "meter [{:.0}, {:.0}] veh/h, rates {}, peak queue {}",
                        meter.min_rate,
                        meter.max_rate,
                        if rates.is_empty() { "-".into() } else { rates },
                        meter.queue_lengths.iter().max().copied().unwrap_or(0)
                    ));
                }
                writeln!(f, "  {}: {}", id, parts.join("; "))?;
            }
        }

        if !data.controllers.is_empty() {
            writeln!(f)?;
            writeln!(f, "CONTROLLERS")?;
            for (id, controller) in &data.controllers {
                write!(
                    f,
                    "  {} ({}): {} activation changes",
                    id,
                    controller.controller_type,
                    controller.activation_times.len()
                )?;
                if let Some(diverted) = &controller.diverted {
                    write!(f, ", {} vehicles diverted", diverted.len())?;
                }
                if let Some(limits) = &controller.speed_limits {
                    let limits = limits
                        .iter()
                        .map(|l| match l.speed_limit {
                            Some(v) => format!("{:.0}", v),
                            None => "default".to_string(),
                        })
                        .join(" -> ");
                    write!(f, ", limits {} {}", limits, speed)?;
                }
                writeln!(f)?;
            }
        }

        if !data.events.is_empty() {
            writeln!(f)?;
            writeln!(f, "EVENTS")?;
            for (id, event) in &data.events {
                let status = match event.status {
                    EventStatus::Scheduled => "scheduled",
                    EventStatus::Active => "active",
                    EventStatus::Completed => "completed",
                };
                write!(
                    f,
                    "  {}: {}, {:.1} s to {:.1} s",
                    id, status, event.event.start_time, event.event.end_time
                )?;
                if !event.affected_vehicles.is_empty() {
                    write!(f, ", vehicles {}", event.affected_vehicles.iter().join(", "))?;
                }
                writeln!(f)?;
            }
        }

        if !self.objects.routes.is_empty() {
            writeln!(f)?;
            writeln!(f, "ROUTES")?;
            for (id, edges) in &self.objects.routes {
                writeln!(f, "  {}: {}", id, edges.iter().join(" -> "))?;
            }
        }
        Ok(())
    }
}
