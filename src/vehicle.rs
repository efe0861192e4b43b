use self::acceleration::DriverModel;
use crate::network::Network;
use crate::util::Interval;
use crate::{EdgeId, LinkId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

pub(crate) mod acceleration;
pub(crate) mod routing;

/// Vehicles slower than this, in m/s, count as halting.
pub const HALTING_SPEED: f64 = 0.1;

/// The attributes shared by all vehicles of a type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleType {
    /// The vehicle length in m.
    pub length: f64,
    /// The vehicle width in m.
    pub width: f64,
    /// The maximum acceleration of the vehicle, in m/s^2.
    pub max_acc: f64,
    /// The comfortable deceleration of the vehicle, in m/s^2.
    pub comf_dec: f64,
    /// The top speed of the vehicle, in m/s.
    pub max_speed: f64,
    /// The desired time gap to the vehicle ahead, in s.
    pub time_headway: f64,
    /// Standard deviation of the factor applied to speed limits by each driver.
    pub speed_dev: f64,
    /// Display colour as a hex string.
    pub colour: Option<String>,
}

impl Default for VehicleType {
    fn default() -> Self {
        Self {
            length: 4.5,
            width: 1.8,
            max_acc: 2.6,
            comf_dec: 4.5,
            max_speed: 50.0,
            time_headway: 1.2,
            speed_dev: 0.1,
            colour: None,
        }
    }
}

impl VehicleType {
    /// The types available in every simulation, which the scenario may override.
    pub fn builtin() -> BTreeMap<String, VehicleType> {
        let car = VehicleType::default();
        let types = [
            ("default", car.clone()),
            ("cars", car.clone()),
            (
                "lorries",
                VehicleType {
                    length: 12.0,
                    width: 2.5,
                    max_acc: 1.3,
                    comf_dec: 4.0,
                    max_speed: 25.0,
                    time_headway: 1.8,
                    speed_dev: 0.05,
                    ..car.clone()
                },
            ),
            (
                "motorcycles",
                VehicleType {
                    length: 2.2,
                    width: 0.9,
                    max_acc: 3.5,
                    comf_dec: 5.0,
                    max_speed: 55.0,
                    time_headway: 1.0,
                    ..car.clone()
                },
            ),
            (
                "vans",
                VehicleType {
                    length: 6.0,
                    width: 2.1,
                    max_acc: 2.0,
                    max_speed: 40.0,
                    time_headway: 1.4,
                    ..car
                },
            ),
        ];
        types
            .into_iter()
            .map(|(name, vtype)| (name.to_string(), vtype))
            .collect()
    }
}

/// The stretch of a link the centre of a vehicle covered during the last step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Span {
    pub link: LinkId,
    pub range: Interval<f64>,
}

/// The result of [Vehicle::advance].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Advance {
    /// Still on the same link.
    Stayed,
    /// Moved onto a new link.
    Moved { from: LinkId },
    /// Reached the end of its route and left the network.
    Exited,
}

/// Everything needed to place a new vehicle in the network.
#[derive(Clone, Debug)]
pub(crate) struct Departure {
    pub name: String,
    pub vehicle_type: String,
    pub route: Vec<EdgeId>,
    pub route_id: Option<String>,
    pub link: LinkId,
    pub vel: f64,
    pub time: f64,
    pub speed_factor: f64,
}

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The external name of the vehicle.
    name: String,
    /// The name of the vehicle's type.
    vehicle_type: String,
    /// Half the vehicle's length in m.
    half_len: f64,
    /// The vehicle's top speed in m/s.
    max_speed: f64,
    driver: DriverModel,
    /// Multiplies the speed limit to give the speed the driver aims for.
    speed_factor: f64,
    /// The link the vehicle is on.
    link: LinkId,
    /// The longitudinal position along the current link, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// The acceleration applied during the last step, in m/s^2.
    last_acc: f64,
    /// The edge the vehicle entered the network on.
    origin: EdgeId,
    /// The edges of the rest of the vehicle's route.
    route: Vec<EdgeId>,
    /// The index of the current edge in `route`.
    route_idx: usize,
    /// The named route the vehicle was assigned, if any.
    route_id: Option<String>,
    /// The time the vehicle entered the network, in s.
    departure: f64,
    /// Highlight colour as a hex string.
    colour: Option<String>,
    /// A speed the vehicle may not exceed, imposed by an event, in m/s.
    speed_cap: Option<f64>,
    /// The accumulated time spent halting, in s.
    waiting_time: f64,
    /// The distance travelled, in m.
    distance: f64,
    /// The stretches of road covered during the last step.
    trail: SmallVec<[Span; 2]>,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(vtype: &VehicleType, departure: Departure) -> Self {
        let half_len = 0.5 * vtype.length;
        Self {
            name: departure.name,
            vehicle_type: departure.vehicle_type,
            half_len,
            max_speed: vtype.max_speed,
            driver: DriverModel::new(vtype),
            speed_factor: departure.speed_factor,
            link: departure.link,
            pos: half_len,
            vel: departure.vel,
            last_acc: 0.0,
            origin: departure.route[0],
            route: departure.route,
            route_idx: 0,
            route_id: departure.route_id,
            departure: departure.time,
            colour: vtype.colour.clone(),
            speed_cap: None,
            waiting_time: 0.0,
            distance: 0.0,
            trail: SmallVec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vehicle_type(&self) -> &str {
        &self.vehicle_type
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// The ID of the link the vehicle is currently travelling on.
    pub fn link_id(&self) -> LinkId {
        self.link
    }

    /// The longitudinal position of the centre of the vehicle in m.
    pub fn pos_mid(&self) -> f64 {
        self.pos
    }

    /// The longitudinal position of the rear of the vehicle in m.
    pub fn pos_rear(&self) -> f64 {
        self.pos - self.half_len
    }

    /// The longitudinal position of the front of the vehicle in m.
    pub fn pos_front(&self) -> f64 {
        self.pos + self.half_len
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.vel < HALTING_SPEED
    }

    /// The edge the vehicle is on.
    pub fn edge(&self) -> EdgeId {
        self.route[self.route_idx]
    }

    pub fn origin(&self) -> EdgeId {
        self.origin
    }

    pub fn destination(&self) -> EdgeId {
        self.route[self.route.len() - 1]
    }

    /// The next edge on the route, if the vehicle is not on its last one.
    pub fn next_edge(&self) -> Option<EdgeId> {
        self.route.get(self.route_idx + 1).copied()
    }

    /// The speed the vehicle aims for on a link with the given limit, in m/s.
    pub fn desired_speed(&self, speed_limit: f64) -> f64 {
        let speed = f64::min(speed_limit * self.speed_factor, self.max_speed);
        match self.speed_cap {
            Some(cap) => f64::min(speed, cap),
            None => speed,
        }
    }

    pub(crate) fn trail(&self) -> &[Span] {
        &self.trail
    }

    pub(crate) fn set_colour(&mut self, colour: Option<String>) {
        self.colour = colour;
    }

    pub(crate) fn set_speed_cap(&mut self, cap: Option<f64>) {
        self.speed_cap = cap;
    }

    /// Replaces the rest of the route. `route` must start with the current edge.
    /// The origin stays the edge the vehicle entered on.
    pub(crate) fn set_route(&mut self, route: Vec<EdgeId>, route_id: Option<String>) {
        debug_assert_eq!(route.first(), Some(&self.edge()));
        self.route = route;
        self.route_idx = 0;
        self.route_id = route_id;
    }

    /// Determines whether the vehicle can comfortably stop before reaching `pos`.
    pub(crate) fn can_stop(&self, pos: f64) -> bool {
        let net_dist = pos - self.pos_front();
        net_dist >= self.driver.braking_distance(self.vel)
    }

    /// Applies an acceleration to the vehicle so it stops before the line at `pos`.
    pub(crate) fn stop_at_line(&self, pos: f64) {
        let net_dist = pos - self.pos_front();
        self.driver.stop_before(net_dist, self.vel);
    }

    /// Applies an acceleration to the vehicle so it follows a vehicle
    /// whose rear is at `pos` and travels at `vel`.
    pub(crate) fn follow_vehicle(&self, pos: f64, vel: f64) {
        let net_dist = pos - self.pos_front();
        self.driver.follow(net_dist, self.vel, vel);
    }

    /// Drives towards the desired speed on a link with the given limit.
    pub(crate) fn cruise(&self, speed_limit: f64) {
        self.driver.cruise(self.vel, self.desired_speed(speed_limit));
    }

    /// Prepares for the speed limit of the link starting at `pos`.
    pub(crate) fn slow_for(&self, speed_limit: f64, pos: f64) {
        let desired = self.desired_speed(speed_limit);
        self.driver.slow_for(self.vel, desired, pos - self.pos_front());
    }

    pub(crate) fn emergency_stop(&self) {
        self.driver.brake_hard();
    }

    pub(crate) fn begin_step(&self) {
        self.driver.begin_step()
    }

    /// Integrates the vehicle's velocity and position
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    pub(crate) fn integrate(&mut self, dt: f64) {
        let vel = f64::max(self.vel + dt * self.driver.acceleration(), 0.0);
        let pos = self.pos + 0.5 * (self.vel + vel) * dt;
        self.last_acc = (vel - self.vel) / dt;
        self.distance += pos - self.pos;
        self.trail.clear();
        self.trail.push(Span {
            link: self.link,
            range: Interval::new(self.pos, pos),
        });
        self.vel = vel;
        self.pos = pos;

        if self.has_stopped() {
            self.waiting_time += dt;
        }
    }

    /// Checks whether the vehicle has travelled past the end of its current link,
    /// and if so, advances it to the next link on its route if there is one.
    pub(crate) fn advance(&mut self, network: &Network) -> Advance {
        let from = self.link;
        loop {
            let length = network.links()[self.link].length();
            if self.pos <= length {
                break;
            }
            let Some(next_edge) = self.next_edge() else {
                return Advance::Exited;
            };
            let next = network.next_link(self.link, next_edge);
            self.route_idx += 1;
            self.link = next;
            self.pos -= length;
            if let Some(last) = self.trail.last().map(|s| s.range) {
                self.trail.push(Span {
                    link: next,
                    range: Interval::new(last.min - length, last.max - length),
                });
            }
        }
        if self.link == from {
            Advance::Stayed
        } else {
            Advance::Moved { from }
        }
    }

    /// Builds a snapshot of the vehicle in the given units.
    pub(crate) fn vals(&self, network: &Network, units: crate::Units) -> VehicleVals {
        let link = &network.links()[self.link];
        let position = link.world_pos(self.pos);
        VehicleVals {
            vehicle_id: self.name.clone(),
            vehicle_type: self.vehicle_type.clone(),
            speed: units.speed_from_ms(self.vel),
            acceleration: self.last_acc,
            position: [position.x, position.y],
            edge: network.edge_name(self.edge()).to_string(),
            lane: link.index(),
            lane_position: units.dist_from_m(self.pos),
            route: self
                .route
                .iter()
                .map(|e| network.edge_name(*e).to_string())
                .collect(),
            route_id: self.route_id.clone(),
            origin: network.edge_name(self.origin()).to_string(),
            destination: network.edge_name(self.destination()).to_string(),
            departure: self.departure,
            waiting_time: self.waiting_time,
            distance: units.dist_from_m(self.distance),
            colour: self.colour.clone(),
        }
    }
}

/// A snapshot of a vehicle, in the simulation's units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleVals {
    pub vehicle_id: String,
    pub vehicle_type: String,
    pub speed: f64,
    /// Acceleration in m/s^2.
    pub acceleration: f64,
    /// World coordinates in m.
    pub position: [f64; 2],
    pub edge: String,
    pub lane: usize,
    /// Distance of the vehicle's centre from the start of its lane.
    pub lane_position: f64,
    pub route: Vec<String>,
    pub route_id: Option<String>,
    pub origin: String,
    pub destination: String,
    /// Departure time in s.
    pub departure: f64,
    /// Time spent halting in s.
    pub waiting_time: f64,
    pub distance: f64,
    pub colour: Option<String>,
}
