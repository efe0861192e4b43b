//! Longitudinal driver behaviour: the intelligent driver model, plus the
//! braking constraints applied at stop lines and speed limit changes.

use super::VehicleType;
use std::cell::Cell;

/// The gap kept to a stopped vehicle ahead, in m.
pub const MIN_GAP: f64 = 2.0;

/// The hardest braking of any vehicle, in m/s^2.
const MAX_BRAKE: f64 = 6.0;

/// The gap kept at a stop line when stopped, in m.
const STOP_MARGIN: f64 = 2.5;

/// A driver's choice of acceleration for one step. Each constraint may only
/// lower the acceleration chosen so far.
#[derive(Clone, Debug)]
pub struct DriverModel {
    time_headway: f64,
    max_acc: f64,
    comf_dec: f64,
    chosen: Cell<f64>,
}

impl DriverModel {
    pub fn new(vtype: &VehicleType) -> Self {
        Self {
            time_headway: vtype.time_headway,
            max_acc: vtype.max_acc,
            comf_dec: vtype.comf_dec,
            chosen: Cell::new(vtype.max_acc),
        }
    }

    /// Clears the constraints of the previous step.
    pub fn begin_step(&self) {
        self.chosen.set(self.max_acc);
    }

    /// The acceleration chosen for this step, in m/s^2.
    pub fn acceleration(&self) -> f64 {
        f64::max(self.chosen.get(), -MAX_BRAKE)
    }

    pub fn brake_hard(&self) {
        self.chosen.set(-MAX_BRAKE);
    }

    fn constrain(&self, acc: f64) {
        self.chosen.set(f64::min(self.chosen.get(), acc));
    }

    /// Free-road acceleration towards `desired`, both in m/s.
    pub fn cruise(&self, vel: f64, desired: f64) {
        if desired <= 0.0 {
            return self.brake_hard();
        }
        self.constrain(self.max_acc * (1.0 - (vel / desired).powi(4)));
    }

    /// Slows down for a lower desired speed that starts `dist` m ahead.
    /// Braking only starts once comfortable braking would no longer suffice.
    pub fn slow_for(&self, vel: f64, desired: f64, dist: f64) {
        if dist <= 0.0 {
            return self.cruise(vel, desired);
        }
        let needed = (desired.powi(2) - vel.powi(2)) / (2.0 * dist);
        if needed <= -self.comf_dec {
            self.constrain(f64::max(-2.0 * self.comf_dec, needed));
        }
    }

    /// Stops at a line `gap` m ahead.
    pub fn stop_before(&self, gap: f64, vel: f64) {
        // Treat the line as a stopped vehicle without the safety gap.
        self.constrain(self.idm(gap + MIN_GAP, vel, 0.0));
    }

    /// Follows a leader `gap` m ahead travelling at `leader_vel` m/s.
    pub fn follow(&self, gap: f64, vel: f64, leader_vel: f64) {
        self.constrain(self.idm(gap, vel, leader_vel));
    }

    /// The distance needed to stop comfortably from `vel`, in m.
    pub fn braking_distance(&self, vel: f64) -> f64 {
        0.5 * vel * vel / self.comf_dec + STOP_MARGIN
    }

    /// The gap wanted to the vehicle ahead at `vel`, in m.
    pub fn desired_gap(&self, vel: f64) -> f64 {
        MIN_GAP + vel * self.time_headway
    }

    fn idm(&self, gap: f64, vel: f64, leader_vel: f64) -> f64 {
        if gap <= MIN_GAP {
            return -10.0 * self.max_acc;
        }
        let closing = vel - leader_vel;
        let braking = vel * closing / (2.0 * (self.max_acc * self.comf_dec).sqrt());
        let ratio = (self.desired_gap(vel) + braking) / gap;
        self.max_acc * (1.0 - ratio * ratio)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn driver() -> DriverModel {
        DriverModel::new(&VehicleType {
            time_headway: 1.5,
            max_acc: 2.0,
            comf_dec: 2.0,
            ..VehicleType::default()
        })
    }

    #[test]
    fn free_road_accelerates_at_max() {
        let driver = driver();
        driver.begin_step();
        driver.cruise(0.0, 20.0);
        assert_approx_eq!(driver.acceleration(), 2.0);
    }

    #[test]
    fn zero_desired_speed_brakes_hard() {
        let driver = driver();
        driver.begin_step();
        driver.cruise(0.0, 0.0);
        assert_approx_eq!(driver.acceleration(), -MAX_BRAKE);
    }

    #[test]
    fn close_leader_brakes_hard() {
        let driver = driver();
        driver.begin_step();
        driver.follow(1.0, 10.0, 0.0);
        assert_approx_eq!(driver.acceleration(), -MAX_BRAKE);

        driver.begin_step();
        driver.follow(200.0, 10.0, 10.0);
        assert!(driver.acceleration() > 1.9);
    }

    #[test]
    fn distant_limit_changes_are_ignored() {
        let driver = driver();
        driver.begin_step();
        driver.slow_for(20.0, 10.0, 1000.0);
        assert_approx_eq!(driver.acceleration(), 2.0);

        driver.begin_step();
        driver.slow_for(20.0, 10.0, 50.0);
        assert!(driver.acceleration() < -2.0);
    }

    #[test]
    fn braking_distance_grows_with_speed() {
        let driver = driver();
        assert_approx_eq!(driver.braking_distance(0.0), STOP_MARGIN);
        assert_approx_eq!(driver.braking_distance(10.0), 25.0 + STOP_MARGIN);
    }
}
