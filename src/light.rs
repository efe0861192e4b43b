use crate::link::TrafficControl;
use crate::{Error, LinkId, LinkSet, Result};
use serde::{Deserialize, Serialize};

/// The state of a single signal index of a traffic light.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum LightState {
    Red,
    Amber,
    Green,
    /// The signal is switched off and traffic proceeds uncontrolled.
    Off,
}

impl LightState {
    /// Parses a signal state character, as used in phase strings.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'G' | 'g' => Some(LightState::Green),
            'y' | 'Y' => Some(LightState::Amber),
            'r' | 'R' | 's' => Some(LightState::Red),
            'o' | 'O' => Some(LightState::Off),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            LightState::Red => 'r',
            LightState::Amber => 'y',
            LightState::Green => 'G',
            LightState::Off => 'O',
        }
    }
}

/// Phases end once no more than this much of them remains, in s.
const PHASE_EPSILON: f64 = 1e-9;

/// A cyclic signal plan: each phase is a string with one state character per
/// signal index, shown for the matching number of seconds in `times`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasePlan {
    pub phases: Vec<String>,
    pub times: Vec<f64>,
}

impl PhasePlan {
    pub fn new<S: Into<String>>(phases: impl IntoIterator<Item = S>, times: &[f64]) -> Self {
        Self {
            phases: phases.into_iter().map(Into::into).collect(),
            times: times.to_vec(),
        }
    }

    /// The duration of a full cycle in s.
    pub fn cycle_length(&self) -> f64 {
        self.times.iter().sum()
    }

    /// Checks that the plan is well formed for a light with `num_signals` signal indices,
    /// and parses each phase.
    pub(crate) fn parse(&self, junction: &str, num_signals: usize) -> Result<Vec<Vec<LightState>>> {
        let invalid = |reason: String| Error::InvalidPhasePlan {
            junction: junction.to_string(),
            reason,
        };
        if self.phases.is_empty() {
            return Err(invalid("no phases given".into()));
        }
        if self.phases.len() != self.times.len() {
            return Err(invalid(format!(
                "{} phases but {} times",
                self.phases.len(),
                self.times.len()
            )));
        }
        if let Some(time) = self.times.iter().find(|t| !(**t > PHASE_EPSILON)) {
            return Err(invalid(format!("phase duration {} is not positive", time)));
        }
        self.phases
            .iter()
            .map(|phase| parse_states(phase, num_signals).map_err(invalid))
            .collect()
    }
}

fn parse_states(phase: &str, num_signals: usize) -> std::result::Result<Vec<LightState>, String> {
    if phase.chars().count() != num_signals {
        return Err(format!(
            "phase '{}' does not have {} signal states",
            phase, num_signals
        ));
    }
    phase
        .chars()
        .map(|c| LightState::from_char(c).ok_or_else(|| format!("invalid signal state '{}'", c)))
        .collect()
}

/// The program a traffic light is running.
#[derive(Clone, Debug)]
enum Program {
    /// A constant state, set directly.
    Fixed(Vec<LightState>),
    /// A cyclic phase plan.
    Plan {
        plan: PhasePlan,
        states: Vec<Vec<LightState>>,
        phase: usize,
        remaining: f64,
    },
}

/// A traffic light, controlling the stop lines at the end of a set of links.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The light ID.
    id: String,
    /// The link controlled by each signal index.
    signals: Vec<LinkId>,
    /// The running program.
    program: Program,
}

impl TrafficLight {
    /// Creates a traffic light which is green for all signal indices.
    pub(crate) fn new(id: &str, signals: Vec<LinkId>) -> Self {
        let program = Program::Fixed(vec![LightState::Green; signals.len()]);
        Self {
            id: id.to_string(),
            signals,
            program,
        }
    }

    /// The number of signal indices.
    pub fn num_signals(&self) -> usize {
        self.signals.len()
    }

    /// Starts running a phase plan from its first phase.
    pub(crate) fn set_plan(&mut self, plan: PhasePlan) -> Result<()> {
        let states = plan.parse(&self.id, self.signals.len())?;
        let remaining = plan.times[0];
        self.program = Program::Plan {
            plan,
            states,
            phase: 0,
            remaining,
        };
        Ok(())
    }

    /// Sets a fixed state, e.g. "GGrr", stopping any running phase plan.
    pub(crate) fn set_state(&mut self, state: &str) -> Result<()> {
        let states = parse_states(state, self.signals.len()).map_err(|reason| {
            Error::InvalidPhasePlan {
                junction: self.id.clone(),
                reason,
            }
        })?;
        self.program = Program::Fixed(states);
        Ok(())
    }

    /// The current state of every signal index.
    pub fn states(&self) -> &[LightState] {
        match &self.program {
            Program::Fixed(states) => states,
            Program::Plan { states, phase, .. } => &states[*phase],
        }
    }

    /// The current state as a phase string.
    pub fn state_string(&self) -> String {
        self.states().iter().map(|s| s.to_char()).collect()
    }

    /// Advances the traffic light timing by `dt` seconds.
    pub(crate) fn step(&mut self, dt: f64) {
        if let Program::Plan {
            plan,
            phase,
            remaining,
            ..
        } = &mut self.program
        {
            *remaining -= dt;
            let cycle = plan.cycle_length();
            if *remaining < -cycle {
                // Whole cycles end where they started.
                *remaining %= cycle;
            }
            while *remaining <= PHASE_EPSILON {
                *phase = (*phase + 1) % plan.times.len();
                *remaining += plan.times[*phase];
            }
        }
    }

    /// Applies the current signal states to the controlled links.
    pub(crate) fn apply(&self, links: &mut LinkSet) {
        for (link_id, state) in self.signals.iter().zip(self.states()) {
            links[*link_id].set_control(TrafficControl::Signal(*state));
        }
    }
}
