//! Table-driven superstructure sequencing.
//!
//! The current state changes only through [`TRANSITIONS`]. Each entry names
//! the state it leaves (or any state), the event that triggers it, the
//! interlocks that must all hold, and the state it enters. Entries are tried
//! in order and the first whose interlocks hold wins; an event with no such
//! entry is rejected and reported, leaving the state untouched.
//!
//! Losing the enable signal bypasses the table entirely: the machine drops to
//! `Stow` and commands [`ActuatorCommand::safe`] on that same tick.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::io::{ActuatorCommand, MechanismInputs};
use crate::shooter::ShotData;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SuperstructureState {
    /// Empty and tucked in.
    #[default]
    Stow,
    Intake,
    /// Tucked in with a note loaded.
    Holding,
    /// Pivot and flywheel tracking the shot solution.
    Aim,
    /// Feeding the note into the flywheel.
    Fire,
    /// A mechanism fault was reported; actuators are unpowered.
    Fault,
}

impl fmt::Display for SuperstructureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SuperstructureState::Stow => "stow",
            SuperstructureState::Intake => "intake",
            SuperstructureState::Holding => "holding",
            SuperstructureState::Aim => "aim",
            SuperstructureState::Fire => "fire",
            SuperstructureState::Fault => "fault",
        };
        f.write_str(name)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuperstructureEvent {
    RequestStow,
    RequestIntake,
    RequestAim,
    RequestFire,
    /// Automatic aiming has settled on the target.
    AutoAimReady,
    NoteDetected,
    NoteExited,
    /// Generated internally when a state outlives its timeout.
    Timeout,
    MechanismFault,
    Disable,
}

impl SuperstructureEvent {
    /// Operator and automation requests are held back by dwell times;
    /// feedback, timeouts and safety events are not.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            SuperstructureEvent::RequestStow
                | SuperstructureEvent::RequestIntake
                | SuperstructureEvent::RequestAim
                | SuperstructureEvent::RequestFire
                | SuperstructureEvent::AutoAimReady
        )
    }
}

/// Interlocks checked before a transition is taken.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// No mechanism reports a fault.
    Healthy,
    NotePresent,
    NoteAbsent,
    /// Shot confidence is at or above the firing threshold.
    ShotConfident,
    /// Note loaded, pivot at angle and flywheel at speed.
    MechanismReady,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// `None` matches every state.
    pub from: Option<SuperstructureState>,
    pub event: SuperstructureEvent,
    pub guards: &'static [Guard],
    pub to: SuperstructureState,
}

const fn on(
    from: SuperstructureState,
    event: SuperstructureEvent,
    guards: &'static [Guard],
    to: SuperstructureState,
) -> Transition {
    Transition {
        from: Some(from),
        event,
        guards,
        to,
    }
}

use Guard::*;
use SuperstructureEvent::*;
use SuperstructureState::{Aim, Fire, Holding, Intake, Stow};

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: None,
        event: Disable,
        guards: &[],
        to: Stow,
    },
    Transition {
        from: None,
        event: MechanismFault,
        guards: &[],
        to: SuperstructureState::Fault,
    },
    on(SuperstructureState::Fault, RequestStow, &[Healthy, NotePresent], Holding),
    on(SuperstructureState::Fault, RequestStow, &[Healthy], Stow),
    on(Stow, RequestIntake, &[Healthy], Intake),
    on(Stow, NoteDetected, &[Healthy], Holding),
    on(Stow, RequestAim, &[Healthy, ShotConfident], Aim),
    on(Intake, NoteDetected, &[], Holding),
    on(Intake, RequestStow, &[], Stow),
    on(Intake, Timeout, &[], Stow),
    on(Holding, NoteExited, &[], Stow),
    on(Holding, RequestAim, &[Healthy, ShotConfident], Aim),
    on(Aim, AutoAimReady, &[ShotConfident, MechanismReady], Fire),
    on(Aim, RequestFire, &[ShotConfident, MechanismReady], Fire),
    on(Aim, RequestStow, &[NotePresent], Holding),
    on(Aim, RequestStow, &[], Stow),
    on(Aim, Timeout, &[NotePresent], Holding),
    on(Aim, Timeout, &[], Stow),
    on(Aim, NoteExited, &[], Stow),
    on(Fire, NoteExited, &[], Stow),
    on(Fire, Timeout, &[NotePresent], Holding),
    on(Fire, Timeout, &[], Stow),
];

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperstructureConfig {
    /// Minimum shot confidence to aim or fire.
    pub fire_confidence_threshold: f64,
    pub pivot_tolerance: f64,
    pub flywheel_tolerance: f64,
    pub intake_voltage: f64,
    /// Feeder voltage while intaking, to seat the note against the beam break.
    pub feeder_intake_voltage: f64,
    pub feeder_fire_voltage: f64,
    pub intake_pivot_angle: f64,
    pub intake_dwell: f64,
    pub aim_dwell: f64,
    pub fire_dwell: f64,
    pub intake_timeout: f64,
    pub aim_timeout: f64,
    pub fire_timeout: f64,
}

impl Default for SuperstructureConfig {
    fn default() -> Self {
        SuperstructureConfig {
            fire_confidence_threshold: 0.6,
            pivot_tolerance: 0.02,
            flywheel_tolerance: 150.0,
            intake_voltage: 8.0,
            feeder_intake_voltage: 4.0,
            feeder_fire_voltage: 10.0,
            intake_pivot_angle: 0.0,
            intake_dwell: 0.2,
            aim_dwell: 0.25,
            fire_dwell: 0.3,
            intake_timeout: 5.0,
            aim_timeout: 3.0,
            fire_timeout: 1.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The table has no entry for this event in the current state.
    NoTransition,
    /// Entries exist but this interlock failed on the first of them.
    Interlock(Guard),
    /// The current state has not been held for its minimum dwell.
    Dwell,
    /// The robot is disabled.
    Disabled,
}

/// An event the machine refused, kept for the step that refused it.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub event: SuperstructureEvent,
    pub state: SuperstructureState,
    pub reason: RejectReason,
}

#[derive(Debug, Clone)]
pub struct Superstructure {
    config: SuperstructureConfig,
    state: SuperstructureState,
    entered_at: Option<f64>,
    previous_inputs: MechanismInputs,
    rejected: Vec<Rejection>,
    command: ActuatorCommand,
}

impl Superstructure {
    pub fn new(config: SuperstructureConfig) -> Self {
        Superstructure {
            config,
            state: SuperstructureState::Stow,
            entered_at: None,
            previous_inputs: MechanismInputs::default(),
            rejected: Vec::new(),
            command: ActuatorCommand::safe(),
        }
    }

    pub fn config(&self) -> &SuperstructureConfig {
        &self.config
    }

    pub fn state(&self) -> SuperstructureState {
        self.state
    }

    /// Events refused during the most recent `step`.
    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    /// The command produced by the most recent `step`.
    pub fn command(&self) -> ActuatorCommand {
        self.command
    }

    pub fn time_in_state(&self, now: f64) -> f64 {
        self.entered_at.map_or(0.0, |entered| now - entered)
    }

    /// Advance one tick.
    ///
    /// Feedback edges (note detected or gone, a new fault) and an elapsed
    /// timeout are turned into events and handled before `requests`, in that
    /// order. Returns the actuator command for the resulting state.
    pub fn step(
        &mut self,
        now: f64,
        enabled: bool,
        requests: &[SuperstructureEvent],
        shot: &ShotData,
        inputs: &MechanismInputs,
    ) -> ActuatorCommand {
        self.rejected.clear();
        self.entered_at.get_or_insert(now);

        if !enabled {
            if self.state != Stow {
                self.handle(Disable, now, shot, inputs);
            }
            for &event in requests {
                self.reject(event, RejectReason::Disabled);
            }
            self.previous_inputs = *inputs;
            self.command = ActuatorCommand::safe();
            return self.command;
        }

        let mut edges = Vec::with_capacity(3);
        if inputs.fault && !self.previous_inputs.fault {
            edges.push(MechanismFault);
        }
        if inputs.note_present && !self.previous_inputs.note_present {
            edges.push(NoteDetected);
        }
        if !inputs.note_present && self.previous_inputs.note_present {
            edges.push(NoteExited);
        }
        for event in edges {
            self.handle(event, now, shot, inputs);
        }

        // Judged against the state the edges left behind.
        if let Some(timeout) = self.timeout(self.state) {
            if self.time_in_state(now) >= timeout {
                self.handle(Timeout, now, shot, inputs);
            }
        }

        for &event in requests {
            self.handle(event, now, shot, inputs);
        }
        self.previous_inputs = *inputs;
        self.command = self.command_for(self.state, shot);
        self.command
    }

    fn handle(
        &mut self,
        event: SuperstructureEvent,
        now: f64,
        shot: &ShotData,
        inputs: &MechanismInputs,
    ) {
        if event.is_request() && self.time_in_state(now) < self.dwell(self.state) {
            self.reject(event, RejectReason::Dwell);
            return;
        }
        let mut failed = None;
        for transition in TRANSITIONS
            .iter()
            .filter(|t| t.event == event && t.from.is_none_or(|from| from == self.state))
        {
            match transition
                .guards
                .iter()
                .find(|guard| !self.guard_holds(**guard, shot, inputs))
            {
                None => {
                    self.enter(transition.to, now, event);
                    return;
                }
                Some(guard) => {
                    failed.get_or_insert(*guard);
                }
            }
        }
        self.reject(event, failed.map_or(RejectReason::NoTransition, RejectReason::Interlock));
    }

    fn guard_holds(&self, guard: Guard, shot: &ShotData, inputs: &MechanismInputs) -> bool {
        let c = &self.config;
        match guard {
            Healthy => !inputs.fault,
            NotePresent => inputs.note_present,
            NoteAbsent => !inputs.note_present,
            ShotConfident => shot.confidence >= c.fire_confidence_threshold,
            MechanismReady => {
                inputs.note_present
                    && !inputs.fault
                    && (inputs.pivot_angle - shot.pivot_angle).abs() <= c.pivot_tolerance
                    && (inputs.flywheel_rpm - shot.rpm).abs() <= c.flywheel_tolerance
            }
        }
    }

    fn enter(&mut self, to: SuperstructureState, now: f64, event: SuperstructureEvent) {
        if to == SuperstructureState::Fault {
            warn!(from = %self.state, ?event, "superstructure fault");
        } else {
            info!(from = %self.state, %to, ?event, "superstructure transition");
        }
        self.state = to;
        self.entered_at = Some(now);
    }

    fn reject(&mut self, event: SuperstructureEvent, reason: RejectReason) {
        debug!(state = %self.state, ?event, ?reason, "superstructure request rejected");
        self.rejected.push(Rejection {
            event,
            state: self.state,
            reason,
        });
    }

    fn dwell(&self, state: SuperstructureState) -> f64 {
        match state {
            Intake => self.config.intake_dwell,
            Aim => self.config.aim_dwell,
            Fire => self.config.fire_dwell,
            _ => 0.0,
        }
    }

    fn timeout(&self, state: SuperstructureState) -> Option<f64> {
        match state {
            Intake => Some(self.config.intake_timeout),
            Aim => Some(self.config.aim_timeout),
            Fire => Some(self.config.fire_timeout),
            _ => None,
        }
    }

    fn command_for(&self, state: SuperstructureState, shot: &ShotData) -> ActuatorCommand {
        let c = &self.config;
        match state {
            Stow | Holding | SuperstructureState::Fault => ActuatorCommand::safe(),
            Intake => ActuatorCommand {
                intake_voltage: c.intake_voltage,
                feeder_voltage: c.feeder_intake_voltage,
                pivot_angle: c.intake_pivot_angle,
                ..ActuatorCommand::safe()
            },
            Aim => ActuatorCommand {
                flywheel_rpm: shot.rpm,
                pivot_angle: shot.pivot_angle,
                ..ActuatorCommand::safe()
            },
            Fire => ActuatorCommand {
                feeder_voltage: c.feeder_fire_voltage,
                flywheel_rpm: shot.rpm,
                pivot_angle: shot.pivot_angle,
                ..ActuatorCommand::safe()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MechanismIo, SimMechanismConfig, SimMechanismIo};

    const ALL_STATES: [SuperstructureState; 6] = [
        Stow,
        Intake,
        Holding,
        Aim,
        Fire,
        SuperstructureState::Fault,
    ];

    fn shot(confidence: f64) -> ShotData {
        ShotData {
            rpm: 4000.0,
            pivot_angle: 0.7,
            confidence,
            ..ShotData::default()
        }
    }

    fn loaded() -> MechanismInputs {
        MechanismInputs {
            note_present: true,
            ..MechanismInputs::default()
        }
    }

    fn ready() -> MechanismInputs {
        MechanismInputs {
            note_present: true,
            pivot_angle: 0.71,
            flywheel_rpm: 3950.0,
            fault: false,
        }
    }

    /// A machine already holding a note at time 0.
    fn holding() -> Superstructure {
        let mut s = Superstructure::new(SuperstructureConfig::default());
        s.step(0.0, true, &[], &shot(0.0), &loaded());
        assert_eq!(s.state(), Holding);
        s
    }

    #[test]
    fn test_aim_refused_below_confidence() {
        let mut s = Superstructure::new(SuperstructureConfig::default());
        s.step(0.0, true, &[RequestAim], &shot(0.3), &MechanismInputs::default());
        assert_eq!(s.state(), Stow);
        assert_eq!(
            s.rejected(),
            &[Rejection {
                event: RequestAim,
                state: Stow,
                reason: RejectReason::Interlock(ShotConfident),
            }]
        );
        assert_eq!(s.command(), ActuatorCommand::safe());
    }

    #[test]
    fn test_fire_needs_confidence_and_readiness() {
        let mut s = holding();
        s.step(0.02, true, &[RequestAim], &shot(0.9), &loaded());
        assert_eq!(s.state(), Aim);
        assert_eq!(s.command().flywheel_rpm, 4000.0);
        assert_eq!(s.command().feeder_voltage, 0.0);

        // Too soon after entering aim.
        s.step(0.1, true, &[RequestFire], &shot(0.9), &ready());
        assert_eq!(s.rejected()[0].reason, RejectReason::Dwell);

        // Mechanism not up to speed.
        s.step(0.5, true, &[RequestFire], &shot(0.9), &loaded());
        assert_eq!(s.rejected()[0].reason, RejectReason::Interlock(MechanismReady));
        assert_eq!(s.state(), Aim);

        // Ready but the solution degraded.
        s.step(0.52, true, &[AutoAimReady], &shot(0.4), &ready());
        assert_eq!(s.rejected()[0].reason, RejectReason::Interlock(ShotConfident));

        s.step(0.54, true, &[AutoAimReady], &shot(0.9), &ready());
        assert_eq!(s.state(), Fire);
        assert!(s.command().feeder_voltage > 0.0);

        // The note leaves the shooter.
        s.step(0.7, true, &[], &shot(0.9), &MechanismInputs::default());
        assert_eq!(s.state(), Stow);
        assert_eq!(s.command(), ActuatorCommand::safe());
    }

    #[test]
    fn test_disable_forces_stow_from_every_state() {
        for state in ALL_STATES {
            let mut s = Superstructure::new(SuperstructureConfig::default());
            s.state = state;
            s.command = ActuatorCommand {
                feeder_voltage: 10.0,
                ..ActuatorCommand::safe()
            };
            let command = s.step(1.0, false, &[RequestFire], &shot(1.0), &ready());
            assert_eq!(s.state(), Stow);
            assert_eq!(command, ActuatorCommand::safe());
            assert_eq!(s.rejected()[0].reason, RejectReason::Disabled);
        }
    }

    #[test]
    fn test_disable_event_preempts_from_any_state() {
        for state in ALL_STATES {
            let mut s = Superstructure::new(SuperstructureConfig::default());
            s.state = state;
            s.step(0.0, true, &[Disable], &shot(1.0), &ready());
            assert_eq!(s.state(), Stow, "from {state}");
        }
    }

    #[test]
    fn test_unmatched_request_is_reported() {
        let mut s = Superstructure::new(SuperstructureConfig::default());
        s.step(0.0, true, &[RequestIntake], &shot(0.0), &MechanismInputs::default());
        assert_eq!(s.state(), Intake);
        s.step(1.0, true, &[RequestFire], &shot(1.0), &MechanismInputs::default());
        assert_eq!(s.state(), Intake);
        assert_eq!(s.rejected()[0].reason, RejectReason::NoTransition);
    }

    #[test]
    fn test_intake_times_out() {
        let mut s = Superstructure::new(SuperstructureConfig::default());
        s.step(0.0, true, &[RequestIntake], &shot(0.0), &MechanismInputs::default());
        s.step(4.9, true, &[], &shot(0.0), &MechanismInputs::default());
        assert_eq!(s.state(), Intake);
        s.step(5.0, true, &[], &shot(0.0), &MechanismInputs::default());
        assert_eq!(s.state(), Stow);
    }

    #[test]
    fn test_fault_holds_until_cleared() {
        let mut s = holding();
        let faulted = MechanismInputs {
            fault: true,
            ..loaded()
        };
        s.step(0.02, true, &[], &shot(1.0), &faulted);
        assert_eq!(s.state(), SuperstructureState::Fault);
        assert_eq!(s.command(), ActuatorCommand::safe());

        s.step(0.04, true, &[RequestStow, RequestAim], &shot(1.0), &faulted);
        assert_eq!(s.state(), SuperstructureState::Fault);
        assert_eq!(s.rejected()[0].reason, RejectReason::Interlock(Healthy));
        assert_eq!(s.rejected()[1].reason, RejectReason::NoTransition);

        s.step(0.06, true, &[RequestStow], &shot(1.0), &loaded());
        assert_eq!(s.state(), Holding);
    }

    #[test]
    fn test_fault_while_disabled_keeps_stow() {
        let mut s = Superstructure::new(SuperstructureConfig::default());
        let faulted = MechanismInputs {
            fault: true,
            ..MechanismInputs::default()
        };
        s.step(0.0, false, &[], &shot(1.0), &faulted);
        s.step(0.02, true, &[RequestIntake], &shot(1.0), &faulted);
        assert_eq!(s.state(), Stow);
        assert_eq!(s.rejected()[0].reason, RejectReason::Interlock(Healthy));
    }

    #[test]
    fn test_faulted_stow_ignores_a_new_note() {
        let mut s = Superstructure::new(SuperstructureConfig::default());
        let faulted = MechanismInputs {
            fault: true,
            ..MechanismInputs::default()
        };
        s.step(0.0, false, &[], &shot(1.0), &faulted);
        s.step(
            0.02,
            true,
            &[],
            &shot(1.0),
            &MechanismInputs {
                note_present: true,
                ..faulted
            },
        );
        assert_eq!(s.state(), Stow);
        assert_eq!(
            s.rejected(),
            &[Rejection {
                event: NoteDetected,
                state: Stow,
                reason: RejectReason::Interlock(Healthy),
            }]
        );
    }

    #[test]
    fn test_note_arriving_at_the_timeout_wins() {
        let mut s = Superstructure::new(SuperstructureConfig::default());
        s.step(0.0, true, &[RequestIntake], &shot(0.0), &MechanismInputs::default());
        s.step(5.0, true, &[], &shot(0.0), &loaded());
        assert_eq!(s.state(), Holding);
        assert!(s.rejected().is_empty());
        assert_eq!(s.time_in_state(5.0), 0.0);
    }

    #[test]
    fn test_disabling_restarts_the_stow_clock() {
        let mut s = holding();
        s.step(0.02, true, &[RequestAim], &shot(0.9), &loaded());
        assert_eq!(s.state(), Aim);
        s.step(1.5, false, &[], &shot(0.9), &loaded());
        assert_eq!(s.state(), Stow);
        assert_eq!(s.time_in_state(1.5), 0.0);
        assert!(s.rejected().is_empty());

        // Already stowed: nothing to leave.
        s.step(2.0, false, &[], &shot(0.9), &loaded());
        assert_eq!(s.time_in_state(2.0), 0.5);
    }

    #[test]
    fn test_every_table_entry_leaves_a_real_state() {
        for t in TRANSITIONS {
            assert!(t.from != Some(t.to) || t.from.is_none());
        }
        assert!(
            TRANSITIONS
                .iter()
                .any(|t| t.from.is_none() && t.event == Disable && t.to == Stow)
        );
    }

    #[test]
    fn test_full_cycle_against_simulated_mechanism() {
        let mut io = SimMechanismIo::new(SimMechanismConfig {
            preloaded: false,
            ..SimMechanismConfig::default()
        });
        let mut s = Superstructure::new(SuperstructureConfig::default());
        let mut inputs = MechanismInputs::default();
        let solution = shot(0.9);
        let mut fired = false;
        for i in 0..300 {
            let now = i as f64 * 0.02;
            io.update_inputs(now, &mut inputs).unwrap();
            let request = match s.state() {
                Stow if !fired => vec![RequestIntake],
                Holding => vec![RequestAim],
                Aim => vec![AutoAimReady],
                _ => vec![],
            };
            if s.state() == Fire {
                fired = true;
            }
            let command = s.step(now, true, &request, &solution, &inputs);
            io.apply(&command).unwrap();
        }
        assert!(fired);
        assert_eq!(s.state(), Stow);
        assert!(!inputs.note_present);
    }
}
