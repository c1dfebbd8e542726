//! Mechanism hardware capability and its simulated and absent backends.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SuperstructureError};

/// Feedback read from the intake, feeder, pivot and flywheel each tick.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MechanismInputs {
    /// Beam break between intake and shooter sees a note.
    pub note_present: bool,
    /// Pivot angle above its hard stop (rad).
    pub pivot_angle: f64,
    pub flywheel_rpm: f64,
    /// A motor controller reports a fault, e.g. over-temperature or a lost sensor.
    pub fault: bool,
}

/// Setpoints for every superstructure actuator.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommand {
    pub intake_voltage: f64,
    pub feeder_voltage: f64,
    pub flywheel_rpm: f64,
    pub pivot_angle: f64,
}

impl ActuatorCommand {
    /// Everything unpowered with the pivot at its hard stop.
    pub const fn safe() -> Self {
        ActuatorCommand {
            intake_voltage: 0.0,
            feeder_voltage: 0.0,
            flywheel_rpm: 0.0,
            pivot_angle: 0.0,
        }
    }
}

impl Default for ActuatorCommand {
    fn default() -> Self {
        ActuatorCommand::safe()
    }
}

/// Hardware capability for the superstructure mechanisms.
pub trait MechanismIo: Send {
    /// Refresh `inputs` with the state of the mechanisms at time `now` (s).
    fn update_inputs(&mut self, now: f64, inputs: &mut MechanismInputs) -> Result<()>;

    /// Send new setpoints to the actuators.
    fn apply(&mut self, command: &ActuatorCommand) -> Result<()>;
}

/// Backend for a robot without a superstructure: never a note, never a fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMechanismIo;

impl MechanismIo for NullMechanismIo {
    fn update_inputs(&mut self, _now: f64, inputs: &mut MechanismInputs) -> Result<()> {
        *inputs = MechanismInputs::default();
        Ok(())
    }

    fn apply(&mut self, _command: &ActuatorCommand) -> Result<()> {
        Ok(())
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimMechanismConfig {
    /// Flywheel acceleration (rpm/s).
    pub flywheel_rate: f64,
    /// Pivot slew rate (rad/s).
    pub pivot_rate: f64,
    /// Intake run time before a note reaches the beam break (s).
    pub intake_time: f64,
    /// Feeder run time before a note leaves the shooter (s).
    pub feed_time: f64,
    /// Flywheel speed below which the feeder cannot push a note out (rpm).
    pub min_feed_rpm: f64,
    /// Start with a note already loaded.
    pub preloaded: bool,
}

impl Default for SimMechanismConfig {
    fn default() -> Self {
        SimMechanismConfig {
            flywheel_rate: 8000.0,
            pivot_rate: 3.0,
            intake_time: 0.4,
            feed_time: 0.15,
            min_feed_rpm: 1000.0,
            preloaded: true,
        }
    }
}

/// First-order mechanism simulation driven by the last applied command.
#[derive(Debug, Clone)]
pub struct SimMechanismIo {
    config: SimMechanismConfig,
    state: MechanismInputs,
    command: ActuatorCommand,
    last_update: Option<f64>,
    intake_progress: f64,
    feed_progress: f64,
    disconnected: bool,
}

impl SimMechanismIo {
    pub fn new(config: SimMechanismConfig) -> Self {
        SimMechanismIo {
            config,
            state: MechanismInputs {
                note_present: config.preloaded,
                ..MechanismInputs::default()
            },
            command: ActuatorCommand::safe(),
            last_update: None,
            intake_progress: 0.0,
            feed_progress: 0.0,
            disconnected: false,
        }
    }

    pub fn set_fault(&mut self, fault: bool) {
        self.state.fault = fault;
    }

    /// Simulate a lost CAN link: every IO call fails until reconnected.
    pub fn set_disconnected(&mut self, disconnected: bool) {
        self.disconnected = disconnected;
    }

    pub fn load_note(&mut self) {
        self.state.note_present = true;
    }

    fn advance(&mut self, dt: f64) {
        let s = &mut self.state;
        let (flywheel_step, pivot_step) =
            (self.config.flywheel_rate * dt, self.config.pivot_rate * dt);
        s.flywheel_rpm = approach(s.flywheel_rpm, self.command.flywheel_rpm, flywheel_step);
        s.pivot_angle = approach(s.pivot_angle, self.command.pivot_angle, pivot_step);

        if !s.note_present && self.command.intake_voltage > 0.0 {
            self.intake_progress += dt;
            if self.intake_progress >= self.config.intake_time {
                s.note_present = true;
                self.intake_progress = 0.0;
            }
        } else {
            self.intake_progress = 0.0;
        }

        if s.note_present
            && self.command.feeder_voltage > 0.0
            && s.flywheel_rpm >= self.config.min_feed_rpm
        {
            self.feed_progress += dt;
            if self.feed_progress >= self.config.feed_time {
                s.note_present = false;
                self.feed_progress = 0.0;
            }
        } else {
            self.feed_progress = 0.0;
        }
    }
}

impl MechanismIo for SimMechanismIo {
    fn update_inputs(&mut self, now: f64, inputs: &mut MechanismInputs) -> Result<()> {
        if self.disconnected {
            return Err(SuperstructureError::Io("simulated mechanism disconnected".into()));
        }
        let dt = self.last_update.map_or(0.0, |last| (now - last).max(0.0));
        self.last_update = Some(now);
        self.advance(dt);
        *inputs = self.state;
        Ok(())
    }

    fn apply(&mut self, command: &ActuatorCommand) -> Result<()> {
        if self.disconnected {
            return Err(SuperstructureError::Io("simulated mechanism disconnected".into()));
        }
        if !(command.flywheel_rpm.is_finite() && command.pivot_angle.is_finite()) {
            warn!(?command, "non-finite mechanism command, holding previous");
            return Ok(());
        }
        self.command = *command;
        Ok(())
    }
}

fn approach(current: f64, target: f64, max_step: f64) -> f64 {
    current + (target - current).clamp(-max_step, max_step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn run(io: &mut SimMechanismIo, from: f64, to: f64) -> MechanismInputs {
        let mut inputs = MechanismInputs::default();
        let mut t = from;
        while t <= to + 1e-9 {
            io.update_inputs(t, &mut inputs).unwrap();
            t += 0.02;
        }
        inputs
    }

    #[test]
    fn test_sim_intakes_spins_up_and_fires() {
        let mut io = SimMechanismIo::new(SimMechanismConfig {
            preloaded: false,
            ..SimMechanismConfig::default()
        });
        io.apply(&ActuatorCommand {
            intake_voltage: 8.0,
            ..ActuatorCommand::safe()
        })
        .unwrap();
        assert!(run(&mut io, 0.0, 0.5).note_present);

        io.apply(&ActuatorCommand {
            flywheel_rpm: 4000.0,
            pivot_angle: 0.6,
            ..ActuatorCommand::safe()
        })
        .unwrap();
        let inputs = run(&mut io, 0.52, 1.2);
        assert_abs_diff_eq!(inputs.flywheel_rpm, 4000.0);
        assert_abs_diff_eq!(inputs.pivot_angle, 0.6);
        assert!(inputs.note_present);

        io.apply(&ActuatorCommand {
            feeder_voltage: 10.0,
            flywheel_rpm: 4000.0,
            pivot_angle: 0.6,
            ..ActuatorCommand::safe()
        })
        .unwrap();
        assert!(!run(&mut io, 1.22, 1.5).note_present);
    }

    #[test]
    fn test_sim_feeder_needs_flywheel() {
        let mut io = SimMechanismIo::new(SimMechanismConfig::default());
        io.apply(&ActuatorCommand {
            feeder_voltage: 10.0,
            ..ActuatorCommand::safe()
        })
        .unwrap();
        assert!(run(&mut io, 0.0, 1.0).note_present);
    }

    #[test]
    fn test_sim_fault_and_disconnect() {
        let mut io = SimMechanismIo::new(SimMechanismConfig::default());
        io.set_fault(true);
        assert!(run(&mut io, 0.0, 0.1).fault);
        io.set_disconnected(true);
        let mut inputs = MechanismInputs::default();
        assert!(matches!(io.update_inputs(0.2, &mut inputs), Err(SuperstructureError::Io(_))));
        assert!(io.apply(&ActuatorCommand::safe()).is_err());
    }

    #[test]
    fn test_null_backend_is_idle() {
        let mut io = NullMechanismIo;
        let mut inputs = MechanismInputs {
            note_present: true,
            ..MechanismInputs::default()
        };
        io.apply(&ActuatorCommand::safe()).unwrap();
        io.update_inputs(1.0, &mut inputs).unwrap();
        assert_eq!(inputs, MechanismInputs::default());
    }
}
