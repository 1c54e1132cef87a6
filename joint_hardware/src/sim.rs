//! Simulated stepper joint.
//!
//! A single rotor model is shared (`Rc<RefCell<_>>`) between the sensor and
//! driver halves so each can be handed to the core as an independent trait
//! object, like the real SPI encoder and H-bridge are.
//!
//! The rotor is quasi-static: every driver command pulls it toward the
//! commanded electrical angle by at most `max_slew_per_tick * |I| / full_scale`
//! subdivided steps. There is no inertia, so the model settles immediately
//! once the command stops moving.

use std::cell::RefCell;
use std::f64::consts::TAU;
use std::rc::Rc;

use joint_traits::{AngleSensor, Driver};

/// Subdivided steps per mechanical revolution (200 full steps x 256).
const STEPS_PER_TURN: f64 = 51_200.0;
/// Subdivided steps per electrical cycle (4 full steps x 256).
const ELECTRICAL_CYCLE: i64 = 1024;
/// Raw sensor counts per revolution (14 bits).
const SENSOR_RESOLUTION: f64 = 16_384.0;

/// How the magnet/sensor pair distorts the true rotor angle.
#[derive(Debug, Clone, Copy)]
pub struct SensorModel {
    /// Raw-count offset between rotor zero and sensor zero.
    pub offset: u16,
    /// Amplitude (raw counts) of a once-per-turn sinusoidal error.
    pub error_amplitude: f64,
    /// Sensor counts decrease when the rotor turns forward.
    pub reversed: bool,
}

impl Default for SensorModel {
    fn default() -> Self {
        Self {
            offset: 0,
            error_amplitude: 0.0,
            reversed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coils {
    Free,
    Braked,
    Driven { direction: u32, current_ma: i32 },
}

#[derive(Debug)]
struct Rotor {
    position: f64,
    coils: Coils,
    jammed: bool,
    full_scale_ma: f64,
    max_slew_per_tick: f64,
    sensor: SensorModel,
    commands: u64,
}

impl Rotor {
    fn apply(&mut self, direction: u32, current_ma: i32) {
        self.coils = Coils::Driven {
            direction,
            current_ma,
        };
        self.commands += 1;
        if self.jammed || current_ma == 0 {
            return;
        }
        let target = i64::from(direction) & (ELECTRICAL_CYCLE - 1);
        let here = self.position.rem_euclid(ELECTRICAL_CYCLE as f64);
        let mut diff = target as f64 - here;
        let half = (ELECTRICAL_CYCLE / 2) as f64;
        if diff > half {
            diff -= ELECTRICAL_CYCLE as f64;
        } else if diff <= -half {
            diff += ELECTRICAL_CYCLE as f64;
        }
        let ratio = (f64::from(current_ma).abs() / self.full_scale_ma).min(1.0);
        let slew = self.max_slew_per_tick * ratio;
        self.position += diff.clamp(-slew, slew);
    }

    fn raw_angle(&self) -> u16 {
        let turn = self.position.rem_euclid(STEPS_PER_TURN) / STEPS_PER_TURN;
        let mut raw = turn * SENSOR_RESOLUTION
            + f64::from(self.sensor.offset)
            + self.sensor.error_amplitude * (TAU * turn).sin();
        if self.sensor.reversed {
            raw = SENSOR_RESOLUTION - raw;
        }
        (raw.round().rem_euclid(SENSOR_RESOLUTION)) as u16
    }
}

/// Handle on the shared rotor; hands out the sensor and driver halves.
#[derive(Debug, Clone)]
pub struct SimulatedJoint {
    rotor: Rc<RefCell<Rotor>>,
}

impl Default for SimulatedJoint {
    fn default() -> Self {
        Self::new(SensorModel::default())
    }
}

impl SimulatedJoint {
    pub fn new(sensor: SensorModel) -> Self {
        Self {
            rotor: Rc::new(RefCell::new(Rotor {
                position: 0.0,
                coils: Coils::Free,
                jammed: false,
                full_scale_ma: 3300.0,
                max_slew_per_tick: 8.0,
                sensor,
                commands: 0,
            })),
        }
    }

    /// Override the slew limit at full-scale current.
    pub fn with_max_slew(self, steps_per_tick: f64) -> Self {
        self.rotor.borrow_mut().max_slew_per_tick = steps_per_tick;
        self
    }

    pub fn sensor(&self) -> SimSensor {
        SimSensor {
            rotor: Rc::clone(&self.rotor),
        }
    }

    pub fn driver(&self) -> SimDriver {
        SimDriver {
            rotor: Rc::clone(&self.rotor),
        }
    }

    /// True rotor position in subdivided steps (unwrapped).
    pub fn position(&self) -> f64 {
        self.rotor.borrow().position
    }

    /// Teleport the rotor; used to set up scenarios.
    pub fn set_position(&self, steps: f64) {
        self.rotor.borrow_mut().position = steps;
    }

    /// Block the rotor mechanically (stall scenarios).
    pub fn set_jammed(&self, jammed: bool) {
        self.rotor.borrow_mut().jammed = jammed;
    }

    /// Last current commanded through `set_foc_vector`, 0 when asleep/braked.
    pub fn last_current_ma(&self) -> i32 {
        match self.rotor.borrow().coils {
            Coils::Driven { current_ma, .. } => current_ma,
            Coils::Free | Coils::Braked => 0,
        }
    }

    /// Last electrical direction commanded, if the coils are driven.
    pub fn last_direction(&self) -> Option<u32> {
        match self.rotor.borrow().coils {
            Coils::Driven { direction, .. } => Some(direction),
            Coils::Free | Coils::Braked => None,
        }
    }

    pub fn is_asleep(&self) -> bool {
        self.rotor.borrow().coils == Coils::Free
    }

    pub fn is_braked(&self) -> bool {
        self.rotor.borrow().coils == Coils::Braked
    }

    /// Number of `set_foc_vector` calls seen so far.
    pub fn command_count(&self) -> u64 {
        self.rotor.borrow().commands
    }
}

/// Sensor half of a `SimulatedJoint`.
#[derive(Debug)]
pub struct SimSensor {
    rotor: Rc<RefCell<Rotor>>,
}

impl AngleSensor for SimSensor {
    fn read_raw_angle(&mut self) -> u16 {
        self.rotor.borrow().raw_angle()
    }
}

/// Driver half of a `SimulatedJoint`.
#[derive(Debug)]
pub struct SimDriver {
    rotor: Rc<RefCell<Rotor>>,
}

impl Driver for SimDriver {
    fn set_foc_vector(&mut self, direction_in_count: u32, current_ma: i32) {
        self.rotor
            .borrow_mut()
            .apply(direction_in_count, current_ma);
    }

    fn sleep(&mut self) {
        self.rotor.borrow_mut().coils = Coils::Free;
    }

    fn brake(&mut self) {
        self.rotor.borrow_mut().coils = Coils::Braked;
    }
}
