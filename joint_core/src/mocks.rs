//! Test and helper mocks for joint_core

use std::collections::VecDeque;

use joint_traits::{AngleSensor, BoxError, Driver, PersistentTable};

use crate::consts::{ENCODER_RESOLUTION, ERASED_ENTRY};

/// Sensor that replays queued readings, then repeats the last one.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSensor {
    queue: VecDeque<u16>,
    last: u16,
}

impl ScriptedSensor {
    pub fn constant(raw: u16) -> Self {
        Self {
            queue: VecDeque::new(),
            last: raw,
        }
    }

    pub fn sequence(readings: impl IntoIterator<Item = u16>) -> Self {
        Self {
            queue: readings.into_iter().collect(),
            last: 0,
        }
    }

    pub fn push(&mut self, raw: u16) {
        self.queue.push_back(raw);
    }

    pub fn set(&mut self, raw: u16) {
        self.queue.clear();
        self.last = raw;
    }
}

impl AngleSensor for ScriptedSensor {
    fn read_raw_angle(&mut self) -> u16 {
        if let Some(v) = self.queue.pop_front() {
            self.last = v;
        }
        self.last
    }
}

/// Last thing a `SpyDriver` was told to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverCommand {
    #[default]
    None,
    Foc {
        direction: u32,
        current_ma: i32,
    },
    Sleep,
    Brake,
}

/// Driver that records commands instead of moving anything.
#[derive(Debug, Clone, Default)]
pub struct SpyDriver {
    pub last: DriverCommand,
    pub foc_calls: u64,
    pub sleep_calls: u64,
    pub brake_calls: u64,
}

impl Driver for SpyDriver {
    fn set_foc_vector(&mut self, direction_in_count: u32, current_ma: i32) {
        self.foc_calls += 1;
        self.last = DriverCommand::Foc {
            direction: direction_in_count,
            current_ma,
        };
    }

    fn sleep(&mut self) {
        self.sleep_calls += 1;
        self.last = DriverCommand::Sleep;
    }

    fn brake(&mut self) {
        self.brake_calls += 1;
        self.last = DriverCommand::Brake;
    }
}

/// Vec-backed table without flash write rules.
#[derive(Debug, Clone)]
pub struct VecTable {
    entries: Vec<u16>,
    cursor: usize,
}

impl VecTable {
    pub fn erased() -> Self {
        Self::from_entries(vec![ERASED_ENTRY; ENCODER_RESOLUTION as usize])
    }

    pub fn from_entries(entries: Vec<u16>) -> Self {
        Self { entries, cursor: 0 }
    }
}

impl PersistentTable for VecTable {
    fn clear(&mut self) -> Result<(), BoxError> {
        self.entries.fill(ERASED_ENTRY);
        Ok(())
    }

    fn begin_write(&mut self) -> Result<(), BoxError> {
        self.cursor = 0;
        Ok(())
    }

    fn append_u16(&mut self, value: u16) -> Result<(), BoxError> {
        if self.cursor == self.entries.len() {
            self.entries.push(value);
        } else {
            self.entries[self.cursor] = value;
        }
        self.cursor += 1;
        Ok(())
    }

    fn end_write(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn entries(&self) -> &[u16] {
        &self.entries
    }
}
