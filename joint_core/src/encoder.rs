//! Raw angle sensor plus the correction table that linearizes it.

use joint_traits::{AngleSensor, PersistentTable};

use crate::consts::{ENCODER_RESOLUTION, ERASED_ENTRY, SUBDIVIDE_STEPS};

const RAW_MASK: u16 = (ENCODER_RESOLUTION - 1) as u16;

/// True when `entries` is a complete, programmed correction table.
pub fn table_is_valid(entries: &[u16]) -> bool {
    entries.len() == ENCODER_RESOLUTION as usize && !entries.contains(&ERASED_ENTRY)
}

/// Angle sensor combined with its persisted correction table.
#[derive(Debug)]
pub struct Encoder<S, T> {
    sensor: S,
    table: T,
    raw_angle: u16,
    rectified_angle: i32,
    calibrated: bool,
}

impl<S: AngleSensor, T: PersistentTable> Encoder<S, T> {
    pub fn new(sensor: S, table: T) -> Self {
        Self {
            sensor,
            table,
            raw_angle: 0,
            rectified_angle: 0,
            calibrated: false,
        }
    }

    /// Validate the stored table and take a first reading.
    pub fn init(&mut self) -> bool {
        self.calibrated = table_is_valid(self.table.entries());
        if !self.calibrated {
            tracing::warn!("encoder correction table missing or incomplete; calibration required");
        }
        self.update_angle();
        self.calibrated
    }

    /// Read the sensor and map the reading through the table.
    ///
    /// Without a valid table the raw angle is scaled linearly so the
    /// rectified angle stays within one revolution.
    pub fn update_angle(&mut self) -> i32 {
        self.raw_angle = self.sensor.read_raw_angle() & RAW_MASK;
        let linear = i32::from(self.raw_angle) * SUBDIVIDE_STEPS / ENCODER_RESOLUTION;
        self.rectified_angle = if self.calibrated {
            self.table
                .entries()
                .get(usize::from(self.raw_angle))
                .map_or(linear, |&v| i32::from(v))
        } else {
            linear
        };
        self.rectified_angle
    }

    pub fn raw_angle(&self) -> u16 {
        self.raw_angle
    }

    /// Corrected angle within one revolution, in subdivided steps.
    pub fn rectified_angle(&self) -> i32 {
        self.rectified_angle
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn set_calibrated(&mut self, calibrated: bool) {
        self.calibrated = calibrated;
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut T {
        &mut self.table
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn into_parts(self) -> (S, T) {
        (self.sensor, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ScriptedSensor, VecTable};

    #[test]
    fn erased_entry_invalidates_table() {
        let mut entries: Vec<u16> = (0..16_384).map(|i| (i * 25 / 8) as u16).collect();
        assert!(table_is_valid(&entries));
        entries[77] = ERASED_ENTRY;
        assert!(!table_is_valid(&entries));
        assert!(!table_is_valid(&entries[..100]));
    }

    #[test]
    fn uncalibrated_encoder_scales_linearly() {
        let mut enc = Encoder::new(ScriptedSensor::constant(8192), VecTable::erased());
        assert!(!enc.init());
        assert_eq!(enc.rectified_angle(), 25_600);
    }

    #[test]
    fn calibrated_encoder_uses_table_and_masks_raw() {
        let entries: Vec<u16> = (0..16_384u32).map(|i| (51_199 - i * 3) as u16).collect();
        let mut enc = Encoder::new(
            ScriptedSensor::constant(0xC000 | 5),
            VecTable::from_entries(entries),
        );
        assert!(enc.init());
        assert_eq!(enc.raw_angle(), 5);
        assert_eq!(enc.rectified_angle(), 51_199 - 15);
    }
}
