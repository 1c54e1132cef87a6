//! Hardware seams between the joint control core and the board.
//!
//! The real-time tick calls `AngleSensor` and `Driver` synchronously, so those
//! methods are infallible. `PersistentTable` is only touched from the
//! low-priority polling context and reports failures like the rest of the
//! workspace, as boxed errors at the trait boundary.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error used at trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Magnetic angle sensor returning one raw reading per call.
pub trait AngleSensor {
    /// Raw angle in sensor counts (14 significant bits).
    fn read_raw_angle(&mut self) -> u16;
}

/// Two-phase current driver.
pub trait Driver {
    /// Apply a current vector. `direction_in_count` is the electrical direction
    /// in subdivided steps; only the low 10 bits (one electrical cycle) matter.
    fn set_foc_vector(&mut self, direction_in_count: u32, current_ma: i32);
    /// Release both coils (free-wheel).
    fn sleep(&mut self);
    /// Short both coils.
    fn brake(&mut self);
}

/// Append-only non-volatile table holding the encoder correction map.
pub trait PersistentTable {
    /// Erase the table (every entry reads back as `0xFFFF`).
    fn clear(&mut self) -> Result<(), BoxError>;
    /// Open a write window starting at entry 0.
    fn begin_write(&mut self) -> Result<(), BoxError>;
    /// Append one entry inside the open write window.
    fn append_u16(&mut self, value: u16) -> Result<(), BoxError>;
    /// Close the write window.
    fn end_write(&mut self) -> Result<(), BoxError>;
    /// Current contents, consulted every tick.
    fn entries(&self) -> &[u16];
}

impl<T: AngleSensor + ?Sized> AngleSensor for Box<T> {
    fn read_raw_angle(&mut self) -> u16 {
        (**self).read_raw_angle()
    }
}

impl<T: Driver + ?Sized> Driver for Box<T> {
    fn set_foc_vector(&mut self, direction_in_count: u32, current_ma: i32) {
        (**self).set_foc_vector(direction_in_count, current_ma);
    }
    fn sleep(&mut self) {
        (**self).sleep();
    }
    fn brake(&mut self) {
        (**self).brake();
    }
}

impl<T: PersistentTable + ?Sized> PersistentTable for Box<T> {
    fn clear(&mut self) -> Result<(), BoxError> {
        (**self).clear()
    }
    fn begin_write(&mut self) -> Result<(), BoxError> {
        (**self).begin_write()
    }
    fn append_u16(&mut self, value: u16) -> Result<(), BoxError> {
        (**self).append_u16(value)
    }
    fn end_write(&mut self) -> Result<(), BoxError> {
        (**self).end_write()
    }
    fn entries(&self) -> &[u16] {
        (**self).entries()
    }
}
