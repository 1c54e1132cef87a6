//! Host-side stand-ins for the joint hardware.
//!
//! - `SimulatedJoint`: one rotor shared by a `SimSensor` and a `SimDriver`
//! - `MemoryTable`: RAM-backed `PersistentTable` with flash-like semantics
pub mod error;
pub mod sim;
pub mod table;

pub use sim::{SensorModel, SimDriver, SimSensor, SimulatedJoint};
pub use table::MemoryTable;
