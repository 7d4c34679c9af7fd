//! Display controller adapters.
//!
//! Monitors are switched over DDC/CI by writing one VCP feature (normally
//! `0x60`, input select) on the monitor's I2C bus.

pub mod ddcutil;
pub mod mock;
