//! Register image compiler for TX7332 32-channel ultrasound transmit
//! ASICs.
//!
//! A transmit operation is described as values: delay profiles (per-element
//! time-of-flight offsets plus an on/off apodization mask) and pulse
//! profiles (frequency, duty cycle, cycle count, tail, polarity). The
//! compiler turns them into the bit-exact address→value image the chips
//! expect, either for one chip ([`tx7332::Tx7332`]), the two chips behind
//! one I2C address ([`module::TxModule`]), or a whole transducer array
//! ([`array::TxArray`]).
//!
//! Everything here is synchronous, in-memory computation; shipping the
//! registers over I2C is the caller's job.

pub mod array;
pub mod error;
pub mod module;
pub mod pattern;
pub mod profile;
pub mod regmap;
pub mod tx7332;
pub mod units;
