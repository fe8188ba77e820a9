//! Profile value types and the indexed slot list that stores them.
//!
//! Profiles are plain values: they are validated once on construction and
//! inserted into compilers by copy. A delay profile names a slot in the
//! chip's 16-deep delay memory; a pulse profile names a slot in the
//! 32-deep pattern memory.

use crate::error::{self, ErrorKind};
use crate::pattern::DEFAULT_PATTERN_DUTY_CYCLE;
use crate::units::TimeUnit;

use serde::{Deserialize, Serialize};

/// Number of delay profile slots per chip
pub const NUM_DELAY_PROFILES: u8 = 16;

/// Number of pulse (pattern) profile slots per chip
pub const NUM_PATTERN_PROFILES: u8 = 32;

/// Trailing zero-level samples appended after the repeated pattern when a
/// pulse profile does not specify its own tail
pub const DEFAULT_TAIL_COUNT: u8 = 29;

/// The tail count register field is 5 bits wide
const MAX_TAIL_COUNT: u8 = 31;

/// Per-channel transmit delays and on/off apodization for one profile slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayProfile {
    index: u8,
    delays: Vec<f64>,
    apodizations: Vec<u8>,
    units: TimeUnit,
}

impl DelayProfile {
    /// Build a profile with every element enabled
    pub fn new(index: u8, delays: Vec<f64>, units: TimeUnit) -> error::Result<Self> {
        let apodizations = vec![1; delays.len()];
        Self::with_apodization(index, delays, apodizations, units)
    }

    /// Build a profile with an explicit 0/1 apodization mask
    pub fn with_apodization(
        index: u8,
        delays: Vec<f64>,
        apodizations: Vec<u8>,
        units: TimeUnit,
    ) -> error::Result<Self> {
        if index < 1 || index > NUM_DELAY_PROFILES {
            Err(ErrorKind::InvalidProfileIndex(format!(
                "delay profile index {} outside 1..={}",
                index, NUM_DELAY_PROFILES
            )))?
        }
        if apodizations.len() != delays.len() {
            Err(ErrorKind::LengthMismatch(format!(
                "apodization list must have {} elements, got {}",
                delays.len(),
                apodizations.len()
            )))?
        }
        if let Some(bad) = apodizations.iter().find(|&&a| a > 1) {
            Err(ErrorKind::ValueOutOfRange(format!(
                "apodization value {} is not 0 or 1",
                bad
            )))?
        }
        Ok(Self {
            index,
            delays,
            apodizations,
            units,
        })
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// Per-element delays in `units`
    pub fn delays(&self) -> &[f64] {
        &self.delays
    }

    /// Per-element enable mask (1 = element fires)
    pub fn apodizations(&self) -> &[u8] {
        &self.apodizations
    }

    pub fn units(&self) -> TimeUnit {
        self.units
    }

    pub fn num_elements(&self) -> usize {
        self.delays.len()
    }

    /// Delay of element `i` converted to seconds
    pub fn delay_seconds(&self, i: usize) -> f64 {
        self.delays[i] * self.units.seconds()
    }

    /// Copy out the elements `[start, start + count)` as a profile with the
    /// same index and units
    pub(crate) fn slice(&self, start: usize, count: usize) -> Self {
        Self {
            index: self.index,
            delays: self.delays[start..start + count].to_vec(),
            apodizations: self.apodizations[start..start + count].to_vec(),
            units: self.units,
        }
    }
}

/// Pulse waveform specification for one pattern profile slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseProfile {
    index: u8,
    frequency: f64,
    cycles: u32,
    duty_cycle: f64,
    tail_count: u8,
    invert: bool,
}

impl PulseProfile {
    /// Build a profile with the default duty cycle, tail and polarity
    pub fn new(index: u8, frequency: f64, cycles: u32) -> error::Result<Self> {
        Self::with_shape(
            index,
            frequency,
            cycles,
            DEFAULT_PATTERN_DUTY_CYCLE,
            DEFAULT_TAIL_COUNT,
            false,
        )
    }

    /// Build a profile with every waveform parameter explicit
    pub fn with_shape(
        index: u8,
        frequency: f64,
        cycles: u32,
        duty_cycle: f64,
        tail_count: u8,
        invert: bool,
    ) -> error::Result<Self> {
        if index < 1 || index > NUM_PATTERN_PROFILES {
            Err(ErrorKind::InvalidProfileIndex(format!(
                "pulse profile index {} outside 1..={}",
                index, NUM_PATTERN_PROFILES
            )))?
        }
        if !(frequency > 0.0) {
            Err(ErrorKind::ValueOutOfRange(format!(
                "pulse frequency must be positive, got {}",
                frequency
            )))?
        }
        if cycles < 1 {
            Err(ErrorKind::ValueOutOfRange(format!(
                "cycle count must be at least 1, got {}",
                cycles
            )))?
        }
        if !(duty_cycle > 0.0 && duty_cycle <= 1.0) {
            Err(ErrorKind::ValueOutOfRange(format!(
                "duty cycle {} outside (0, 1]",
                duty_cycle
            )))?
        }
        if tail_count > MAX_TAIL_COUNT {
            Err(ErrorKind::ValueOutOfRange(format!(
                "tail count {} does not fit in 5 bits",
                tail_count
            )))?
        }
        Ok(Self {
            index,
            frequency,
            cycles,
            duty_cycle,
            tail_count,
            invert,
        })
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    pub fn tail_count(&self) -> u8 {
        self.tail_count
    }

    pub fn invert(&self) -> bool {
        self.invert
    }
}

/// A value stored in a [`Slots`] list, addressed by its own index field
pub trait Indexed {
    fn index(&self) -> u8;
}

impl Indexed for DelayProfile {
    fn index(&self) -> u8 {
        self.index
    }
}

impl Indexed for PulseProfile {
    fn index(&self) -> u8 {
        self.index
    }
}

/// Insertion-ordered profile list keyed by profile index.
///
/// Inserting an index that is already present replaces that entry in place,
/// keeping its position; all lookups go through the index field, never the
/// list position. Lists hold at most 32 entries, so lookups stay linear.
#[derive(Debug, Clone, Default)]
pub struct Slots<P> {
    entries: Vec<P>,
}

impl<P: Indexed> Slots<P> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn position(&self, index: u8) -> Option<usize> {
        self.entries.iter().position(|p| p.index() == index)
    }

    /// Insert a profile, replacing in place when the index already exists
    pub fn insert(&mut self, profile: P) {
        match self.position(profile.index()) {
            Some(i) => self.entries[i] = profile,
            None => self.entries.push(profile),
        }
    }

    /// Remove and return the profile with the given index
    pub fn remove(&mut self, index: u8) -> Option<P> {
        self.position(index).map(|i| self.entries.remove(i))
    }

    pub fn get(&self, index: u8) -> Option<&P> {
        self.position(index).map(|i| &self.entries[i])
    }

    pub fn contains(&self, index: u8) -> bool {
        self.position(index).is_some()
    }

    /// Profile indices in insertion order
    pub fn indices(&self) -> Vec<u8> {
        self.entries.iter().map(|p| p.index()).collect()
    }

    /// Profiles in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, P> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn delay_profile(index: u8) -> DelayProfile {
        DelayProfile::new(index, vec![0.0; 32], TimeUnit::Seconds).unwrap()
    }

    #[test]
    fn test_delay_profile_validation() {
        assert!(matches!(
            DelayProfile::new(0, vec![0.0; 32], TimeUnit::Seconds)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidProfileIndex(_)
        ));
        assert!(matches!(
            DelayProfile::new(17, vec![0.0; 32], TimeUnit::Seconds)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidProfileIndex(_)
        ));
        assert!(matches!(
            DelayProfile::with_apodization(1, vec![0.0; 32], vec![1; 31], TimeUnit::Seconds)
                .unwrap_err()
                .kind(),
            ErrorKind::LengthMismatch(_)
        ));
        assert!(matches!(
            DelayProfile::with_apodization(1, vec![0.0; 2], vec![1, 2], TimeUnit::Seconds)
                .unwrap_err()
                .kind(),
            ErrorKind::ValueOutOfRange(_)
        ));
    }

    #[test]
    fn test_delay_profile_defaults_and_units() {
        let p = DelayProfile::new(3, vec![1.0, 2.0], TimeUnit::Microseconds).unwrap();
        assert_eq!(p.apodizations(), &[1, 1]);
        assert_eq!(p.num_elements(), 2);
        assert_eq!(p.delay_seconds(1), 2e-6);
    }

    #[test]
    fn test_pulse_profile_validation() {
        assert!(PulseProfile::new(1, 400e3, 3).is_ok());
        assert!(matches!(
            PulseProfile::new(33, 400e3, 3).unwrap_err().kind(),
            ErrorKind::InvalidProfileIndex(_)
        ));
        assert!(matches!(
            PulseProfile::new(1, 0.0, 3).unwrap_err().kind(),
            ErrorKind::ValueOutOfRange(_)
        ));
        assert!(matches!(
            PulseProfile::new(1, 400e3, 0).unwrap_err().kind(),
            ErrorKind::ValueOutOfRange(_)
        ));
        assert!(matches!(
            PulseProfile::with_shape(1, 400e3, 3, 1.5, 29, false)
                .unwrap_err()
                .kind(),
            ErrorKind::ValueOutOfRange(_)
        ));
        assert!(matches!(
            PulseProfile::with_shape(1, 400e3, 3, 0.66, 32, false)
                .unwrap_err()
                .kind(),
            ErrorKind::ValueOutOfRange(_)
        ));
    }

    #[test]
    fn test_pulse_profile_defaults() {
        let p = PulseProfile::new(2, 500e3, 10).unwrap();
        assert_eq!(p.duty_cycle(), DEFAULT_PATTERN_DUTY_CYCLE);
        assert_eq!(p.tail_count(), DEFAULT_TAIL_COUNT);
        assert!(!p.invert());
    }

    #[test]
    fn test_slots_replace_in_place() {
        let mut slots = Slots::new();
        slots.insert(delay_profile(4));
        slots.insert(delay_profile(1));
        slots.insert(delay_profile(9));
        assert_eq!(slots.indices(), vec![4, 1, 9]);

        // replacing keeps the position
        let replacement =
            DelayProfile::new(1, vec![7e-6; 32], TimeUnit::Seconds).unwrap();
        slots.insert(replacement);
        assert_eq!(slots.indices(), vec![4, 1, 9]);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots.get(1).unwrap().delays()[0], 7e-6);
    }

    #[test]
    fn test_slots_remove_by_index_field() {
        let mut slots = Slots::new();
        slots.insert(delay_profile(4));
        slots.insert(delay_profile(1));

        assert!(slots.remove(7).is_none());
        let removed = slots.remove(4).unwrap();
        assert_eq!(removed.index(), 4);
        assert_eq!(slots.indices(), vec![1]);
        assert!(!slots.contains(4));
    }

    #[test]
    fn test_profile_serde_roundtrip() {
        let p = DelayProfile::with_apodization(
            2,
            vec![1.5, 0.0],
            vec![1, 0],
            TimeUnit::Microseconds,
        )
        .unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"us\""));
        let back: DelayProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);

        let p = PulseProfile::with_shape(5, 400e3, 3, 0.5, 20, true).unwrap();
        let back: PulseProfile = serde_json::from_str(&serde_json::to_string(&p).unwrap()).unwrap();
        assert_eq!(back, p);
    }
}
