//! TX7332 per-chip register compiler.
//!
//! The TX7332 is a 32-channel ultrasound transmit ASIC. Its register file
//! holds 16 delay profiles (per-channel launch delays plus an apodization
//! mask) and 32 pulse profiles (run-length encoded waveforms), one of each
//! selected as active by the global control registers. This module owns the
//! chip constants, the channel/period → register location maps, and the
//! compiler that turns profile values into the full address→value image.

use crate::error::{self, ErrorKind};
use crate::pattern::{self, MAX_PATTERN_PERIODS};
use crate::profile::{DelayProfile, PulseProfile, Slots, NUM_DELAY_PROFILES, NUM_PATTERN_PROFILES};
use crate::regmap::{set_field, RegisterMap};

use once_cell::sync::Lazy;

use std::collections::HashMap;

/// Channels per transmitter chip
pub const NUM_CHANNELS: usize = 32;

/// Beamformer system clock the chips are specified against
pub const DEFAULT_CLK_FREQ: f64 = 64e6;

pub const ADDRESS_GLOBAL_MODE: u16 = 0x0;
pub const ADDRESS_STANDBY: u16 = 0x1;
pub const ADDRESS_DYNPWR_2: u16 = 0x6;
pub const ADDRESS_LDO_PWR_1: u16 = 0xB;
pub const ADDRESS_TRSW_TURNOFF: u16 = 0xC;
pub const ADDRESS_DYNPWR_1: u16 = 0xF;
pub const ADDRESS_LDO_PWR_2: u16 = 0x14;
pub const ADDRESS_TRSW_TURNON: u16 = 0x15;
pub const ADDRESS_DELAY_SEL: u16 = 0x16;
pub const ADDRESS_PATTERN_MODE: u16 = 0x18;
pub const ADDRESS_PATTERN_REPEAT: u16 = 0x19;
pub const ADDRESS_TRSW: u16 = 0x1A;
pub const ADDRESS_APODIZATION: u16 = 0x1B;
pub const ADDRESS_PATTERN_SEL_G2: u16 = 0x1E;
pub const ADDRESS_PATTERN_SEL_G1: u16 = 0x1F;

/// Global (non-profile-data) register addresses
pub const ADDRESSES_GLOBAL: [u16; 15] = [
    ADDRESS_GLOBAL_MODE,
    ADDRESS_STANDBY,
    ADDRESS_DYNPWR_2,
    ADDRESS_LDO_PWR_1,
    ADDRESS_TRSW_TURNOFF,
    ADDRESS_DYNPWR_1,
    ADDRESS_LDO_PWR_2,
    ADDRESS_TRSW_TURNON,
    ADDRESS_DELAY_SEL,
    ADDRESS_PATTERN_MODE,
    ADDRESS_PATTERN_REPEAT,
    ADDRESS_PATTERN_SEL_G1,
    ADDRESS_PATTERN_SEL_G2,
    ADDRESS_TRSW,
    ADDRESS_APODIZATION,
];

/// Delay data memory: 16 profiles x 16 registers
pub const ADDRESS_DELAY_DATA_FIRST: u16 = 0x020;
pub const ADDRESS_DELAY_DATA_LAST: u16 = 0x11F;
/// Pattern data memory: 32 profiles x 4 registers
pub const ADDRESS_PATTERN_DATA_FIRST: u16 = 0x120;
pub const ADDRESS_PATTERN_DATA_LAST: u16 = 0x19F;

/// Registers per delay profile
pub const DELAY_PROFILE_OFFSET: u16 = 16;
/// Registers per pattern profile
pub const PATTERN_PROFILE_OFFSET: u16 = 4;

/// Width of one delay field in bits
pub const DELAY_WIDTH: u8 = 13;
/// Width of one pattern level field in bits
pub const PATTERN_LEVEL_WIDTH: u8 = 3;
/// Width of one pattern length field in bits
pub const PATTERN_LENGTH_WIDTH: u8 = 5;

/// Largest repeat count of the classic 5-bit repeat field (stores count-1)
pub const MAX_REPEAT: u32 = 31;
/// Largest repeat count of the 16-bit elastic repeat field
pub const MAX_ELASTIC_REPEAT: u32 = 65535;

/// Fixed bits of the pattern mode register (everything the compiler does
/// not set stays at its hardware default)
const PATTERN_MODE_BASE: u32 = 0x02000003;

/// Terminator level code marking the end of a short pattern
const PATTERN_LEVEL_TERMINATE: u32 = 0b111;

/// Delay fields are packed two channels per register in a fixed interleave.
/// Row `r` of a profile holds the channel pair `DELAY_ORDER[r]`; the first
/// channel of the pair sits at bit 16, the second at bit 0.
const DELAY_ORDER: [[u8; 2]; 16] = [
    [32, 30],
    [28, 26],
    [24, 22],
    [20, 18],
    [31, 29],
    [27, 25],
    [23, 21],
    [19, 17],
    [16, 14],
    [12, 10],
    [8, 6],
    [4, 2],
    [15, 13],
    [11, 9],
    [7, 5],
    [3, 1],
];

struct DelaySlot {
    row: u16,
    lsb: u8,
}

static DELAY_CHANNEL_MAP: Lazy<HashMap<u8, DelaySlot>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (row, pair) in DELAY_ORDER.iter().enumerate() {
        for (i, &channel) in pair.iter().enumerate() {
            map.insert(
                channel,
                DelaySlot {
                    row: row as u16,
                    lsb: 16 * (1 - i as u8),
                },
            );
        }
    }
    map
});

/// Register address and least significant bit of one channel's delay field
pub fn delay_location(channel: u8, profile: u8) -> error::Result<(u16, u8)> {
    let slot = DELAY_CHANNEL_MAP.get(&channel).ok_or_else(|| {
        error::Error::from(ErrorKind::ValueOutOfRange(format!(
            "invalid channel {}",
            channel
        )))
    })?;
    if profile < 1 || profile > NUM_DELAY_PROFILES {
        Err(ErrorKind::InvalidProfileIndex(format!(
            "delay profile index {} outside 1..={}",
            profile, NUM_DELAY_PROFILES
        )))?
    }
    let address =
        ADDRESS_DELAY_DATA_FIRST + (u16::from(profile) - 1) * DELAY_PROFILE_OFFSET + slot.row;
    Ok((address, slot.lsb))
}

/// Register address and level/length bit offsets of one pattern period.
///
/// Periods are packed four per register: period `p` (1-based) lands in row
/// `(p - 1) / 4`, with the 3-bit level followed by the 5-bit length.
pub fn pattern_location(period: u8, profile: u8) -> error::Result<(u16, u8, u8)> {
    if period < 1 || period as usize > MAX_PATTERN_PERIODS {
        Err(ErrorKind::ValueOutOfRange(format!(
            "invalid pattern period {}",
            period
        )))?
    }
    if profile < 1 || profile > NUM_PATTERN_PROFILES {
        Err(ErrorKind::InvalidProfileIndex(format!(
            "pulse profile index {} outside 1..={}",
            profile, NUM_PATTERN_PROFILES
        )))?
    }
    let row = u16::from(period - 1) / 4;
    let slot = (period - 1) % 4;
    let lsb_level = slot * (PATTERN_LEVEL_WIDTH + PATTERN_LENGTH_WIDTH);
    let address =
        ADDRESS_PATTERN_DATA_FIRST + (u16::from(profile) - 1) * PATTERN_PROFILE_OFFSET + row;
    Ok((address, lsb_level, lsb_level + PATTERN_LEVEL_WIDTH))
}

/// Which profile data to include in a compiled image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileScope {
    /// Only the active delay and pulse profile
    Active,
    /// Every stored profile, in insertion order
    Set,
    /// Every stored profile, with all unused profile slots zero-filled
    All,
}

/// Register compiler for one TX7332.
///
/// Holds the chip's delay and pulse profile slots plus the active selection
/// for each, and compiles them into the register image the chip expects.
#[derive(Debug, Clone)]
pub struct Tx7332 {
    bf_clk: f64,
    delay_profiles: Slots<DelayProfile>,
    pulse_profiles: Slots<PulseProfile>,
    active_delay: Option<u8>,
    active_pulse: Option<u8>,
}

impl Tx7332 {
    pub fn new(bf_clk: f64) -> Self {
        Self {
            bf_clk,
            delay_profiles: Slots::new(),
            pulse_profiles: Slots::new(),
            active_delay: None,
            active_pulse: None,
        }
    }

    /// Build a compiler from pre-existing profile lists.
    ///
    /// Rejects lists carrying two profiles with the same index and active
    /// selections that name no stored profile.
    pub fn with_profiles(
        bf_clk: f64,
        delay_profiles: Vec<DelayProfile>,
        pulse_profiles: Vec<PulseProfile>,
        active_delay: Option<u8>,
        active_pulse: Option<u8>,
    ) -> error::Result<Self> {
        let mut tx = Self::new(bf_clk);
        for p in delay_profiles {
            if tx.delay_profiles.contains(p.index()) {
                Err(ErrorKind::DuplicateProfile(format!(
                    "delay profile {} given twice",
                    p.index()
                )))?
            }
            tx.add_delay_profile(p, Some(false))?;
        }
        for p in pulse_profiles {
            if tx.pulse_profiles.contains(p.index()) {
                Err(ErrorKind::DuplicateProfile(format!(
                    "pulse profile {} given twice",
                    p.index()
                )))?
            }
            tx.add_pulse_profile(p, Some(false));
        }
        if let Some(index) = active_delay {
            tx.activate_delay_profile(index)?;
        }
        if let Some(index) = active_pulse {
            tx.activate_pulse_profile(index)?;
        }
        Ok(tx)
    }

    pub fn bf_clk(&self) -> f64 {
        self.bf_clk
    }

    pub fn active_delay_profile(&self) -> Option<u8> {
        self.active_delay
    }

    pub fn active_pulse_profile(&self) -> Option<u8> {
        self.active_pulse
    }

    /// Store a delay profile (replacing in place if its index exists).
    ///
    /// `activate` semantics: `Some(true)` activates, `Some(false)` leaves
    /// the selection alone, `None` activates only when nothing is active.
    pub fn add_delay_profile(
        &mut self,
        profile: DelayProfile,
        activate: Option<bool>,
    ) -> error::Result<()> {
        if profile.num_elements() != NUM_CHANNELS {
            Err(ErrorKind::LengthMismatch(format!(
                "delay profile must have {} elements, got {}",
                NUM_CHANNELS,
                profile.num_elements()
            )))?
        }
        let index = profile.index();
        self.delay_profiles.insert(profile);
        if activate.unwrap_or(self.active_delay.is_none()) {
            self.active_delay = Some(index);
        }
        Ok(())
    }

    /// Store a pulse profile; `activate` as in [`Self::add_delay_profile`]
    pub fn add_pulse_profile(&mut self, profile: PulseProfile, activate: Option<bool>) {
        let index = profile.index();
        self.pulse_profiles.insert(profile);
        if activate.unwrap_or(self.active_pulse.is_none()) {
            self.active_pulse = Some(index);
        }
    }

    pub fn remove_delay_profile(&mut self, index: u8) -> error::Result<()> {
        self.delay_profiles.remove(index).ok_or_else(|| {
            error::Error::from(ErrorKind::ProfileNotFound(format!(
                "delay profile {} not found",
                index
            )))
        })?;
        if self.active_delay == Some(index) {
            self.active_delay = None;
        }
        Ok(())
    }

    pub fn remove_pulse_profile(&mut self, index: u8) -> error::Result<()> {
        self.pulse_profiles.remove(index).ok_or_else(|| {
            error::Error::from(ErrorKind::ProfileNotFound(format!(
                "pulse profile {} not found",
                index
            )))
        })?;
        if self.active_pulse == Some(index) {
            self.active_pulse = None;
        }
        Ok(())
    }

    pub fn activate_delay_profile(&mut self, index: u8) -> error::Result<()> {
        if !self.delay_profiles.contains(index) {
            Err(ErrorKind::ProfileNotFound(format!(
                "delay profile {} not found",
                index
            )))?
        }
        self.active_delay = Some(index);
        Ok(())
    }

    pub fn activate_pulse_profile(&mut self, index: u8) -> error::Result<()> {
        if !self.pulse_profiles.contains(index) {
            Err(ErrorKind::ProfileNotFound(format!(
                "pulse profile {} not found",
                index
            )))?
        }
        self.active_pulse = Some(index);
        Ok(())
    }

    /// Look up a delay profile; `None` means the active one
    pub fn get_delay_profile(&self, index: Option<u8>) -> error::Result<&DelayProfile> {
        let index = index.or(self.active_delay).ok_or_else(|| {
            error::Error::from(ErrorKind::ProfileNotFound(
                "no delay profile is active".to_string(),
            ))
        })?;
        self.delay_profiles.get(index).ok_or_else(|| {
            error::Error::from(ErrorKind::ProfileNotFound(format!(
                "delay profile {} not found",
                index
            )))
        })
    }

    /// Look up a pulse profile; `None` means the active one
    pub fn get_pulse_profile(&self, index: Option<u8>) -> error::Result<&PulseProfile> {
        let index = index.or(self.active_pulse).ok_or_else(|| {
            error::Error::from(ErrorKind::ProfileNotFound(
                "no pulse profile is active".to_string(),
            ))
        })?;
        self.pulse_profiles.get(index).ok_or_else(|| {
            error::Error::from(ErrorKind::ProfileNotFound(format!(
                "pulse profile {} not found",
                index
            )))
        })
    }

    pub(crate) fn delay_profile_indices(&self) -> Vec<u8> {
        self.delay_profiles.indices()
    }

    pub(crate) fn pulse_profile_indices(&self) -> Vec<u8> {
        self.pulse_profiles.indices()
    }

    /// Delay select and apodization control registers for one profile
    pub fn delay_control_registers(&self, index: Option<u8>) -> error::Result<RegisterMap> {
        let profile = self.get_delay_profile(index)?;

        let mut apod_register = 0;
        for (i, &apod) in profile.apodizations().iter().enumerate() {
            // the chip stores the inverted mask (1 = element muted)
            apod_register = set_field(apod_register, 1 - u32::from(apod), i as u8, 1)?;
        }

        let select = u32::from(profile.index()) - 1;
        let mut delay_sel_register = set_field(0, select, 12, 4)?;
        delay_sel_register = set_field(delay_sel_register, select, 28, 4)?;

        let mut registers = RegisterMap::new();
        registers.insert(ADDRESS_DELAY_SEL, delay_sel_register);
        registers.insert(ADDRESS_APODIZATION, apod_register);
        Ok(registers)
    }

    /// Pattern mode, repeat and select control registers for one profile
    pub fn pulse_control_registers(&self, index: Option<u8>) -> error::Result<RegisterMap> {
        let profile = self.get_pulse_profile(index)?;
        let pattern =
            pattern::calc_pulse_pattern(profile.frequency(), profile.duty_cycle(), self.bf_clk)?;

        let cycles = profile.cycles();
        let (repeat, elastic_repeat, elastic_mode) = if cycles > MAX_REPEAT + 1 {
            // long pulses repeat in 16-sample elastic units
            let pulse_samples = f64::from(cycles) * self.bf_clk / profile.frequency();
            let elastic_repeat = (pulse_samples / 16.0) as u32;
            if elastic_repeat > MAX_ELASTIC_REPEAT {
                Err(ErrorKind::PatternOverflow(format!(
                    "pattern duration too long for elastic repeat ({} > {})",
                    elastic_repeat, MAX_ELASTIC_REPEAT
                )))?
            }
            (0, elastic_repeat, 1)
        } else {
            (cycles - 1, 0, 0)
        };

        let mut reg_mode = PATTERN_MODE_BASE;
        reg_mode = set_field(reg_mode, u32::from(pattern.clk_div_n()), 3, 3)?;
        reg_mode = set_field(reg_mode, u32::from(profile.invert()), 6, 1)?;

        let mut reg_repeat = set_field(0, repeat, 1, 5)?;
        reg_repeat = set_field(reg_repeat, u32::from(profile.tail_count()), 6, 5)?;
        reg_repeat = set_field(reg_repeat, elastic_mode, 11, 1)?;
        reg_repeat = set_field(reg_repeat, elastic_repeat, 12, 16)?;

        let reg_pattern_sel = set_field(0, u32::from(profile.index()) - 1, 0, 6)?;

        let mut registers = RegisterMap::new();
        registers.insert(ADDRESS_PATTERN_MODE, reg_mode);
        registers.insert(ADDRESS_PATTERN_REPEAT, reg_repeat);
        registers.insert(ADDRESS_PATTERN_SEL_G1, reg_pattern_sel);
        registers.insert(ADDRESS_PATTERN_SEL_G2, reg_pattern_sel);
        Ok(registers)
    }

    /// Delay memory registers of one profile
    pub fn delay_data_registers(&self, index: Option<u8>) -> error::Result<RegisterMap> {
        let profile = self.get_delay_profile(index)?;
        let mut registers = RegisterMap::new();
        for channel in 1..=NUM_CHANNELS as u8 {
            let (address, lsb) = delay_location(channel, profile.index())?;
            let seconds = profile.delay_seconds(channel as usize - 1);
            let ticks = (seconds * self.bf_clk).round();
            if ticks < 0.0 || ticks >= f64::from(1u32 << DELAY_WIDTH) {
                Err(ErrorKind::ValueOutOfRange(format!(
                    "delay of {} ticks on channel {} does not fit in {} bits",
                    ticks, channel, DELAY_WIDTH
                )))?
            }
            let reg = registers.entry(address).or_insert(0);
            *reg = set_field(*reg, ticks as u32, lsb, DELAY_WIDTH)?;
        }
        Ok(registers)
    }

    /// Pattern memory registers of one profile
    pub fn pulse_data_registers(&self, index: Option<u8>) -> error::Result<RegisterMap> {
        let profile = self.get_pulse_profile(index)?;
        let pattern =
            pattern::calc_pulse_pattern(profile.frequency(), profile.duty_cycle(), self.bf_clk)?;
        let mut registers = RegisterMap::new();
        for (i, (&level, &length)) in pattern
            .levels()
            .iter()
            .zip(pattern.lengths().iter())
            .enumerate()
        {
            let code = match level {
                -1 => 0b01,
                0 => 0b00,
                1 => 0b10,
                other => panic!("BUG: pattern level {} out of range", other),
            };
            self.write_pattern_period(
                &mut registers,
                i as u8 + 1,
                profile.index(),
                code,
                u32::from(length),
            )?;
        }
        let num_periods = pattern.num_periods();
        if num_periods < MAX_PATTERN_PERIODS {
            self.write_pattern_period(
                &mut registers,
                num_periods as u8 + 1,
                profile.index(),
                PATTERN_LEVEL_TERMINATE,
                0,
            )?;
        }
        Ok(registers)
    }

    fn write_pattern_period(
        &self,
        registers: &mut RegisterMap,
        period: u8,
        profile: u8,
        level: u32,
        length: u32,
    ) -> error::Result<()> {
        let (address, lsb_level, lsb_length) = pattern_location(period, profile)?;
        let reg = registers.entry(address).or_insert(0);
        *reg = set_field(*reg, level, lsb_level, PATTERN_LEVEL_WIDTH)?;
        *reg = set_field(*reg, length, lsb_length, PATTERN_LENGTH_WIDTH)?;
        Ok(())
    }

    /// Compile the complete register image.
    ///
    /// Global registers are always present (zeroed, then overlaid with the
    /// active profile's control state). Profile data coverage follows
    /// `scope`; data is laid down in slot insertion order, and the active
    /// profile's control overlay is written last.
    pub fn get_registers(&self, scope: ProfileScope) -> error::Result<RegisterMap> {
        if self.delay_profiles.is_empty() {
            Err(ErrorKind::NotReady("no delay profiles have been set".to_string()))?
        }
        if self.pulse_profiles.is_empty() {
            Err(ErrorKind::NotReady("no pulse profiles have been set".to_string()))?
        }
        if self.active_delay.is_none() {
            Err(ErrorKind::NotReady("no delay profile selected".to_string()))?
        }
        if self.active_pulse.is_none() {
            Err(ErrorKind::NotReady("no pulse profile selected".to_string()))?
        }

        let mut registers = RegisterMap::new();
        for &address in ADDRESSES_GLOBAL.iter() {
            registers.insert(address, 0);
        }
        if scope == ProfileScope::All {
            for address in ADDRESS_DELAY_DATA_FIRST..=ADDRESS_DELAY_DATA_LAST {
                registers.insert(address, 0);
            }
            for address in ADDRESS_PATTERN_DATA_FIRST..=ADDRESS_PATTERN_DATA_LAST {
                registers.insert(address, 0);
            }
        }

        match scope {
            ProfileScope::Active => {
                registers.extend(self.delay_data_registers(None)?);
                registers.extend(self.pulse_data_registers(None)?);
            }
            ProfileScope::Set | ProfileScope::All => {
                for profile in self.delay_profiles.iter() {
                    registers.extend(self.delay_data_registers(Some(profile.index()))?);
                }
                for profile in self.pulse_profiles.iter() {
                    registers.extend(self.pulse_data_registers(Some(profile.index()))?);
                }
            }
        }

        registers.extend(self.delay_control_registers(None)?);
        registers.extend(self.pulse_control_registers(None)?);
        Ok(registers)
    }
}
