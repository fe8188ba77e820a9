//! Transmit module: the transmitters sharing one I2C address.
//!
//! A module stores whole-module profiles (one delay/apodization entry per
//! physical element across all of its chips) and derives the per-chip
//! slice each transmitter compiles. The per-chip profiles are caches of
//! that derivation: every module-level mutation re-derives the affected
//! slices eagerly, and `recompute_*` rebuilds all of them from scratch.

use crate::error::{self, ErrorKind};
use crate::profile::{DelayProfile, PulseProfile, Slots};
use crate::regmap::RegisterMap;
use crate::tx7332::{ProfileScope, Tx7332, NUM_CHANNELS};

use log::debug;

/// Transmitter chips behind one I2C address
pub const DEFAULT_NUM_TRANSMITTERS: usize = 2;

/// A group of TX7332s addressed as one I2C device.
#[derive(Debug, Clone)]
pub struct TxModule {
    i2c_addr: u8,
    bf_clk: f64,
    num_transmitters: usize,
    delay_profiles: Slots<DelayProfile>,
    pulse_profiles: Slots<PulseProfile>,
    active_delay: Option<u8>,
    active_pulse: Option<u8>,
    transmitters: Vec<Tx7332>,
}

impl TxModule {
    pub fn new(i2c_addr: u8, bf_clk: f64, num_transmitters: usize) -> Self {
        assert!(num_transmitters >= 1, "BUG: module without transmitters");
        Self {
            i2c_addr,
            bf_clk,
            num_transmitters,
            delay_profiles: Slots::new(),
            pulse_profiles: Slots::new(),
            active_delay: None,
            active_pulse: None,
            transmitters: (0..num_transmitters).map(|_| Tx7332::new(bf_clk)).collect(),
        }
    }

    pub fn i2c_addr(&self) -> u8 {
        self.i2c_addr
    }

    pub fn bf_clk(&self) -> f64 {
        self.bf_clk
    }

    pub fn num_transmitters(&self) -> usize {
        self.num_transmitters
    }

    /// Total physical elements across the module's chips
    pub fn num_elements(&self) -> usize {
        NUM_CHANNELS * self.num_transmitters
    }

    pub fn transmitters(&self) -> &[Tx7332] {
        &self.transmitters
    }

    pub fn active_delay_profile(&self) -> Option<u8> {
        self.active_delay
    }

    pub fn active_pulse_profile(&self) -> Option<u8> {
        self.active_pulse
    }

    /// Store a whole-module delay profile and push its per-chip slices
    /// down to every transmitter
    pub fn add_delay_profile(
        &mut self,
        profile: DelayProfile,
        activate: Option<bool>,
    ) -> error::Result<()> {
        if profile.num_elements() != self.num_elements() {
            Err(ErrorKind::LengthMismatch(format!(
                "delay profile must have {} elements, got {}",
                self.num_elements(),
                profile.num_elements()
            )))?
        }
        let index = profile.index();
        let activate = activate.unwrap_or(self.active_delay.is_none());
        for (i, tx) in self.transmitters.iter_mut().enumerate() {
            let slice = profile.slice(i * NUM_CHANNELS, NUM_CHANNELS);
            tx.add_delay_profile(slice, Some(activate))?;
        }
        self.delay_profiles.insert(profile);
        if activate {
            self.active_delay = Some(index);
        }
        Ok(())
    }

    /// Store a whole-module pulse profile on every transmitter
    pub fn add_pulse_profile(&mut self, profile: PulseProfile, activate: Option<bool>) {
        let index = profile.index();
        let activate = activate.unwrap_or(self.active_pulse.is_none());
        for tx in self.transmitters.iter_mut() {
            tx.add_pulse_profile(profile.clone(), Some(activate));
        }
        self.pulse_profiles.insert(profile);
        if activate {
            self.active_pulse = Some(index);
        }
    }

    pub fn remove_delay_profile(&mut self, index: u8) -> error::Result<()> {
        if self.delay_profiles.remove(index).is_none() {
            Err(ErrorKind::ProfileNotFound(format!(
                "delay profile {} not found",
                index
            )))?
        }
        if self.active_delay == Some(index) {
            self.active_delay = None;
        }
        for tx in self.transmitters.iter_mut() {
            tx.remove_delay_profile(index)?;
        }
        Ok(())
    }

    pub fn remove_pulse_profile(&mut self, index: u8) -> error::Result<()> {
        if self.pulse_profiles.remove(index).is_none() {
            Err(ErrorKind::ProfileNotFound(format!(
                "pulse profile {} not found",
                index
            )))?
        }
        if self.active_pulse == Some(index) {
            self.active_pulse = None;
        }
        for tx in self.transmitters.iter_mut() {
            tx.remove_pulse_profile(index)?;
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
        for tx in self.transmitters.iter_mut() {
            tx.activate_delay_profile(index)?;
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
        for tx in self.transmitters.iter_mut() {
            tx.activate_pulse_profile(index)?;
        }
        self.active_pulse = Some(index);
        Ok(())
    }

    /// Look up a whole-module delay profile; `None` means the active one
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

    /// Look up a whole-module pulse profile; `None` means the active one
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

    /// Throw away every per-chip delay slice and re-derive from the
    /// module's own profile list
    pub fn recompute_delay_profiles(&mut self) -> error::Result<()> {
        debug!(
            "module {:#04x}: re-deriving {} delay profiles",
            self.i2c_addr,
            self.delay_profiles.len()
        );
        for i in 0..self.transmitters.len() {
            for index in self.transmitters[i].delay_profile_indices() {
                self.transmitters[i].remove_delay_profile(index)?;
            }
            for profile in self.delay_profiles.iter() {
                let slice = profile.slice(i * NUM_CHANNELS, NUM_CHANNELS);
                let activate = self.active_delay == Some(profile.index());
                self.transmitters[i].add_delay_profile(slice, Some(activate))?;
            }
        }
        Ok(())
    }

    /// Throw away every per-chip pulse slot and re-derive from the
    /// module's own profile list
    pub fn recompute_pulse_profiles(&mut self) -> error::Result<()> {
        debug!(
            "module {:#04x}: re-deriving {} pulse profiles",
            self.i2c_addr,
            self.pulse_profiles.len()
        );
        for tx in self.transmitters.iter_mut() {
            for index in tx.pulse_profile_indices() {
                tx.remove_pulse_profile(index)?;
            }
        }
        for profile in self.pulse_profiles.iter() {
            let activate = self.active_pulse == Some(profile.index());
            for tx in self.transmitters.iter_mut() {
                tx.add_pulse_profile(profile.clone(), Some(activate));
            }
        }
        Ok(())
    }

    /// Compile one register image per transmitter, in transmitter order
    pub fn get_registers(&self, scope: ProfileScope) -> error::Result<Vec<RegisterMap>> {
        self.transmitters
            .iter()
            .map(|tx| tx.get_registers(scope))
            .collect()
    }

    /// Per-transmitter delay control registers for one profile
    pub fn delay_control_registers(&self, index: Option<u8>) -> error::Result<Vec<RegisterMap>> {
        self.transmitters
            .iter()
            .map(|tx| tx.delay_control_registers(index))
            .collect()
    }

    /// Per-transmitter pattern control registers for one profile
    pub fn pulse_control_registers(&self, index: Option<u8>) -> error::Result<Vec<RegisterMap>> {
        self.transmitters
            .iter()
            .map(|tx| tx.pulse_control_registers(index))
            .collect()
    }

    /// Per-transmitter delay memory registers for one profile
    pub fn delay_data_registers(&self, index: Option<u8>) -> error::Result<Vec<RegisterMap>> {
        self.transmitters
            .iter()
            .map(|tx| tx.delay_data_registers(index))
            .collect()
    }

    /// Per-transmitter pattern memory registers for one profile
    pub fn pulse_data_registers(&self, index: Option<u8>) -> error::Result<Vec<RegisterMap>> {
        self.transmitters
            .iter()
            .map(|tx| tx.pulse_data_registers(index))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tx7332::{ADDRESS_APODIZATION, ADDRESS_DELAY_SEL, DEFAULT_CLK_FREQ};
    use crate::units::TimeUnit;

    fn ramp_profile(index: u8, elements: usize) -> DelayProfile {
        let delays = (0..elements).map(|i| i as f64).collect();
        DelayProfile::new(index, delays, TimeUnit::Nanoseconds).unwrap()
    }

    #[test]
    fn test_add_delay_profile_slices_per_chip() {
        let mut module = TxModule::new(0x32, DEFAULT_CLK_FREQ, 2);
        module.add_delay_profile(ramp_profile(1, 64), None).unwrap();

        let txs = module.transmitters();
        let first = txs[0].get_delay_profile(None).unwrap();
        let second = txs[1].get_delay_profile(None).unwrap();
        assert_eq!(first.num_elements(), 32);
        assert_eq!(first.delays()[0], 0.0);
        assert_eq!(first.delays()[31], 31.0);
        assert_eq!(second.delays()[0], 32.0);
        assert_eq!(second.delays()[31], 63.0);
        // same slot index on both chips
        assert_eq!(first.index(), 1);
        assert_eq!(second.index(), 1);
    }

    #[test]
    fn test_add_delay_profile_length_check() {
        let mut module = TxModule::new(0x32, DEFAULT_CLK_FREQ, 2);
        let err = module.add_delay_profile(ramp_profile(1, 32), None).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::LengthMismatch(_)));
    }

    #[test]
    fn test_remove_removes_everywhere() {
        let mut module = TxModule::new(0x32, DEFAULT_CLK_FREQ, 2);
        module.add_delay_profile(ramp_profile(1, 64), None).unwrap();
        module.add_delay_profile(ramp_profile(2, 64), None).unwrap();

        module.remove_delay_profile(1).unwrap();
        assert!(module.get_delay_profile(Some(1)).is_err());
        for tx in module.transmitters() {
            assert!(tx.get_delay_profile(Some(1)).is_err());
            assert!(tx.get_delay_profile(Some(2)).is_ok());
        }
        // profile 1 was active; selection cleared at every level
        assert_eq!(module.active_delay_profile(), None);
        for tx in module.transmitters() {
            assert_eq!(tx.active_delay_profile(), None);
        }
    }

    #[test]
    fn test_activation_propagates() {
        let mut module = TxModule::new(0x32, DEFAULT_CLK_FREQ, 2);
        module.add_delay_profile(ramp_profile(1, 64), None).unwrap();
        module.add_delay_profile(ramp_profile(2, 64), None).unwrap();
        assert_eq!(module.active_delay_profile(), Some(1));

        module.activate_delay_profile(2).unwrap();
        assert_eq!(module.active_delay_profile(), Some(2));
        for tx in module.transmitters() {
            assert_eq!(tx.active_delay_profile(), Some(2));
        }

        assert!(matches!(
            module.activate_delay_profile(9).unwrap_err().kind(),
            ErrorKind::ProfileNotFound(_)
        ));
    }

    #[test]
    fn test_pulse_profile_broadcast() {
        let mut module = TxModule::new(0x32, DEFAULT_CLK_FREQ, 2);
        module.add_pulse_profile(PulseProfile::new(1, 400e3, 3).unwrap(), None);
        assert_eq!(module.active_pulse_profile(), Some(1));
        for tx in module.transmitters() {
            assert_eq!(tx.get_pulse_profile(None).unwrap().frequency(), 400e3);
        }
    }

    #[test]
    fn test_recompute_rebuilds_slices() {
        let mut module = TxModule::new(0x32, DEFAULT_CLK_FREQ, 2);
        module.add_delay_profile(ramp_profile(1, 64), None).unwrap();
        module.add_delay_profile(ramp_profile(2, 64), Some(false)).unwrap();
        module.add_pulse_profile(PulseProfile::new(1, 400e3, 3).unwrap(), None);

        module.recompute_delay_profiles().unwrap();
        module.recompute_pulse_profiles().unwrap();

        for tx in module.transmitters() {
            assert_eq!(tx.active_delay_profile(), Some(1));
            assert_eq!(tx.active_pulse_profile(), Some(1));
            assert!(tx.get_delay_profile(Some(2)).is_ok());
        }
    }

    #[test]
    fn test_get_registers_one_image_per_chip() {
        let mut module = TxModule::new(0x32, DEFAULT_CLK_FREQ, 2);
        let mut apod = vec![1; 64];
        apod[0] = 0; // mute the first element of chip 0 only
        let delays = vec![0.0; 64];
        module
            .add_delay_profile(
                DelayProfile::with_apodization(1, delays, apod, TimeUnit::Seconds).unwrap(),
                None,
            )
            .unwrap();
        module.add_pulse_profile(PulseProfile::new(1, 400e3, 3).unwrap(), None);

        let images = module.get_registers(ProfileScope::Set).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].get(&ADDRESS_APODIZATION), Some(&0x0000_0001));
        assert_eq!(images[1].get(&ADDRESS_APODIZATION), Some(&0x0000_0000));
        // both chips select the same profile slot
        assert_eq!(
            images[0].get(&ADDRESS_DELAY_SEL),
            images[1].get(&ADDRESS_DELAY_SEL)
        );
    }
}
