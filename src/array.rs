//! Transmit array: every module of one physical transducer array.
//!
//! One level up from [`crate::module::TxModule`]: the array stores
//! whole-array profiles and slices them per module (stride = the module's
//! element count), keyed by the modules' I2C addresses.

use crate::error::{self, ErrorKind};
use crate::module::TxModule;
use crate::profile::{DelayProfile, PulseProfile, Slots};
use crate::regmap::RegisterMap;
use crate::tx7332::ProfileScope;

use log::debug;

use std::collections::BTreeMap;

/// All transmit modules of one array, addressed over one I2C bus.
#[derive(Debug, Clone)]
pub struct TxArray {
    bf_clk: f64,
    modules: Vec<TxModule>,
    delay_profiles: Slots<DelayProfile>,
    pulse_profiles: Slots<PulseProfile>,
    active_delay: Option<u8>,
    active_pulse: Option<u8>,
}

impl TxArray {
    /// Build an array of one module per I2C address.
    ///
    /// Addresses must be unique; modules keep the given order.
    pub fn new(
        i2c_addresses: &[u8],
        bf_clk: f64,
        num_transmitters: usize,
    ) -> error::Result<Self> {
        let mut modules: Vec<TxModule> = Vec::with_capacity(i2c_addresses.len());
        for &addr in i2c_addresses {
            if modules.iter().any(|m| m.i2c_addr() == addr) {
                Err(ErrorKind::DuplicateAddress(format!(
                    "I2C address {:#04x} given twice",
                    addr
                )))?
            }
            modules.push(TxModule::new(addr, bf_clk, num_transmitters));
        }
        Ok(Self {
            bf_clk,
            modules,
            delay_profiles: Slots::new(),
            pulse_profiles: Slots::new(),
            active_delay: None,
            active_pulse: None,
        })
    }

    pub fn bf_clk(&self) -> f64 {
        self.bf_clk
    }

    pub fn num_modules(&self) -> usize {
        self.modules.len()
    }

    /// Total physical elements across all modules
    pub fn num_elements(&self) -> usize {
        self.modules.iter().map(|m| m.num_elements()).sum()
    }

    pub fn modules(&self) -> &[TxModule] {
        &self.modules
    }

    /// The module behind one I2C address
    pub fn module(&self, i2c_addr: u8) -> Option<&TxModule> {
        self.modules.iter().find(|m| m.i2c_addr() == i2c_addr)
    }

    pub fn active_delay_profile(&self) -> Option<u8> {
        self.active_delay
    }

    pub fn active_pulse_profile(&self) -> Option<u8> {
        self.active_pulse
    }

    /// Store a whole-array delay profile and push per-module slices down
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
        let mut start = 0;
        for module in self.modules.iter_mut() {
            let count = module.num_elements();
            module.add_delay_profile(profile.slice(start, count), Some(activate))?;
            start += count;
        }
        self.delay_profiles.insert(profile);
        if activate {
            self.active_delay = Some(index);
        }
        Ok(())
    }

    /// Store a whole-array pulse profile on every module
    pub fn add_pulse_profile(&mut self, profile: PulseProfile, activate: Option<bool>) {
        let index = profile.index();
        let activate = activate.unwrap_or(self.active_pulse.is_none());
        for module in self.modules.iter_mut() {
            module.add_pulse_profile(profile.clone(), Some(activate));
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
        for module in self.modules.iter_mut() {
            module.remove_delay_profile(index)?;
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
        for module in self.modules.iter_mut() {
            module.remove_pulse_profile(index)?;
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
        for module in self.modules.iter_mut() {
            module.activate_delay_profile(index)?;
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
        for module in self.modules.iter_mut() {
            module.activate_pulse_profile(index)?;
        }
        self.active_pulse = Some(index);
        Ok(())
    }

    /// Look up a whole-array delay profile; `None` means the active one
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

    /// Look up a whole-array pulse profile; `None` means the active one
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

    /// Rebuild every module's delay slices from the array's profile list
    pub fn recompute_delay_profiles(&mut self) -> error::Result<()> {
        debug!(
            "array: re-deriving {} delay profiles across {} modules",
            self.delay_profiles.len(),
            self.modules.len()
        );
        for i in 0..self.modules.len() {
            for index in self.modules[i].delay_profile_indices() {
                self.modules[i].remove_delay_profile(index)?;
            }
        }
        let mut start = 0;
        for i in 0..self.modules.len() {
            let count = self.modules[i].num_elements();
            for profile in self.delay_profiles.iter() {
                let activate = self.active_delay == Some(profile.index());
                self.modules[i].add_delay_profile(profile.slice(start, count), Some(activate))?;
            }
            start += count;
        }
        Ok(())
    }

    /// Rebuild every module's pulse slots from the array's profile list
    pub fn recompute_pulse_profiles(&mut self) -> error::Result<()> {
        debug!(
            "array: re-deriving {} pulse profiles across {} modules",
            self.pulse_profiles.len(),
            self.modules.len()
        );
        for module in self.modules.iter_mut() {
            for index in module.pulse_profile_indices() {
                module.remove_pulse_profile(index)?;
            }
        }
        for profile in self.pulse_profiles.iter() {
            let activate = self.active_pulse == Some(profile.index());
            for module in self.modules.iter_mut() {
                module.add_pulse_profile(profile.clone(), Some(activate));
            }
        }
        Ok(())
    }

    /// Compile the register images of every module, keyed by I2C address
    pub fn get_registers(
        &self,
        scope: ProfileScope,
    ) -> error::Result<BTreeMap<u8, Vec<RegisterMap>>> {
        let mut images = BTreeMap::new();
        for module in self.modules.iter() {
            images.insert(module.i2c_addr(), module.get_registers(scope)?);
        }
        Ok(images)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tx7332::{ADDRESS_DELAY_SEL, DEFAULT_CLK_FREQ};
    use crate::units::TimeUnit;

    fn ramp_profile(index: u8, elements: usize) -> DelayProfile {
        let delays = (0..elements).map(|i| i as f64).collect();
        DelayProfile::new(index, delays, TimeUnit::Nanoseconds).unwrap()
    }

    fn two_module_array() -> TxArray {
        TxArray::new(&[0x32, 0x34], DEFAULT_CLK_FREQ, 2).unwrap()
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let err = TxArray::new(&[0x32, 0x34, 0x32], DEFAULT_CLK_FREQ, 2).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateAddress(_)));
    }

    #[test]
    fn test_element_count() {
        let array = two_module_array();
        assert_eq!(array.num_modules(), 2);
        assert_eq!(array.num_elements(), 128);
    }

    #[test]
    fn test_add_delay_profile_slices_per_module() {
        let mut array = two_module_array();
        array.add_delay_profile(ramp_profile(1, 128), None).unwrap();

        let first = array.module(0x32).unwrap();
        let second = array.module(0x34).unwrap();
        // module slices are contiguous 64-element windows
        assert_eq!(first.get_delay_profile(None).unwrap().delays()[0], 0.0);
        assert_eq!(second.get_delay_profile(None).unwrap().delays()[0], 64.0);
        // chip-level slices line up with the global element numbering
        let tx = &second.transmitters()[1];
        assert_eq!(tx.get_delay_profile(None).unwrap().delays()[0], 96.0);
        assert_eq!(tx.get_delay_profile(None).unwrap().delays()[31], 127.0);
    }

    #[test]
    fn test_add_delay_profile_length_check() {
        let mut array = two_module_array();
        let err = array.add_delay_profile(ramp_profile(1, 64), None).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::LengthMismatch(_)));
    }

    #[test]
    fn test_lifecycle_forwarding() {
        let mut array = two_module_array();
        array.add_delay_profile(ramp_profile(1, 128), None).unwrap();
        array.add_delay_profile(ramp_profile(2, 128), None).unwrap();
        array.add_pulse_profile(PulseProfile::new(1, 400e3, 3).unwrap(), None);
        assert_eq!(array.active_delay_profile(), Some(1));

        array.activate_delay_profile(2).unwrap();
        for module in array.modules() {
            assert_eq!(module.active_delay_profile(), Some(2));
        }

        array.remove_delay_profile(2).unwrap();
        assert_eq!(array.active_delay_profile(), None);
        for module in array.modules() {
            assert_eq!(module.active_delay_profile(), None);
            assert!(module.get_delay_profile(Some(1)).is_ok());
        }
    }

    #[test]
    fn test_recompute_after_parent_mutation() {
        let mut array = two_module_array();
        array.add_delay_profile(ramp_profile(1, 128), None).unwrap();
        array.add_pulse_profile(PulseProfile::new(1, 400e3, 3).unwrap(), None);
        array.recompute_delay_profiles().unwrap();
        array.recompute_pulse_profiles().unwrap();

        for module in array.modules() {
            assert_eq!(module.active_delay_profile(), Some(1));
            for tx in module.transmitters() {
                assert_eq!(tx.active_delay_profile(), Some(1));
                assert_eq!(tx.active_pulse_profile(), Some(1));
            }
        }
    }

    #[test]
    fn test_get_registers_keyed_by_address() {
        let mut array = two_module_array();
        array.add_delay_profile(ramp_profile(1, 128), None).unwrap();
        array.add_pulse_profile(PulseProfile::new(1, 400e3, 3).unwrap(), None);

        let images = array.get_registers(ProfileScope::Set).unwrap();
        assert_eq!(images.keys().copied().collect::<Vec<_>>(), vec![0x32, 0x34]);
        for per_module in images.values() {
            assert_eq!(per_module.len(), 2);
            for image in per_module {
                assert_eq!(image.get(&ADDRESS_DELAY_SEL), Some(&0));
            }
        }
    }

    #[test]
    fn test_get_registers_requires_profiles() {
        let array = two_module_array();
        let err = array.get_registers(ProfileScope::Set).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotReady(_)));
    }
}
