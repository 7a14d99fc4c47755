// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Key loading and key protection.

use kernel::hil::time::Time;
use kernel::ErrorCode;

use super::{Aes, Instance, KeyMode, KeySelect, KeySize};
use crate::registers::{AesRegisterBank, Register, CR, ISR};

impl<'a, R: AesRegisterBank, T: Time> Aes<'a, R, T> {
    /// Load a software key, `key[0]` being the most significant word.
    ///
    /// The driver keeps a reference to `key` so that a saved context can
    /// reload it.
    pub fn set_normal_key(&self, size: KeySize, key: &'a [u32]) -> Result<(), ErrorCode> {
        if key.len() < size.words() {
            return Err(ErrorCode::INVAL);
        }
        self.check_idle()?;
        self.clear_key_error();
        match self.instance {
            Instance::Aes => self.modify_cr(size.field()),
            Instance::Saes => self.modify_cr(size.field() + CR::KEYSEL::Software),
        }
        self.write_key(size, key);
        self.wait_busy()?;
        self.key.set(key);
        Ok(())
    }

    /// KEYR0 receives the least significant word and is written last.
    pub(super) fn write_key(&self, size: KeySize, key: &[u32]) {
        let words = size.words();
        for (i, word) in key.iter().take(words).enumerate() {
            self.registers.write(Register::Keyr(words - 1 - i), *word);
        }
    }

    /// Select a hardware key of SAES. The key never appears on the bus.
    pub fn set_hw_key(&self, size: KeySize, select: KeySelect, mode: KeyMode) -> Result<(), ErrorCode> {
        if self.instance != Instance::Saes {
            return Err(ErrorCode::INVAL);
        }
        self.check_idle()?;
        self.clear_key_error();
        self.modify_cr(select.field() + size.field() + mode.field());
        self.wait_busy()
    }

    /// Take over the key SAES shared with this AES instance.
    ///
    /// Fails if no key is waiting on the shared bus.
    pub fn set_shared_key(&self, size: KeySize) -> Result<(), ErrorCode> {
        if self.instance != Instance::Aes {
            return Err(ErrorCode::INVAL);
        }
        self.check_idle()?;
        self.clear_key_error();
        self.modify_cr(CR::KMOD::Shared + size.field());
        if self.isr().is_set(ISR::KEIF) {
            return Err(ErrorCode::FAIL);
        }
        self.wait_busy()
    }

    /// Lock the key so that another secure application cannot use it.
    pub fn enable_key_protection(&self) -> Result<(), ErrorCode> {
        self.set_key_protection(true)
    }

    /// Release the key for other secure applications.
    pub fn disable_key_protection(&self) -> Result<(), ErrorCode> {
        self.set_key_protection(false)
    }

    fn set_key_protection(&self, enabled: bool) -> Result<(), ErrorCode> {
        if self.instance != Instance::Saes {
            return Err(ErrorCode::INVAL);
        }
        self.check_idle()?;
        self.disable();
        if enabled {
            self.modify_cr(CR::KEYPROT::SET);
        } else {
            self.modify_cr(CR::KEYPROT::CLEAR);
        }
        Ok(())
    }

    /// Whether KEYPROT is set.
    pub fn is_key_protection_enabled(&self) -> bool {
        self.cr().is_set(CR::KEYPROT)
    }
}
