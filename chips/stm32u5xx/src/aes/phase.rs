// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! GCM and CCM phase sequencing.
//!
//! An authenticated message runs through the init phase (hash subkey or
//! first MAC block), the header phase (associated data, no output), the
//! payload phase, and the final phase which yields the tag. Init and header
//! only happen on the first call of a message.

use kernel::hil::time::Time;
use kernel::ErrorCode;

use super::{Aes, Algorithm, State, BLOCK_BYTES, HEADER_PHASE_LATENCY, INIT_PHASE_LATENCY};
use crate::config::CONFIG;
use crate::registers::{AesRegisterBank, Register, CR};

impl<'a, R: AesRegisterBank, T: Time> Aes<'a, R, T> {
    pub(super) fn process_phases(
        &self,
        input: &[u8],
        output: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), ErrorCode> {
        let size = self.data_size.get();
        if self.data_size_sum.get() == 0 {
            self.init_phase(timeout_ms)?;
            if self.header_len() == 0 {
                if size == 0 {
                    self.modify_cr(CR::GCMPH::Payload);
                    self.enable();
                    return Ok(());
                }
            } else {
                self.header_phase(timeout_ms)?;
            }
        }
        if size != 0 {
            self.payload_phase(input, output, timeout_ms)?;
        }
        Ok(())
    }

    fn init_phase(&self, timeout_ms: u32) -> Result<(), ErrorCode> {
        self.modify_cr(CR::GCMPH::Init);
        self.enable();
        self.wait_for_ccf(timeout_ms)?;
        self.clear_ccf();
        Ok(())
    }

    /// Init phase for the interrupt and DMA paths, bounded by iterations.
    pub(super) fn init_phase_spin(&self) -> Result<(), ErrorCode> {
        self.modify_cr(CR::GCMPH::Init);
        self.enable();
        self.spin_for_ccf(INIT_PHASE_LATENCY)?;
        self.clear_ccf();
        Ok(())
    }

    fn header_phase(&self, timeout_ms: u32) -> Result<(), ErrorCode> {
        let header = self.header.unwrap_or(&[]);
        let whole = header.len() / BLOCK_BYTES;
        let remaining = header.len() % BLOCK_BYTES;
        self.modify_cr(CR::GCMPH::Header);
        self.enable();
        for block in 0..whole {
            self.block_count.set(block);
            self.write_block(header, block);
            self.wait_for_ccf(timeout_ms)?;
            self.clear_ccf();
        }
        self.block_count.set(whole);
        if remaining != 0 {
            self.write_padded_block(header, whole, remaining);
            self.wait_for_ccf(timeout_ms)?;
            self.clear_ccf();
        }
        Ok(())
    }

    fn payload_phase(&self, input: &[u8], output: &mut [u8], timeout_ms: u32) -> Result<(), ErrorCode> {
        let size = self.data_size.get();
        let whole = size / BLOCK_BYTES;
        let remaining = size % BLOCK_BYTES;
        self.modify_cr(CR::GCMPH::Payload);
        self.enable();
        for block in 0..whole {
            self.block_count.set(block);
            self.process_one_block(input, output, block, timeout_ms)?;
        }
        self.block_count.set(whole);
        if remaining != 0 {
            self.set_padding_bytes(remaining);
            self.write_padded_block(input, whole, remaining);
            self.wait_for_ccf(timeout_ms)?;
            self.clear_ccf();
            self.read_block(output, whole);
        }
        self.data_size_sum.set(self.data_size_sum.get() + size);
        Ok(())
    }

    /// Write a padded final block and wait for it, bounded by `latency`
    /// iterations. A payload block's output is left in DOUTR.
    pub(super) fn padded_block_spin(
        &self,
        data: &[u8],
        block: usize,
        remaining: usize,
        latency: u32,
    ) -> Result<(), ErrorCode> {
        self.write_padded_block(data, block, remaining);
        self.spin_for_ccf(latency)?;
        self.clear_ccf();
        Ok(())
    }

    /// Header latency bounded wait used after a DMA header transfer.
    pub(super) fn header_spin(&self) -> Result<(), ErrorCode> {
        self.spin_for_ccf(HEADER_PHASE_LATENCY)?;
        self.clear_ccf();
        Ok(())
    }

    /// Close a GCM or GMAC message and read its 128-bit tag.
    ///
    /// The tag words come out of DOUTR with the configured data swapping.
    pub fn gcm_generate_auth_tag(&self, tag: &mut [u32; 4], timeout_ms: u32) -> Result<(), ErrorCode> {
        if !CONFIG.gcm_gmac {
            return Err(ErrorCode::NOSUPPORT);
        }
        if timeout_ms == 0 || self.algorithm.get() != Algorithm::GcmGmac {
            return Err(ErrorCode::INVAL);
        }
        let header_bits = (self.header_len() as u32).wrapping_mul(8);
        let payload_bits = (self.data_size_sum.get() as u32).wrapping_mul(8);
        self.final_phase(tag, Some([0, header_bits, 0, payload_bits]), timeout_ms)
    }

    /// Close a CCM message and read its 128-bit tag.
    pub fn ccm_generate_auth_tag(&self, tag: &mut [u32; 4], timeout_ms: u32) -> Result<(), ErrorCode> {
        if !CONFIG.ccm {
            return Err(ErrorCode::NOSUPPORT);
        }
        if timeout_ms == 0 || self.algorithm.get() != Algorithm::Ccm {
            return Err(ErrorCode::INVAL);
        }
        self.final_phase(tag, None, timeout_ms)
    }

    fn final_phase(
        &self,
        tag: &mut [u32; 4],
        lengths: Option<[u32; 4]>,
        timeout_ms: u32,
    ) -> Result<(), ErrorCode> {
        self.check_update_state(&[State::Idle], State::Active)?;
        self.clear_rw_error();
        self.reset_errors();
        let cr = self.cr();
        if !(cr.matches_all(CR::GCMPH::Header) || cr.matches_all(CR::GCMPH::Payload)) {
            self.disable();
            self.state.set(State::Idle);
            return Err(ErrorCode::FAIL);
        }
        self.modify_cr(CR::GCMPH::Final);
        if let Some(lengths) = lengths {
            for word in lengths {
                self.registers.write(Register::Dinr, word);
            }
        }
        if let Err(e) = self.wait_for_ccf(timeout_ms) {
            self.state.set(State::Idle);
            return Err(e);
        }
        for word in tag.iter_mut() {
            *word = self.registers.read(Register::Doutr);
        }
        self.clear_ccf();
        self.disable();
        self.state.set(State::Idle);
        Ok(())
    }
}
