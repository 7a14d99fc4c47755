// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Interrupt-driven transfers.
//!
//! The start call writes the first block and enables the completion
//! interrupt. Every completion then reads one output block and writes the
//! next input block, until the call's data is exhausted. For GCM and CCM the
//! completion of the init phase kicks off the header phase, whose blocks
//! produce no output, and the header phase hands over to the payload phase.

use kernel::hil::time::Time;
use kernel::ErrorCode;
use tock_registers::LocalRegisterCopy;

use super::{Aes, Algorithm, Direction, State, BLOCK_BYTES};
use crate::registers::{AesRegisterBank, Register, AES_ERRORS, CR, ISR, SR};

impl<'a, R: AesRegisterBank, T: Time> Aes<'a, R, T> {
    /// Start an interrupt-driven encryption. On error the output buffer is
    /// handed back.
    pub fn encrypt_it(
        &self,
        input: &'a [u8],
        output: &'a mut [u8],
    ) -> Result<(), (ErrorCode, &'a mut [u8])> {
        self.start_it(Direction::Encrypt, input, output)
    }

    /// Start an interrupt-driven decryption. On error the output buffer is
    /// handed back.
    pub fn decrypt_it(
        &self,
        input: &'a [u8],
        output: &'a mut [u8],
    ) -> Result<(), (ErrorCode, &'a mut [u8])> {
        self.start_it(Direction::Decrypt, input, output)
    }

    fn start_it(
        &self,
        direction: Direction,
        input: &'a [u8],
        output: &'a mut [u8],
    ) -> Result<(), (ErrorCode, &'a mut [u8])> {
        if let Err(e) = self.check_transfer(input.len(), output.len()) {
            return Err((e, output));
        }
        if let Err(e) = self.start_operation(direction, input.len()) {
            return Err((e, output));
        }
        self.input.set(input);
        self.input_done_pending.set(false);
        match self.algorithm.get() {
            Algorithm::Ecb | Algorithm::Cbc | Algorithm::Ctr => {
                self.output.replace(output);
                self.start_blocks_it();
                Ok(())
            }
            Algorithm::GcmGmac | Algorithm::Ccm => self.start_phases_it(output),
        }
    }

    /// Write the block at `block_count` and let the interrupt take over.
    pub(super) fn start_blocks_it(&self) {
        let blocks = self.data_size.get().div_ceil(BLOCK_BYTES);
        let block = self.block_count.get();
        self.enable();
        self.input.map(|input| self.write_block(input, block));
        if block + 1 == blocks {
            self.input_done_pending.set(true);
        }
        self.enable_interrupts();
    }

    fn start_phases_it(&self, output: &'a mut [u8]) -> Result<(), (ErrorCode, &'a mut [u8])> {
        let size = self.data_size.get();
        if self.data_size_sum.get() == 0 {
            if self.header_len() == 0 && size == 0 {
                // Nothing to stream: run the init phase here and leave the
                // peripheral ready for the final phase.
                if let Err(e) = self.init_phase_spin() {
                    self.state.set(State::Idle);
                    return Err((e, output));
                }
                self.modify_cr(CR::GCMPH::Payload);
                self.enable();
                self.output.replace(output);
                self.state.set(State::Idle);
                return Ok(());
            }
            self.output.replace(output);
            self.modify_cr(CR::GCMPH::Init);
            self.enable();
            self.enable_interrupts();
        } else if size != 0 {
            self.output.replace(output);
            self.modify_cr(CR::GCMPH::Payload);
            self.enable();
            self.start_payload_it();
            self.enable_interrupts();
        } else {
            self.output.replace(output);
            self.state.set(State::Idle);
        }
        Ok(())
    }

    /// Service the AES interrupt. Call this from the chip's interrupt
    /// dispatcher.
    pub fn handle_interrupt(&self) {
        let enabled = self.registers.read(Register::Ier);
        let status: LocalRegisterCopy<u32, SR::Register> = self.sr();
        let pending: LocalRegisterCopy<u32, ISR::Register> =
            LocalRegisterCopy::new(self.registers.read(Register::Isr) & enabled);

        if pending.is_set(ISR::RWEIF) {
            if status.is_set(SR::WRERR) {
                self.record_error(AES_ERRORS::WRITE::SET);
            }
            if status.is_set(SR::RDERR) {
                self.record_error(AES_ERRORS::READ::SET);
            }
            self.clear_rw_error();
        }
        if pending.is_set(ISR::KEIF) {
            self.record_error(AES_ERRORS::KEY::SET);
        }
        if pending.is_set(ISR::RNGEIF) {
            self.record_error(AES_ERRORS::RNG::SET);
        }
        if pending.is_set(ISR::KEIF) || pending.is_set(ISR::RNGEIF) {
            self.clear_key_error();
            self.clear_rng_error();
            self.disable_interrupts();
            self.disable();
            self.state.set(State::Idle);
            self.report_error(ErrorCode::FAIL);
            return;
        }

        if pending.is_set(ISR::CCF) {
            self.clear_ccf();
            if self.input_done_pending.take() {
                self.client.map(|client| client.input_done());
            }
            match self.algorithm.get() {
                Algorithm::Ecb | Algorithm::Cbc | Algorithm::Ctr => self.continue_blocks_it(),
                Algorithm::GcmGmac | Algorithm::Ccm => {
                    let cr = self.cr();
                    if cr.matches_all(CR::GCMPH::Init) {
                        if self.header_len() != 0 {
                            self.modify_cr(CR::GCMPH::Header);
                            self.enable();
                            self.header_step_it();
                        } else {
                            self.modify_cr(CR::GCMPH::Payload);
                            self.enable();
                            self.start_payload_it();
                        }
                    } else if cr.matches_all(CR::GCMPH::Header) {
                        self.header_step_it();
                    } else {
                        self.payload_step_it();
                    }
                }
            }
        }
    }

    fn continue_blocks_it(&self) {
        let blocks = self.data_size.get().div_ceil(BLOCK_BYTES);
        let block = self.block_count.get();
        if block < blocks {
            self.output.map(|output| self.read_block(output, block));
        }
        let next = block + 1;
        self.block_count.set(next);
        if next >= blocks {
            self.data_size_sum
                .set(self.data_size_sum.get() + self.data_size.get());
            self.disable_interrupts();
            self.disable();
            self.finish_call();
        } else if self.suspend_request.get() {
            self.disable();
            self.suspend_it();
        } else {
            self.input.map(|input| self.write_block(input, next));
            if next + 1 == blocks {
                self.input_done_pending.set(true);
            }
        }
    }

    pub(super) fn header_step_it(&self) {
        let header = self.header.unwrap_or(&[]);
        let whole = header.len() / BLOCK_BYTES;
        let total = header.len().div_ceil(BLOCK_BYTES);
        let block = self.block_count.get();
        if block < whole {
            if self.suspend_request.get() && block > 0 {
                self.suspend_it();
            } else {
                self.write_block(header, block);
                self.block_count.set(block + 1);
            }
        } else if block == total {
            if self.data_size.get() != 0 {
                self.block_count.set(0);
                self.clear_ccf();
                self.modify_cr(CR::GCMPH::Payload);
                self.start_payload_it();
            } else {
                self.disable_interrupts();
                self.finish_call();
            }
        } else {
            self.write_padded_block(header, block, header.len() % BLOCK_BYTES);
            self.block_count.set(block + 1);
        }
    }

    /// Write the payload block at `block_count`, padded if it is the last,
    /// partial one.
    pub(super) fn start_payload_it(&self) {
        let size = self.data_size.get();
        let whole = size / BLOCK_BYTES;
        let block = self.block_count.get();
        if block < whole {
            self.input.map(|input| self.write_block(input, block));
            if block + 1 == size.div_ceil(BLOCK_BYTES) {
                self.input_done_pending.set(true);
            }
        } else {
            let remaining = size % BLOCK_BYTES;
            self.set_padding_bytes(remaining);
            self.input
                .map(|input| self.write_padded_block(input, block, remaining));
            self.input_done_pending.set(true);
        }
    }

    fn payload_step_it(&self) {
        let size = self.data_size.get();
        let total = size.div_ceil(BLOCK_BYTES);
        let whole = size / BLOCK_BYTES;
        let block = self.block_count.get();
        if block < total {
            self.output.map(|output| self.read_block(output, block));
        }
        let next = block + 1;
        self.block_count.set(next);
        if self.suspend_request.get() && next < total {
            self.suspend_it();
        } else if next < whole {
            self.input.map(|input| self.write_block(input, next));
            if next + 1 == total {
                self.input_done_pending.set(true);
            }
        } else if next == whole && size % BLOCK_BYTES != 0 {
            let remaining = size % BLOCK_BYTES;
            self.set_padding_bytes(remaining);
            self.input
                .map(|input| self.write_padded_block(input, next, remaining));
            self.input_done_pending.set(true);
        } else {
            self.data_size_sum.set(self.data_size_sum.get() + size);
            self.disable_interrupts();
            self.finish_call();
        }
    }

    fn suspend_it(&self) {
        self.clear_ccf();
        self.suspend_request.set(false);
        self.disable_interrupts();
        self.state.set(State::Suspended);
        self.client.map(|client| client.suspended());
    }

    /// Back to `Idle` and tell the client. A suspension request that came
    /// too late for this call is dropped.
    pub(super) fn finish_call(&self) {
        self.suspend_request.set(false);
        self.state.set(State::Idle);
        if self.input_done_pending.take() {
            self.client.map(|client| client.input_done());
        }
        self.client.map(|client| client.output_done());
    }
}
