// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! DMA-driven transfers.
//!
//! Whole blocks go through the two DMA channels. A trailing partial GCM or
//! CCM block, and the header blocks that precede the payload, are finished
//! by the CPU from the DMA completion callbacks.

use kernel::hil::time::Time;
use kernel::ErrorCode;

use super::{
    Aes, Algorithm, Direction, State, BLOCK_BYTES, HEADER_PHASE_LATENCY, PAYLOAD_PHASE_LATENCY,
};
use crate::config::CONFIG;
use crate::dma::{DmaChannel, DmaClient, DmaRequest};
use crate::registers::{AesRegisterBank, Register, AES_ERRORS, CR};

impl<'a, R: AesRegisterBank + 'a, T: Time> Aes<'a, R, T> {
    /// Attach the channels serving the AES input and output requests.
    pub fn set_dma_channels(&'a self, dma_in: &'a dyn DmaChannel<'a>, dma_out: &'a dyn DmaChannel<'a>) {
        dma_in.set_client(self);
        dma_out.set_client(self);
        self.dma_in.set(dma_in);
        self.dma_out.set(dma_out);
    }
}

impl<'a, R: AesRegisterBank, T: Time> Aes<'a, R, T> {
    /// Start a DMA-driven encryption. On error the output buffer is handed
    /// back.
    ///
    /// When the call can be finished without the DMA engine (GCM or CCM data
    /// shorter than a block), it completes before returning: the driver is
    /// `Idle` again and no callback follows.
    pub fn encrypt_dma(
        &self,
        input: &'a [u8],
        output: &'a mut [u8],
    ) -> Result<(), (ErrorCode, &'a mut [u8])> {
        self.start_dma(Direction::Encrypt, input, output)
    }

    /// Start a DMA-driven decryption. Same contract as `encrypt_dma`.
    pub fn decrypt_dma(
        &self,
        input: &'a [u8],
        output: &'a mut [u8],
    ) -> Result<(), (ErrorCode, &'a mut [u8])> {
        self.start_dma(Direction::Decrypt, input, output)
    }

    fn start_dma(
        &self,
        direction: Direction,
        input: &'a [u8],
        output: &'a mut [u8],
    ) -> Result<(), (ErrorCode, &'a mut [u8])> {
        if !CONFIG.dma {
            return Err((ErrorCode::NOSUPPORT, output));
        }
        if self.dma_in.is_none() || self.dma_out.is_none() {
            return Err((ErrorCode::INVAL, output));
        }
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
                self.start_blocks_dma(input, output)
            }
            Algorithm::GcmGmac | Algorithm::Ccm => self.start_phases_dma(output),
        }
    }

    fn start_dma_in(&self, data: &'a [u8], len: usize) -> Result<(), ErrorCode> {
        let dest = self.registers.address(Register::Dinr);
        self.dma_in.map_or(Err(ErrorCode::FAIL), |channel| {
            channel.write_to_peripheral(data, len, dest)
        })
    }

    fn start_dma_out(&self, buf: &'a mut [u8], len: usize) -> Result<(), (ErrorCode, &'a mut [u8])> {
        let src = self.registers.address(Register::Doutr);
        match self.dma_out.get() {
            Some(channel) => channel.read_from_peripheral(src, buf, len),
            None => Err((ErrorCode::FAIL, buf)),
        }
    }

    /// Start both channels on `len` bytes. On failure nothing is left
    /// running and the driver is `Idle`.
    fn start_channels(
        &self,
        input: &'a [u8],
        output: &'a mut [u8],
        len: usize,
    ) -> Result<(), (ErrorCode, &'a mut [u8])> {
        if let Err(e) = self.start_dma_in(input, len) {
            self.dma_start_failed();
            return Err((e, output));
        }
        if let Err((e, buf)) = self.start_dma_out(output, len) {
            self.dma_in.map(|channel| channel.abort());
            self.dma_start_failed();
            return Err((e, buf));
        }
        self.modify_cr(CR::DMAINEN::SET + CR::DMAOUTEN::SET);
        Ok(())
    }

    fn dma_start_failed(&self) {
        self.disable();
        self.record_error(AES_ERRORS::DMA::SET);
        self.state.set(State::Idle);
    }

    fn start_blocks_dma(&self, input: &'a [u8], output: &'a mut [u8]) -> Result<(), (ErrorCode, &'a mut [u8])> {
        self.enable();
        self.start_channels(input, output, self.data_size.get())
    }

    fn start_phases_dma(&self, output: &'a mut [u8]) -> Result<(), (ErrorCode, &'a mut [u8])> {
        let size = self.data_size.get();
        if self.data_size_sum.get() == 0 {
            if let Err(e) = self.init_phase_spin() {
                self.state.set(State::Idle);
                return Err((e, output));
            }
            if self.header_len() == 0 && size == 0 {
                self.modify_cr(CR::GCMPH::Payload);
                self.enable();
                self.output.replace(output);
                self.state.set(State::Idle);
                return Ok(());
            }
            if self.header_len() != 0 {
                return self.header_phase_dma(output);
            }
            self.payload_phase_dma(output)
        } else if size != 0 {
            self.payload_phase_dma(output)
        } else {
            self.output.replace(output);
            self.state.set(State::Idle);
            Ok(())
        }
    }

    fn header_phase_dma(&self, output: &'a mut [u8]) -> Result<(), (ErrorCode, &'a mut [u8])> {
        let header = self.header.unwrap_or(&[]);
        let whole = header.len() / BLOCK_BYTES;
        let remaining = header.len() % BLOCK_BYTES;
        self.modify_cr(CR::GCMPH::Header);
        self.enable();
        if whole > 0 {
            if let Err(e) = self.start_dma_in(header, whole * BLOCK_BYTES) {
                self.dma_start_failed();
                return Err((e, output));
            }
            self.output.replace(output);
            self.modify_cr(CR::DMAINEN::SET);
            return Ok(());
        }
        if let Err(e) = self.padded_block_spin(header, 0, remaining, HEADER_PHASE_LATENCY) {
            self.state.set(State::Idle);
            return Err((e, output));
        }
        if self.data_size.get() != 0 {
            self.block_count.set(0);
            self.payload_phase_dma(output)
        } else {
            self.output.replace(output);
            self.state.set(State::Idle);
            Ok(())
        }
    }

    fn payload_phase_dma(&self, output: &'a mut [u8]) -> Result<(), (ErrorCode, &'a mut [u8])> {
        let input = self.input.unwrap_or(&[]);
        let size = self.data_size.get();
        let whole = size / BLOCK_BYTES;
        let remaining = size % BLOCK_BYTES;
        self.modify_cr(CR::GCMPH::Payload);
        self.enable();
        if whole > 0 {
            return self.start_channels(input, output, whole * BLOCK_BYTES);
        }
        self.set_padding_bytes(remaining);
        if let Err(e) = self.padded_block_spin(input, 0, remaining, PAYLOAD_PHASE_LATENCY) {
            self.state.set(State::Idle);
            return Err((e, output));
        }
        self.read_block(output, 0);
        self.data_size_sum.set(self.data_size_sum.get() + size);
        self.output.replace(output);
        self.state.set(State::Idle);
        Ok(())
    }

    fn abort_with(&self, error: ErrorCode) {
        self.state.set(State::Idle);
        self.report_error(error);
    }

    /// The header blocks are in; finish the header on the CPU and move to
    /// the payload.
    fn header_dma_done(&self) {
        let header = self.header.unwrap_or(&[]);
        let whole = header.len() / BLOCK_BYTES;
        let remaining = header.len() % BLOCK_BYTES;
        if let Err(e) = self.header_spin() {
            self.abort_with(e);
            return;
        }
        if remaining != 0 {
            self.block_count.set(whole);
            if let Err(e) = self.padded_block_spin(header, whole, remaining, HEADER_PHASE_LATENCY) {
                self.abort_with(e);
                return;
            }
        }
        if self.data_size.get() == 0 {
            self.clear_ccf();
            self.finish_call();
            return;
        }
        self.block_count.set(0);
        match self.output.take() {
            Some(output) => match self.payload_phase_dma(output) {
                Ok(()) => {
                    if self.state.get() == State::Idle {
                        self.finish_call();
                    }
                }
                Err((e, buf)) => {
                    self.output.replace(buf);
                    self.report_error(e);
                }
            },
            None => self.abort_with(ErrorCode::FAIL),
        }
    }

    /// The whole payload blocks are out; process the padded tail, if any.
    fn payload_dma_done(&self) {
        let input = self.input.unwrap_or(&[]);
        let size = self.data_size.get();
        let whole = size / BLOCK_BYTES;
        let remaining = size % BLOCK_BYTES;
        if remaining != 0 {
            self.clear_ccf();
            self.set_padding_bytes(remaining);
            self.block_count.set(whole);
            if let Err(e) = self.padded_block_spin(input, whole, remaining, PAYLOAD_PHASE_LATENCY) {
                self.abort_with(e);
                return;
            }
            self.output.map(|output| self.read_block(output, whole));
        }
        self.clear_ccf();
        self.data_size_sum.set(self.data_size_sum.get() + size);
        self.finish_call();
    }
}

impl<'a, R: AesRegisterBank, T: Time> DmaClient for Aes<'a, R, T> {
    fn transfer_done(&self, request: DmaRequest) {
        match request {
            DmaRequest::AesIn => {
                self.modify_cr(CR::DMAINEN::CLEAR);
                match self.algorithm.get() {
                    Algorithm::Ecb | Algorithm::Cbc | Algorithm::Ctr => {
                        self.client.map(|client| client.input_done());
                    }
                    Algorithm::GcmGmac | Algorithm::Ccm => {
                        if self.cr().matches_all(CR::GCMPH::Header) {
                            self.header_dma_done();
                        } else {
                            self.client.map(|client| client.input_done());
                        }
                    }
                }
            }
            DmaRequest::AesOut => {
                if let Some(buf) = self.dma_out.and_then(|channel| channel.return_buffer()) {
                    self.output.replace(buf);
                }
                self.modify_cr(CR::DMAOUTEN::CLEAR);
                match self.algorithm.get() {
                    Algorithm::Ecb | Algorithm::Cbc | Algorithm::Ctr => {
                        self.clear_ccf();
                        self.disable();
                        self.data_size_sum
                            .set(self.data_size_sum.get() + self.data_size.get());
                        self.finish_call();
                    }
                    Algorithm::GcmGmac | Algorithm::Ccm => self.payload_dma_done(),
                }
            }
        }
    }

    fn transfer_error(&self, _request: DmaRequest) {
        self.modify_cr(CR::DMAINEN::CLEAR + CR::DMAOUTEN::CLEAR);
        self.clear_ccf();
        self.dma_in.map(|channel| channel.abort());
        if let Some(buf) = self.dma_out.and_then(|channel| channel.abort()) {
            self.output.replace(buf);
        }
        self.disable();
        self.record_error(AES_ERRORS::DMA::SET);
        self.abort_with(ErrorCode::FAIL);
    }
}
