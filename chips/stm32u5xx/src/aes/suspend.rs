// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Suspension of interrupt-driven messages.
//!
//! A long message can be parked at a block boundary, its peripheral context
//! saved, a more urgent message processed, and the parked message restored
//! and resumed later. Only interrupt-driven transfers honor suspension
//! requests.

use kernel::hil::time::Time;
use kernel::ErrorCode;
use tock_registers::LocalRegisterCopy;

use super::{Aes, AesClient, Algorithm, Instance, KeySize, State};
use crate::config::CONFIG;
use crate::registers::{AesRegisterBank, Register, CR};

/// Everything needed to continue a suspended message on the same instance.
///
/// The context owns the message's output buffer while it is parked.
pub struct SuspendContext<'a> {
    instance: Instance,
    algorithm: Algorithm,
    cr: u32,
    iv: [u32; 4],
    /// SUSP7R first
    susp: [u32; 8],
    data_size: usize,
    data_size_sum: usize,
    block_count: usize,
    input: Option<&'a [u8]>,
    output: Option<&'a mut [u8]>,
    header: Option<&'a [u8]>,
    key: Option<&'a [u32]>,
    suspend_request: bool,
    client: Option<&'a dyn AesClient>,
}

impl<'a> SuspendContext<'a> {
    /// Instance the context was saved from.
    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Chaining mode of the parked message.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Next block of the parked message.
    pub fn block_count(&self) -> usize {
        self.block_count
    }
}

impl<'a, R: AesRegisterBank, T: Time> Aes<'a, R, T> {
    /// Ask the running interrupt-driven operation to stop at the next block
    /// boundary. `AesClient::suspended` reports when it did.
    pub fn request_suspend(&self) -> Result<(), ErrorCode> {
        if !CONFIG.suspend_resume {
            return Err(ErrorCode::NOSUPPORT);
        }
        if self.state.get() != State::Active {
            return Err(ErrorCode::BUSY);
        }
        self.suspend_request.set(true);
        Ok(())
    }

    /// Continue a suspended or restored operation.
    pub fn resume(&self) -> Result<(), ErrorCode> {
        if !CONFIG.suspend_resume {
            return Err(ErrorCode::NOSUPPORT);
        }
        self.check_update_state(&[State::Suspended], State::Active)?;
        match self.algorithm.get() {
            Algorithm::GcmGmac | Algorithm::Ccm => {
                self.enable();
                if self.cr().matches_all(CR::GCMPH::Header) {
                    self.header_step_it();
                } else {
                    self.start_payload_it();
                }
                self.enable_interrupts();
            }
            Algorithm::Ecb | Algorithm::Cbc | Algorithm::Ctr => self.start_blocks_it(),
        }
        Ok(())
    }

    /// Capture the context of a suspended operation and free the peripheral.
    /// The driver is `Idle` afterwards.
    pub fn save_context(&self) -> Result<SuspendContext<'a>, ErrorCode> {
        if !CONFIG.suspend_resume {
            return Err(ErrorCode::NOSUPPORT);
        }
        if self.state.get() != State::Suspended {
            return Err(ErrorCode::BUSY);
        }
        let algorithm = self.algorithm.get();
        let mut susp = [0; 8];
        if matches!(algorithm, Algorithm::GcmGmac | Algorithm::Ccm) {
            for (i, word) in susp.iter_mut().enumerate() {
                *word = self.registers.read(Register::Suspr(7 - i));
            }
        }
        let iv = if algorithm != Algorithm::Ecb {
            self.iv()
        } else {
            [0; 4]
        };
        self.disable();
        let context = SuspendContext {
            instance: self.instance,
            algorithm,
            cr: self.registers.read(Register::Cr),
            iv,
            susp,
            data_size: self.data_size.get(),
            data_size_sum: self.data_size_sum.get(),
            block_count: self.block_count.get(),
            input: self.input.get(),
            output: self.output.take(),
            header: self.header.get(),
            key: self.key.get(),
            suspend_request: self.suspend_request.get(),
            client: self.client.get(),
        };
        self.state.set(State::Idle);
        Ok(context)
    }

    /// Reload a saved context. The driver is `Suspended` afterwards and
    /// `resume` continues the message.
    ///
    /// On error the context comes back. If the decryption key could not be
    /// derived again, the driver has already taken the context's output
    /// buffer, which `take_output` returns.
    pub fn restore_context(
        &self,
        context: SuspendContext<'a>,
    ) -> Result<(), (ErrorCode, SuspendContext<'a>)> {
        if !CONFIG.suspend_resume {
            return Err((ErrorCode::NOSUPPORT, context));
        }
        if context.instance != self.instance {
            return Err((ErrorCode::INVAL, context));
        }
        if self.state.get() != State::Idle {
            return Err((ErrorCode::BUSY, context));
        }
        let mut context = context;
        self.disable();
        self.registers.write(Register::Cr, context.cr);
        self.algorithm.set(context.algorithm);
        self.data_size.set(context.data_size);
        self.data_size_sum.set(context.data_size_sum);
        self.block_count.set(context.block_count);
        self.input.insert(context.input);
        self.output.put(context.output.take());
        self.header.insert(context.header);
        self.key.insert(context.key);
        self.suspend_request.set(context.suspend_request);
        self.client.insert(context.client);

        let cr: LocalRegisterCopy<u32, CR::Register> = LocalRegisterCopy::new(context.cr);
        if context.algorithm != Algorithm::Ecb {
            self.set_iv(&context.iv);
        }
        if cr.read(CR::KEYSEL) == 0 {
            let size = if cr.is_set(CR::KEYSIZE) {
                KeySize::Bits256
            } else {
                KeySize::Bits128
            };
            if let Some(key) = context.key {
                self.write_key(size, key);
            }
        }
        if cr.matches_all(CR::MODE::Decrypt)
            && matches!(context.algorithm, Algorithm::Ecb | Algorithm::Cbc)
        {
            if let Err(e) = self.derive_decryption_key() {
                return Err((e, context));
            }
            self.modify_cr(CR::MODE::Decrypt + CR::KMOD::Normal);
        }
        if matches!(context.algorithm, Algorithm::GcmGmac | Algorithm::Ccm) {
            for (i, word) in context.susp.iter().enumerate() {
                self.registers.write(Register::Suspr(7 - i), *word);
            }
        }
        self.state.set(State::Suspended);
        Ok(())
    }
}
