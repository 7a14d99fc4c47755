// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! AES and SAES accelerator driver.
//!
//! A driver instance owns one register block and walks it through the
//! lifecycle `Reset -> Init -> Idle -> Active -> Idle`. Each message is
//! configured once (`config_*`), keyed (`set_*_key`), and then processed in
//! one or several calls to `encrypt*`/`decrypt*`. The three families of entry
//! points differ only in how blocks are moved:
//!
//! - `encrypt`/`decrypt` poll the completion flag and return when done,
//! - `encrypt_it`/`decrypt_it` feed one block per completion interrupt,
//!   `handle_interrupt` must be called from the AES vector,
//! - `encrypt_dma`/`decrypt_dma` hand whole blocks to two DMA channels.
//!
//! Interrupt and DMA completions are reported through [`AesClient`].
//!
//! Usage
//! -----
//!
//! ```rust,ignore
//! let aes = static_init!(
//!     Aes<'static, StaticRef<AesRegisters>, VirtualMuxAlarm<'static, Lptim1<'static>>>,
//!     Aes::new(AES_BASE, Instance::Aes, clocks, aes_alarm)
//! );
//! aes.init()?;
//! aes.config_gcm(&GcmConfig { iv, header: &AAD })?;
//! aes.set_data_swapping(DataSwapping::Byte)?;
//! aes.set_normal_key(KeySize::Bits128, &KEY)?;
//! aes.encrypt(plaintext, ciphertext, 10)?;
//! aes.gcm_generate_auth_tag(&mut tag, 10)?;
//! ```

use core::any::Any;
use core::cell::Cell;

use kernel::hil::time::{ConvertTicks, Ticks, Time};
use kernel::platform::chip::ClockInterface;
use kernel::utilities::cells::{OptionalCell, TakeCell};
use kernel::ErrorCode;
use tock_registers::fields::FieldValue;
use tock_registers::LocalRegisterCopy;

use crate::config::CONFIG;
use crate::dma::DmaChannel;
use crate::registers::{AesRegisterBank, LastErrors, Register, AES_ERRORS, CR, IER, ISR, SR};

mod block;
mod dma;
mod interrupt;
mod key;
mod phase;
mod suspend;
mod wrap;

#[cfg(test)]
mod mock;

pub use self::suspend::SuspendContext;

/// Bound on key loading, RNG fetch and the default blocking waits.
const GENERAL_TIMEOUT_MS: u32 = 82;

// Iteration counts for the bounded completion spins used where no time
// source may be consulted (DMA and interrupt context).
const INIT_PHASE_LATENCY: u32 = 88;
const HEADER_PHASE_LATENCY: u32 = 240;
const PAYLOAD_PHASE_LATENCY: u32 = 486;
const AES_KEY_DERIVATION_LATENCY: u32 = 82;
const SAES_KEY_DERIVATION_LATENCY: u32 = 324;

const BLOCK_BYTES: usize = 16;

/// Lifecycle of a driver instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Reset,
    Init,
    Idle,
    Active,
    Suspended,
}

/// Which hardware block the driver drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instance {
    Aes,
    /// The secure AES: ECB and CBC only, plus hardware keys.
    Saes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Ecb,
    Cbc,
    Ctr,
    GcmGmac,
    Ccm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySize {
    Bits128,
    Bits256,
}

impl KeySize {
    /// Key length in 32-bit words.
    pub fn words(self) -> usize {
        match self {
            KeySize::Bits128 => 4,
            KeySize::Bits256 => 8,
        }
    }

    /// Key length in bytes.
    pub fn bytes(self) -> usize {
        self.words() * 4
    }

    fn field(self) -> FieldValue<u32, CR::Register> {
        match self {
            KeySize::Bits128 => CR::KEYSIZE::Bits128,
            KeySize::Bits256 => CR::KEYSIZE::Bits256,
        }
    }
}

/// Hardware key sources of SAES.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySelect {
    /// Derived hardware unique key
    Dhuk,
    /// Boot hardware key, written by the secure boot code
    Bhk,
    DhukXorBhk,
}

impl KeySelect {
    fn field(self) -> FieldValue<u32, CR::Register> {
        match self {
            KeySelect::Dhuk => CR::KEYSEL::Dhuk,
            KeySelect::Bhk => CR::KEYSEL::Bhk,
            KeySelect::DhukXorBhk => CR::KEYSEL::DhukXorBhk,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyMode {
    Normal,
    /// The key encrypts or decrypts another key
    Wrapped,
    /// The key is shared with the AES instance
    Shared,
}

impl KeyMode {
    fn field(self) -> FieldValue<u32, CR::Register> {
        match self {
            KeyMode::Normal => CR::KMOD::Normal,
            KeyMode::Wrapped => CR::KMOD::Wrapped,
            KeyMode::Shared => CR::KMOD::Shared,
        }
    }
}

/// Swap applied by the hardware to every DINR and DOUTR word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSwapping {
    NoSwap,
    HalfWord,
    Byte,
    Bit,
}

impl DataSwapping {
    fn field(self) -> FieldValue<u32, CR::Register> {
        match self {
            DataSwapping::NoSwap => CR::DATATYPE::NoSwap,
            DataSwapping::HalfWord => CR::DATATYPE::HalfWord,
            DataSwapping::Byte => CR::DATATYPE::Byte,
            DataSwapping::Bit => CR::DATATYPE::Bit,
        }
    }

    fn from_bits(bits: u32) -> DataSwapping {
        match bits {
            0 => DataSwapping::NoSwap,
            1 => DataSwapping::HalfWord,
            2 => DataSwapping::Byte,
            _ => DataSwapping::Bit,
        }
    }
}

/// GCM and GMAC message parameters.
pub struct GcmConfig<'a> {
    /// The 96-bit IV followed by the initial counter value, most significant
    /// word first. The counter word is normally 2.
    pub iv: [u32; 4],
    /// Additional authenticated data. GMAC is GCM with an empty payload.
    pub header: &'a [u8],
}

/// CCM message parameters.
pub struct CcmConfig<'a> {
    /// The formatted first block B0, most significant word first.
    pub b0: [u32; 4],
    /// Formatted associated data, starting with its encoded length.
    pub header: &'a [u8],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Completion notifications for interrupt and DMA driven operations.
///
/// All methods have empty default bodies; implement the ones you need.
pub trait AesClient {
    /// The last input word of the current call has been handed to the
    /// peripheral; the input buffer may be reused.
    fn input_done(&self) {}

    /// The current call has finished and its output is available from
    /// `take_output`.
    fn output_done(&self) {}

    /// The operation was aborted. `last_errors` tells why.
    fn error(&self, _error: ErrorCode) {}

    /// A suspension request has been honored at a block boundary.
    fn suspended(&self) {}
}

/// Clock gates the driver toggles in `init`.
pub struct AesClocks<'a> {
    pub peripheral: &'a dyn ClockInterface,
    /// SAES fetches masks from the RNG, which needs its own clock.
    pub rng: Option<&'a dyn ClockInterface>,
}

pub struct Aes<'a, R: AesRegisterBank, T: Time> {
    registers: R,
    instance: Instance,
    clocks: AesClocks<'a>,
    /// Bounds the blocking waits
    time: &'a T,

    state: Cell<State>,
    algorithm: Cell<Algorithm>,
    /// Byte count of the current call
    data_size: Cell<usize>,
    /// Payload bytes processed by earlier calls of the same message
    data_size_sum: Cell<usize>,
    /// Next block to process within the current phase
    block_count: Cell<usize>,

    input: OptionalCell<&'a [u8]>,
    output: TakeCell<'a, [u8]>,
    header: OptionalCell<&'a [u8]>,
    key: OptionalCell<&'a [u32]>,

    suspend_request: Cell<bool>,
    /// The last input block is in the peripheral; report it at the next
    /// completion
    input_done_pending: Cell<bool>,
    last_errors: Cell<LastErrors>,

    client: OptionalCell<&'a dyn AesClient>,
    dma_in: OptionalCell<&'a dyn DmaChannel<'a>>,
    dma_out: OptionalCell<&'a dyn DmaChannel<'a>>,
    user_data: OptionalCell<&'a dyn Any>,
}

impl<'a, R: AesRegisterBank, T: Time> Aes<'a, R, T> {
    /// Create a driver for `instance` in the `Reset` state. Nothing is
    /// written to the peripheral until `init`.
    pub const fn new(
        registers: R,
        instance: Instance,
        clocks: AesClocks<'a>,
        time: &'a T,
    ) -> Aes<'a, R, T> {
        Aes {
            registers,
            instance,
            clocks,
            time,
            state: Cell::new(State::Reset),
            algorithm: Cell::new(Algorithm::Ecb),
            data_size: Cell::new(0),
            data_size_sum: Cell::new(0),
            block_count: Cell::new(0),
            input: OptionalCell::empty(),
            output: TakeCell::empty(),
            header: OptionalCell::empty(),
            key: OptionalCell::empty(),
            suspend_request: Cell::new(false),
            input_done_pending: Cell::new(false),
            last_errors: Cell::new(LocalRegisterCopy::new(0)),
            client: OptionalCell::empty(),
            dma_in: OptionalCell::empty(),
            dma_out: OptionalCell::empty(),
            user_data: OptionalCell::empty(),
        }
    }

    /// Register the receiver of interrupt and DMA completions.
    pub fn set_client(&self, client: &'a dyn AesClient) {
        self.client.set(client);
    }

    /// Attach an opaque value for the client's own bookkeeping.
    pub fn set_user_data(&self, data: &'a dyn Any) {
        self.user_data.set(data);
    }

    /// The value attached with `set_user_data`, if any.
    pub fn user_data(&self) -> Option<&'a dyn Any> {
        self.user_data.get()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state.get()
    }

    /// Which block this driver owns.
    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Chaining mode of the last configuration.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm.get()
    }

    /// Errors recorded since the last operation started. Always empty when
    /// error tracking is compiled out.
    pub fn last_errors(&self) -> LastErrors {
        self.last_errors.get()
    }

    /// Hand back the output buffer of the last interrupt or DMA operation.
    pub fn take_output(&self) -> Result<&'a mut [u8], ErrorCode> {
        if self.state.get() == State::Active {
            return Err(ErrorCode::BUSY);
        }
        self.output.take().ok_or(ErrorCode::FAIL)
    }

    /// Power up the instance and forget any earlier message.
    pub fn init(&self) -> Result<(), ErrorCode> {
        if self.state.get() == State::Active {
            return Err(ErrorCode::BUSY);
        }
        if CONFIG.clock_enable {
            self.clocks.peripheral.enable();
            if self.instance == Instance::Saes {
                if let Some(rng) = self.clocks.rng {
                    rng.enable();
                }
            }
        }
        self.input.clear();
        self.output.take();
        self.header.clear();
        self.key.clear();
        self.data_size.set(0);
        self.data_size_sum.set(0);
        self.block_count.set(0);
        self.suspend_request.set(false);
        self.reset_errors();
        self.state.set(State::Init);
        Ok(())
    }

    /// Stop any transfer and return the peripheral to its reset state. The
    /// output buffer of an aborted DMA transfer stays available from
    /// `take_output`.
    pub fn deinit(&self) {
        let cr = self.cr();
        if CONFIG.dma && (cr.is_set(CR::DMAINEN) || cr.is_set(CR::DMAOUTEN)) {
            self.modify_cr(CR::DMAINEN::CLEAR + CR::DMAOUTEN::CLEAR);
            self.dma_in.map(|channel| channel.abort());
            if let Some(buf) = self.dma_out.and_then(|channel| channel.abort()) {
                self.output.replace(buf);
            }
        }
        self.disable_interrupts();
        self.disable();
        self.modify_cr(CR::IPRST::SET);
        self.modify_cr(CR::IPRST::CLEAR);
        self.state.set(State::Reset);
    }

    // Configuration

    /// Configure an ECB message. Resets the data swapping.
    pub fn config_ecb(&self) -> Result<(), ErrorCode> {
        if !CONFIG.ecb_cbc {
            return Err(ErrorCode::NOSUPPORT);
        }
        self.configure(
            Algorithm::Ecb,
            CR::CHMOD::Ecb + CR::CHMOD2::CLEAR + CR::KEYSEL::Software + CR::DATATYPE::NoSwap,
            None,
            &[],
        )
    }

    /// Configure a CBC message, `iv[0]` being the most significant word.
    pub fn config_cbc(&self, iv: &[u32; 4]) -> Result<(), ErrorCode> {
        if !CONFIG.ecb_cbc {
            return Err(ErrorCode::NOSUPPORT);
        }
        self.configure(
            Algorithm::Cbc,
            CR::CHMOD::Cbc + CR::CHMOD2::CLEAR + CR::KEYSEL::Software + CR::DATATYPE::NoSwap,
            Some(iv),
            &[],
        )
    }

    /// Configure a CTR message with its initial counter block. AES only.
    pub fn config_ctr(&self, iv: &[u32; 4]) -> Result<(), ErrorCode> {
        if !CONFIG.ctr {
            return Err(ErrorCode::NOSUPPORT);
        }
        self.configure(
            Algorithm::Ctr,
            CR::CHMOD::Ctr + CR::CHMOD2::CLEAR + CR::DATATYPE::NoSwap,
            Some(iv),
            &[],
        )
    }

    /// Configure a GCM message. A GMAC is a GCM message whose payload is
    /// empty.
    pub fn config_gcm(&self, config: &GcmConfig<'a>) -> Result<(), ErrorCode> {
        if !CONFIG.gcm_gmac {
            return Err(ErrorCode::NOSUPPORT);
        }
        self.configure(
            Algorithm::GcmGmac,
            CR::CHMOD::Gcm
                + CR::CHMOD2::CLEAR
                + CR::DATATYPE::NoSwap
                + CR::GCMPH::Init
                + CR::NPBLB.val(0),
            Some(&config.iv),
            config.header,
        )
    }

    /// Configure a CCM message. AES only.
    pub fn config_ccm(&self, config: &CcmConfig<'a>) -> Result<(), ErrorCode> {
        if !CONFIG.ccm {
            return Err(ErrorCode::NOSUPPORT);
        }
        self.configure(
            Algorithm::Ccm,
            CR::CHMOD::Ecb
                + CR::CHMOD2::SET
                + CR::DATATYPE::NoSwap
                + CR::GCMPH::Init
                + CR::NPBLB.val(0),
            Some(&config.b0),
            config.header,
        )
    }

    fn configure(
        &self,
        algorithm: Algorithm,
        fields: FieldValue<u32, CR::Register>,
        iv: Option<&[u32; 4]>,
        header: &'a [u8],
    ) -> Result<(), ErrorCode> {
        match self.state.get() {
            State::Init | State::Idle => {}
            _ => return Err(ErrorCode::BUSY),
        }
        match (self.instance, algorithm) {
            (Instance::Saes, Algorithm::Ecb) | (Instance::Saes, Algorithm::Cbc) => {
                self.rng_fetch_status()?;
            }
            (Instance::Saes, _) => return Err(ErrorCode::INVAL),
            (Instance::Aes, _) => {}
        }
        self.disable();
        self.modify_cr(fields);
        if let Some(iv) = iv {
            self.set_iv(iv);
        }
        self.header.set(header);
        self.data_size_sum.set(0);
        self.algorithm.set(algorithm);
        self.state.set(State::Idle);
        Ok(())
    }

    /// SAES fetches random masks from the RNG before it accepts a mode.
    fn rng_fetch_status(&self) -> Result<(), ErrorCode> {
        let start = self.time.now();
        while self.sr().is_set(SR::BUSY) {
            if self.elapsed_ms(start) > GENERAL_TIMEOUT_MS {
                self.record_error(AES_ERRORS::TIMEOUT::SET);
                self.disable();
                return Err(ErrorCode::FAIL);
            }
        }
        if self.isr().is_set(ISR::RNGEIF) {
            self.record_error(AES_ERRORS::RNG::SET);
            self.clear_rng_error();
            return Err(ErrorCode::FAIL);
        }
        Ok(())
    }

    /// Select how the peripheral swaps data words. Configuring an algorithm
    /// resets the swapping, so call this afterwards.
    pub fn set_data_swapping(&self, swapping: DataSwapping) -> Result<(), ErrorCode> {
        self.check_idle()?;
        self.modify_cr(swapping.field());
        Ok(())
    }

    /// Swapping currently programmed in CR.
    pub fn data_swapping(&self) -> DataSwapping {
        DataSwapping::from_bits(self.cr().read(CR::DATATYPE))
    }

    /// Chaining value left by the last CBC call, most significant word
    /// first. Feed it to `config_cbc` to continue the chain on another
    /// message.
    pub fn cbc_last_output_iv(&self) -> Result<[u32; 4], ErrorCode> {
        if !CONFIG.ecb_cbc {
            return Err(ErrorCode::NOSUPPORT);
        }
        self.last_output_iv(Algorithm::Cbc)
    }

    /// Counter block following the last CTR call.
    pub fn ctr_last_output_iv(&self) -> Result<[u32; 4], ErrorCode> {
        if !CONFIG.ctr {
            return Err(ErrorCode::NOSUPPORT);
        }
        self.last_output_iv(Algorithm::Ctr)
    }

    fn last_output_iv(&self, algorithm: Algorithm) -> Result<[u32; 4], ErrorCode> {
        if self.algorithm.get() != algorithm || self.data_size_sum.get() == 0 {
            return Err(ErrorCode::FAIL);
        }
        Ok(self.iv())
    }

    // Polling transfers

    /// Encrypt `input` into `output`, waiting at most `timeout_ms` for each
    /// block.
    pub fn encrypt(&self, input: &[u8], output: &mut [u8], timeout_ms: u32) -> Result<(), ErrorCode> {
        self.process_polling(Direction::Encrypt, input, output, timeout_ms)
    }

    /// Decrypt `input` into `output`, waiting at most `timeout_ms` for each
    /// block.
    pub fn decrypt(&self, input: &[u8], output: &mut [u8], timeout_ms: u32) -> Result<(), ErrorCode> {
        self.process_polling(Direction::Decrypt, input, output, timeout_ms)
    }

    fn process_polling(
        &self,
        direction: Direction,
        input: &[u8],
        output: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), ErrorCode> {
        if timeout_ms == 0 {
            return Err(ErrorCode::INVAL);
        }
        self.check_transfer(input.len(), output.len())?;
        self.start_operation(direction, input.len())?;
        let result = match self.algorithm.get() {
            Algorithm::Ecb | Algorithm::Cbc | Algorithm::Ctr => {
                self.process_blocks(input, output, timeout_ms)
            }
            Algorithm::GcmGmac | Algorithm::Ccm => self.process_phases(input, output, timeout_ms),
        };
        self.state.set(State::Idle);
        result
    }

    /// Argument checks shared by every transfer style.
    fn check_transfer(&self, input_len: usize, output_len: usize) -> Result<(), ErrorCode> {
        if !self.algorithm_enabled(self.algorithm.get()) {
            return Err(ErrorCode::NOSUPPORT);
        }
        if output_len < input_len {
            return Err(ErrorCode::INVAL);
        }
        match self.algorithm.get() {
            Algorithm::Ecb | Algorithm::Cbc | Algorithm::Ctr => {
                if input_len == 0 || input_len % BLOCK_BYTES != 0 {
                    return Err(ErrorCode::INVAL);
                }
            }
            Algorithm::GcmGmac | Algorithm::Ccm => {}
        }
        Ok(())
    }

    fn algorithm_enabled(&self, algorithm: Algorithm) -> bool {
        match algorithm {
            Algorithm::Ecb | Algorithm::Cbc => CONFIG.ecb_cbc,
            Algorithm::Ctr => CONFIG.ctr,
            Algorithm::GcmGmac => CONFIG.gcm_gmac,
            Algorithm::Ccm => CONFIG.ccm,
        }
    }

    /// Moves `Idle -> Active` and programs the direction. On failure the
    /// driver is back in `Idle` (or untouched if it was not idle).
    fn start_operation(&self, direction: Direction, size: usize) -> Result<(), ErrorCode> {
        self.check_update_state(&[State::Idle], State::Active)?;
        if !self.sr().is_set(SR::KEYVALID) {
            self.state.set(State::Idle);
            return Err(ErrorCode::FAIL);
        }
        let algorithm = self.algorithm.get();
        if direction == Direction::Decrypt
            && matches!(algorithm, Algorithm::Ecb | Algorithm::Cbc)
            && self.data_size_sum.get() == 0
        {
            if let Err(e) = self.derive_decryption_key() {
                self.state.set(State::Idle);
                return Err(e);
            }
        }
        self.clear_rw_error();
        self.reset_errors();
        let mode = match direction {
            Direction::Encrypt => CR::MODE::Encrypt,
            Direction::Decrypt => CR::MODE::Decrypt,
        };
        self.modify_cr(mode + CR::KMOD::Normal);
        self.data_size.set(size);
        self.block_count.set(0);
        // Leftovers of an aborted call must not reach this one.
        self.suspend_request.set(false);
        self.input_done_pending.set(false);
        Ok(())
    }

    /// ECB and CBC decryption need the last round key, which the peripheral
    /// computes from the loaded key.
    fn derive_decryption_key(&self) -> Result<(), ErrorCode> {
        self.disable();
        self.modify_cr(CR::MODE::KeyDerivation);
        self.enable();
        let latency = match self.instance {
            Instance::Aes => AES_KEY_DERIVATION_LATENCY,
            Instance::Saes => SAES_KEY_DERIVATION_LATENCY,
        };
        self.spin_for_ccf(latency)?;
        self.clear_ccf();
        Ok(())
    }

    fn process_blocks(&self, input: &[u8], output: &mut [u8], timeout_ms: u32) -> Result<(), ErrorCode> {
        let blocks = self.data_size.get().div_ceil(BLOCK_BYTES);
        self.enable();
        for block in self.block_count.get()..blocks {
            self.block_count.set(block);
            self.process_one_block(input, output, block, timeout_ms)?;
        }
        self.disable();
        self.data_size_sum
            .set(self.data_size_sum.get() + self.data_size.get());
        Ok(())
    }

    // Register helpers

    fn cr(&self) -> LocalRegisterCopy<u32, CR::Register> {
        LocalRegisterCopy::new(self.registers.read(Register::Cr))
    }

    fn modify_cr(&self, fields: FieldValue<u32, CR::Register>) {
        let mut cr = self.cr();
        cr.modify(fields);
        self.registers.write(Register::Cr, cr.get());
    }

    fn sr(&self) -> LocalRegisterCopy<u32, SR::Register> {
        LocalRegisterCopy::new(self.registers.read(Register::Sr))
    }

    fn isr(&self) -> LocalRegisterCopy<u32, ISR::Register> {
        LocalRegisterCopy::new(self.registers.read(Register::Isr))
    }

    fn enable(&self) {
        self.modify_cr(CR::EN::SET);
    }

    fn disable(&self) {
        self.modify_cr(CR::EN::CLEAR);
    }

    fn clear_ccf(&self) {
        self.registers.write(Register::Icr, ISR::CCF::SET.value);
    }

    fn clear_rw_error(&self) {
        self.registers.write(Register::Icr, ISR::RWEIF::SET.value);
    }

    fn clear_key_error(&self) {
        self.registers.write(Register::Icr, ISR::KEIF::SET.value);
    }

    fn clear_rng_error(&self) {
        self.registers.write(Register::Icr, ISR::RNGEIF::SET.value);
    }

    fn enable_interrupts(&self) {
        let mut ier = IER::CCFIE::SET + IER::RWEIE::SET + IER::KEIE::SET;
        if self.instance == Instance::Saes {
            ier += IER::RNGEIE::SET;
        }
        self.registers.write(Register::Ier, ier.value);
    }

    fn disable_interrupts(&self) {
        self.registers.write(Register::Ier, 0);
    }

    fn set_iv(&self, iv: &[u32; 4]) {
        for (i, word) in iv.iter().enumerate() {
            self.registers.write(Register::Ivr(3 - i), *word);
        }
    }

    fn iv(&self) -> [u32; 4] {
        let mut iv = [0; 4];
        for (i, word) in iv.iter_mut().enumerate() {
            *word = self.registers.read(Register::Ivr(3 - i));
        }
        iv
    }

    fn reset_errors(&self) {
        self.last_errors.set(LocalRegisterCopy::new(0));
    }

    fn record_error(&self, error: FieldValue<u32, AES_ERRORS::Register>) {
        if CONFIG.last_errors {
            let mut errors = self.last_errors.get();
            errors.modify(error);
            self.last_errors.set(errors);
        }
    }

    fn report_error(&self, error: ErrorCode) {
        if CONFIG.trace_errors {
            kernel::debug!(
                "aes: {:?} failed with {:?}, errors {:#x}",
                self.instance,
                error,
                self.last_errors.get().get()
            );
        }
        self.client.map(|client| client.error(error));
    }

    /// Setup calls need a driver with no message in flight or parked.
    fn check_idle(&self) -> Result<(), ErrorCode> {
        if self.state.get() == State::Idle {
            Ok(())
        } else {
            Err(ErrorCode::BUSY)
        }
    }

    /// Move to `next` if the current state is one of `allowed`.
    fn check_update_state(&self, allowed: &[State], next: State) -> Result<(), ErrorCode> {
        if allowed.contains(&self.state.get()) {
            self.state.set(next);
            Ok(())
        } else {
            Err(ErrorCode::BUSY)
        }
    }

    fn header_len(&self) -> usize {
        self.header.map_or(0, |header| header.len())
    }

    // Waits

    fn elapsed_ms(&self, start: T::Ticks) -> u32 {
        self.time.ticks_to_ms(self.time.now().wrapping_sub(start))
    }

    /// Wait for the completion flag using the time source. Disables the
    /// peripheral on timeout, which is recorded as `AES_ERRORS::TIMEOUT`.
    fn wait_for_ccf(&self, timeout_ms: u32) -> Result<(), ErrorCode> {
        let start = self.time.now();
        while !self.sr().is_set(SR::CCF) {
            if self.elapsed_ms(start) > timeout_ms {
                self.record_error(AES_ERRORS::TIMEOUT::SET);
                self.disable();
                return Err(ErrorCode::FAIL);
            }
        }
        Ok(())
    }

    /// Wait for the completion flag for at most `latency` polls. Disables
    /// the peripheral when the flag never rises.
    fn spin_for_ccf(&self, latency: u32) -> Result<(), ErrorCode> {
        let mut count = latency;
        loop {
            count = count.saturating_sub(1);
            if self.sr().is_set(SR::CCF) || count == 0 {
                break;
            }
        }
        if count == 0 {
            self.disable();
            return Err(ErrorCode::FAIL);
        }
        Ok(())
    }

    /// Wait until a key load has been absorbed.
    fn wait_busy(&self) -> Result<(), ErrorCode> {
        let start = self.time.now();
        while self.sr().is_set(SR::BUSY) {
            if self.elapsed_ms(start) > GENERAL_TIMEOUT_MS {
                self.record_error(AES_ERRORS::TIMEOUT::SET);
                return Err(ErrorCode::FAIL);
            }
        }
        Ok(())
    }
}
