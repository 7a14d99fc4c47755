// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Software model of the AES block, its DMA channels, a clock and a client.
//!
//! The model computes real AES results through the RustCrypto crates so
//! that driver output can be checked against independent implementations.
//! GCM keeps its running hash in SUSP0..3 and the hash subkey in SUSP4..7,
//! CCM its MAC state in SUSP0..3 and the first counter block in SUSP4..7.
//! Both survive a context save and restore the way the silicon state does.

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use ghash::universal_hash::{NewUniversalHash, UniversalHash};
use ghash::GHash;
use kernel::hil::time::{Freq1KHz, Ticks32, Time};
use kernel::platform::chip::ClockInterface;
use kernel::utilities::cells::{OptionalCell, TakeCell};
use kernel::ErrorCode;
use tock_registers::LocalRegisterCopy;

use super::{AesClient, Instance};
use crate::dma::{DmaChannel, DmaClient, DmaRequest};
use crate::registers::{AesRegisterBank, Register, CR, IER, ISR, SR};

/// Value of the derived hardware unique key in the model.
pub const DHUK: [u8; 32] = [
    0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d, 0x77, 0x81,
    0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3, 0x09, 0x14, 0xdf, 0xf4,
];

const BHK: [u8; 32] = [0xA5; 32];

type Block = [u8; 16];

enum Cipher {
    Aes128(aes::Aes128),
    Aes256(aes::Aes256),
}

impl Cipher {
    fn new(key: &[u8]) -> Cipher {
        if key.len() >= 32 {
            Cipher::Aes256(aes::Aes256::new(GenericArray::from_slice(&key[..32])))
        } else {
            Cipher::Aes128(aes::Aes128::new(GenericArray::from_slice(&key[..16])))
        }
    }

    fn encrypt(&self, block: &Block) -> Block {
        let mut b = GenericArray::clone_from_slice(block);
        match self {
            Cipher::Aes128(c) => c.encrypt_block(&mut b),
            Cipher::Aes256(c) => c.encrypt_block(&mut b),
        }
        let mut out = [0; 16];
        out.copy_from_slice(&b);
        out
    }

    fn decrypt(&self, block: &Block) -> Block {
        let mut b = GenericArray::clone_from_slice(block);
        match self {
            Cipher::Aes128(c) => c.decrypt_block(&mut b),
            Cipher::Aes256(c) => c.decrypt_block(&mut b),
        }
        let mut out = [0; 16];
        out.copy_from_slice(&b);
        out
    }
}

fn xor(a: &Block, b: &Block) -> Block {
    let mut out = [0; 16];
    for i in 0..16 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// `(acc ^ x) * h` in the GHASH field.
fn ghash_step(h: &Block, acc: &Block, x: &Block) -> Block {
    let mut hash = GHash::new(ghash::Key::from_slice(h));
    hash.update(ghash::Block::from_slice(&xor(acc, x)));
    let mut out = [0; 16];
    out.copy_from_slice(&hash.finalize().into_bytes());
    out
}

fn words_to_block(words: &[u32]) -> Block {
    let mut out = [0; 16];
    for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

fn block_to_words(block: &Block) -> [u32; 4] {
    let mut out = [0; 4];
    for (word, chunk) in out.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    out
}

/// Key bus between SAES and AES.
#[derive(Default)]
pub struct KeyBus {
    key: RefCell<Option<Vec<u8>>>,
}

#[derive(Default)]
struct Model {
    cr: u32,
    ier: u32,
    isr: u32,
    wrerr: bool,
    rderr: bool,
    keyr: [u32; 8],
    ivr: [u32; 4],
    suspr: [u32; 8],
    key: Option<Vec<u8>>,
    derived: bool,
    /// Key being unwrapped, filled block by block
    pending_key: Vec<u8>,
    input: Vec<u32>,
    output: VecDeque<u32>,
}

pub struct MockAes {
    instance: Instance,
    model: RefCell<Model>,
    bus: Rc<KeyBus>,
    pub busy: Cell<bool>,
    /// Blocks are absorbed but never complete
    pub stall: Cell<bool>,
    pub writes: Cell<usize>,
    pub derivations: Cell<usize>,
    pub doutr_reads: Cell<usize>,
    pub dinr_log: RefCell<Vec<u32>>,
}

impl MockAes {
    pub fn new(instance: Instance) -> MockAes {
        MockAes::with_bus(instance, Rc::new(KeyBus::default()))
    }

    pub fn with_bus(instance: Instance, bus: Rc<KeyBus>) -> MockAes {
        MockAes {
            instance,
            model: RefCell::new(Model::default()),
            bus,
            busy: Cell::new(false),
            stall: Cell::new(false),
            writes: Cell::new(0),
            derivations: Cell::new(0),
            doutr_reads: Cell::new(0),
            dinr_log: RefCell::new(Vec::new()),
        }
    }

    pub fn cr(&self) -> LocalRegisterCopy<u32, CR::Register> {
        LocalRegisterCopy::new(self.model.borrow().cr)
    }

    pub fn key_valid(&self) -> bool {
        self.model.borrow().key.is_some()
    }

    pub fn interrupt_pending(&self) -> bool {
        let model = self.model.borrow();
        model.isr & model.ier != 0
    }

    pub fn raise_key_error(&self) {
        self.model.borrow_mut().isr |= ISR::KEIF::SET.value;
    }

    pub fn raise_write_error(&self) {
        let mut model = self.model.borrow_mut();
        model.isr |= ISR::RWEIF::SET.value;
        model.wrerr = true;
    }

    pub fn inject_rng_error(&self) {
        self.model.borrow_mut().isr |= ISR::RNGEIF::SET.value;
    }

    fn set_ccf(&self, model: &mut Model) {
        if !self.stall.get() {
            model.isr |= ISR::CCF::SET.value;
        }
    }

    fn swap(cr: LocalRegisterCopy<u32, CR::Register>, word: u32) -> u32 {
        match cr.read(CR::DATATYPE) {
            0 => word,
            1 => word.rotate_left(16),
            2 => word.swap_bytes(),
            _ => word.reverse_bits(),
        }
    }

    fn push_block(&self, model: &mut Model, block: &Block) {
        let cr = LocalRegisterCopy::new(model.cr);
        for word in block_to_words(block) {
            model.output.push_back(MockAes::swap(cr, word));
        }
    }

    fn load_key(model: &mut Model, key: Vec<u8>) {
        model.key = Some(key);
        model.derived = false;
    }

    fn cipher(model: &Model) -> Option<Cipher> {
        model.key.as_ref().map(|key| Cipher::new(key))
    }

    fn counter_block(model: &Model) -> Block {
        words_to_block(&[model.ivr[3], model.ivr[2], model.ivr[1], model.ivr[0]])
    }

    fn increment_counter(model: &mut Model) {
        model.ivr[0] = model.ivr[0].wrapping_add(1);
    }

    fn set_iv_block(model: &mut Model, block: &Block) {
        let words = block_to_words(block);
        for i in 0..4 {
            model.ivr[3 - i] = words[i];
        }
    }

    fn susp_block(model: &Model, first: usize) -> Block {
        words_to_block(&model.suspr[first..first + 4])
    }

    fn set_susp_block(model: &mut Model, first: usize, block: &Block) {
        model.suspr[first..first + 4].copy_from_slice(&block_to_words(block));
    }

    fn write_cr(&self, value: u32) {
        let mut model = self.model.borrow_mut();
        let old: LocalRegisterCopy<u32, CR::Register> = LocalRegisterCopy::new(model.cr);
        let new: LocalRegisterCopy<u32, CR::Register> = LocalRegisterCopy::new(value);
        if new.is_set(CR::IPRST) {
            *model = Model::default();
            model.cr = CR::IPRST::SET.value;
            return;
        }
        model.cr = value;

        let keysel = new.read(CR::KEYSEL);
        if keysel != 0 && keysel != old.read(CR::KEYSEL) {
            let len = if new.is_set(CR::KEYSIZE) { 32 } else { 16 };
            let mut key = vec![0u8; len];
            for i in 0..len {
                key[i] = match keysel {
                    1 => DHUK[i],
                    2 => BHK[i],
                    _ => DHUK[i] ^ BHK[i],
                };
            }
            MockAes::load_key(&mut model, key);
        }
        if self.instance == Instance::Aes
            && new.matches_all(CR::KMOD::Shared)
            && !old.matches_all(CR::KMOD::Shared)
        {
            match self.bus.key.borrow().clone() {
                Some(key) => MockAes::load_key(&mut model, key),
                None => model.isr |= ISR::KEIF::SET.value,
            }
        }
        if !new.is_set(CR::EN) {
            model.input.clear();
            return;
        }
        let rising = !old.is_set(CR::EN);
        if rising && new.matches_all(CR::MODE::KeyDerivation) {
            model.derived = true;
            self.derivations.set(self.derivations.get() + 1);
            self.set_ccf(&mut model);
            return;
        }
        let ccm = new.is_set(CR::CHMOD2);
        let gcm = !ccm && new.matches_all(CR::CHMOD::Gcm);
        if rising && (ccm || gcm) && new.matches_all(CR::GCMPH::Init) {
            self.init_phase(&mut model, ccm);
        }
        if ccm && new.matches_all(CR::GCMPH::Final) && !old.matches_all(CR::GCMPH::Final) {
            if let Some(cipher) = MockAes::cipher(&model) {
                let x = MockAes::susp_block(&model, 0);
                let ctr0 = MockAes::susp_block(&model, 4);
                let tag = xor(&x, &cipher.encrypt(&ctr0));
                self.push_block(&mut model, &tag);
                self.set_ccf(&mut model);
            }
        }
    }

    fn init_phase(&self, model: &mut Model, ccm: bool) {
        let cipher = match MockAes::cipher(model) {
            Some(cipher) => cipher,
            None => return,
        };
        if ccm {
            let b0 = MockAes::counter_block(model);
            let x = cipher.encrypt(&b0);
            let q = (b0[0] & 0x07) as usize + 1;
            let mut ctr0 = [0u8; 16];
            ctr0[0] = b0[0] & 0x07;
            ctr0[1..16 - q].copy_from_slice(&b0[1..16 - q]);
            MockAes::set_susp_block(model, 0, &x);
            MockAes::set_susp_block(model, 4, &ctr0);
            MockAes::set_iv_block(model, &ctr0);
            MockAes::increment_counter(model);
        } else {
            let h = cipher.encrypt(&[0; 16]);
            MockAes::set_susp_block(model, 0, &[0; 16]);
            MockAes::set_susp_block(model, 4, &h);
        }
        self.set_ccf(model);
    }

    fn write_dinr(&self, value: u32) {
        self.dinr_log.borrow_mut().push(value);
        let mut model = self.model.borrow_mut();
        let cr: LocalRegisterCopy<u32, CR::Register> = LocalRegisterCopy::new(model.cr);
        if !cr.is_set(CR::EN) {
            model.wrerr = true;
            model.isr |= ISR::RWEIF::SET.value;
            return;
        }
        let final_phase = cr.matches_all(CR::GCMPH::Final);
        let word = if final_phase {
            value
        } else {
            MockAes::swap(cr, value)
        };
        model.input.push(word);
        if model.input.len() < 4 {
            return;
        }
        let block = words_to_block(&model.input);
        model.input.clear();
        let cipher = match MockAes::cipher(&model) {
            Some(cipher) => cipher,
            None => return,
        };
        let decrypt = cr.matches_all(CR::MODE::Decrypt);
        let ccm = cr.is_set(CR::CHMOD2);

        if ccm || cr.matches_all(CR::CHMOD::Gcm) {
            self.phase_block(&mut model, cr, &cipher, &block, ccm, decrypt);
            self.set_ccf(&mut model);
            return;
        }

        let out = match cr.read(CR::CHMOD) {
            0 => {
                if !decrypt {
                    cipher.encrypt(&block)
                } else if model.derived {
                    cipher.decrypt(&block)
                } else {
                    block
                }
            }
            1 => {
                let iv = MockAes::counter_block(&model);
                if !decrypt {
                    let out = cipher.encrypt(&xor(&block, &iv));
                    MockAes::set_iv_block(&mut model, &out);
                    out
                } else {
                    let plain = if model.derived {
                        cipher.decrypt(&block)
                    } else {
                        block
                    };
                    MockAes::set_iv_block(&mut model, &block);
                    xor(&plain, &iv)
                }
            }
            _ => {
                let keystream = cipher.encrypt(&MockAes::counter_block(&model));
                MockAes::increment_counter(&mut model);
                xor(&block, &keystream)
            }
        };

        let key_target = self.instance == Instance::Saes
            && decrypt
            && !cr.matches_all(CR::KMOD::Normal);
        if key_target {
            model.pending_key.extend_from_slice(&out);
            let len = if cr.is_set(CR::KEYSIZE) { 32 } else { 16 };
            if model.pending_key.len() >= len {
                let key: Vec<u8> = model.pending_key.drain(..).take(len).collect();
                if cr.matches_all(CR::KMOD::Shared) {
                    *self.bus.key.borrow_mut() = Some(key.clone());
                }
                MockAes::load_key(&mut model, key);
            }
            if cr.matches_all(CR::KMOD::Shared) {
                self.push_block(&mut model, &[0; 16]);
            }
        } else {
            self.push_block(&mut model, &out);
        }
        self.set_ccf(&mut model);
    }

    fn phase_block(
        &self,
        model: &mut Model,
        cr: LocalRegisterCopy<u32, CR::Register>,
        cipher: &Cipher,
        block: &Block,
        ccm: bool,
        decrypt: bool,
    ) {
        let padding = cr.read(CR::NPBLB) as usize;
        let mask = |data: &Block| {
            let mut masked = *data;
            for byte in masked.iter_mut().skip(16 - padding) {
                *byte = 0;
            }
            masked
        };
        let phase = cr.read(CR::GCMPH);
        let acc = MockAes::susp_block(model, 0);
        if ccm {
            match phase {
                1 => {
                    let x = cipher.encrypt(&xor(&acc, block));
                    MockAes::set_susp_block(model, 0, &x);
                }
                2 => {
                    let keystream = cipher.encrypt(&MockAes::counter_block(model));
                    MockAes::increment_counter(model);
                    let out = xor(block, &keystream);
                    let plain = if decrypt { mask(&out) } else { *block };
                    let x = cipher.encrypt(&xor(&acc, &plain));
                    MockAes::set_susp_block(model, 0, &x);
                    self.push_block(model, &out);
                }
                _ => {}
            }
        } else {
            let h = MockAes::susp_block(model, 4);
            match phase {
                1 => {
                    let acc = ghash_step(&h, &acc, block);
                    MockAes::set_susp_block(model, 0, &acc);
                }
                2 => {
                    let keystream = cipher.encrypt(&MockAes::counter_block(model));
                    MockAes::increment_counter(model);
                    let out = xor(block, &keystream);
                    let cipher_text = if decrypt { *block } else { mask(&out) };
                    let acc = ghash_step(&h, &acc, &cipher_text);
                    MockAes::set_susp_block(model, 0, &acc);
                    self.push_block(model, &out);
                }
                3 => {
                    let acc = ghash_step(&h, &acc, block);
                    let j0 = words_to_block(&[model.ivr[3], model.ivr[2], model.ivr[1], 1]);
                    let tag = xor(&acc, &cipher.encrypt(&j0));
                    self.push_block(model, &tag);
                }
                _ => {}
            }
        }
    }

    fn write_icr(&self, value: u32) {
        let mut model = self.model.borrow_mut();
        model.isr &= !value;
        if value & ISR::RWEIF::SET.value != 0 {
            model.wrerr = false;
            model.rderr = false;
        }
    }
}

impl AesRegisterBank for MockAes {
    fn read(&self, reg: Register) -> u32 {
        match reg {
            Register::Cr => self.model.borrow().cr,
            Register::Sr => {
                let model = self.model.borrow();
                let mut sr = 0;
                if model.isr & ISR::CCF::SET.value != 0 {
                    sr |= SR::CCF::SET.value;
                }
                if model.wrerr {
                    sr |= SR::WRERR::SET.value;
                }
                if model.rderr {
                    sr |= SR::RDERR::SET.value;
                }
                if self.busy.get() {
                    sr |= SR::BUSY::SET.value;
                }
                if model.key.is_some() {
                    sr |= SR::KEYVALID::SET.value;
                }
                sr
            }
            Register::Doutr => {
                self.doutr_reads.set(self.doutr_reads.get() + 1);
                self.model.borrow_mut().output.pop_front().unwrap_or(0)
            }
            Register::Ivr(n) => self.model.borrow().ivr[n],
            Register::Suspr(n) => self.model.borrow().suspr[n],
            Register::Ier => self.model.borrow().ier,
            Register::Isr => self.model.borrow().isr,
            Register::Dinr | Register::Keyr(_) | Register::Icr => 0,
        }
    }

    fn write(&self, reg: Register, value: u32) {
        self.writes.set(self.writes.get() + 1);
        match reg {
            Register::Cr => self.write_cr(value),
            Register::Dinr => self.write_dinr(value),
            Register::Keyr(n) => {
                let mut model = self.model.borrow_mut();
                model.keyr[n] = value;
                if n == 0 {
                    let cr: LocalRegisterCopy<u32, CR::Register> = LocalRegisterCopy::new(model.cr);
                    let words = if cr.is_set(CR::KEYSIZE) { 8 } else { 4 };
                    let mut key = Vec::new();
                    for i in (0..words).rev() {
                        key.extend_from_slice(&model.keyr[i].to_be_bytes());
                    }
                    MockAes::load_key(&mut model, key);
                }
            }
            Register::Ivr(n) => self.model.borrow_mut().ivr[n] = value,
            Register::Suspr(n) => self.model.borrow_mut().suspr[n] = value,
            Register::Ier => self.model.borrow_mut().ier = value,
            Register::Icr => self.write_icr(value),
            Register::Sr | Register::Doutr | Register::Isr => {}
        }
    }

    fn address(&self, reg: Register) -> usize {
        0x420C_0000 + reg.offset()
    }
}

/// Advances one millisecond per reading.
#[derive(Default)]
pub struct MockTime {
    now: Cell<u32>,
}

impl Time for MockTime {
    type Frequency = Freq1KHz;
    type Ticks = Ticks32;

    fn now(&self) -> Ticks32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        Ticks32::from(now)
    }
}

#[derive(Default)]
pub struct MockClock {
    pub enabled: Cell<bool>,
}

impl ClockInterface for MockClock {
    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }
    fn enable(&self) {
        self.enabled.set(true);
    }
    fn disable(&self) {
        self.enabled.set(false);
    }
}

#[derive(Default)]
pub struct MockClient {
    pub input_done: Cell<usize>,
    pub output_done: Cell<usize>,
    pub suspended: Cell<usize>,
    pub errors: RefCell<Vec<ErrorCode>>,
}

impl AesClient for MockClient {
    fn input_done(&self) {
        self.input_done.set(self.input_done.get() + 1);
    }

    fn output_done(&self) {
        self.output_done.set(self.output_done.get() + 1);
    }

    fn error(&self, error: ErrorCode) {
        self.errors.borrow_mut().push(error);
    }

    fn suspended(&self) {
        self.suspended.set(self.suspended.get() + 1);
    }
}

/// A DMA channel whose transfers are carried out by [`run_dma`].
pub struct MockDma<'a> {
    request: DmaRequest,
    client: OptionalCell<&'a dyn DmaClient>,
    source: OptionalCell<&'a [u8]>,
    len: Cell<usize>,
    buffer: TakeCell<'a, [u8]>,
    done: TakeCell<'a, [u8]>,
    pub fail_start: Cell<bool>,
    /// Report an error instead of completing
    pub fail_transfer: Cell<bool>,
    pub started: Cell<usize>,
}

impl<'a> MockDma<'a> {
    pub fn new(request: DmaRequest) -> MockDma<'a> {
        MockDma {
            request,
            client: OptionalCell::empty(),
            source: OptionalCell::empty(),
            len: Cell::new(0),
            buffer: TakeCell::empty(),
            done: TakeCell::empty(),
            fail_start: Cell::new(false),
            fail_transfer: Cell::new(false),
            started: Cell::new(0),
        }
    }

    fn busy(&self) -> bool {
        self.source.is_some() || self.buffer.is_some()
    }
}

impl<'a> DmaChannel<'a> for MockDma<'a> {
    fn set_client(&self, client: &'a dyn DmaClient) {
        self.client.set(client);
    }

    fn write_to_peripheral(&self, buf: &'a [u8], len: usize, _dest: usize) -> Result<(), ErrorCode> {
        if self.fail_start.get() {
            return Err(ErrorCode::BUSY);
        }
        self.started.set(self.started.get() + 1);
        self.source.set(buf);
        self.len.set(len);
        Ok(())
    }

    fn read_from_peripheral(
        &self,
        _src: usize,
        buf: &'a mut [u8],
        len: usize,
    ) -> Result<(), (ErrorCode, &'a mut [u8])> {
        if self.fail_start.get() {
            return Err((ErrorCode::BUSY, buf));
        }
        self.started.set(self.started.get() + 1);
        self.buffer.replace(buf);
        self.len.set(len);
        Ok(())
    }

    fn return_buffer(&self) -> Option<&'a mut [u8]> {
        self.done.take()
    }

    fn abort(&self) -> Option<&'a mut [u8]> {
        self.source.clear();
        self.buffer.take().or_else(|| self.done.take())
    }
}

/// Move the data of the started transfers through the register model and
/// deliver the completion callbacks, until no channel has work left.
pub fn run_dma(mock: &MockAes, dma_in: &MockDma, dma_out: &MockDma) {
    for _ in 0..16 {
        if !dma_in.busy() && !dma_out.busy() {
            return;
        }
        if dma_in.fail_transfer.get() && dma_in.busy() {
            dma_in
                .client
                .map(|client| client.transfer_error(dma_in.request));
            continue;
        }
        let source = dma_in.source.take();
        let blocks = dma_in.len.get() / 16;
        let mut output = dma_out.buffer.take();
        if let Some(source) = source {
            for block in 0..blocks {
                if !mock.cr().is_set(CR::DMAINEN) {
                    break;
                }
                for word in 0..4 {
                    let offset = block * 16 + word * 4;
                    let bytes = [
                        source[offset],
                        source[offset + 1],
                        source[offset + 2],
                        source[offset + 3],
                    ];
                    mock.write(Register::Dinr, u32::from_le_bytes(bytes));
                }
                if let Some(buf) = output.as_deref_mut() {
                    if mock.cr().is_set(CR::DMAOUTEN) {
                        for word in 0..4 {
                            let value = mock.read(Register::Doutr).to_le_bytes();
                            let offset = block * 16 + word * 4;
                            buf[offset..offset + 4].copy_from_slice(&value);
                        }
                    }
                }
            }
        }
        if let Some(buf) = output {
            dma_out.done.replace(buf);
        }
        if source.is_some() {
            dma_in
                .client
                .map(|client| client.transfer_done(dma_in.request));
        }
        if dma_out.done.is_some() {
            dma_out
                .client
                .map(|client| client.transfer_done(dma_out.request));
        }
    }
}

/// Service interrupts until none is pending.
pub fn run_interrupts<R: AesRegisterBank, T: Time>(aes: &super::Aes<R, T>, mock: &MockAes) {
    for _ in 0..10_000 {
        if !mock.interrupt_pending() {
            return;
        }
        aes.handle_interrupt();
    }
    panic!("interrupt storm");
}

/// Enabled interrupt sources, for assertions.
pub fn enabled_interrupts(mock: &MockAes) -> LocalRegisterCopy<u32, IER::Register> {
    LocalRegisterCopy::new(mock.read(Register::Ier))
}
