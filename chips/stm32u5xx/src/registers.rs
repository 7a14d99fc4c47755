// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! AES and SAES register map of the STM32U5 family.
//!
//! The two instances share the layout. SAES additionally drives the hardware
//! key selection, wrapped keys and the RNG error flag. The driver does not
//! touch `AesRegisters` directly; it goes through [`AesRegisterBank`] so that
//! the same code can run on the memory-mapped block and on a model of it.

use kernel::utilities::StaticRef;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs, LocalRegisterCopy};

register_structs! {
    pub AesRegisters {
        (0x000 => cr: ReadWrite<u32, CR::Register>),
        (0x004 => sr: ReadOnly<u32, SR::Register>),
        (0x008 => dinr: WriteOnly<u32>),
        (0x00C => doutr: ReadOnly<u32>),
        (0x010 => keyr_low: [WriteOnly<u32>; 4]),
        (0x020 => ivr: [ReadWrite<u32>; 4]),
        (0x030 => keyr_high: [WriteOnly<u32>; 4]),
        (0x040 => suspr: [ReadWrite<u32>; 8]),
        (0x060 => _reserved0),
        (0x300 => ier: ReadWrite<u32, IER::Register>),
        (0x304 => isr: ReadOnly<u32, ISR::Register>),
        (0x308 => icr: WriteOnly<u32, ISR::Register>),
        (0x30C => @END),
    }
}

register_bitfields![u32,
    pub CR [
        /// Peripheral reset, SAES only
        IPRST OFFSET(31) NUMBITS(1) [],
        /// Key source, SAES only
        KEYSEL OFFSET(28) NUMBITS(3) [
            Software = 0,
            Dhuk = 1,
            Bhk = 2,
            DhukXorBhk = 4
        ],
        /// Target of a shared key
        KSHAREID OFFSET(26) NUMBITS(2) [],
        KMOD OFFSET(24) NUMBITS(2) [
            Normal = 0,
            Wrapped = 1,
            Shared = 2
        ],
        /// Number of padding bytes in the last payload block
        NPBLB OFFSET(20) NUMBITS(4) [],
        KEYPROT OFFSET(19) NUMBITS(1) [],
        KEYSIZE OFFSET(18) NUMBITS(1) [
            Bits128 = 0,
            Bits256 = 1
        ],
        /// High bit of the chaining mode; set for CCM
        CHMOD2 OFFSET(16) NUMBITS(1) [],
        GCMPH OFFSET(13) NUMBITS(2) [
            Init = 0,
            Header = 1,
            Payload = 2,
            Final = 3
        ],
        DMAOUTEN OFFSET(12) NUMBITS(1) [],
        DMAINEN OFFSET(11) NUMBITS(1) [],
        CHMOD OFFSET(5) NUMBITS(2) [
            Ecb = 0,
            Cbc = 1,
            Ctr = 2,
            Gcm = 3
        ],
        MODE OFFSET(3) NUMBITS(2) [
            Encrypt = 0,
            KeyDerivation = 1,
            Decrypt = 2
        ],
        DATATYPE OFFSET(1) NUMBITS(2) [
            NoSwap = 0,
            HalfWord = 1,
            Byte = 2,
            Bit = 3
        ],
        EN OFFSET(0) NUMBITS(1) []
    ],
    pub SR [
        KEYVALID OFFSET(7) NUMBITS(1) [],
        BUSY OFFSET(3) NUMBITS(1) [],
        WRERR OFFSET(2) NUMBITS(1) [],
        RDERR OFFSET(1) NUMBITS(1) [],
        CCF OFFSET(0) NUMBITS(1) []
    ],
    pub IER [
        RNGEIE OFFSET(3) NUMBITS(1) [],
        KEIE OFFSET(2) NUMBITS(1) [],
        RWEIE OFFSET(1) NUMBITS(1) [],
        CCFIE OFFSET(0) NUMBITS(1) []
    ],
    /// Shared by ISR (status) and ICR (write one to clear).
    pub ISR [
        RNGEIF OFFSET(3) NUMBITS(1) [],
        KEIF OFFSET(2) NUMBITS(1) [],
        RWEIF OFFSET(1) NUMBITS(1) [],
        CCF OFFSET(0) NUMBITS(1) []
    ],
    /// Error flags accumulated by the driver, not a hardware register.
    pub AES_ERRORS [
        WRITE OFFSET(1) NUMBITS(1) [],
        READ OFFSET(2) NUMBITS(1) [],
        DMA OFFSET(3) NUMBITS(1) [],
        TIMEOUT OFFSET(4) NUMBITS(1) [],
        KEY OFFSET(8) NUMBITS(1) [],
        RNG OFFSET(9) NUMBITS(1) []
    ]
];

/// Snapshot of the errors recorded since the last operation started.
pub type LastErrors = LocalRegisterCopy<u32, AES_ERRORS::Register>;

pub const AES_BASE: StaticRef<AesRegisters> =
    unsafe { StaticRef::new(0x420C_0000 as *const AesRegisters) };

pub const SAES_BASE: StaticRef<AesRegisters> =
    unsafe { StaticRef::new(0x420C_0C00 as *const AesRegisters) };

/// A single 32-bit register of the block.
///
/// `Keyr(n)` is key register KEYRn (0..8), `Ivr(n)` is IVRn (0..4) and
/// `Suspr(n)` is SUSPnR (0..8). KEYR0 and IVR0 hold the least significant
/// word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    Cr,
    Sr,
    Dinr,
    Doutr,
    Keyr(usize),
    Ivr(usize),
    Suspr(usize),
    Ier,
    Isr,
    Icr,
}

impl Register {
    /// Byte offset of the register from the peripheral base.
    pub fn offset(self) -> usize {
        match self {
            Register::Cr => 0x000,
            Register::Sr => 0x004,
            Register::Dinr => 0x008,
            Register::Doutr => 0x00C,
            Register::Keyr(n) if n < 4 => 0x010 + 4 * n,
            Register::Keyr(n) => 0x030 + 4 * (n - 4),
            Register::Ivr(n) => 0x020 + 4 * n,
            Register::Suspr(n) => 0x040 + 4 * n,
            Register::Ier => 0x300,
            Register::Isr => 0x304,
            Register::Icr => 0x308,
        }
    }
}

/// Raw access to one AES block.
///
/// Reads of write-only registers return 0 and writes to read-only registers
/// are dropped, as on the bus.
pub trait AesRegisterBank {
    fn read(&self, reg: Register) -> u32;
    fn write(&self, reg: Register, value: u32);

    /// Bus address of `reg`, handed to the DMA engine.
    fn address(&self, reg: Register) -> usize;
}

impl<B: AesRegisterBank + ?Sized> AesRegisterBank for &B {
    fn read(&self, reg: Register) -> u32 {
        (**self).read(reg)
    }

    fn write(&self, reg: Register, value: u32) {
        (**self).write(reg, value)
    }

    fn address(&self, reg: Register) -> usize {
        (**self).address(reg)
    }
}

impl AesRegisterBank for StaticRef<AesRegisters> {
    fn read(&self, reg: Register) -> u32 {
        match reg {
            Register::Cr => self.cr.get(),
            Register::Sr => self.sr.get(),
            Register::Doutr => self.doutr.get(),
            Register::Ivr(n) => self.ivr.get(n).map_or(0, |r| r.get()),
            Register::Suspr(n) => self.suspr.get(n).map_or(0, |r| r.get()),
            Register::Ier => self.ier.get(),
            Register::Isr => self.isr.get(),
            Register::Dinr | Register::Keyr(_) | Register::Icr => 0,
        }
    }

    fn write(&self, reg: Register, value: u32) {
        match reg {
            Register::Cr => self.cr.set(value),
            Register::Dinr => self.dinr.set(value),
            Register::Keyr(n) if n < 4 => {
                if let Some(r) = self.keyr_low.get(n) {
                    r.set(value)
                }
            }
            Register::Keyr(n) => {
                if let Some(r) = self.keyr_high.get(n - 4) {
                    r.set(value)
                }
            }
            Register::Ivr(n) => {
                if let Some(r) = self.ivr.get(n) {
                    r.set(value)
                }
            }
            Register::Suspr(n) => {
                if let Some(r) = self.suspr.get(n) {
                    r.set(value)
                }
            }
            Register::Ier => self.ier.set(value),
            Register::Icr => self.icr.set(value),
            Register::Sr | Register::Doutr | Register::Isr => {}
        }
    }

    fn address(&self, reg: Register) -> usize {
        let base: &AesRegisters = self;
        base as *const AesRegisters as usize + reg.offset()
    }
}
