// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Moving 16-byte blocks through the data registers.

use kernel::hil::time::Time;
use kernel::ErrorCode;

use super::{Aes, Algorithm, Direction, BLOCK_BYTES};
use crate::registers::{AesRegisterBank, Register, CR};

/// Bytes kept from the last, partial header word. Rows are the data
/// swapping modes, columns the number of valid bytes in the word.
const PADDING_MASK: [u32; 16] = [
    0x0000_0000, 0xFF00_0000, 0xFFFF_0000, 0xFFFF_FF00, // no swap
    0x0000_0000, 0x0000_FF00, 0x0000_FFFF, 0xFF00_FFFF, // half-word
    0x0000_0000, 0x0000_00FF, 0x0000_FFFF, 0x00FF_FFFF, // byte
    0x0000_0000, 0x0000_00FF, 0x0000_FFFF, 0x00FF_FFFF, // bit
];

/// Little-endian word at `offset`, zero-filled past the end of `data`.
fn load_word(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        if let Some(value) = data.get(offset + i) {
            *byte = *value;
        }
    }
    u32::from_le_bytes(bytes)
}

impl<'a, R: AesRegisterBank, T: Time> Aes<'a, R, T> {
    pub(super) fn write_block(&self, data: &[u8], block: usize) {
        let offset = block * BLOCK_BYTES;
        for word in 0..4 {
            self.registers
                .write(Register::Dinr, load_word(data, offset + word * 4));
        }
    }

    /// Drain one block from DOUTR into `output`, never past the call's byte
    /// count. An unwrapped key stays inside the peripheral, so nothing is
    /// read in that mode.
    pub(super) fn read_block(&self, output: &mut [u8], block: usize) {
        if self.cr().matches_all(CR::MODE::Decrypt + CR::KMOD::Wrapped) {
            return;
        }
        let offset = block * BLOCK_BYTES;
        let limit = self.data_size.get();
        for word in 0..4 {
            let bytes = self.registers.read(Register::Doutr).to_le_bytes();
            for (i, byte) in bytes.iter().enumerate() {
                let pos = offset + word * 4 + i;
                if pos < limit {
                    if let Some(dst) = output.get_mut(pos) {
                        *dst = *byte;
                    }
                }
            }
        }
    }

    pub(super) fn process_one_block(
        &self,
        input: &[u8],
        output: &mut [u8],
        block: usize,
        timeout_ms: u32,
    ) -> Result<(), ErrorCode> {
        self.write_block(input, block);
        self.wait_for_ccf(timeout_ms)?;
        self.clear_ccf();
        self.read_block(output, block);
        Ok(())
    }

    /// Write the final, partial block of a phase: `remaining` valid bytes
    /// followed by zero words. In the header phase the last partial word is
    /// masked according to the data swapping.
    pub(super) fn write_padded_block(&self, data: &[u8], block: usize, remaining: usize) {
        let offset = block * BLOCK_BYTES;
        let cr = self.cr();
        let mut valid_words;
        if cr.matches_all(CR::GCMPH::Header) {
            valid_words = remaining / 4;
            for word in 0..valid_words {
                self.registers
                    .write(Register::Dinr, load_word(data, offset + word * 4));
            }
            if remaining % 4 != 0 {
                let index = cr.read(CR::DATATYPE) as usize * 4 + remaining % 4;
                let word = load_word(data, offset + valid_words * 4) & PADDING_MASK[index];
                self.registers.write(Register::Dinr, word);
                valid_words += 1;
            }
        } else {
            valid_words = remaining.div_ceil(4);
            for word in 0..valid_words {
                self.registers
                    .write(Register::Dinr, load_word(data, offset + word * 4));
            }
        }
        for _ in valid_words..4 {
            self.registers.write(Register::Dinr, 0);
        }
    }

    /// Tell the peripheral how many bytes of the last payload block are
    /// padding, so they are kept out of the tag.
    ///
    /// Only GCM encryption and CCM decryption need this: in the other two
    /// directions the padding is zero on the tagged side already.
    pub(super) fn set_padding_bytes(&self, remaining: usize) {
        let needed = matches!(
            (self.algorithm.get(), self.direction()),
            (Algorithm::GcmGmac, Direction::Encrypt) | (Algorithm::Ccm, Direction::Decrypt)
        );
        if needed {
            self.modify_cr(CR::NPBLB.val((BLOCK_BYTES - remaining) as u32));
        }
    }

    fn direction(&self) -> Direction {
        if self.cr().matches_all(CR::MODE::Decrypt) {
            Direction::Decrypt
        } else {
            Direction::Encrypt
        }
    }
}
