// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Key wrapping and key sharing on SAES.
//!
//! SAES encrypts an application key with the hardware key selected by
//! `set_hw_key`. The wrapped form can be stored in the clear; unwrapping it
//! loads the key into SAES without exposing it on the bus. A shared key is
//! unwrapped the same way and then handed to the AES instance over a private
//! key bus, see `Aes::set_shared_key`.
//!
//! The instance must have been configured for ECB or CBC beforehand.

use kernel::hil::time::Time;
use kernel::ErrorCode;

use super::{Aes, Direction, Instance, KeyMode, KeySize, State};
use crate::registers::{AesRegisterBank, CR, SR};

/// Highest target id of a shared key.
const MAX_SHARE_TARGET: u8 = 3;

/// Which key operation to run and where the result goes.
#[derive(Clone, Copy)]
struct KeyJob {
    direction: Direction,
    mode: KeyMode,
    target: u8,
}

impl<'a, R: AesRegisterBank, T: Time> Aes<'a, R, T> {
    /// Encrypt `key` with the selected hardware key. `wrapped` receives as
    /// many words as the key has.
    pub fn wrap_key(
        &self,
        key: &[u32],
        size: KeySize,
        wrapped: &mut [u32],
        timeout_ms: u32,
    ) -> Result<(), ErrorCode> {
        let job = KeyJob {
            direction: Direction::Encrypt,
            mode: KeyMode::Wrapped,
            target: 0,
        };
        self.process_key(job, key, size, Some(wrapped), timeout_ms)
    }

    /// Decrypt a wrapped key straight into the key registers.
    pub fn unwrap_key(&self, wrapped: &[u32], size: KeySize, timeout_ms: u32) -> Result<(), ErrorCode> {
        let job = KeyJob {
            direction: Direction::Decrypt,
            mode: KeyMode::Wrapped,
            target: 0,
        };
        self.process_key(job, wrapped, size, None, timeout_ms)
    }

    /// Encrypt `key` so that it can later be shared with peripheral
    /// `target_id`.
    pub fn encrypt_shared_key(
        &self,
        key: &[u32],
        size: KeySize,
        encrypted: &mut [u32],
        target_id: u8,
        timeout_ms: u32,
    ) -> Result<(), ErrorCode> {
        let job = KeyJob {
            direction: Direction::Encrypt,
            mode: KeyMode::Shared,
            target: target_id,
        };
        self.process_key(job, key, size, Some(encrypted), timeout_ms)
    }

    /// Decrypt a shared key into the key registers and offer it to
    /// peripheral `target_id`.
    pub fn decrypt_shared_key(
        &self,
        encrypted: &[u32],
        size: KeySize,
        target_id: u8,
        timeout_ms: u32,
    ) -> Result<(), ErrorCode> {
        let job = KeyJob {
            direction: Direction::Decrypt,
            mode: KeyMode::Shared,
            target: target_id,
        };
        self.process_key(job, encrypted, size, None, timeout_ms)
    }

    fn process_key(
        &self,
        job: KeyJob,
        input: &[u32],
        size: KeySize,
        output: Option<&mut [u32]>,
        timeout_ms: u32,
    ) -> Result<(), ErrorCode> {
        if self.instance != Instance::Saes || timeout_ms == 0 || job.target > MAX_SHARE_TARGET {
            return Err(ErrorCode::INVAL);
        }
        let words = size.words();
        if input.len() < words || output.as_ref().is_some_and(|out| out.len() < words) {
            return Err(ErrorCode::INVAL);
        }
        self.check_update_state(&[State::Idle], State::Active)?;
        if !self.sr().is_set(SR::KEYVALID) {
            self.state.set(State::Idle);
            return Err(ErrorCode::FAIL);
        }
        if job.direction == Direction::Decrypt {
            if let Err(e) = self.derive_decryption_key() {
                self.state.set(State::Idle);
                return Err(e);
            }
        }
        self.clear_rw_error();
        self.reset_errors();
        let mode = match job.direction {
            Direction::Encrypt => CR::MODE::Encrypt,
            Direction::Decrypt => CR::MODE::Decrypt,
        };
        self.modify_cr(mode + job.mode.field() + CR::KSHAREID.val(job.target as u32));
        self.data_size.set(size.bytes());
        self.block_count.set(0);

        let mut data = [0u8; 32];
        for (chunk, word) in data.chunks_exact_mut(4).zip(input.iter().take(words)) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let mut result = [0u8; 32];
        let len = size.bytes();
        if let Err(e) = self.process_blocks(&data[..len], &mut result[..len], timeout_ms) {
            self.state.set(State::Idle);
            return Err(e);
        }
        // Key operations are not part of a message.
        self.data_size_sum.set(0);
        if let Some(output) = output {
            for (word, chunk) in output.iter_mut().zip(result[..len].chunks_exact(4)) {
                *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        self.state.set(State::Idle);
        Ok(())
    }
}
