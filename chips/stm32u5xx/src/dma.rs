// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Interface to the DMA channels serving the AES block.
//!
//! One channel copies input bytes into DINR, the other drains DOUTR into the
//! output buffer. The channel driver owns the buffer for the duration of the
//! transfer and reports completion through [`DmaClient`].

use kernel::ErrorCode;

/// Which AES request line a transfer is serving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaRequest {
    AesIn,
    AesOut,
}

pub trait DmaClient {
    fn transfer_done(&self, request: DmaRequest);
    fn transfer_error(&self, request: DmaRequest);
}

/// A channel of the general-purpose DMA controller bound to one request line.
///
/// Transfers are word-wide on the peripheral side; `len` is in bytes and is
/// a multiple of 16.
pub trait DmaChannel<'a> {
    fn set_client(&self, client: &'a dyn DmaClient);

    /// Start copying `len` bytes of `buf` into the register at `dest`.
    fn write_to_peripheral(&self, buf: &'a [u8], len: usize, dest: usize)
        -> Result<(), ErrorCode>;

    /// Start copying `len` bytes from the register at `src` into `buf`. On
    /// failure the buffer is handed back.
    fn read_from_peripheral(
        &self,
        src: usize,
        buf: &'a mut [u8],
        len: usize,
    ) -> Result<(), (ErrorCode, &'a mut [u8])>;

    /// Give back the buffer of a completed peripheral-to-memory transfer.
    fn return_buffer(&self) -> Option<&'a mut [u8]>;

    /// Stop the channel and give back any buffer it holds.
    fn abort(&self) -> Option<&'a mut [u8]>;
}
