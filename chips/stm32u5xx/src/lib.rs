// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Driver for the AES and SAES hardware cryptographic accelerators of the
//! STM32U5 MCU family.
//!
//! The driver offers ECB, CBC, CTR, GCM/GMAC and CCM in three transfer
//! styles (polling, interrupt and DMA), suspension of interrupt-driven
//! messages, and on SAES the hardware-derived keys, wrapped keys and keys
//! shared with the AES instance.
//!
//! STM32U5: <https://www.st.com/en/microcontrollers-microprocessors/stm32u5-series.html>

#![crate_name = "stm32u5xx"]
#![crate_type = "rlib"]
#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod aes;
pub mod dma;
pub mod registers;

mod config;
