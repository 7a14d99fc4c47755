// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Compile-time configuration of the AES driver.
//!
//! Every optional part of the driver is described by a boolean in `CONFIG`.
//! The driver tests these booleans with ordinary `if` statements, so disabled
//! paths are still type-checked and the optimizer folds them away.

/// Data structure holding compile-time configuration options.
pub(crate) struct Config {
    /// ECB and CBC chaining modes.
    pub(crate) ecb_cbc: bool,

    /// CTR chaining mode.
    pub(crate) ctr: bool,

    /// GCM and GMAC chaining modes, including GCM tag generation.
    pub(crate) gcm_gmac: bool,

    /// CCM chaining mode, including CCM tag generation.
    pub(crate) ccm: bool,

    /// DMA-driven transfers.
    pub(crate) dma: bool,

    /// Suspension of an interrupt-driven operation, and saving and restoring
    /// the peripheral context around a higher-priority message.
    pub(crate) suspend_resume: bool,

    /// Whether error flags are accumulated in the last-errors register copy.
    pub(crate) last_errors: bool,

    /// Whether `init` turns on the peripheral clock (and the RNG clock for
    /// SAES) and `deinit` leaves it to the board.
    pub(crate) clock_enable: bool,

    /// Print every error reported to a client on the debug output.
    pub(crate) trace_errors: bool,
}

/// The only place in this crate where Cargo features are consulted.
pub(crate) const CONFIG: Config = Config {
    ecb_cbc: !cfg!(feature = "no_ecb_cbc"),
    ctr: !cfg!(feature = "no_ctr"),
    gcm_gmac: !cfg!(feature = "no_gcm"),
    ccm: !cfg!(feature = "no_ccm"),
    dma: !cfg!(feature = "no_dma"),
    suspend_resume: !cfg!(feature = "no_suspend_resume"),
    last_errors: !cfg!(feature = "no_last_errors"),
    clock_enable: !cfg!(feature = "no_clock_enable"),
    trace_errors: cfg!(feature = "trace_errors"),
};
