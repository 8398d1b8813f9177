// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Provides pretty printing for various data types used in memory-manager
//! diagnostics, such as a number of bytes or a percentage.

#![no_std]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(deprecated_in_future)]
#![deny(keyword_idents)]
#![forbid(unsafe_code)]
#![deny(unused_crate_dependencies)]

mod bytes;

pub use bytes::Bytes;
