// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Provides access to serial ports and implements the `print` and
//! `println` macros used for kernel diagnostics.
//!
//! The memory manager has no filesystem and no higher-level logging
//! service of its own (crash/debug printing is explicitly an external
//! collaborator), so every diagnostic message — pressure-level
//! transitions, pager progress, out-of-memory crashes — goes out over
//! [`COM1`].
//!
//! # Safety
//!
//! [`print`] and [`println`] disable interrupts while running, to avoid
//! deadlocking against an interrupt handler that would also try to lock
//! [`COM1`].

#![no_std]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::missing_panics_doc)]
#![allow(clippy::panic)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(deprecated_in_future)]
#![deny(keyword_idents)]
#![allow(unsafe_code)]
#![deny(unused_crate_dependencies)]

use core::fmt::Write;
use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::instructions::interrupts::without_interrupts;

/// COM1 is the serial port used for kernel diagnostics.
///
pub static COM1: Mutex<SerialPort> = unsafe { Mutex::new(SerialPort::new(0x3f8)) };

/// Writes a string to COM1.
///
pub fn write_str(s: &str) -> core::fmt::Result {
    without_interrupts(|| COM1.lock().write_str(s))
}

/// Writes formatted text to COM1, acquiring it under a spin lock.
///
#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    without_interrupts(|| {
        COM1.lock().write_fmt(args).expect("printing to COM1 failed");
    });
}

/// Prints to the serial console.
///
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::_print(format_args!($($arg)*)));
}

/// Prints a line to the serial console.
///
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
