// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Pretty printing for byte counts, using [powers of 2 for larger
//! units](https://en.wikipedia.org/wiki/Byte#Units_based_on_powers_of_2).
//!
//! # Examples
//!
//! ```
//! use pretty::Bytes;
//!
//! assert_eq!(format!("{}", Bytes::from_u64(2)), "2 B");
//! assert_eq!(format!("{}", Bytes::from_u64(4096)), "4 KiB");
//! ```

use core::fmt;

/// Wraps a number of bytes for human-readable display.
///
pub struct Bytes(usize);

impl Bytes {
    /// Wraps a number of bytes.
    ///
    pub fn from_u64(n: u64) -> Self {
        Bytes(n as usize)
    }

    /// Wraps a number of bytes.
    ///
    pub fn from_usize(n: usize) -> Self {
        Bytes(n)
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let units = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
        let mut b = self.0;
        for unit in units.iter() {
            if b >= 1024 {
                b >>= 10;
                continue;
            }

            return write!(f, "{b} {unit}");
        }

        write!(f, "{b} ZiB")
    }
}
