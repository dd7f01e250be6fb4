//! Incremental UTF-8 validation for fragmented text messages.
//!
//! A multi-byte sequence may straddle a fragment boundary; the validator
//! carries the unfinished tail (at most three bytes) into the next fragment.

use crate::error::{Error, Result};

/// Expected total length of the sequence introduced by `lead`, or 0 for a
/// byte that cannot start a sequence.
const fn seq_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 0,
    }
}

/// Streaming UTF-8 validator.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    pending: [u8; 3],
    pending_len: u8,
}

impl Utf8Validator {
    /// Create a fresh validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the next fragment. With `fin` set, any sequence still open
    /// at the end of `data` is an error; otherwise its prefix is carried
    /// into the next call.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUtf8` on any malformed or prematurely ended sequence.
    pub fn push(&mut self, mut data: &[u8], fin: bool) -> Result<()> {
        if self.pending_len > 0 {
            let have = self.pending_len as usize;
            let need = seq_len(self.pending[0]);
            if need < 2 {
                return Err(Error::InvalidUtf8);
            }

            let mut seq = [0u8; 4];
            seq[..have].copy_from_slice(&self.pending[..have]);
            let take = (need - have).min(data.len());
            seq[have..have + take].copy_from_slice(&data[..take]);

            if have + take < need {
                if fin {
                    return Err(Error::InvalidUtf8);
                }
                self.pending[..have + take].copy_from_slice(&seq[..have + take]);
                self.pending_len = (have + take) as u8;
                return Ok(());
            }

            std::str::from_utf8(&seq[..need]).map_err(|_| Error::InvalidUtf8)?;
            self.pending_len = 0;
            data = &data[take..];
        }

        match std::str::from_utf8(data) {
            Ok(_) => Ok(()),
            Err(e) if !fin && e.error_len().is_none() => {
                // Unfinished sequence at the end of the fragment; stash it.
                let tail = &data[e.valid_up_to()..];
                self.pending[..tail.len()].copy_from_slice(tail);
                self.pending_len = tail.len() as u8;
                Ok(())
            }
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    /// Discard any carried sequence prefix.
    pub fn reset(&mut self) {
        self.pending_len = 0;
    }

    /// Whether a sequence is currently open across a fragment boundary.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_len > 0
    }
}

/// Validate a complete byte slice as UTF-8.
///
/// # Errors
///
/// `Error::InvalidUtf8` when the slice is not valid UTF-8.
pub fn validate_utf8(data: &[u8]) -> Result<()> {
    std::str::from_utf8(data)
        .map(|_| ())
        .map_err(|_| Error::InvalidUtf8)
}
