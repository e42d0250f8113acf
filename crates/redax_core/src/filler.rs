//! Filler bytes written over redacted ranges.

use crate::error::Result;
use crate::traits::ByteStore;

/// Largest block handed to a single `write_at` call.
pub const FILL_BLOCK_SIZE: usize = 64 * 1024;

pub const DEFAULT_FAST_FILLER: u8 = b'?';

/// Decorative units cycled through in patterned mode. Content is cosmetic.
const PATTERN_UNITS: &[&str] = &[
    "[REDACTED]",
    "(o_o)",
    "░▒▓█▓▒░",
    "¯\\_(ツ)_/¯",
    "<PE removed>",
    "(^_^)",
    "♪ ♫ ♬",
    "[ ▇ ▄ ▅ █ ▇ ▂ ▃ ▁ ]",
    "墨塗り",
    "ʕ•ᴥ•ʔ",
    "NOTHING TO SEE HERE",
    "(╯°□°)╯︵ ┻━┻",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedactMode {
    /// Overwrite with a single repeated byte.
    Fast,
    /// Overwrite with cycling multi-byte decorative units.
    #[default]
    Patterned,
}

/// Produces filler for consecutive redaction ranges.
///
/// In patterned mode the unit cycle carries over from one range to the next,
/// while the last unit of every range is cut at the byte level so a range
/// never receives more than its length.
#[derive(Debug, Clone)]
pub struct Filler {
    mode: RedactMode,
    fast_byte: u8,
    next_unit: usize,
    block: Vec<u8>,
}

impl Filler {
    #[must_use]
    pub fn new(mode: RedactMode, fast_byte: u8) -> Self {
        Self {
            mode,
            fast_byte,
            next_unit: 0,
            block: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> RedactMode {
        self.mode
    }

    /// Overwrites exactly `len` bytes of `store` starting at `offset`.
    pub fn fill<S: ByteStore + ?Sized>(
        &mut self,
        store: &mut S,
        offset: u64,
        len: u64,
    ) -> Result<()> {
        let mut written = 0u64;
        while written < len {
            let chunk = (len - written).min(FILL_BLOCK_SIZE as u64) as usize;
            self.prepare(chunk);
            store.write_at(offset + written, &self.block)?;
            written += chunk as u64;
        }
        Ok(())
    }

    /// Builds the next `len` filler bytes into the reusable block buffer.
    fn prepare(&mut self, len: usize) {
        self.block.clear();
        match self.mode {
            RedactMode::Fast => self.block.resize(len, self.fast_byte),
            RedactMode::Patterned => {
                while self.block.len() < len {
                    let unit = PATTERN_UNITS[self.next_unit].as_bytes();
                    self.next_unit = (self.next_unit + 1) % PATTERN_UNITS.len();
                    let take = unit.len().min(len - self.block.len());
                    self.block.extend_from_slice(&unit[..take]);
                }
            }
        }
    }
}

impl Default for Filler {
    fn default() -> Self {
        Self::new(RedactMode::default(), DEFAULT_FAST_FILLER)
    }
}
