//! Sigmoid look-up table in Q4.12 format.
//!
//! The accelerator has no sigmoid unit, so the activation is a 256-entry
//! table lookup. Entry `i` samples `x = (i - 128) / 16`, covering [-8, 8).
//!
//! On disk the table is a `.mem` file for `$readmemh`: 256 lines of four
//! uppercase hex digits, in index order.

use crate::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Constants for the sigmoid LUT
pub const SIGMOID_LUT_SIZE: usize = 256;
pub const SIGMOID_FRAC_BITS: u32 = 12;
pub const SIGMOID_ONE_Q12: u32 = 1 << SIGMOID_FRAC_BITS; // 4096
pub const SIGMOID_INDEX_OFFSET: i32 = 128;
pub const SIGMOID_INDEX_SCALE: f64 = 16.0;

/// How an activation value becomes a table index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LutIndexMode {
    /// Saturate to [0, 255].
    #[default]
    Clamp,
    /// Wrap mod 256, like the datapath register.
    Wrap,
}

impl LutIndexMode {
    #[inline]
    pub fn index(self, v: i64) -> usize {
        match self {
            LutIndexMode::Clamp => v.clamp(0, SIGMOID_LUT_SIZE as i64 - 1) as usize,
            LutIndexMode::Wrap => v.rem_euclid(SIGMOID_LUT_SIZE as i64) as usize,
        }
    }
}

/// Sigmoid LUT in Q4.12 format.
///
/// `table[i] = floor(sigmoid((i - 128) / 16) * 4096) & 0xFFFF`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigmoidLut {
    pub table: [u16; SIGMOID_LUT_SIZE],
}

impl Default for SigmoidLut {
    fn default() -> Self {
        Self::generate()
    }
}

impl SigmoidLut {
    /// Generate the table. Only needs re-running if the Q4.12 format or the
    /// [-8, 8) domain changes.
    pub fn generate() -> Self {
        let mut table = [0u16; SIGMOID_LUT_SIZE];

        for (i, entry) in table.iter_mut().enumerate() {
            let x = Self::domain_value(i as u8);
            let y = 1.0 / (1.0 + (-x).exp());
            let fixed = (y * SIGMOID_ONE_Q12 as f64).floor() as i64;
            *entry = (fixed & 0xFFFF) as u16;
        }

        Self { table }
    }

    pub fn from_table(table: [u16; SIGMOID_LUT_SIZE]) -> Self {
        Self { table }
    }

    /// Real-domain input sampled by entry `index`.
    #[inline]
    pub fn domain_value(index: u8) -> f64 {
        (index as i32 - SIGMOID_INDEX_OFFSET) as f64 / SIGMOID_INDEX_SCALE
    }

    #[inline]
    pub fn lookup(&self, index: u8) -> u16 {
        self.table[index as usize]
    }

    /// Write the `.mem` representation.
    pub fn write_mem<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for &v in &self.table {
            writeln!(writer, "{:04X}", v)?;
        }
        writer.flush()
    }

    /// Parse a `.mem` table: exactly 256 lines of four uppercase hex
    /// digits and nothing else on the line. A final newline is optional;
    /// CRLF endings, padding and blank lines are rejected.
    pub fn read_mem<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = [0u16; SIGMOID_LUT_SIZE];
        let mut count = 0usize;

        for (i, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            let line_no = i + 1;

            if count == SIGMOID_LUT_SIZE {
                return Err(CodecError::lut_format(
                    line_no,
                    format!("more than {} lines", SIGMOID_LUT_SIZE),
                ));
            }
            table[count] = parse_mem_entry(&line).ok_or_else(|| {
                CodecError::lut_format(
                    line_no,
                    format!("expected 4 uppercase hex digits, got {:?}", String::from_utf8_lossy(&line)),
                )
            })?;
            count += 1;
        }

        if count != SIGMOID_LUT_SIZE {
            return Err(CodecError::lut_format(
                count,
                format!("expected {} entries, found {}", SIGMOID_LUT_SIZE, count),
            ));
        }

        Ok(Self::from_table(table))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_mem(BufWriter::new(file))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::read_mem(BufReader::new(file))
    }

    /// Indices where `self` and `other` disagree.
    pub fn diff(&self, other: &SigmoidLut) -> Vec<(usize, u16, u16)> {
        self.table
            .iter()
            .zip(other.table.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, (&a, &b))| (i, a, b))
            .collect()
    }
}

/// One `.mem` line: exactly `[0-9A-F]{4}`.
fn parse_mem_entry(line: &[u8]) -> Option<u16> {
    if line.len() != 4 {
        return None;
    }
    line.iter().try_fold(0u16, |acc, &b| {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'A'..=b'F' => b - b'A' + 10,
            _ => return None,
        };
        Some(acc << 4 | digit as u16)
    })
}

/// Dequantize a Q4.12 sample.
#[inline]
pub fn q12_to_f32(raw: u16) -> f32 {
    raw as f32 / SIGMOID_ONE_Q12 as f32
}
