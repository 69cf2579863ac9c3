//! Textual addresses for rbyd blocks and block-device geometry.
//!
//! An rbyd lives on one or more candidate blocks, optionally pinned to a
//! specific trunk offset:
//!
//! ```text
//! 0x12            block 0x12
//! 0x12.c4         block 0x12, trunk 0xc4
//! 0x{12,13}       redundant copies on blocks 0x12 and 0x13
//! 0x{12,13}.c4    redundant copies, trunk 0xc4
//! ```
//!
//! Geometry strings are `<block_size>` or `<block_size>x<block_count>`,
//! each in decimal or with a `0x`/`0o`/`0b` radix prefix.

use std::fmt;
use std::str::FromStr;

/// A parsed rbyd block address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbydAddr {
    /// Candidate blocks, in the order given. Never empty after parsing.
    pub blocks: Vec<u32>,
    /// Explicit trunk offset, if pinned.
    pub trunk: Option<u32>,
}

impl RbydAddr {
    pub fn new(blocks: Vec<u32>) -> Self {
        Self {
            blocks,
            trunk: None,
        }
    }

    pub fn with_trunk(blocks: Vec<u32>, trunk: u32) -> Self {
        Self {
            blocks,
            trunk: Some(trunk),
        }
    }
}

impl fmt::Display for RbydAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.blocks.len() == 1 {
            write!(f, "{:#x}", self.blocks[0])?;
        } else {
            write!(f, "0x{{")?;
            for (i, block) in self.blocks.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{block:x}")?;
            }
            write!(f, "}}")?;
        }
        if let Some(trunk) = self.trunk {
            write!(f, ".{trunk:x}")?;
        }
        Ok(())
    }
}

/// Failure to parse an [`RbydAddr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrParseError(String);

impl fmt::Display for AddrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rbyd address: {}", self.0)
    }
}

impl std::error::Error for AddrParseError {}

impl FromStr for RbydAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddrParseError(s.to_string());

        // The trunk suffix splits off first so brace contents stay intact.
        let (body, trunk) = match s.rsplit_once('.') {
            Some((body, trunk)) => {
                let trunk = parse_radixed(trunk, 16).ok_or_else(err)?;
                (body, Some(trunk))
            }
            None => (s, None),
        };

        let blocks = if let Some(inner) = body
            .strip_prefix("0x{")
            .or_else(|| body.strip_prefix("0X{"))
            .and_then(|rest| rest.strip_suffix('}'))
        {
            inner
                .split(',')
                .map(|part| parse_radixed(part.trim(), 16))
                .collect::<Option<Vec<u32>>>()
                .ok_or_else(err)?
        } else {
            vec![parse_radixed(body, 16).ok_or_else(err)?]
        };

        if blocks.is_empty() {
            return Err(err());
        }
        Ok(Self { blocks, trunk })
    }
}

/// Block-device geometry: the block size and how many blocks the device holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdGeometry {
    pub block_size: u32,
    /// Zero means "infer from the device extent".
    pub block_count: u32,
}

impl BdGeometry {
    pub fn new(block_size: u32, block_count: u32) -> Self {
        Self {
            block_size,
            block_count,
        }
    }
}

impl fmt::Display for BdGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.block_count == 0 {
            write!(f, "{}", self.block_size)
        } else {
            write!(f, "{}x{}", self.block_size, self.block_count)
        }
    }
}

/// Failure to parse a [`BdGeometry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryParseError(String);

impl fmt::Display for GeometryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid geometry: {}", self.0)
    }
}

impl std::error::Error for GeometryParseError {}

impl FromStr for BdGeometry {
    type Err = GeometryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || GeometryParseError(s.to_string());

        // The 'x' separator is searched past any leading radix prefix, so
        // "0x200x10" splits into "0x200" and "10".
        let search_from = if s.len() >= 2 && s.as_bytes()[0] == b'0' {
            match s.as_bytes()[1] {
                b'x' | b'X' | b'o' | b'O' | b'b' | b'B' => 2,
                _ => 0,
            }
        } else {
            0
        };

        let (size_str, count_str) = match s[search_from..].find(['x', 'X']) {
            Some(i) => {
                let i = search_from + i;
                (&s[..i], Some(&s[i + 1..]))
            }
            None => (s, None),
        };

        let block_size = parse_radixed(size_str, 10).ok_or_else(err)?;
        if block_size == 0 {
            return Err(err());
        }
        let block_count = match count_str {
            Some(count) => {
                let count = parse_radixed(count, 10).ok_or_else(err)?;
                if count == 0 {
                    return Err(err());
                }
                count
            }
            None => 0,
        };

        Ok(Self {
            block_size,
            block_count,
        })
    }
}

/// Parse an integer with an optional `0x`/`0o`/`0b` prefix, falling back
/// to `default_radix` for bare digits.
fn parse_radixed(s: &str, default_radix: u32) -> Option<u32> {
    let (digits, radix) = if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
    {
        (rest, 16)
    } else if let Some(rest) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        (rest, 8)
    } else if let Some(rest) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (rest, 2)
    } else {
        (s, default_radix)
    };

    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}
