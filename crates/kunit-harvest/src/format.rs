//! Rendering recorded bytes as C literals.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Radix {
    #[default]
    Decimal,
    Hexadecimal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Cannot format a {width}-byte value; expected 1, 2, 4 or 8 bytes")]
    UnsupportedWidth { width: usize },
}

/// Interpret 1, 2, 4 or 8 little-endian bytes as a signed integer.
/// Negative hexadecimal values use signed magnitude: `-3` is `-0x3`.
pub fn format_value(bytes: &[u8], radix: Radix) -> Result<String, FormatError> {
    let value: i64 = match *bytes {
        [a] => i8::from_le_bytes([a]).into(),
        [a, b] => i16::from_le_bytes([a, b]).into(),
        [a, b, c, d] => i32::from_le_bytes([a, b, c, d]).into(),
        [a, b, c, d, e, f, g, h] => i64::from_le_bytes([a, b, c, d, e, f, g, h]),
        _ => return Err(FormatError::UnsupportedWidth { width: bytes.len() }),
    };
    Ok(match radix {
        Radix::Decimal => value.to_string(),
        Radix::Hexadecimal if value < 0 => format!("-{:#x}", value.unsigned_abs()),
        Radix::Hexadecimal => format!("{value:#x}"),
    })
}

/// Format a whole watched buffer. A buffer holding more than one element of
/// `element_size` bytes renders as a brace list `{v0, v1, ...}`.
pub fn format_buffer(bytes: &[u8], element_size: Option<usize>, radix: Radix) -> Result<String, FormatError> {
    match element_size {
        Some(width) if width > 0 && bytes.len() > width && bytes.len() % width == 0 => {
            let items = bytes
                .chunks(width)
                .map(|chunk| format_value(chunk, radix))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("{{{}}}", items.join(", ")))
        }
        _ => format_value(bytes, radix),
    }
}

/// Raw bytes as an unsigned brace list, for values with no integer width
/// such as structs: `{0x01, 0x00}` or `{1, 0}`.
pub fn format_bytes(bytes: &[u8], radix: Radix) -> String {
    let items: Vec<String> = bytes
        .iter()
        .map(|byte| match radix {
            Radix::Decimal => byte.to_string(),
            Radix::Hexadecimal => format!("{byte:#04x}"),
        })
        .collect();
    format!("{{{}}}", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extremes() {
        assert_eq!(format_value(&[0x80], Radix::Decimal).unwrap(), "-128");
        assert_eq!(format_value(&[0x80], Radix::Hexadecimal).unwrap(), "-0x80");
        let min = i64::MIN.to_le_bytes();
        assert_eq!(format_value(&min, Radix::Hexadecimal).unwrap(), "-0x8000000000000000");
    }
}
