use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of bytes a string field stores.
pub const STRING_LEN: usize = 128;

/// Column types. Every type has a fixed on-page width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// 4 bytes, little-endian i32
    Int,
    /// 4-byte length followed by `STRING_LEN` bytes, zero padded
    Str,
}

impl FieldType {
    pub fn len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str => 4 + STRING_LEN,
        }
    }

    /// Decodes one value of this type from the front of `data`.
    pub fn parse(&self, data: &[u8]) -> Option<Field> {
        if data.len() < self.len() {
            return None;
        }
        match self {
            FieldType::Int => {
                let bytes: [u8; 4] = data[0..4].try_into().ok()?;
                Some(Field::Int(i32::from_le_bytes(bytes)))
            }
            FieldType::Str => {
                let bytes: [u8; 4] = data[0..4].try_into().ok()?;
                let len = u32::from_le_bytes(bytes) as usize;
                if len > STRING_LEN {
                    return None;
                }
                let text = std::str::from_utf8(&data[4..4 + len]).ok()?;
                Some(Field::Str(text.to_string()))
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Str => write!(f, "STRING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Str(_) => FieldType::Str,
        }
    }

    /// Writes exactly `field_type().len()` bytes into `out`.
    pub fn serialize_into(&self, out: &mut [u8]) {
        match self {
            Field::Int(v) => out[0..4].copy_from_slice(&v.to_le_bytes()),
            Field::Str(s) => {
                let mut end = s.len().min(STRING_LEN);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                out[0..4].copy_from_slice(&(end as u32).to_le_bytes());
                out[4..4 + end].copy_from_slice(&s.as_bytes()[..end]);
                out[4 + end..4 + STRING_LEN].fill(0);
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}
