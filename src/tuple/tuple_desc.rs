use serde::{Deserialize, Serialize};
use std::fmt;

use super::FieldType;
use crate::common::{DbError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TDItem {
    pub field_type: FieldType,
    pub name: Option<String>,
}

/// Schema of a tuple: an ordered list of typed, optionally named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleDesc {
    items: Vec<TDItem>,
}

impl TupleDesc {
    pub fn new(types: &[FieldType], names: &[&str]) -> Self {
        let items = types
            .iter()
            .enumerate()
            .map(|(i, field_type)| TDItem {
                field_type: *field_type,
                name: names.get(i).map(|n| n.to_string()),
            })
            .collect();
        Self { items }
    }

    pub fn unnamed(types: &[FieldType]) -> Self {
        Self::new(types, &[])
    }

    /// Concatenation of two schemas, as produced by a join.
    pub fn combine(left: &TupleDesc, right: &TupleDesc) -> Self {
        let items = left.items.iter().chain(right.items.iter()).cloned().collect();
        Self { items }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> Result<FieldType> {
        self.items
            .get(i)
            .map(|item| item.field_type)
            .ok_or_else(|| DbError::UnknownField(i.to_string()))
    }

    pub fn field_name(&self, i: usize) -> Result<Option<&str>> {
        self.items
            .get(i)
            .map(|item| item.name.as_deref())
            .ok_or_else(|| DbError::UnknownField(i.to_string()))
    }

    /// Index of the field called `name`. A `table.` qualifier is ignored.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        let bare = match name.find('.') {
            Some(dot) => &name[dot + 1..],
            None => name,
        };
        self.items
            .iter()
            .position(|item| item.name.as_deref() == Some(bare))
            .ok_or_else(|| DbError::UnknownField(name.to_string()))
    }

    /// Width in bytes of one serialized tuple.
    pub fn byte_size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.len()).sum()
    }

    pub fn items(&self) -> &[TDItem] {
        &self.items
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}({})", item.field_type, item.name.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_keeps_order_and_names() {
        let left = TupleDesc::new(&[FieldType::Int], &["id"]);
        let right = TupleDesc::new(&[FieldType::Str, FieldType::Int], &["name"]);
        let joined = TupleDesc::combine(&left, &right);

        assert_eq!(joined.num_fields(), 3);
        assert_eq!(joined.byte_size(), 4 + 132 + 4);
        assert_eq!(joined.field_name(1).unwrap(), Some("name"));
        assert_eq!(joined.field_name(2).unwrap(), None);
        assert_eq!(joined.index_of("orders.name").unwrap(), 1);
        assert!(joined.field_type(3).is_err());
    }
}
