use std::fmt;
use std::sync::Arc;

use super::{Field, TupleDesc};
use crate::common::{DbError, RecordID, Result};

/// A row: field values conforming to a schema, plus its location once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Field>,
    record_id: Option<RecordID>,
}

impl Tuple {
    pub fn new(desc: Arc<TupleDesc>, fields: Vec<Field>) -> Result<Self> {
        if fields.len() != desc.num_fields() {
            return Err(DbError::SchemaMismatch(format!(
                "expected {} fields, got {}",
                desc.num_fields(),
                fields.len()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            let expected = desc.field_type(i)?;
            if field.field_type() != expected {
                return Err(DbError::SchemaMismatch(format!(
                    "field {} is {}, expected {}",
                    i,
                    field.field_type(),
                    expected
                )));
            }
        }
        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get_field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> Result<()> {
        let expected = self.desc.field_type(i)?;
        if field.field_type() != expected {
            return Err(DbError::SchemaMismatch(format!(
                "field {} is {}, expected {}",
                i,
                field.field_type(),
                expected
            )));
        }
        self.fields[i] = field;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordID> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordID>) {
        self.record_id = record_id;
    }

    /// Writes the fixed-width encoding into `out`, which must be
    /// `desc.byte_size()` bytes long.
    pub fn serialize_into(&self, out: &mut [u8]) {
        let mut offset = 0;
        for field in &self.fields {
            let len = field.field_type().len();
            field.serialize_into(&mut out[offset..offset + len]);
            offset += len;
        }
    }

    pub fn parse(desc: Arc<TupleDesc>, data: &[u8]) -> Option<Self> {
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for item in desc.items() {
            let len = item.field_type.len();
            fields.push(item.field_type.parse(data.get(offset..offset + len)?)?);
            offset += len;
        }
        Some(Self {
            desc,
            fields,
            record_id: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
