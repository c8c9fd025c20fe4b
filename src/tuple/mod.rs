mod field;
mod tuple;
mod tuple_desc;

pub use field::{Field, FieldType, STRING_LEN};
pub use tuple::Tuple;
pub use tuple_desc::{TDItem, TupleDesc};
