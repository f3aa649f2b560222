//! Engine-neutral types and traits.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    ColumnDescriptor, ColumnLengthOverride, CopyReport, CopySpec, EngineKind,
    ExternalProcessResult, SourceColumn, SqlKind,
};
pub use traits::{DataUtils, Dialect};
pub use value::{Batch, ReadColumn, SqlNullType, SqlValue};
