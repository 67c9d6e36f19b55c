//! Descriptors, row values, quoting helpers and the database seams.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    ColumnDescriptor, FunctionDescriptor, Inconsistency, IndexDescriptor, Stage,
    TableDescriptor, TablePrivilegeDescriptor, UserDescriptor, ViewDescriptor,
};
pub use traits::{BulkInsertOutcome, SourceCatalog, TargetExecutor, TargetTransaction};
pub use value::{PkValue, Row, SqlValue};
