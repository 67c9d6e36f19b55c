//! MySQL to PostgreSQL DDL translation.
//!
//! Every translator is a pure function from MySQL text (plus a few options)
//! to PostgreSQL statements:
//!
//! - [`translate_table`]: `CREATE TABLE`, column and table comments
//! - [`translate_index`]: secondary indexes
//! - [`translate_view`]: view bodies, including built-in function rewrites
//! - [`translate_function`]: single-expression stored functions
//! - [`translate_user`]: roles and their grants
//!
//! Emitted identifiers are always double-quoted.

mod functions;
mod grant;
mod index;
mod routine;
mod scan;
mod table;
mod typemap;
mod view;

pub use functions::{convert_date_format, rewrite_functions};
pub use grant::{
    create_role_sql, grant_table_sql, is_system_account, role_name,
    table_privileges, translate_grant, translate_user,
};
pub use index::{index_name, translate_index};
pub use routine::translate_function;
pub use table::{translate_table, TableDdl};
pub use typemap::{map_base_type, translate_type_expr};
pub use view::{lowercase_sql, translate_expression, translate_view};

/// Options shared by the translators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateOptions {
    /// Lowercase column names in emitted DDL and load column lists.
    pub lowercase_columns: bool,
}

impl TranslateOptions {
    /// Apply the column case policy to one name.
    pub fn column_name(&self, name: &str) -> String {
        if self.lowercase_columns {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}
