use crate::config::{ConversionLimits, ConversionOptions};

/// Migration phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    TableDdl,
    Data,
    Indexes,
    Views,
    Functions,
    Users,
    TablePrivileges,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::TableDdl,
        Phase::Data,
        Phase::Indexes,
        Phase::Views,
        Phase::Functions,
        Phase::Users,
        Phase::TablePrivileges,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::TableDdl => "TableDDL",
            Phase::Data => "Data",
            Phase::Indexes => "Indexes",
            Phase::Views => "Views",
            Phase::Functions => "Functions",
            Phase::Users => "Users",
            Phase::TablePrivileges => "TablePrivileges",
        }
    }

    pub fn is_enabled(&self, options: &ConversionOptions) -> bool {
        match self {
            Phase::TableDdl => options.tableddl,
            Phase::Data => options.data,
            Phase::Indexes => options.indexes,
            Phase::Views => options.view,
            Phase::Functions => options.functions,
            Phase::Users => options.users,
            Phase::TablePrivileges => options.table_privileges,
        }
    }

    /// Enabled phases, in execution order.
    pub fn enabled(options: &ConversionOptions) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|p| p.is_enabled(options))
            .collect()
    }

    /// Items per batch.
    pub fn batch_size(&self, limits: &ConversionLimits) -> usize {
        match self {
            Phase::TableDdl | Phase::Data | Phase::Views | Phase::TablePrivileges => {
                limits.get_max_ddl_per_batch()
            }
            Phase::Indexes => limits.get_max_indexes_per_batch(),
            Phase::Functions => limits.get_max_functions_per_batch(),
            Phase::Users => limits.get_max_users_per_batch(),
        }
    }

    /// Whether the phase works from the selected table list.
    pub fn needs_tables(&self) -> bool {
        matches!(
            self,
            Phase::TableDdl | Phase::Data | Phase::Indexes | Phase::TablePrivileges
        )
    }
}
