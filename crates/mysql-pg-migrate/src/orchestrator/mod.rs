//! Stage scheduler: reads source metadata once, then runs the enabled phases
//! in a fixed order.
//!
//! Within a phase the work items are cut into batches. Every batch runs on
//! its own task and handles its items one after another; a single semaphore
//! of width `concurrency`, shared by all phases, bounds the items in flight.
//! A hard error stops the rest of its own batch only; the other batches run
//! to completion and the first error is returned once every batch has ended.

mod phase;

pub use phase::Phase;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::config::{Config, ConversionOptions};
use crate::core::{
    FunctionDescriptor, IndexDescriptor, Inconsistency, SourceCatalog, Stage, TableDescriptor,
    TablePrivilegeDescriptor, TargetExecutor, UserDescriptor, ViewDescriptor,
};
use crate::dialect::{
    role_name, table_privileges, translate_function, translate_index, translate_table,
    translate_user, translate_view, TranslateOptions,
};
use crate::drivers::{MysqlCatalog, PostgresExecutor};
use crate::error::{MigrateError, Result};
use crate::progress::{RowProgress, TableBar, TaskCounter};
use crate::report::MigrationSummary;
use crate::transfer::{TransferConfig, TransferEngine};

/// One unit of work, counted once toward total progress.
#[derive(Debug, Clone)]
enum Task {
    CreateTable(TableDescriptor),
    LoadTable(String),
    CreateIndex(IndexDescriptor),
    CreateView(ViewDescriptor),
    CreateFunction(FunctionDescriptor),
    CreateUser(UserDescriptor),
    GrantTable(TablePrivilegeDescriptor),
}

/// State shared by every worker, always behind one lock.
struct Hub {
    tasks: TaskCounter,
    show_progress: bool,
    bars: HashMap<String, TableBar>,
    stages: Vec<Stage>,
    inconsistencies: Vec<Inconsistency>,
    failed_tables: Vec<String>,
    untranslated: Vec<String>,
    rows_transferred: u64,
}

impl Hub {
    fn task_done(&mut self) {
        self.tasks.complete(1);
        if self.show_progress {
            info!("Progress: {}", self.tasks.summary());
        }
    }
}

/// Draws per-table bars under the hub lock.
struct HubProgress(Arc<Mutex<Hub>>);

#[async_trait]
impl RowProgress for HubProgress {
    async fn rows_loaded(&self, table: &str, done: u64, total: u64) {
        let mut hub = self.0.lock().await;
        if !hub.show_progress {
            return;
        }
        let line = hub
            .bars
            .entry(table.to_string())
            .or_insert_with(|| TableBar::new(table, total))
            .update(done);
        if let Some(line) = line {
            eprintln!("{}", line);
        }
    }
}

/// Everything a task needs, shared by all batches of a run.
struct Worker {
    source: Arc<dyn SourceCatalog>,
    target: Arc<dyn TargetExecutor>,
    transfer: TransferEngine,
    translate: TranslateOptions,
    skip_existing_tables: bool,
    emit_grants: bool,
    target_database: String,
    target_schema: String,
    hub: Arc<Mutex<Hub>>,
}

impl Worker {
    /// Run one task. Only hard errors are returned; object-level failures
    /// are logged, recorded and counted as done.
    async fn run(&self, task: Task) -> Result<()> {
        let result = match task {
            Task::CreateTable(table) => self.create_table(&table).await,
            Task::LoadTable(name) => self.load_table(&name).await,
            Task::CreateIndex(index) => self.create_index(&index).await,
            Task::CreateView(view) => self.create_view(&view).await,
            Task::CreateFunction(function) => self.create_function(&function).await,
            Task::CreateUser(user) => self.create_user(user).await,
            Task::GrantTable(privilege) => self.grant_table(&privilege).await,
        };

        let mut hub = self.hub.lock().await;
        match result {
            Ok(()) => {}
            Err(MigrateError::Translate { object, message }) => {
                error!("Translation failed for {}: {}", object, message);
                hub.untranslated.push(object);
            }
            Err(e) => return Err(e),
        }
        hub.task_done();
        Ok(())
    }

    async fn create_table(&self, table: &TableDescriptor) -> Result<()> {
        if self.skip_existing_tables && self.target.table_exists(&table.name).await? {
            info!("{}: already exists on target, skipping", table.name);
            return Ok(());
        }
        let ddl = translate_table(&table.ddl, &self.translate)
            .map_err(|e| retag_translate(e, &table.name))?;
        for statement in ddl.statements() {
            self.target.exec_ddl(&statement).await?;
        }
        info!("{}: table created", table.name);
        Ok(())
    }

    async fn load_table(&self, name: &str) -> Result<()> {
        match self.transfer.execute(name).await {
            Ok(stats) => {
                let mut hub = self.hub.lock().await;
                hub.rows_transferred += stats.rows;
                if let Some(inconsistency) = stats.inconsistency {
                    hub.inconsistencies.push(inconsistency);
                }
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("{}: data transfer aborted: {}", name, e);
                self.hub.lock().await.failed_tables.push(name.to_string());
                Ok(())
            }
        }
    }

    async fn create_index(&self, index: &IndexDescriptor) -> Result<()> {
        let sql = translate_index(index, &self.translate)?;
        if sql.is_empty() {
            return Ok(());
        }
        self.target.exec_ddl(&sql).await
    }

    async fn create_view(&self, view: &ViewDescriptor) -> Result<()> {
        let sql = translate_view(view, self.source.database(), &self.translate)?;
        self.target.exec_ddl(&sql).await?;
        info!("{}: view created", view.name);
        Ok(())
    }

    async fn create_function(&self, function: &FunctionDescriptor) -> Result<()> {
        let sql = translate_function(function, &self.translate)?;
        self.target.exec_ddl(&sql).await?;
        info!("{}: function created", function.name);
        Ok(())
    }

    async fn create_user(&self, mut user: UserDescriptor) -> Result<()> {
        if self.emit_grants {
            user.grants = self.source.list_user_grants(&user.login, &user.host).await?;
        }
        let statements = translate_user(&user, &self.target_database, &self.target_schema)?;
        for statement in statements {
            self.target.exec_ddl(&statement).await?;
        }
        Ok(())
    }

    async fn grant_table(&self, privilege: &TablePrivilegeDescriptor) -> Result<()> {
        let privileges = table_privileges(&privilege.privileges);
        if privileges.is_empty() {
            return Ok(());
        }
        self.target
            .grant(&role_name(&privilege.user), &privilege.table, &privileges)
            .await
    }
}

/// Put the table name on translate errors that carry a generic object.
fn retag_translate(e: MigrateError, table: &str) -> MigrateError {
    match e {
        MigrateError::Translate { message, .. } => MigrateError::translate(table, message),
        other => other,
    }
}

/// Filter the source tables by the include and exclude lists, keeping
/// source order. Unknown names in the include list are logged.
pub fn select_tables(
    tables: Vec<TableDescriptor>,
    options: &ConversionOptions,
) -> Vec<TableDescriptor> {
    let mut tables = tables;
    if options.use_table_list {
        let known: HashSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        for name in &options.table_list {
            if !known.contains(name.as_str()) {
                warn!("Table {} from table_list not found in source", name);
            }
        }
        let wanted: HashSet<&str> = options.table_list.iter().map(String::as_str).collect();
        tables.retain(|t| wanted.contains(t.name.as_str()));
    }
    if options.exclude_use_table_list {
        let excluded: HashSet<&str> = options
            .exclude_table_list
            .iter()
            .map(String::as_str)
            .collect();
        tables.retain(|t| !excluded.contains(t.name.as_str()));
    }
    tables
}

/// Source metadata needed by the enabled phases.
#[derive(Default)]
struct Inventory {
    tables: Vec<TableDescriptor>,
    views: Vec<ViewDescriptor>,
    functions: Vec<FunctionDescriptor>,
    users: Vec<UserDescriptor>,
    table_privileges: Vec<TablePrivilegeDescriptor>,
}

impl Inventory {
    fn tasks(&self, phase: Phase) -> Vec<Task> {
        match phase {
            Phase::TableDdl => self.tables.iter().cloned().map(Task::CreateTable).collect(),
            Phase::Data => self
                .tables
                .iter()
                .map(|t| Task::LoadTable(t.name.clone()))
                .collect(),
            Phase::Indexes => self
                .tables
                .iter()
                .flat_map(|t| t.indexes.iter().cloned())
                .map(Task::CreateIndex)
                .collect(),
            Phase::Views => self.views.iter().cloned().map(Task::CreateView).collect(),
            Phase::Functions => self
                .functions
                .iter()
                .cloned()
                .map(Task::CreateFunction)
                .collect(),
            Phase::Users => self.users.iter().cloned().map(Task::CreateUser).collect(),
            Phase::TablePrivileges => self
                .table_privileges
                .iter()
                .cloned()
                .map(Task::GrantTable)
                .collect(),
        }
    }
}

/// Drives a full migration run.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceCatalog>,
    target: Arc<dyn TargetExecutor>,
}

impl Orchestrator {
    /// Open both pools from the configuration.
    pub async fn connect(config: Config) -> Result<Self> {
        let source = MysqlCatalog::new(&config.mysql).await?;
        let target = PostgresExecutor::new(&config.postgresql).await?;
        Ok(Self::new(config, Arc::new(source), Arc::new(target)))
    }

    pub fn new(
        config: Config,
        source: Arc<dyn SourceCatalog>,
        target: Arc<dyn TargetExecutor>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// Run every enabled phase and return the summary.
    pub async fn run(self) -> Result<MigrationSummary> {
        let started_at = Local::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);
        let options = self.config.options().clone();
        let phases = Phase::enabled(&options);
        if phases.is_empty() {
            warn!("No phase enabled in conversion.options, nothing to do");
            return Ok(MigrationSummary::empty());
        }

        info!("Reading source metadata from {}", self.source.database());
        let inventory = self.inventory(&phases, &options).await?;
        if options.use_table_list && inventory.tables.is_empty() {
            info!("No table matched table_list, nothing to do");
            return Ok(MigrationSummary::empty());
        }

        let total: usize = phases.iter().map(|p| inventory.tasks(*p).len()).sum();
        info!("{} tasks across {} phases", total, phases.len());

        let hub = Arc::new(Mutex::new(Hub {
            tasks: TaskCounter::new(total),
            show_progress: self.config.run.show_progress,
            bars: HashMap::new(),
            stages: Vec::new(),
            inconsistencies: Vec::new(),
            failed_tables: Vec::new(),
            untranslated: Vec::new(),
            rows_transferred: 0,
        }));

        let limits = self.config.limits();
        let translate = TranslateOptions {
            lowercase_columns: options.lowercase_columns,
        };
        let transfer = TransferEngine::new(
            self.source.clone(),
            self.target.clone(),
            TransferConfig {
                max_rows_per_batch: limits.get_max_rows_per_batch(),
                batch_insert_size: limits.get_batch_insert_size(),
                truncate_before_sync: options.truncate_before_sync,
                validate_data: options.validate_data,
                translate,
            },
        )
        .with_progress(Arc::new(HubProgress(hub.clone())));

        if let Some(mbps) = limits.bandwidth_mbps {
            info!("bandwidth_mbps={} is advisory and not enforced", mbps);
        }

        let worker = Arc::new(Worker {
            source: self.source.clone(),
            target: self.target.clone(),
            transfer,
            translate,
            skip_existing_tables: options.skip_existing_tables,
            emit_grants: options.grant,
            target_database: self.config.postgresql.database.clone(),
            target_schema: self.config.postgresql.schema.clone(),
            hub: hub.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(limits.get_concurrency().max(1)));

        for (n, phase) in phases.iter().enumerate() {
            info!("Phase {}: {}", n + 1, phase.name());
            let tasks = inventory.tasks(*phase);
            let objects = tasks.len();
            let stage_start = Local::now();
            let result = run_phase(
                worker.clone(),
                semaphore.clone(),
                tasks,
                phase.batch_size(limits),
            )
            .await;

            hub.lock().await.stages.push(Stage {
                name: phase.name().to_string(),
                started_at: stage_start,
                finished_at: Local::now(),
                objects,
            });

            if let Err(e) = result {
                error!("Phase {} failed: {}", phase.name(), e);
                return Err(e);
            }
        }

        let hub = hub.lock().await;
        let summary = MigrationSummary {
            run_id,
            started_at,
            finished_at: Local::now(),
            stages: hub.stages.clone(),
            inconsistencies: hub.inconsistencies.clone(),
            failed_tables: hub.failed_tables.clone(),
            untranslated: hub.untranslated.clone(),
            total_tasks: hub.tasks.total(),
            completed_tasks: hub.tasks.completed(),
            rows_transferred: hub.rows_transferred,
        };
        info!(
            "Migration finished: {}/{} tasks, {} rows in {:.1}s",
            summary.completed_tasks,
            summary.total_tasks,
            summary.rows_transferred,
            summary.duration_secs()
        );
        Ok(summary)
    }

    async fn inventory(&self, phases: &[Phase], options: &ConversionOptions) -> Result<Inventory> {
        let mut inventory = Inventory::default();

        if phases.iter().any(|p| p.needs_tables()) {
            let tables = self.source.list_tables().await?;
            info!("Found {} tables", tables.len());
            inventory.tables = select_tables(tables, options);
        }
        if phases.contains(&Phase::Views) {
            inventory.views = self.source.list_views().await?;
        }
        if phases.contains(&Phase::Functions) {
            inventory.functions = self.source.list_functions().await?;
        }
        if phases.contains(&Phase::Users) {
            inventory.users = self.source.list_users().await?;
        }
        if phases.contains(&Phase::TablePrivileges) {
            let database = self.source.database();
            let selected: HashSet<&str> =
                inventory.tables.iter().map(|t| t.name.as_str()).collect();
            let filter_tables = !inventory.tables.is_empty();
            inventory.table_privileges = self
                .source
                .list_table_privileges()
                .await?
                .into_iter()
                .filter(|p| p.db == database)
                .filter(|p| !filter_tables || selected.contains(p.table.as_str()))
                .collect();
        }
        Ok(inventory)
    }
}

/// Run one phase: one task per batch, all batches awaited.
async fn run_phase(
    worker: Arc<Worker>,
    semaphore: Arc<Semaphore>,
    tasks: Vec<Task>,
    batch_size: usize,
) -> Result<()> {
    let (err_tx, mut err_rx) = mpsc::channel::<MigrateError>(1);
    let mut handles = Vec::new();

    let mut tasks = tasks.into_iter().peekable();
    while tasks.peek().is_some() {
        let batch: Vec<Task> = tasks.by_ref().take(batch_size.max(1)).collect();
        let worker = worker.clone();
        let semaphore = semaphore.clone();
        let err_tx = err_tx.clone();

        handles.push(tokio::spawn(async move {
            for task in batch {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let result = worker.run(task).await;
                drop(permit);
                if let Err(e) = result {
                    // Only the first error is kept.
                    let _ = err_tx.try_send(e);
                    break;
                }
            }
        }));
    }
    drop(err_tx);

    let mut first_error = None;
    for handle in handles {
        if let Err(e) = handle.await {
            first_error.get_or_insert(MigrateError::Internal(format!("batch task panicked: {}", e)));
        }
        if let Ok(e) = err_rx.try_recv() {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Check the connections flagged with `test_only` and report their versions.
pub async fn test_connections(config: &Config) -> Result<()> {
    if config.mysql.test_only {
        let source = MysqlCatalog::new(&config.mysql).await?;
        info!("MySQL connection OK: {}", source.server_version().await?);
        source.close().await;
    }
    if config.postgresql.test_only {
        let target = PostgresExecutor::new(&config.postgresql).await?;
        info!("PostgreSQL connection OK: {}", target.server_version().await?);
        target.close();
    }
    Ok(())
}
