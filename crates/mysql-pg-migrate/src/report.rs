//! End-of-run summary.

use chrono::{DateTime, Local};

use crate::core::{Inconsistency, Stage};

/// Everything the scheduler learned during a run.
#[derive(Debug, Clone)]
pub struct MigrationSummary {
    pub run_id: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub stages: Vec<Stage>,
    pub inconsistencies: Vec<Inconsistency>,
    /// Tables whose data transfer aborted.
    pub failed_tables: Vec<String>,
    /// Objects skipped because they could not be translated.
    pub untranslated: Vec<String>,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub rows_transferred: u64,
}

impl MigrationSummary {
    pub fn empty() -> Self {
        let now = Local::now();
        Self {
            run_id: String::new(),
            started_at: now,
            finished_at: now,
            stages: Vec::new(),
            inconsistencies: Vec::new(),
            failed_tables: Vec::new(),
            untranslated: Vec::new(),
            total_tasks: 0,
            completed_tasks: 0,
            rows_transferred: 0,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// No table failed and every count matched.
    pub fn is_clean(&self) -> bool {
        self.failed_tables.is_empty() && self.inconsistencies.is_empty()
    }
}

const STAGE_WIDTH: usize = 16;
const TABLE_WIDTH: usize = 32;

fn rule(widths: &[usize]) -> String {
    let cells: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    format!("+{}+", cells.join("+"))
}

/// Phase table: `Stage | Start | End | Duration | Objects`.
pub fn render_stages(stages: &[Stage]) -> String {
    let widths = [STAGE_WIDTH, 8, 8, 10, 7];
    let mut out = Vec::with_capacity(stages.len() + 4);
    out.push(rule(&widths));
    out.push(format!(
        "| {:<16} | {:<8} | {:<8} | {:>10} | {:>7} |",
        "Stage", "Start", "End", "Duration", "Objects"
    ));
    out.push(rule(&widths));
    for stage in stages {
        out.push(format!(
            "| {:<16} | {} | {} | {:>9.2}s | {:>7} |",
            truncate(&stage.name, STAGE_WIDTH),
            stage.started_at.format("%H:%M:%S"),
            stage.finished_at.format("%H:%M:%S"),
            stage.duration_secs(),
            stage.objects
        ));
    }
    out.push(rule(&widths));
    out.join("\n")
}

/// Count mismatch table: `Table | Source rows | Target rows`.
pub fn render_inconsistencies(items: &[Inconsistency]) -> String {
    let widths = [TABLE_WIDTH, 12, 12];
    let mut out = Vec::with_capacity(items.len() + 4);
    out.push(rule(&widths));
    out.push(format!(
        "| {:<32} | {:>12} | {:>12} |",
        "Table", "Source rows", "Target rows"
    ));
    out.push(rule(&widths));
    for item in items {
        out.push(format!(
            "| {:<32} | {:>12} | {:>12} |",
            truncate(&item.table, TABLE_WIDTH),
            item.source_rows,
            item.target_rows
        ));
    }
    out.push(rule(&widths));
    out.join("\n")
}

/// Full report printed by the CLI after a successful run.
pub fn render_summary(summary: &MigrationSummary) -> String {
    let mut out = String::new();
    if !summary.run_id.is_empty() {
        out.push_str(&format!("Run {}\n", summary.run_id));
    }
    out.push_str(&render_stages(&summary.stages));
    out.push('\n');
    out.push_str(&format!(
        "Tasks: {}/{}  Rows: {}  Elapsed: {:.2}s\n",
        summary.completed_tasks,
        summary.total_tasks,
        summary.rows_transferred,
        summary.duration_secs()
    ));

    if !summary.inconsistencies.is_empty() {
        out.push_str("\nRow count mismatches:\n");
        out.push_str(&render_inconsistencies(&summary.inconsistencies));
        out.push('\n');
    }
    if !summary.failed_tables.is_empty() {
        out.push_str(&format!(
            "\nFailed tables ({}): {}\n",
            summary.failed_tables.len(),
            summary.failed_tables.join(", ")
        ));
    }
    if !summary.untranslated.is_empty() {
        out.push_str(&format!(
            "\nSkipped (not translatable): {}\n",
            summary.untranslated.join(", ")
        ));
    }
    out
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(width - 1).collect();
        t.push('~');
        t
    }
}
