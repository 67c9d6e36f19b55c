//! Run progress: overall task counter and per-table row bars.

use async_trait::async_trait;

/// Cells in a per-table bar.
pub const BAR_CELLS: usize = 20;

/// Smallest percent advance that forces a redraw when the cell count is
/// unchanged.
const MIN_PERCENT_STEP: f64 = 0.5;

/// Receives row progress from the data pipeline.
#[async_trait]
pub trait RowProgress: Send + Sync {
    async fn rows_loaded(&self, table: &str, done: u64, total: u64);
}

/// Ignores all progress.
pub struct NoProgress;

#[async_trait]
impl RowProgress for NoProgress {
    async fn rows_loaded(&self, _table: &str, _done: u64, _total: u64) {}
}

/// Completed versus total tasks across all enabled phases.
#[derive(Debug, Clone, Default)]
pub struct TaskCounter {
    total: usize,
    completed: usize,
}

impl TaskCounter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
        }
    }

    /// Mark `n` tasks done. The count never passes the total.
    pub fn complete(&mut self, n: usize) -> usize {
        self.completed = (self.completed + n).min(self.total);
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }

    /// `completed/total (pct%)`
    pub fn summary(&self) -> String {
        format!("{}/{} ({:.1}%)", self.completed, self.total, self.percent())
    }
}

/// Redraw state for one table's bar.
#[derive(Debug, Clone)]
pub struct TableBar {
    table: String,
    total: u64,
    drawn_cells: Option<usize>,
    drawn_percent: f64,
}

impl TableBar {
    pub fn new(table: impl Into<String>, total: u64) -> Self {
        Self {
            table: table.into(),
            total,
            drawn_cells: None,
            drawn_percent: 0.0,
        }
    }

    /// The line to draw for `done` rows, or `None` if the bar would look the
    /// same as the last one drawn.
    pub fn update(&mut self, done: u64) -> Option<String> {
        let percent = percent_of(done, self.total);
        let cells = filled_cells(percent);
        let changed = self.drawn_cells != Some(cells)
            || percent - self.drawn_percent >= MIN_PERCENT_STEP;
        if !changed {
            return None;
        }
        self.drawn_cells = Some(cells);
        self.drawn_percent = percent;
        Some(render_bar(&self.table, done, self.total))
    }
}

fn percent_of(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 * 100.0 / total as f64).min(100.0)
    }
}

fn filled_cells(percent: f64) -> usize {
    ((percent / 100.0 * BAR_CELLS as f64) as usize).min(BAR_CELLS)
}

/// `[#####...............]  25.0% users (250/1000)`
pub fn render_bar(table: &str, done: u64, total: u64) -> String {
    let percent = percent_of(done, total);
    let cells = filled_cells(percent);
    format!(
        "[{}{}] {:5.1}% {} ({}/{})",
        "#".repeat(cells),
        ".".repeat(BAR_CELLS - cells),
        percent,
        table,
        done,
        total
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_bar() {
        assert_eq!(
            render_bar("users", 250, 1000),
            "[#####...............]  25.0% users (250/1000)"
        );
        assert_eq!(
            render_bar("t", 10, 10),
            "[####################] 100.0% t (10/10)"
        );
    }

    #[test]
    fn test_bar_redraws_only_on_visible_change() {
        let mut bar = TableBar::new("t", 10_000);
        assert!(bar.update(0).is_some());
        // 0.1% with the same cell count: suppressed
        assert!(bar.update(10).is_none());
        // 0.5% advance: redrawn
        assert!(bar.update(50).is_some());
        assert!(bar.update(60).is_none());
        // crosses into the first cell (5%)
        assert!(bar.update(500).is_some());
    }

    #[test]
    fn test_task_counter_never_exceeds_total() {
        let mut counter = TaskCounter::new(3);
        assert_eq!(counter.complete(2), 2);
        assert_eq!(counter.complete(5), 3);
        assert_eq!(counter.summary(), "3/3 (100.0%)");
    }

    #[test]
    fn test_empty_counter_is_complete() {
        let counter = TaskCounter::new(0);
        assert_eq!(counter.percent(), 100.0);
    }
}
