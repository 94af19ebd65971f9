//! Human-readable run summaries.

use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

use super::{DatabaseResult, MigrationPlan, MigrationResult};
use crate::transfer::comma_string;

struct Summary {
    out: String,
}

impl Summary {
    fn new() -> Self {
        Self {
            out: String::from("Summary:\n"),
        }
    }

    fn line(&mut self, label: &str, value: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{:>16}: {}", label, value);
    }

    fn path(&mut self, label: &str, path: &Path) {
        self.line(label, path.display());
    }

    fn list(&mut self, head: &str, entries: &[String]) {
        self.line(&format!("{} ({})", head, entries.len()), entries.join("  "));
    }

    fn counts(&mut self, head: &str, databases: &[DatabaseResult]) {
        let _ = writeln!(self.out, "{:>16}:", format!("{} ({})", head, databases.len()));
        for db in databases {
            let _ = writeln!(
                self.out,
                "{:>22}: {:>11} entries",
                db.path.strip_suffix(".db").unwrap_or(&db.path),
                comma_string(db.entries)
            );
        }
    }
}

pub(crate) fn plan_summary(plan: &MigrationPlan) -> String {
    let mut s = Summary::new();
    s.line("Status", "Not Started");
    s.path("Data Dir", &plan.source_data_dir);
    s.path("Staging Dir", &plan.staging_data_dir);
    s.path("Backup Dir", &plan.backup_data_dir);
    s.line("Source DB Type", plan.config.source_backend);
    s.line("New DB Type", plan.config.target_backend);
    s.list("To Copy", &plan.others);
    s.list("To Migrate", &plan.databases);
    s.out
}

pub(crate) fn result_summary(result: &MigrationResult) -> String {
    let mut s = Summary::new();
    s.line("Status", &result.status);
    s.line(
        "Run Time",
        format!("{:.1?}", Duration::from_secs_f64(result.duration_seconds)),
    );
    s.path("Data Dir", &result.data_dir);
    s.path("Staging Dir", &result.staging_dir);
    match result.backup_dir {
        Some(ref backup) => s.path("Backup Dir", backup),
        None => s.line("Backup Dir", "(not created)"),
    }
    s.line("Source DB Type", result.source_backend);
    s.line("New DB Type", result.target_backend);
    s.list("Copied", &result.copied);
    s.counts("Migrated", &result.databases);
    s.out
}
