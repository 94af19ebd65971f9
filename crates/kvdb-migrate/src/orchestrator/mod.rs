//! Migration orchestrator - main workflow coordinator.
//!
//! A run is planned first ([`Orchestrator::plan`]) and executed second
//! ([`Orchestrator::execute`]). Planning validates inputs and classifies the
//! data directory without touching the filesystem; execution builds the
//! staging directory and swaps it into place.

mod copy;
mod summary;

pub use copy::copy_entry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::backend::{BackendCatalog, BackendType};
use crate::classify::{get_data_dir_contents, split_db_path};
use crate::config::MigrationConfig;
use crate::detect::detect_backend;
use crate::error::{MigrateError, Result};
use crate::transfer::{comma_string, create_new_dir_with_mode, TransferEngine, TransferJob};

/// Stage of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationPhase {
    Planned,
    Converting,
    Copying,
    Swapping,
    Done,
    Failed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationPhase::Planned => "planned",
            MigrationPhase::Converting => "converting",
            MigrationPhase::Copying => "copying",
            MigrationPhase::Swapping => "swapping",
            MigrationPhase::Done => "done",
            MigrationPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Backend reported by the detector for one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedBackend {
    pub db: String,
    pub backend: Option<BackendType>,
}

/// Everything one run needs, computed before any filesystem mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Config with defaults applied.
    pub config: MigrationConfig,

    /// Data directory being migrated.
    pub source_data_dir: PathBuf,

    /// Directory the converted data is built in. Does not exist yet.
    pub staging_data_dir: PathBuf,

    /// Where the original data directory is moved to.
    pub backup_data_dir: PathBuf,

    /// Database paths relative to the data directory, in conversion order.
    pub databases: Vec<String>,

    /// Non-database paths relative to the data directory, in copy order.
    pub others: Vec<String>,

    /// Detector output per database.
    pub detected: Vec<DetectedBackend>,

    /// When the plan was made (also the timestamp in directory names).
    pub planned_at: DateTime<Local>,
}

impl MigrationPlan {
    /// Multi-line summary of what the run will do.
    pub fn summary(&self) -> String {
        summary::plan_summary(self)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Result for one converted database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseResult {
    /// Path relative to the data directory.
    pub path: String,
    pub entries: u64,
    pub batches: u64,
    pub bytes: u64,
    pub duration_seconds: f64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Final status: `completed`, or `staged` when the swap was skipped.
    pub status: String,

    /// Last phase reached.
    pub phase: MigrationPhase,

    pub source_backend: BackendType,
    pub target_backend: BackendType,

    /// The node data directory.
    pub data_dir: PathBuf,

    /// Staging directory used for the run.
    pub staging_dir: PathBuf,

    /// Location of the original data, if the swap happened.
    pub backup_dir: Option<PathBuf>,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-database results in conversion order.
    pub databases: Vec<DatabaseResult>,

    /// Non-database entries copied verbatim.
    pub copied: Vec<String>,

    /// Total entries written across all databases.
    pub entries_total: u64,

    /// Average throughput (entries/second).
    pub entries_per_second: u64,
}

impl MigrationResult {
    /// Multi-line summary with per-database entry counts.
    pub fn summary(&self) -> String {
        summary::result_summary(self)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Progress of one execution, used to report what is left behind on failure.
struct RunState {
    phase: MigrationPhase,
    staging_exists: bool,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: MigrationPhase::Planned,
            staging_exists: false,
        }
    }

    fn enter(&mut self, phase: MigrationPhase) {
        debug!("Migration phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }
}

/// Migration orchestrator.
pub struct Orchestrator<'a> {
    catalog: &'a BackendCatalog,
}

impl<'a> Orchestrator<'a> {
    /// Create a new orchestrator over the given backends.
    pub fn new(catalog: &'a BackendCatalog) -> Self {
        Self { catalog }
    }

    /// Validate inputs and classify the data directory.
    ///
    /// Nothing on disk is created, moved or modified.
    pub fn plan(&self, config: &MigrationConfig) -> Result<MigrationPlan> {
        config.validate()?;
        self.catalog.require(config.source_backend)?;
        self.catalog.require(config.target_backend)?;

        let mut config = config.clone();
        config.apply_defaults();

        let source_data_dir = config.get_source_data_dir();
        if !source_data_dir.is_dir() {
            return Err(MigrateError::Config(format!(
                "data directory {} does not exist",
                source_data_dir.display()
            )));
        }

        let planned_at = Local::now();
        let stamp = format_stamp(&planned_at, &config.dir_date_format)?;

        let backup_data_dir = config.backup_data_dir.clone().unwrap_or_else(|| {
            config
                .get_backup_parent()
                .join(format!("data-{}-{}", stamp, config.source_backend))
        });
        let staging_data_dir = config
            .get_staging_parent()
            .join(format!("data-dbmigrate-tmp-{}-{}", stamp, config.target_backend));

        if staging_data_dir.exists() {
            return Err(MigrateError::Config(format!(
                "staging directory {} already exists",
                staging_data_dir.display()
            )));
        }
        if !config.stage_only && backup_data_dir.exists() {
            return Err(MigrateError::Config(format!(
                "backup directory {} already exists",
                backup_data_dir.display()
            )));
        }

        // Both get renamed around the data directory, so neither may live in it.
        let data_real = source_data_dir.canonicalize()?;
        let mut outside = vec![("staging", &staging_data_dir)];
        if !config.stage_only {
            outside.push(("backup", &backup_data_dir));
        }
        for (label, dir) in outside {
            if resolve_path(dir).starts_with(&data_real) {
                return Err(MigrateError::Config(format!(
                    "{} directory {} is inside the data directory {}",
                    label,
                    dir.display(),
                    source_data_dir.display()
                )));
            }
        }

        let (databases, others) = get_data_dir_contents(&source_data_dir)?;
        if databases.is_empty() {
            return Err(MigrateError::NoDatabases(source_data_dir));
        }
        info!(
            "Found {} databases and {} other entries in {}",
            databases.len(),
            others.len(),
            source_data_dir.display()
        );

        let detected = databases
            .iter()
            .map(|db| {
                let (dir, name) = split_db_path(&source_data_dir, db);
                let backend = detect_backend(&name, &dir, self.catalog);
                match backend {
                    Some(found) if found != config.source_backend => warn!(
                        "{}: looks like {} but the source backend is {}; opening as {}",
                        db, found, config.source_backend, config.source_backend
                    ),
                    None => debug!("{}: backend could not be detected", db),
                    _ => {}
                }
                DetectedBackend {
                    db: db.clone(),
                    backend,
                }
            })
            .collect();

        Ok(MigrationPlan {
            config,
            source_data_dir,
            staging_data_dir,
            backup_data_dir,
            databases,
            others,
            detected,
            planned_at,
        })
    }

    /// Run a plan: convert, copy, then swap (unless `stage_only`).
    pub fn execute(&self, plan: &MigrationPlan) -> Result<MigrationResult> {
        self.execute_tracked(plan, &mut RunState::new())
    }

    fn execute_tracked(
        &self,
        plan: &MigrationPlan,
        state: &mut RunState,
    ) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let timer = Instant::now();

        info!("{}", plan.summary());

        let outcome = self.run(plan, state);
        let (databases, copied) = match outcome {
            Ok(done) => done,
            Err(e) => {
                error!("Migration failed during {} phase: {}", state.phase, e);
                state.enter(MigrationPhase::Failed);
                if state.staging_exists {
                    error!(
                        "The staging directory still exists due to error: {}",
                        plan.staging_data_dir.display()
                    );
                }
                return Err(e);
            }
        };

        let completed_at = Utc::now();
        let duration = timer.elapsed().as_secs_f64();
        let entries_total: u64 = databases.iter().map(|d| d.entries).sum();
        let entries_per_second = if duration > 0.0 {
            (entries_total as f64 / duration) as u64
        } else {
            0
        };
        let stage_only = plan.config.stage_only;

        let result = MigrationResult {
            status: if stage_only { "staged" } else { "completed" }.to_string(),
            phase: state.phase,
            source_backend: plan.config.source_backend,
            target_backend: plan.config.target_backend,
            data_dir: plan.source_data_dir.clone(),
            staging_dir: plan.staging_data_dir.clone(),
            backup_dir: (!stage_only).then(|| plan.backup_data_dir.clone()),
            started_at,
            completed_at,
            duration_seconds: duration,
            databases,
            copied,
            entries_total,
            entries_per_second,
        };

        info!("{}", result.summary());
        info!(
            "Migration {}: {} databases, {} entries in {:.1}s ({} entries/s)",
            result.status,
            result.databases.len(),
            comma_string(result.entries_total),
            result.duration_seconds,
            comma_string(result.entries_per_second)
        );

        Ok(result)
    }

    fn run(
        &self,
        plan: &MigrationPlan,
        state: &mut RunState,
    ) -> Result<(Vec<DatabaseResult>, Vec<String>)> {
        let config = &plan.config;
        let transfer_config = config.transfer_config();

        create_new_dir_with_mode(&plan.staging_data_dir, transfer_config.dir_mode)
            .map_err(|e| staging_create_error(&plan.staging_data_dir, e))?;
        state.staging_exists = true;

        // Phase 1: Convert databases
        state.enter(MigrationPhase::Converting);
        info!(
            "Phase 1: Converting {} databases from {} to {} (batch size {} MB)",
            plan.databases.len(),
            config.source_backend,
            config.target_backend,
            comma_string(transfer_config.batch_size_bytes / crate::transfer::BYTES_PER_MB)
        );
        let engine = TransferEngine::new(self.catalog, transfer_config);
        let total = plan.databases.len();
        let mut databases = Vec::with_capacity(total);
        for (i, db) in plan.databases.iter().enumerate() {
            info!("{}/{}: {}", i + 1, total, db);
            let job = TransferJob {
                db: db.clone(),
                source_root: plan.source_data_dir.clone(),
                target_root: plan.staging_data_dir.clone(),
                source: config.source_backend,
                target: config.target_backend,
            };
            let stats = engine.convert_database(&job)?;
            databases.push(DatabaseResult {
                path: db.clone(),
                entries: stats.entries,
                batches: stats.batches,
                bytes: stats.bytes,
                duration_seconds: stats.duration.as_secs_f64(),
            });
        }

        // Phase 2: Copy everything else
        state.enter(MigrationPhase::Copying);
        let total = plan.others.len();
        info!(
            "Phase 2: Copying {} items from {} to {}",
            total,
            plan.source_data_dir.display(),
            plan.staging_data_dir.display()
        );
        for (i, entry) in plan.others.iter().enumerate() {
            info!("{}/{}: Copying {}", i + 1, total, entry);
            copy_entry(
                &plan.source_data_dir.join(entry),
                &plan.staging_data_dir.join(entry),
            )
            .map_err(|source| MigrateError::Copy {
                entry: entry.clone(),
                source,
            })?;
        }

        if config.stage_only {
            info!(
                "Stage only: {} left in place, converted data is in {}",
                plan.source_data_dir.display(),
                plan.staging_data_dir.display()
            );
            state.staging_exists = false;
            state.enter(MigrationPhase::Done);
            return Ok((databases, plan.others.clone()));
        }

        // Phase 3: Swap
        state.enter(MigrationPhase::Swapping);
        info!(
            "Phase 3: Moving existing data directory to backup location {}",
            plan.backup_data_dir.display()
        );
        let backup_err = |source: std::io::Error| MigrateError::Backup {
            from: plan.source_data_dir.clone(),
            to: plan.backup_data_dir.clone(),
            source,
        };
        if let Some(parent) = plan.backup_data_dir.parent() {
            std::fs::create_dir_all(parent).map_err(backup_err)?;
        }
        std::fs::rename(&plan.source_data_dir, &plan.backup_data_dir).map_err(backup_err)?;

        info!(
            "Moving new data directory into place: {} -> {}",
            plan.staging_data_dir.display(),
            plan.source_data_dir.display()
        );
        std::fs::rename(&plan.staging_data_dir, &plan.source_data_dir).map_err(|source| {
            MigrateError::Swap {
                data_dir: plan.source_data_dir.clone(),
                backup_dir: plan.backup_data_dir.clone(),
                staging_dir: plan.staging_data_dir.clone(),
                source,
            }
        })?;
        state.staging_exists = false;
        state.enter(MigrationPhase::Done);

        Ok((databases, plan.others.clone()))
    }
}

fn staging_create_error(staging: &Path, e: std::io::Error) -> MigrateError {
    if e.kind() == std::io::ErrorKind::AlreadyExists {
        MigrateError::Config(format!(
            "staging directory {} already exists",
            staging.display()
        ))
    } else {
        e.into()
    }
}

/// Canonical form of `path`, resolving through its deepest existing ancestor.
fn resolve_path(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    resolved.extend(missing.into_iter().rev());
    resolved
}

fn format_stamp(at: &DateTime<Local>, format: &str) -> Result<String> {
    use std::fmt::Write;
    let mut stamp = String::new();
    write!(stamp, "{}", at.format(format))
        .map_err(|_| MigrateError::Config(format!("invalid dir_date_format {:?}", format)))?;
    Ok(stamp)
}
