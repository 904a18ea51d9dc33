//! The migration engine
//!
//! Every mutating operation walks the same states:
//! `Verifying -> Locking -> Planning -> Executing -> Recording -> Unlocking -> Done`,
//! with `Failed` reachable from each of them. The lock is released on every
//! exit path once it has been taken.

use crate::error::{EngineError, EngineResult};
use crate::options::{ApplyOptions, EngineSettings};
use crate::plan::{plan_apply, plan_rollback};
use crate::report::{
    ApplyReport, EngineState, Operation, PlannedUnit, PublishReport, StatusReport,
    VerificationReport,
};
use crate::security::{sign_manifest, verify_manifest, BuildInfo, SecurityProvider};
use crate::store::{ArtifactStore, StoreError};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tm_core::{
    build_manifest, decode, decode_unverified, encode, AppliedVersion, EffectiveHistory, Manifest,
    ManifestMetadata, MigrationFile, Version,
};
use tm_db::{Database, DbError, LockHandle, Transaction};
use tokio::sync::{Mutex, Semaphore};

type SharedTransaction = Mutex<Box<dyn Transaction>>;

/// Orchestrates verify, lock, plan, execute, record and unlock
pub struct MigrationEngine {
    db: Arc<dyn Database>,
    store: Arc<dyn ArtifactStore>,
    security: Option<Arc<dyn SecurityProvider>>,
    settings: EngineSettings,
}

/// Logs each state transition of one operation
struct Progress {
    operation: Operation,
    version: String,
    state: EngineState,
}

impl Progress {
    fn new(operation: Operation, version: &Version) -> Self {
        Self {
            operation,
            version: version.to_string(),
            state: EngineState::Idle,
        }
    }

    fn enter(&mut self, next: EngineState) {
        log::debug!(
            "{} {}: {} -> {}",
            self.operation,
            self.version,
            self.state,
            next
        );
        self.state = next;
    }
}

/// Artifact pulled from the store together with its verification outcome
struct Inspection {
    report: VerificationReport,
    archive: Vec<u8>,
    decoded: Option<(Manifest, Vec<MigrationFile>)>,
}

/// Artifact accepted for execution
struct Verified {
    report: VerificationReport,
    manifest: Manifest,
    files: Vec<MigrationFile>,
}

fn parse_version(version: &str) -> EngineResult<Version> {
    Version::parse(version).map_err(EngineError::InvalidVersion)
}

impl MigrationEngine {
    pub fn new(
        db: Arc<dyn Database>,
        store: Arc<dyn ArtifactStore>,
        settings: EngineSettings,
    ) -> EngineResult<Self> {
        settings.validate()?;
        Ok(Self {
            db,
            store,
            security: None,
            settings,
        })
    }

    /// Sign published artifacts and require valid signatures before execution
    pub fn with_security(mut self, provider: Arc<dyn SecurityProvider>) -> Self {
        self.security = Some(provider);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Apply one version
    pub async fn apply(&self, version: &str, options: &ApplyOptions) -> EngineResult<ApplyReport> {
        self.run(Operation::Apply, version, options).await
    }

    /// Reverse one applied version using its rollback files
    pub async fn rollback(
        &self,
        version: &str,
        options: &ApplyOptions,
    ) -> EngineResult<ApplyReport> {
        self.run(Operation::Rollback, version, options).await
    }

    /// Verify a stored artifact without changing anything
    pub async fn verify(&self, version: &str) -> EngineResult<VerificationReport> {
        let version = parse_version(version)?;
        Ok(self.inspect(&version).await?.report)
    }

    /// Ledger history, current version and pending store versions
    pub async fn status(&self) -> EngineResult<StatusReport> {
        let history = self.ledger_rows().await?;
        let effective = EffectiveHistory::replay(&history);
        let known = self.known_versions().await?;

        let pending = known
            .iter()
            .filter(|v| !effective.is_applied(v))
            .map(|v| v.to_string())
            .collect();

        Ok(StatusReport {
            current: effective.current().map(|v| v.to_string()),
            history,
            pending,
            known: known.iter().map(|v| v.to_string()).collect(),
            checked_at: Utc::now(),
        })
    }

    /// Every version in the store, ascending
    pub async fn list(&self) -> EngineResult<Vec<Version>> {
        self.known_versions().await
    }

    /// Build, sign (when a provider is configured), encode and store an artifact
    pub async fn publish(
        &self,
        version: &str,
        files: &[MigrationFile],
        metadata: ManifestMetadata,
        build: &BuildInfo,
    ) -> EngineResult<PublishReport> {
        let version = parse_version(version)?;
        if self.store.exists(&version).await? {
            return Err(StoreError::AlreadyExists {
                version: version.to_string(),
            }
            .into());
        }

        let mut manifest = build_manifest(version.clone(), files, metadata)?;
        if let Some(provider) = &self.security {
            sign_manifest(provider.as_ref(), &mut manifest, build)?;
        }
        let archive = encode(&manifest, files)?;
        let location = self.store.push(&version, archive, &manifest).await?;

        log::info!(
            "Published {} ({} files, checksum {}) to {}",
            version,
            manifest.files.len(),
            manifest.checksum,
            location
        );
        Ok(PublishReport {
            version: version.to_string(),
            checksum: manifest.checksum.clone(),
            files: manifest.files.len(),
            signed: manifest.signature.is_some(),
            location,
        })
    }

    async fn run(
        &self,
        operation: Operation,
        version: &str,
        options: &ApplyOptions,
    ) -> EngineResult<ApplyReport> {
        options.validate()?;
        let started = Instant::now();
        let version = parse_version(version)?;
        let mut progress = Progress::new(operation, &version);

        match self
            .orchestrate(&mut progress, operation, &version, options)
            .await
        {
            Ok((verification, planned, executed)) => {
                progress.enter(EngineState::Done);
                let duration_secs = started.elapsed().as_secs_f64();
                if options.dry_run {
                    let units: usize = planned.iter().map(Vec::len).sum();
                    log::info!("Dry run of {} {}: {} units planned", operation, version, units);
                } else {
                    log::info!(
                        "{} {} succeeded: {} units in {:.2}s",
                        operation,
                        version,
                        executed,
                        duration_secs
                    );
                }
                Ok(ApplyReport {
                    version: version.to_string(),
                    operation,
                    dry_run: options.dry_run,
                    verification,
                    planned,
                    executed,
                    state: progress.state,
                    duration_secs,
                })
            }
            Err(e) => {
                progress.enter(EngineState::Failed);
                log::info!("{} {} failed: {}", operation, version, e);
                Err(e)
            }
        }
    }

    async fn orchestrate(
        &self,
        progress: &mut Progress,
        operation: Operation,
        version: &Version,
        options: &ApplyOptions,
    ) -> EngineResult<(VerificationReport, Vec<Vec<PlannedUnit>>, usize)> {
        // Repeated calls for an applied version must not contend for the lock
        let history = self.effective_history().await?;
        check_target(operation, version, &history)?;

        progress.enter(EngineState::Verifying);
        let verified = self.verify_for_execution(version, options.force).await?;

        let planned = match operation {
            Operation::Apply => {
                check_apply_order(version, &verified.manifest, &history, options.force)?;
                plan_apply(&verified.manifest)
            }
            Operation::Rollback => {
                check_rollback_order(version, &history, options.force)?;
                let plan = plan_rollback(&verified.manifest);
                if plan.is_empty() {
                    return Err(EngineError::NoRollback {
                        version: version.to_string(),
                    });
                }
                plan
            }
        };

        for file in &verified.files {
            file.sql()?;
        }

        if options.dry_run {
            progress.enter(EngineState::Planning);
            return Ok((verified.report, planned, 0));
        }

        progress.enter(EngineState::Locking);
        let lock = self.acquire_lock().await?;

        let outcome = self
            .execute_locked(progress, operation, version, &verified, &planned, options)
            .await;

        progress.enter(EngineState::Unlocking);
        if let Err(e) = lock.release() {
            log::warn!("Failed to release lock '{}': {}", self.settings.lock_key, e);
        }

        let executed = outcome?;
        Ok((verified.report, planned, executed))
    }

    async fn acquire_lock(&self) -> EngineResult<LockHandle> {
        let key = &self.settings.lock_key;
        let timeout = self.settings.lock_timeout;
        match tokio::time::timeout(timeout, self.db.try_lock(key, timeout)).await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(source)) => Err(EngineError::Lock {
                key: key.clone(),
                source,
            }),
            Err(_) => Err(EngineError::Lock {
                key: key.clone(),
                source: DbError::Internal(format!("acquisition timed out after {timeout:?}")),
            }),
        }
    }

    async fn execute_locked(
        &self,
        progress: &mut Progress,
        operation: Operation,
        version: &Version,
        verified: &Verified,
        planned: &[Vec<PlannedUnit>],
        options: &ApplyOptions,
    ) -> EngineResult<usize> {
        progress.enter(EngineState::Planning);
        // Another process may have finished this version while we verified
        let history = self.effective_history().await?;
        check_target(operation, version, &history)?;

        let sources = verified
            .files
            .iter()
            .map(|f| Ok((f.path.as_str(), f.sql()?)))
            .collect::<EngineResult<HashMap<&str, &str>>>()?;

        progress.enter(EngineState::Executing);
        let tx = match self.db.begin().await {
            Ok(tx) => Mutex::new(tx),
            Err(e) => {
                let err = EngineError::Database(e);
                progress.enter(EngineState::Recording);
                self.record_failure(operation, version, &verified.manifest, &err)
                    .await;
                return Err(err);
            }
        };

        let execution = self.execute_stages(&tx, planned, &sources, options);
        let result = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .unwrap_or(Err(EngineError::Timeout { after: limit })),
            None => execution.await,
        };
        let mut tx = tx.into_inner();

        progress.enter(EngineState::Recording);
        let result = match result {
            Ok(executed) => {
                let row = self.ledger_row(operation, version, &verified.manifest, None);
                match tx.record_version(&row).await {
                    Ok(()) => tx.commit().await.map(|_| executed).map_err(EngineError::from),
                    Err(e) => {
                        rollback_quietly(tx).await;
                        Err(EngineError::from(e))
                    }
                }
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        };

        if let Err(e) = &result {
            self.record_failure(operation, version, &verified.manifest, e)
                .await;
        }
        result
    }

    async fn execute_stages(
        &self,
        tx: &SharedTransaction,
        stages: &[Vec<PlannedUnit>],
        sources: &HashMap<&str, &str>,
        options: &ApplyOptions,
    ) -> EngineResult<usize> {
        let mut executed = 0;
        for stage in stages {
            executed += if options.parallel && stage.len() > 1 {
                execute_parallel(tx, stage, sources, options).await?
            } else {
                let mut count = 0;
                for unit in stage {
                    execute_unit(tx, unit, sources, options).await?;
                    count += 1;
                }
                count
            };
        }
        Ok(executed)
    }

    async fn verify_for_execution(&self, version: &Version, force: bool) -> EngineResult<Verified> {
        let Inspection {
            report,
            archive,
            decoded,
        } = self.inspect(version).await?;

        if !report.is_ok() {
            if !force {
                return Err(EngineError::Verification(report));
            }
            log::warn!(
                "Proceeding past {} verification problem(s) for {}: {}",
                report.errors.len(),
                version,
                report.summary()
            );
        }

        let (manifest, files) = match decoded {
            Some(decoded) => decoded,
            None => decode_unverified(&archive).map_err(|source| EngineError::Checksum {
                version: version.to_string(),
                source,
            })?,
        };
        Ok(Verified {
            report,
            manifest,
            files,
        })
    }

    async fn inspect(&self, version: &Version) -> EngineResult<Inspection> {
        let (archive, stored) = self.store.pull(version).await?;
        let mut report = VerificationReport::new(version.to_string());
        report.checksum = Some(stored.checksum.clone());

        let decoded = match decode(&archive) {
            Ok((manifest, files)) => {
                if manifest.checksum != stored.checksum {
                    report.errors.push(format!(
                        "stored manifest checksum {} does not match archive checksum {}",
                        stored.checksum, manifest.checksum
                    ));
                }
                Some((manifest, files))
            }
            Err(e) => {
                report.errors.push(e.to_string());
                None
            }
        };

        let manifest = decoded.as_ref().map(|(m, _)| m).unwrap_or(&stored);
        if &manifest.version != version {
            report.errors.push(format!(
                "artifact declares version {} but was requested as {}",
                manifest.version, version
            ));
        }

        if let Some(provider) = &self.security {
            report.signature_checked = true;
            report
                .errors
                .extend(verify_manifest(provider.as_ref(), manifest));
        }

        Ok(Inspection {
            report,
            archive,
            decoded,
        })
    }

    async fn ledger_rows(&self) -> EngineResult<Vec<AppliedVersion>> {
        Ok(self
            .db
            .applied_versions()
            .await?
            .into_iter()
            .filter(|r| !r.is_system)
            .collect())
    }

    async fn effective_history(&self) -> EngineResult<EffectiveHistory> {
        Ok(EffectiveHistory::replay(&self.ledger_rows().await?))
    }

    async fn known_versions(&self) -> EngineResult<Vec<Version>> {
        let mut versions = self.store.list().await?;
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    fn ledger_row(
        &self,
        operation: Operation,
        version: &Version,
        manifest: &Manifest,
        error: Option<String>,
    ) -> AppliedVersion {
        AppliedVersion {
            id: uuid::Uuid::new_v4().to_string(),
            version: version.to_string(),
            checksum: manifest.checksum.clone(),
            applied_at: Utc::now(),
            applied_by: self.settings.actor.clone(),
            success: error.is_none(),
            error,
            rollback_of: (operation == Operation::Rollback).then(|| version.to_string()),
            manifest: manifest.to_json().ok(),
            is_system: false,
        }
    }

    /// Write a failure row outside the rolled-back transaction
    async fn record_failure(
        &self,
        operation: Operation,
        version: &Version,
        manifest: &Manifest,
        error: &EngineError,
    ) {
        let row = self.ledger_row(operation, version, manifest, Some(error.to_string()));
        if let Err(e) = self.db.record_version(&row).await {
            log::error!(
                "Failed to record failed {} of {}: {} (original error: {})",
                operation,
                version,
                e,
                error
            );
        }
    }
}

async fn rollback_quietly(tx: Box<dyn Transaction>) {
    if let Err(e) = tx.rollback().await {
        log::warn!("Transaction rollback failed: {}", e);
    }
}

async fn execute_unit(
    tx: &SharedTransaction,
    unit: &PlannedUnit,
    sources: &HashMap<&str, &str>,
    options: &ApplyOptions,
) -> EngineResult<()> {
    let sql = sources.get(unit.path.as_str()).ok_or_else(|| {
        EngineError::Core(tm_core::CoreError::MissingArchiveEntry {
            path: unit.path.clone(),
        })
    })?;

    options.before(unit);
    log::debug!("Executing {} ({})", unit.path, unit.category);
    let result = {
        let mut tx = tx.lock().await;
        tx.execute_batch(sql).await
    };
    options.after(unit, result.is_ok());

    // Give a pending timeout the chance to fire between units
    tokio::task::yield_now().await;

    result.map_err(|source| EngineError::Execution {
        path: unit.path.clone(),
        source,
    })
}

/// Dispatch one stage's units concurrently, bounded by `max_parallel`
///
/// Units still share the version's single transaction. After the first
/// failure no further unit starts.
async fn execute_parallel(
    tx: &SharedTransaction,
    stage: &[PlannedUnit],
    sources: &HashMap<&str, &str>,
    options: &ApplyOptions,
) -> EngineResult<usize> {
    let semaphore = Semaphore::new(options.max_parallel);
    let stopped = AtomicBool::new(false);

    let results = join_all(stage.iter().map(|unit| {
        let semaphore = &semaphore;
        let stopped = &stopped;
        async move {
            let _permit = semaphore.acquire().await.ok()?;
            if stopped.load(Ordering::SeqCst) {
                return None;
            }
            let result = execute_unit(tx, unit, sources, options).await;
            if result.is_err() {
                stopped.store(true, Ordering::SeqCst);
            }
            Some(result)
        }
    }))
    .await;

    let mut executed = 0;
    for result in results.into_iter().flatten() {
        result?;
        executed += 1;
    }
    Ok(executed)
}

fn check_target(
    operation: Operation,
    version: &Version,
    history: &EffectiveHistory,
) -> EngineResult<()> {
    match operation {
        Operation::Apply if history.is_applied(version) => Err(EngineError::AlreadyApplied {
            version: version.to_string(),
        }),
        Operation::Rollback if !history.is_applied(version) => Err(EngineError::NotApplied {
            version: version.to_string(),
        }),
        _ => Ok(()),
    }
}

fn check_apply_order(
    version: &Version,
    manifest: &Manifest,
    history: &EffectiveHistory,
    force: bool,
) -> EngineResult<()> {
    if let Some(dependency) = manifest
        .dependencies
        .iter()
        .find(|dep| !history.is_applied(dep))
    {
        return Err(EngineError::MissingDependency {
            version: version.to_string(),
            dependency: dependency.to_string(),
        });
    }

    match history.current() {
        Some(current) if version < current && !force => Err(EngineError::OutOfOrder {
            version: version.to_string(),
            current: current.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Only the current version may be rolled back unless forced
fn check_rollback_order(
    version: &Version,
    history: &EffectiveHistory,
    force: bool,
) -> EngineResult<()> {
    match history.current() {
        Some(current) if current != version && !force => Err(EngineError::OutOfOrder {
            version: version.to_string(),
            current: current.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
