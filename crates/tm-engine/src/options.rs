//! Engine settings and per-operation options

use crate::error::{EngineError, EngineResult};
use crate::report::PlannedUnit;
use std::sync::Arc;
use std::time::Duration;

/// Called before each unit runs
pub type BeforeEachHook = Arc<dyn Fn(&PlannedUnit) + Send + Sync>;

/// Called after each unit runs, with whether it succeeded
pub type AfterEachHook = Arc<dyn Fn(&PlannedUnit, bool) + Send + Sync>;

/// Settings fixed for the lifetime of an engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Lock key shared by every process migrating the same database
    pub lock_key: String,

    /// Bound on one non-blocking lock acquisition attempt
    pub lock_timeout: Duration,

    /// Identity recorded in the ledger
    pub actor: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lock_key: "tidemark_migration_lock".to_string(),
            lock_timeout: Duration::from_secs(5),
            actor: "unknown".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if self.lock_key.trim().is_empty() {
            return Err(EngineError::InvalidOptions("lock key must not be empty".to_string()));
        }
        if self.lock_timeout.is_zero() {
            return Err(EngineError::InvalidOptions(
                "lock timeout must be greater than zero".to_string(),
            ));
        }
        if self.actor.trim().is_empty() {
            return Err(EngineError::InvalidOptions("actor must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Options for one apply or rollback
#[derive(Clone)]
pub struct ApplyOptions {
    /// Verify and plan only; never open a transaction or write the ledger
    pub dry_run: bool,

    /// Proceed past verification problems and out-of-order checks
    pub force: bool,

    /// Bound on the executing phase
    pub timeout: Option<Duration>,

    /// Dispatch units of the same category concurrently
    pub parallel: bool,

    /// Upper bound on concurrently dispatched units
    pub max_parallel: usize,

    pub before_each: Option<BeforeEachHook>,
    pub after_each: Option<AfterEachHook>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            timeout: None,
            parallel: false,
            max_parallel: 4,
            before_each: None,
            after_each: None,
        }
    }
}

impl ApplyOptions {
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_parallel == 0 {
            return Err(EngineError::InvalidOptions(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(EngineError::InvalidOptions(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_parallel(mut self, max_parallel: usize) -> Self {
        self.parallel = true;
        self.max_parallel = max_parallel;
        self
    }

    pub fn on_before_each(mut self, hook: impl Fn(&PlannedUnit) + Send + Sync + 'static) -> Self {
        self.before_each = Some(Arc::new(hook));
        self
    }

    pub fn on_after_each(
        mut self,
        hook: impl Fn(&PlannedUnit, bool) + Send + Sync + 'static,
    ) -> Self {
        self.after_each = Some(Arc::new(hook));
        self
    }

    pub(crate) fn before(&self, unit: &PlannedUnit) {
        if let Some(hook) = &self.before_each {
            hook(unit);
        }
    }

    pub(crate) fn after(&self, unit: &PlannedUnit, success: bool) {
        if let Some(hook) = &self.after_each {
            hook(unit, success);
        }
    }
}

impl std::fmt::Debug for ApplyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyOptions")
            .field("dry_run", &self.dry_run)
            .field("force", &self.force)
            .field("timeout", &self.timeout)
            .field("parallel", &self.parallel)
            .field("max_parallel", &self.max_parallel)
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .finish()
    }
}
