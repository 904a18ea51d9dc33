//! Runtime context for CLI commands

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tm_core::Config;
use tm_db::{Database, DuckDbBackend};
use tm_engine::{
    ApplyOptions, ArtifactStore, Ed25519Provider, EngineSettings, FsArtifactStore,
    MigrationEngine, SecurityProvider,
};

use crate::cli::GlobalArgs;

/// Loaded configuration plus the engine wired from it
pub(crate) struct RuntimeContext {
    /// Project root directory
    pub root: PathBuf,

    /// The loaded configuration
    pub config: Config,

    /// Engine over the configured database and artifact store
    pub engine: MigrationEngine,

    /// Print JSON instead of text
    pub json: bool,
}

impl RuntimeContext {
    /// Load configuration and connect to the database
    pub async fn new(args: &GlobalArgs) -> Result<Self> {
        let root = PathBuf::from(&args.project_dir);
        let config = load_config(args)?;

        let db_path = config.database_path(&root);
        let db: Arc<dyn Database> = Arc::new(
            DuckDbBackend::new(&db_path)
                .with_context(|| format!("Failed to connect to database: {}", db_path))?
                .with_holder(config.actor())
                .with_lock_lease(config.lock_lease()),
        );
        let store: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::new(config.artifact_path(&root)));

        let settings = EngineSettings {
            lock_key: config.lock.key.clone(),
            lock_timeout: config.lock_timeout(),
            actor: config.actor(),
        };
        let mut engine =
            MigrationEngine::new(db, store, settings).context("Invalid engine settings")?;
        if let Some(provider) = security_provider(&config, &root)? {
            engine = engine.with_security(provider);
        }

        Ok(Self {
            root,
            config,
            engine,
            json: args.json,
        })
    }

    /// Execution options from configuration, before command-line flags
    pub fn apply_options(&self) -> ApplyOptions {
        let mut options = ApplyOptions::default();
        if let Some(timeout) = self.config.execution_timeout() {
            options = options.with_timeout(timeout);
        }
        if self.config.execution.parallel {
            options = options.with_parallel(self.config.execution.max_parallel);
        }
        options
    }
}

/// Load config from `--config` or the project directory
pub(crate) fn load_config(args: &GlobalArgs) -> Result<Config> {
    match &args.config {
        Some(config_path) => {
            Config::load(Path::new(config_path)).context("Failed to load configuration file")
        }
        None => Config::load_from_dir(Path::new(&args.project_dir))
            .context("Failed to load project configuration"),
    }
}

/// Signing provider when `signing.key_path`, otherwise a verifier when `signing.public_key`
fn security_provider(config: &Config, root: &Path) -> Result<Option<Arc<dyn SecurityProvider>>> {
    if let Some(key_path) = &config.signing.key_path {
        let path = root.join(key_path);
        let provider = Ed25519Provider::from_seed_file(&path)
            .with_context(|| format!("Failed to load signing key: {}", path.display()))?;
        return Ok(Some(Arc::new(provider)));
    }
    if let Some(public_key) = &config.signing.public_key {
        let provider =
            Ed25519Provider::verifier(public_key).context("Invalid signing.public_key")?;
        return Ok(Some(Arc::new(provider)));
    }
    Ok(None)
}
