//! Application state wiring the dispatch pipeline together.
//!
//! The core is generic over repository and compute provider; `AppState` pins
//! it to the local process provider and either the SQLite history or, with
//! `--ephemeral`, the in-memory one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use arrival_core::dispatcher::Dispatcher;
use arrival_core::event::EventBus;
use arrival_core::orchestrator::Orchestrator;
use arrival_core::repository::execution::{ExecutionFilter, ExecutionRepository};
use arrival_core::repository::memory::InMemoryExecutionRepository;
use arrival_infra::compute::ProcessComputeProvider;
use arrival_infra::config::{load_config, load_from_data_dir};
use arrival_infra::paths::{buckets_dir, database_url, resolve_data_dir};
use arrival_infra::sqlite::execution::SqliteExecutionRepository;
use arrival_infra::sqlite::pool::DatabasePool;
use arrival_infra::storage::LocalObjectStore;
use arrival_types::config::DispatcherConfig;
use arrival_types::error::RepositoryError;
use arrival_types::execution::Execution;
use uuid::Uuid;

pub type ConcreteOrchestrator = Orchestrator<ExecutionStore, ProcessComputeProvider>;
pub type ConcreteDispatcher = Dispatcher<ExecutionStore, ProcessComputeProvider>;

/// Execution history backend chosen at startup.
pub enum ExecutionStore {
    Sqlite(SqliteExecutionRepository),
    Memory(InMemoryExecutionRepository),
}

impl ExecutionRepository for ExecutionStore {
    async fn create(&self, execution: &Execution) -> Result<(), RepositoryError> {
        match self {
            Self::Sqlite(repo) => repo.create(execution).await,
            Self::Memory(repo) => repo.create(execution).await,
        }
    }

    async fn update(&self, execution: &Execution) -> Result<(), RepositoryError> {
        match self {
            Self::Sqlite(repo) => repo.update(execution).await,
            Self::Memory(repo) => repo.update(execution).await,
        }
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        match self {
            Self::Sqlite(repo) => repo.get(id).await,
            Self::Memory(repo) => repo.get(id).await,
        }
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, RepositoryError> {
        match self {
            Self::Sqlite(repo) => repo.list(filter).await,
            Self::Memory(repo) => repo.list(filter).await,
        }
    }

    async fn list_unfinished(&self) -> Result<Vec<Execution>, RepositoryError> {
        match self {
            Self::Sqlite(repo) => repo.list_unfinished().await,
            Self::Memory(repo) => repo.list_unfinished().await,
        }
    }
}

/// Startup options taken from the global CLI flags.
#[derive(Debug, Clone, Default)]
pub struct StateOptions {
    pub data_dir: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub ephemeral: bool,
}

/// Shared state used by both CLI commands and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DispatcherConfig>,
    pub dispatcher: Arc<ConcreteDispatcher>,
    pub store: LocalObjectStore,
    pub data_dir: PathBuf,
    /// HMAC key for notification ingress; `None` accepts unsigned requests.
    pub ingress_secret: Option<Arc<[u8]>>,
}

impl AppState {
    /// Load config, open the execution history and wire the pipeline.
    pub async fn init(options: StateOptions) -> anyhow::Result<Self> {
        let data_dir = options.data_dir.unwrap_or_else(resolve_data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = match &options.config_path {
            Some(path) => load_config(path).await,
            None => load_from_data_dir(&data_dir).await,
        }
        .context("Failed to load configuration")?;

        let repo = if options.ephemeral {
            tracing::debug!("using in-memory execution history");
            ExecutionStore::Memory(InMemoryExecutionRepository::new())
        } else {
            let pool = DatabasePool::new(&database_url(&data_dir))
                .await
                .context("Failed to open execution history")?;
            ExecutionStore::Sqlite(SqliteExecutionRepository::new(pool))
        };

        Ok(Self::from_parts(config, repo, data_dir))
    }

    /// Wire the pipeline around an already loaded config and history.
    pub fn from_parts(config: DispatcherConfig, repo: ExecutionStore, data_dir: PathBuf) -> Self {
        let provider = Arc::new(ProcessComputeProvider::new(
            config.task.max_running.map(|n| n as usize),
        ));
        let orchestrator =
            Orchestrator::from_config(Arc::new(repo), provider, EventBus::default(), &config);
        let dispatcher = Dispatcher::from_config(&config, orchestrator);

        let root = config
            .storage
            .root
            .clone()
            .unwrap_or_else(|| buckets_dir(&data_dir));
        let store = LocalObjectStore::new(root, config.storage.source.clone());

        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            store,
            data_dir,
            ingress_secret: None,
        }
    }

    pub fn with_ingress_secret(mut self, secret: Option<Vec<u8>>) -> Self {
        self.ingress_secret = secret.map(Arc::from);
        self
    }

    pub fn orchestrator(&self) -> &ConcreteOrchestrator {
        self.dispatcher.orchestrator()
    }

    pub fn executions(&self) -> &ExecutionStore {
        self.orchestrator().repository()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Read the ingress HMAC secret from the variable named in the config.
pub fn resolve_ingress_secret(config: &DispatcherConfig) -> anyhow::Result<Option<Vec<u8>>> {
    let Some(var) = config.ingress.hmac_secret_env.as_deref() else {
        return Ok(None);
    };
    let secret = std::env::var(var)
        .with_context(|| format!("ingress.hmac_secret_env names {var}, which is not set"))?;
    if secret.is_empty() {
        anyhow::bail!("{var} is empty; refusing to verify signatures with an empty key");
    }
    Ok(Some(secret.into_bytes()))
}
