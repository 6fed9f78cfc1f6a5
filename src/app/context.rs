use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::app::error::Result;
use crate::auth::{AuthResolver, CredentialsFileStore, RetryPolicy, SecretStore, SharedSecretStore};
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::generator::GeneratorCatalog;
use crate::manager::Manager;
use crate::output::OutputWriter;
use crate::scheduler::Scheduler;
use crate::server::FeedServer;
use crate::watermark::WatermarkStore;

/// Wires configuration, the shared runtime and the engine components.
pub struct AppContext {
    pub config: Config,
    pub catalog: GeneratorCatalog,
    watermark_path: PathBuf,
    runtime: Runtime,
}

impl AppContext {
    pub fn with_config(config: Config, watermark_path: PathBuf) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("rssforward-worker")
            .build()?;
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new()?);
        let catalog = GeneratorCatalog::builtin(fetcher);

        Ok(Self {
            config,
            catalog,
            watermark_path,
            runtime,
        })
    }

    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    pub fn watermark_path(&self) -> &Path {
        &self.watermark_path
    }

    /// The process-wide secret store; opened on first KEEPASSXC lookup.
    pub fn secret_store(&self) -> SharedSecretStore {
        match self.config.secrets.credentials_file.clone() {
            Some(path) => SharedSecretStore::new(Box::new(move || {
                let store = CredentialsFileStore::open(&path)?;
                Ok(Box::new(store) as Box<dyn SecretStore>)
            })),
            None => SharedSecretStore::unconfigured(),
        }
    }

    pub fn manager(&self) -> Manager {
        let resolver = AuthResolver::new(
            self.secret_store(),
            RetryPolicy::from(&self.config.secrets),
        );
        Manager::new(
            self.config.generators.clone(),
            self.catalog.clone(),
            resolver,
            OutputWriter::new(&self.config.general.data_root),
            WatermarkStore::new(&self.watermark_path),
        )
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.manager(), self.handle())
    }

    pub fn server(&self) -> FeedServer {
        FeedServer::new(
            &self.config.general.data_root,
            self.config.general.port,
            self.handle(),
        )
    }
}
