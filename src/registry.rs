//! Ordered set of authenticated generators for one run.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{info, warn};

use crate::auth::AuthResolver;
use crate::domain::GeneratorSpec;
use crate::generator::{Generator, GeneratorCatalog};

/// A live generator plus the outcome of its last cycle.
pub struct GeneratorState {
    pub id: String,
    pub generator: Box<dyn Generator>,
    /// Did the last cycle produce content without error.
    pub valid: bool,
}

impl std::fmt::Debug for GeneratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorState")
            .field("id", &self.id)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<GeneratorState>,
}

impl Registry {
    /// Construct and authenticate every enabled generator, in config order.
    ///
    /// A generator that cannot be built, whose credentials cannot be resolved
    /// or that refuses them is logged and left out; the rest still load.
    pub async fn build(
        specs: &[GeneratorSpec],
        catalog: &GeneratorCatalog,
        resolver: &mut AuthResolver,
    ) -> Self {
        let mut entries: Vec<GeneratorState> = Vec::new();

        for spec in specs {
            if !spec.enabled {
                info!(id = %spec.id, "Generator disabled, skipping");
                continue;
            }
            if entries.iter().any(|e| e.id == spec.id) {
                warn!(id = %spec.id, "Duplicate generator id, skipping");
                continue;
            }

            let mut generator = match catalog.create(spec) {
                Ok(generator) => generator,
                Err(e) => {
                    warn!(id = %spec.id, "Failed to create generator: {}", e);
                    continue;
                }
            };

            let credentials = match resolver.resolve(spec.auth.as_ref()).await {
                Ok(credentials) => credentials,
                Err(e) => {
                    warn!(id = %spec.id, "Failed to resolve credentials: {}", e);
                    generator.close().await;
                    continue;
                }
            };

            let outcome = AssertUnwindSafe(generator.authenticate(&credentials))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(true)) => {
                    info!(id = %spec.id, kind = %spec.kind, "Generator ready");
                    entries.push(GeneratorState {
                        id: spec.id.clone(),
                        generator,
                        valid: false,
                    });
                }
                Ok(Ok(false)) => {
                    warn!(id = %spec.id, "Authentication rejected, generator excluded");
                    generator.close().await;
                }
                Ok(Err(e)) => {
                    warn!(id = %spec.id, "Authentication failed: {}", e);
                    generator.close().await;
                }
                Err(_) => {
                    warn!(id = %spec.id, "Authentication panicked, generator excluded");
                    generator.close().await;
                }
            }
        }

        info!(count = entries.len(), "Generator registry built");
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&GeneratorState> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GeneratorState> {
        self.entries.iter_mut()
    }

    /// True when every generator's last cycle was valid.
    pub fn all_valid(&self) -> bool {
        self.entries.iter().all(|e| e.valid)
    }

    /// Close every generator and empty the registry.
    pub async fn close(&mut self) {
        for mut state in self.entries.drain(..) {
            state.generator.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Result, RssForwardError};
    use crate::domain::{AuthSpec, Credentials, Payload};
    use crate::generator::GenerationContext;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Accepts only the login "u"; records closes.
    struct Gate {
        id: String,
        log: Log,
    }

    #[async_trait]
    impl Generator for Gate {
        async fn authenticate(&mut self, credentials: &Credentials) -> Result<bool> {
            match credentials.login.as_deref() {
                Some("u") => Ok(true),
                Some("boom") => Err(RssForwardError::Other("server error".into())),
                Some("panic") => panic!("authenticate exploded"),
                _ => Ok(false),
            }
        }

        async fn generate(&mut self, _ctx: &GenerationContext) -> Result<Option<Payload>> {
            Ok(None)
        }

        async fn close(&mut self) {
            self.log.lock().unwrap().push(self.id.clone());
        }
    }

    fn catalog(log: Log) -> GeneratorCatalog {
        let mut catalog = GeneratorCatalog::new();
        catalog.register("gate", move |spec| {
            Ok(Box::new(Gate {
                id: spec.id.clone(),
                log: log.clone(),
            }) as Box<dyn Generator>)
        });
        catalog
    }

    fn spec(id: &str, login: &str) -> GeneratorSpec {
        let mut spec = GeneratorSpec::new(id, "gate");
        spec.auth = Some(AuthSpec::Raw {
            login: Some(login.into()),
            password: Some("p".into()),
        });
        spec
    }

    #[tokio::test]
    async fn test_build_keeps_config_order_and_skips_disabled() {
        let log = Log::default();
        let mut disabled = spec("b", "u");
        disabled.enabled = false;
        let specs = vec![spec("c", "u"), disabled, spec("a", "u")];

        let mut resolver = AuthResolver::raw_only();
        let registry = Registry::build(&specs, &catalog(log), &mut resolver).await;

        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["c", "a"]);
        assert!(registry.get("b").is_none());
    }

    #[tokio::test]
    async fn test_failed_authentication_excludes_and_closes() {
        let log = Log::default();
        let specs = vec![
            spec("ok", "u"),
            spec("refused", "x"),
            spec("error", "boom"),
            spec("panics", "panic"),
            spec("ok2", "u"),
        ];

        let mut resolver = AuthResolver::raw_only();
        let registry = Registry::build(&specs, &catalog(log.clone()), &mut resolver).await;

        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["ok", "ok2"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["refused".to_string(), "error".into(), "panics".into()]
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_and_unresolvable_auth_are_skipped() {
        let log = Log::default();
        let mut store_auth = GeneratorSpec::new("vault", "gate");
        store_auth.auth = Some(AuthSpec::SecretStore {
            item_url: "https://portal.example.com".into(),
        });
        let specs = vec![
            GeneratorSpec::new("ghost", "missing"),
            store_auth,
            spec("a", "u"),
        ];

        // No secret store configured: the lookup fails with a backend error.
        let mut resolver = AuthResolver::raw_only();
        let registry = Registry::build(&specs, &catalog(log.clone()), &mut resolver).await;

        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(*log.lock().unwrap(), vec!["vault".to_string()]);
    }

    #[tokio::test]
    async fn test_close_drains_registry() {
        let log = Log::default();
        let specs = vec![spec("a", "u"), spec("b", "u")];
        let mut resolver = AuthResolver::raw_only();
        let mut registry = Registry::build(&specs, &catalog(log.clone()), &mut resolver).await;
        assert!(!registry.all_valid());

        registry.close().await;
        assert!(registry.is_empty());
        assert!(registry.all_valid());
        assert_eq!(*log.lock().unwrap(), vec!["a".to_string(), "b".into()]);
    }
}
