//! One generation cycle over every registered generator.
//!
//! ```text
//! generate_data → Registry (built once) → generate() per id → OutputWriter
//!                                                          ↘ watermark
//! ```

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Local};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::auth::AuthResolver;
use crate::domain::GeneratorSpec;
use crate::generator::{GenerationContext, GeneratorCatalog};
use crate::output::OutputWriter;
use crate::registry::Registry;
use crate::watermark::WatermarkStore;

/// Source of "now" for watermark computation.
pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

/// How far the stored watermark trails the cycle start.
pub const WATERMARK_BACKOFF_DAYS: i64 = 1;

/// Summary of one `generate_data` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub generators: usize,
    pub produced: usize,
    /// Ids that raised, panicked or produced nothing.
    pub failed: Vec<String>,
    pub write_errors: usize,
    /// Watermark written at the end of the cycle.
    pub watermark: Option<DateTime<FixedOffset>>,
}

impl CycleReport {
    pub fn is_healthy(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Manager {
    specs: Vec<GeneratorSpec>,
    catalog: GeneratorCatalog,
    resolver: AuthResolver,
    writer: OutputWriter,
    watermark: WatermarkStore,
    registry: Option<Registry>,
    clock: Clock,
}

impl Manager {
    pub fn new(
        specs: Vec<GeneratorSpec>,
        catalog: GeneratorCatalog,
        resolver: AuthResolver,
        writer: OutputWriter,
        watermark: WatermarkStore,
    ) -> Self {
        Self {
            specs,
            catalog,
            resolver,
            writer,
            watermark,
            registry: None,
            clock: Arc::new(|| Local::now().fixed_offset()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The registry, once the first cycle has built it.
    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    /// Run every generator once, in registry order.
    ///
    /// Not re-entrant: callers must not run two cycles on one manager at once.
    pub async fn generate_data(&mut self) -> CycleReport {
        if self.registry.is_none() {
            let registry = Registry::build(&self.specs, &self.catalog, &mut self.resolver).await;
            self.registry = Some(registry);
        }
        let Some(registry) = self.registry.as_mut() else {
            return CycleReport::default();
        };
        if registry.is_empty() {
            info!("No generators registered, skipping cycle");
            return CycleReport::default();
        }

        let next_watermark = (self.clock)() - Duration::days(WATERMARK_BACKOFF_DAYS);
        let recent = match self.watermark.read() {
            Ok(recent) => recent,
            Err(e) => {
                warn!("Failed to read watermark: {}", e);
                None
            }
        };
        let ctx = GenerationContext { recent };

        let mut report = CycleReport {
            generators: registry.len(),
            ..CycleReport::default()
        };

        for state in registry.iter_mut() {
            debug!(id = %state.id, "Running generator");
            let outcome = AssertUnwindSafe(state.generator.generate(&ctx))
                .catch_unwind()
                .await;

            let payload = match outcome {
                Ok(Ok(Some(payload))) if !payload.is_empty() => payload,
                Ok(Ok(_)) => {
                    warn!(id = %state.id, "Generator produced no content");
                    state.valid = false;
                    report.failed.push(state.id.clone());
                    continue;
                }
                Ok(Err(e)) => {
                    error!(id = %state.id, "Generator failed: {}", e);
                    state.valid = false;
                    report.failed.push(state.id.clone());
                    continue;
                }
                Err(_) => {
                    error!(id = %state.id, "Generator panicked");
                    state.valid = false;
                    report.failed.push(state.id.clone());
                    continue;
                }
            };

            state.valid = true;
            report.produced += 1;
            if let Err(e) = self.writer.write(&state.id, Some(&payload)) {
                error!(id = %state.id, "Failed to write output: {}", e);
                report.write_errors += 1;
            } else {
                info!(id = %state.id, files = payload.len(), "Generator output written");
            }
        }

        match self.watermark.write(next_watermark) {
            Ok(()) => report.watermark = Some(next_watermark),
            Err(e) => error!("Failed to store watermark: {}", e),
        }

        info!(
            generators = report.generators,
            produced = report.produced,
            failed = report.failed.len(),
            "Generation cycle finished"
        );
        report
    }

    /// True when every registered generator's last cycle was valid.
    pub fn is_gen_valid(&self) -> bool {
        self.registry.as_ref().map_or(true, Registry::all_valid)
    }

    /// Close all generators, then the shared secret store connection.
    pub async fn close(&mut self) {
        if let Some(registry) = self.registry.as_mut() {
            registry.close().await;
        }
        self.resolver.close();
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("generators", &self.specs.len())
            .field("catalog", &self.catalog)
            .field("root", &self.writer.root())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Result, RssForwardError};
    use crate::auth::{RetryPolicy, SecretStore, SecretStoreError, SharedSecretStore};
    use crate::domain::{AuthSpec, Credentials, Payload};
    use crate::generator::Generator;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Calls = Arc<Mutex<Vec<String>>>;

    /// Behaviour chosen by the `mode` param.
    struct Scripted {
        id: String,
        mode: String,
        calls: Calls,
        closes: Calls,
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn authenticate(&mut self, credentials: &Credentials) -> Result<bool> {
            Ok(self.mode != "needs-login" || credentials.login.as_deref() == Some("u"))
        }

        async fn generate(&mut self, _ctx: &GenerationContext) -> Result<Option<Payload>> {
            self.calls.lock().unwrap().push(self.id.clone());
            match self.mode.as_str() {
                "error" => Err(RssForwardError::Other("site changed".into())),
                "panic" => panic!("generator bug"),
                "empty" => Ok(Some(Payload::new())),
                _ => Ok(Some(Payload::from([(
                    "out.xml".to_string(),
                    "<rss/>".to_string(),
                )]))),
            }
        }

        async fn close(&mut self) {
            self.closes.lock().unwrap().push(self.id.clone());
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: std::path::PathBuf,
        watermark: std::path::PathBuf,
        calls: Calls,
        closes: Calls,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                root: dir.path().join("data"),
                watermark: dir.path().join("state/recentdate.json"),
                _dir: dir,
                calls: Calls::default(),
                closes: Calls::default(),
            }
        }

        fn manager(&self, specs: Vec<GeneratorSpec>) -> Manager {
            self.manager_with(specs, AuthResolver::raw_only())
        }

        fn manager_with(&self, specs: Vec<GeneratorSpec>, resolver: AuthResolver) -> Manager {
            let calls = self.calls.clone();
            let closes = self.closes.clone();
            let mut catalog = GeneratorCatalog::new();
            catalog.register("scripted", move |spec| {
                let mode = spec
                    .params
                    .get("mode")
                    .and_then(|v| v.as_str())
                    .unwrap_or("ok")
                    .to_string();
                Ok(Box::new(Scripted {
                    id: spec.id.clone(),
                    mode,
                    calls: calls.clone(),
                    closes: closes.clone(),
                }) as Box<dyn Generator>)
            });
            Manager::new(
                specs,
                catalog,
                resolver,
                OutputWriter::new(&self.root),
                WatermarkStore::new(&self.watermark),
            )
        }
    }

    fn scripted(id: &str, mode: &str) -> GeneratorSpec {
        let mut spec = GeneratorSpec::new(id, "scripted");
        spec.params
            .insert("mode".into(), toml::Value::String(mode.into()));
        spec
    }

    #[tokio::test]
    async fn test_enabled_generator_output_lands_under_its_id() {
        let fx = Fixture::new();
        let mut a = scripted("a", "needs-login");
        a.auth = Some(AuthSpec::Raw {
            login: Some("u".into()),
            password: Some("p".into()),
        });
        let mut b = scripted("b", "ok");
        b.enabled = false;

        let mut manager = fx.manager(vec![a, b]);
        let report = manager.generate_data().await;

        assert_eq!(
            manager.registry().unwrap().ids().collect::<Vec<_>>(),
            vec!["a"]
        );
        assert_eq!(
            fs::read_to_string(fx.root.join("a/out.xml")).unwrap(),
            "<rss/>"
        );
        assert!(!fx.root.join("b").exists());
        assert_eq!(report.produced, 1);
        assert!(manager.is_gen_valid());
    }

    #[tokio::test]
    async fn test_failing_generator_does_not_stop_others() {
        for (first, second) in [("error", "ok"), ("ok", "error"), ("panic", "ok"), ("ok", "panic")]
        {
            let fx = Fixture::new();
            let mut manager = fx.manager(vec![scripted("x", first), scripted("y", second)]);

            let report = manager.generate_data().await;

            assert_eq!(*fx.calls.lock().unwrap(), vec!["x".to_string(), "y".into()]);
            let good = if first == "ok" { "x" } else { "y" };
            assert!(fx.root.join(good).join("out.xml").is_file());
            assert_eq!(report.produced, 1);
            assert_eq!(report.failed.len(), 1);
            assert!(!manager.is_gen_valid());
        }
    }

    #[tokio::test]
    async fn test_empty_payload_marks_invalid() {
        let fx = Fixture::new();
        let mut manager = fx.manager(vec![scripted("a", "ok"), scripted("e", "empty")]);
        let report = manager.generate_data().await;

        assert_eq!(report.failed, vec!["e".to_string()]);
        assert!(!fx.root.join("e").exists());
        assert!(!manager.is_gen_valid());
        assert!(manager.registry().unwrap().get("a").unwrap().valid);
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let fx = Fixture::new();
        let mut manager = fx.manager(vec![scripted("a", "ok")]);

        manager.generate_data().await;
        let first = fs::read(fx.root.join("a/out.xml")).unwrap();
        manager.generate_data().await;
        let second = fs::read(fx.root.join("a/out.xml")).unwrap();

        assert_eq!(first, second);
        let entries = fs::read_dir(fx.root.join("a")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_watermark_is_cycle_start_minus_one_day() {
        let fx = Fixture::new();
        let offset = FixedOffset::east_opt(3600).unwrap();
        let start = offset.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let ticks = Arc::new(Mutex::new(0i64));

        let clock_ticks = ticks.clone();
        let clock: Clock = Arc::new(move || {
            let mut n = clock_ticks.lock().unwrap();
            *n += 1;
            start + Duration::hours(*n)
        });
        let mut manager = fx.manager(vec![scripted("a", "ok"), scripted("b", "error")]).with_clock(clock);
        let store = WatermarkStore::new(&fx.watermark);

        let mut previous = None;
        for cycle in 1..=3 {
            let report = manager.generate_data().await;
            let stored = store.read().unwrap().unwrap();
            let expected = start + Duration::hours(cycle) - Duration::days(1);
            assert_eq!(stored, expected);
            assert_eq!(report.watermark, Some(expected));
            if let Some(prev) = previous {
                assert!(stored >= prev);
            }
            previous = Some(stored);
        }
        assert_eq!(*ticks.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_all_disabled_leaves_watermark_untouched() {
        let fx = Fixture::new();
        let mut a = scripted("a", "ok");
        a.enabled = false;
        let mut manager = fx.manager(vec![a]);

        let report = manager.generate_data().await;

        assert_eq!(report, CycleReport::default());
        assert!(!fx.watermark.exists());
        assert!(fx.calls.lock().unwrap().is_empty());
        assert!(manager.is_gen_valid());
    }

    #[tokio::test]
    async fn test_write_error_keeps_validity() {
        let fx = Fixture::new();
        // A file where the data root should be makes every write fail.
        fs::create_dir_all(fx.root.parent().unwrap()).unwrap();
        fs::write(&fx.root, "not a directory").unwrap();
        let mut manager = fx.manager(vec![scripted("a", "ok")]);

        let report = manager.generate_data().await;

        assert_eq!(report.write_errors, 1);
        assert!(manager.is_gen_valid());
        assert!(fx.watermark.exists());
    }

    #[tokio::test]
    async fn test_close_is_safe_before_first_cycle() {
        let fx = Fixture::new();
        let mut manager = fx.manager(vec![scripted("a", "ok")]);
        manager.close().await;
        manager.generate_data().await;
        manager.close().await;
        assert_eq!(manager.registry().unwrap().len(), 0);
    }

    /// Vault that hands out the same login for every entry.
    struct CountingVault {
        closes: Arc<AtomicUsize>,
    }

    impl SecretStore for CountingVault {
        fn get_auth_data(&mut self, _lookup_key: &str) -> std::result::Result<Credentials, SecretStoreError> {
            Ok(Credentials::new("u", "p"))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_close_releases_every_generator_and_vault_once() {
        let fx = Fixture::new();
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));

        let (open_count, close_count) = (opens.clone(), closes.clone());
        let store = SharedSecretStore::new(Box::new(move || {
            open_count.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingVault {
                closes: close_count.clone(),
            }) as Box<dyn SecretStore>)
        }));
        let resolver = AuthResolver::new(
            store,
            RetryPolicy {
                delay: std::time::Duration::ZERO,
                max_attempts: Some(1),
            },
        );

        let mut specs = Vec::new();
        for (id, entry) in [("mail", "https://mail.example.com"), ("portal", "https://portal.example.com")] {
            let mut spec = scripted(id, "needs-login");
            spec.auth = Some(AuthSpec::SecretStore {
                item_url: entry.into(),
            });
            specs.push(spec);
        }
        let mut manager = fx.manager_with(specs, resolver);

        for _ in 0..2 {
            let report = manager.generate_data().await;
            assert_eq!(report.produced, 2);
        }
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        assert!(fx.closes.lock().unwrap().is_empty());

        manager.close().await;

        let mut closed = fx.closes.lock().unwrap().clone();
        closed.sort();
        assert_eq!(closed, vec!["mail".to_string(), "portal".into()]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        manager.close().await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }
}
