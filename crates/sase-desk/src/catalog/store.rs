//! Lock-free catalog store with hot-swapping

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::catalog::RuleCatalog;
use crate::domain::{Rule, RuleKind, RuleSet};
use crate::error::ConfigurationError;
use crate::ports::outbound::CatalogSource;

/// Copy-on-write holder of the active [`RuleCatalog`].
///
/// Readers take an `Arc` to the current version and keep it for the whole
/// evaluation, so a concurrent swap never changes rules under them. Writers
/// are serialised and each write validates the complete candidate; a
/// rejected candidate leaves the active version untouched.
pub struct CatalogStore {
    /// Current catalog (atomically swappable)
    current: ArcSwap<RuleCatalog>,
    version: AtomicU64,
    writer: Mutex<()>,
}

impl CatalogStore {
    pub fn new(catalog: RuleCatalog) -> Self {
        Self {
            current: ArcSwap::from_pointee(catalog.with_version(1)),
            version: AtomicU64::new(1),
            writer: Mutex::new(()),
        }
    }

    /// Validate and store an initial rule set.
    pub fn from_rules(rules: RuleSet) -> Result<Self, ConfigurationError> {
        Ok(Self::new(RuleCatalog::load(rules)?))
    }

    #[inline(always)]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Snapshot of the active catalog
    pub fn current(&self) -> Arc<RuleCatalog> {
        self.current.load_full()
    }

    /// Swap in a complete new rule set. Returns the new version.
    pub fn replace(&self, rules: RuleSet) -> Result<u64, ConfigurationError> {
        let _guard = self.writer.lock();
        self.activate(rules)
    }

    /// Apply `change` to a copy of the active rules and swap the result in.
    pub fn edit<F>(&self, change: F) -> Result<u64, ConfigurationError>
    where
        F: FnOnce(&mut RuleSet),
    {
        let _guard = self.writer.lock();
        let mut rules = self.current.load().rules().clone();
        change(&mut rules);
        self.activate(rules)
    }

    pub fn upsert(&self, rule: Rule) -> Result<u64, ConfigurationError> {
        self.edit(|rules| rules.upsert(rule))
    }

    /// Remove a rule. `Ok(false)` when no rule of that kind has the id.
    pub fn remove(&self, kind: RuleKind, id: &str) -> Result<bool, ConfigurationError> {
        let _guard = self.writer.lock();
        let mut rules = self.current.load().rules().clone();
        if !rules.remove(kind, id) {
            return Ok(false);
        }
        self.activate(rules).map(|_| true)
    }

    /// Toggle a rule. `Ok(false)` when no rule of that kind has the id.
    pub fn set_enabled(
        &self,
        kind: RuleKind,
        id: &str,
        enabled: bool,
    ) -> Result<bool, ConfigurationError> {
        let _guard = self.writer.lock();
        let mut rules = self.current.load().rules().clone();
        let found = match rules.headers_mut(kind).into_iter().find(|h| h.id == id) {
            Some(header) => {
                header.enabled = enabled;
                true
            }
            None => false,
        };
        if !found {
            return Ok(false);
        }
        self.activate(rules).map(|_| true)
    }

    /// Fetch a fresh rule set from `source` and swap it in.
    pub async fn reload(&self, source: &dyn CatalogSource) -> Result<u64, ConfigurationError> {
        let rules = match source.load().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(
                    source = %source.describe(),
                    error = %e,
                    active_version = self.version(),
                    "Catalog reload failed, keeping active version"
                );
                return Err(e);
            }
        };
        self.replace(rules)
    }

    /// Caller holds the writer lock.
    fn activate(&self, rules: RuleSet) -> Result<u64, ConfigurationError> {
        let catalog = match RuleCatalog::load(rules) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    active_version = self.version(),
                    "Rule catalog rejected, keeping active version"
                );
                return Err(e);
            }
        };
        let version = self.version() + 1;
        let catalog = catalog.with_version(version);
        let rules = catalog.rule_count();
        self.current.store(Arc::new(catalog));
        self.version.store(version, Ordering::Release);
        tracing::info!(version, rules, "Rule catalog activated");
        Ok(version)
    }
}
