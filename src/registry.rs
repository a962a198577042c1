//! Annotation registry: kind → provider/renderer mapping plus a bounded
//! result cache.
//!
//! The registry is an explicit context object. Build one, register a
//! provider and a renderer per [`AnnotationKind`], then hand it to the
//! pipeline (usually behind an `Arc`).
//!
//! ## Ordering
//!
//! `find_all` concatenates provider results in registration order and then
//! stable-sorts by the priority of each annotation's renderer. Kinds with no
//! renderer sort as priority 0. Equal priorities keep provider order.
//!
//! ## Cache
//!
//! Results are cached under a [`Fingerprint`] of the text, evicting the
//! least-recently-used entry at capacity. Any registration change or
//! provider reload clears the whole cache.
//!
//! Cached entries hold every match regardless of category state. Disabled
//! categories are filtered out on read, so a category toggle keeps the cache
//! intact. Per-span lookups made while drawing read the cache but never
//! insert into it, so a page with many spans cannot evict page-level text.

use crate::annotation::{Annotation, AnnotationKind};
use crate::config::AnnotatorConfig;
use crate::error::LoadError;
use crate::provider::AnnotationProvider;
use crate::render::{AnnotationRenderer, DrawingSurface, RenderBounds};
use crate::source::TabularSource;
use lru::LruCache;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace};

/// Fixed-size cache key derived from page text.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        Self(blake3::hash(text.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for b in &self.0[..6] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "…)")
    }
}

/// Cache counters since construction (or the last `clear_cache`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

struct RegistryInner {
    providers: Vec<(AnnotationKind, Box<dyn AnnotationProvider>)>,
    renderers: Vec<(AnnotationKind, Box<dyn AnnotationRenderer>)>,
    cache: LruCache<Fingerprint, Arc<[Annotation]>>,
    hits: u64,
    misses: u64,
}

impl RegistryInner {
    fn priority_of(&self, kind: AnnotationKind) -> i32 {
        self.renderers
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, r)| r.priority())
    }

    fn invalidate(&mut self, reason: &str) {
        if !self.cache.is_empty() {
            debug!("Annotation cache cleared ({} entries): {}", self.cache.len(), reason);
        }
        self.cache.clear();
    }

    fn is_visible(&self, annotation: &Annotation) -> bool {
        self.providers
            .iter()
            .find(|(k, _)| *k == annotation.kind())
            .map_or(true, |(_, p)| p.is_category_enabled(annotation.category()))
    }

    /// Drop annotations of disabled categories. Returns the same `Arc` when
    /// nothing is filtered.
    fn visible(&self, all: &Arc<[Annotation]>) -> Arc<[Annotation]> {
        if all.iter().all(|a| self.is_visible(a)) {
            return Arc::clone(all);
        }
        all.iter().filter(|a| self.is_visible(a)).cloned().collect()
    }

    /// Every match in `text`, priority-ordered, ignoring category state.
    fn compute(&self, text: &str) -> Arc<[Annotation]> {
        let mut found: Vec<Annotation> = self
            .providers
            .iter()
            .flat_map(|(_, provider)| provider.matches(text))
            .collect();
        // sort_by_key is stable: equal priorities keep provider order.
        found.sort_by_key(|a| self.priority_of(a.kind()));
        found.into()
    }

    fn lookup(&mut self, text: &str) -> Arc<[Annotation]> {
        let key = Fingerprint::of(text);
        if let Some(hit) = self.cache.get(&key).map(Arc::clone) {
            self.hits += 1;
            trace!("Annotation cache hit {:?}", key);
            return self.visible(&hit);
        }
        self.misses += 1;

        let all = self.compute(text);
        self.cache.put(key, Arc::clone(&all));
        self.visible(&all)
    }

    /// Like `lookup`, but never inserts, promotes or counts.
    fn lookup_uncached(&self, text: &str) -> Arc<[Annotation]> {
        match self.cache.peek(&Fingerprint::of(text)) {
            Some(hit) => self.visible(hit),
            None => self.visible(&self.compute(text)),
        }
    }
}

/// Thread-safe provider/renderer registry with a bounded lookup cache.
pub struct AnnotationRegistry {
    inner: Mutex<RegistryInner>,
}

impl fmt::Debug for AnnotationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("AnnotationRegistry")
            .field("providers", &inner.providers.iter().map(|(k, _)| *k).collect::<Vec<_>>())
            .field("renderers", &inner.renderers.iter().map(|(k, _)| *k).collect::<Vec<_>>())
            .field("cached", &inner.cache.len())
            .finish()
    }
}

impl Default for AnnotationRegistry {
    fn default() -> Self {
        Self::from_config(&AnnotatorConfig::default())
    }
}

impl AnnotationRegistry {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                providers: Vec::new(),
                renderers: Vec::new(),
                cache: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Registry sized by `config.cache_capacity` (minimum 1).
    pub fn from_config(config: &AnnotatorConfig) -> Self {
        Self::new(NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN))
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or replace) the provider for `kind`. Clears the cache.
    ///
    /// A replaced provider keeps its original position in the iteration
    /// order.
    pub fn register_provider(&self, kind: AnnotationKind, provider: Box<dyn AnnotationProvider>) {
        let mut inner = self.lock();
        match inner.providers.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => slot.1 = provider,
            None => inner.providers.push((kind, provider)),
        }
        inner.invalidate("provider registered");
        info!("Registered {} provider", kind);
    }

    /// Register (or replace) the renderer for `kind`. Clears the cache.
    pub fn register_renderer(&self, kind: AnnotationKind, renderer: Box<dyn AnnotationRenderer>) {
        let mut inner = self.lock();
        let priority = renderer.priority();
        match inner.renderers.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => slot.1 = renderer,
            None => inner.renderers.push((kind, renderer)),
        }
        inner.invalidate("renderer registered");
        info!("Registered {} renderer (priority {})", kind, priority);
    }

    /// Reload the provider registered for `kind` from `source`.
    ///
    /// Returns `Ok(None)` if no provider is registered for `kind`. A failed
    /// load leaves the provider and the cache untouched.
    pub fn load_provider(
        &self,
        kind: AnnotationKind,
        source: &dyn TabularSource,
    ) -> Result<Option<usize>, LoadError> {
        let mut inner = self.lock();
        let Some((_, provider)) = inner.providers.iter_mut().find(|(k, _)| *k == kind) else {
            return Ok(None);
        };
        let rows = provider.load(source)?;
        inner.invalidate("provider reloaded");
        Ok(Some(rows))
    }

    pub fn has_provider(&self, kind: AnnotationKind) -> bool {
        self.lock().providers.iter().any(|(k, _)| *k == kind)
    }

    pub fn has_renderer(&self, kind: AnnotationKind) -> bool {
        self.lock().renderers.iter().any(|(k, _)| *k == kind)
    }

    /// Renderer priority for `kind`, 0 when none is registered.
    pub fn priority_of(&self, kind: AnnotationKind) -> i32 {
        self.lock().priority_of(kind)
    }

    /// All annotations in `text`, priority-ordered. Cached by fingerprint.
    pub fn find_all(&self, text: &str) -> Arc<[Annotation]> {
        self.lock().lookup(text)
    }

    /// `find_all` for several texts under one lock acquisition.
    pub fn find_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Arc<[Annotation]>> {
        let mut inner = self.lock();
        texts.iter().map(|t| inner.lookup(t.as_ref())).collect()
    }

    /// Batch lookup that reads cached results but leaves the cache, its
    /// recency order and its counters untouched.
    ///
    /// Used for per-span lookups while drawing.
    pub fn find_batch_uncached<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Arc<[Annotation]>> {
        let inner = self.lock();
        texts.iter().map(|t| inner.lookup_uncached(t.as_ref())).collect()
    }

    /// Draw `annotations` in sequence order.
    ///
    /// Disabled annotations and kinds without a renderer are skipped.
    pub fn render(
        &self,
        annotations: &[Annotation],
        surface: &mut dyn DrawingSurface,
        bounds: RenderBounds,
    ) -> usize {
        let inner = self.lock();
        let mut drawn = 0;
        for annotation in annotations.iter().filter(|a| a.is_enabled()) {
            match inner.renderers.iter().find(|(k, _)| *k == annotation.kind()) {
                Some((_, renderer)) => {
                    renderer.render(annotation, surface, bounds);
                    drawn += 1;
                }
                None => trace!("No renderer for {}; skipped", annotation.kind()),
            }
        }
        drawn
    }

    /// Category labels per kind, across every registered provider.
    pub fn all_categories(&self) -> BTreeMap<AnnotationKind, BTreeSet<String>> {
        self.lock()
            .providers
            .iter()
            .map(|(kind, p)| (*kind, p.categories()))
            .collect()
    }

    /// Enabled category labels per kind.
    pub fn enabled_categories(&self) -> BTreeMap<AnnotationKind, BTreeSet<String>> {
        self.lock()
            .providers
            .iter()
            .map(|(kind, p)| (*kind, p.enabled_categories()))
            .collect()
    }

    /// Toggle a category on the provider for `kind`.
    ///
    /// Cached results are kept; lookups filter them by the new state.
    ///
    /// Returns `false` if no provider is registered for `kind` or the
    /// category is unknown to it.
    pub fn set_category_enabled(&self, kind: AnnotationKind, category: &str, enabled: bool) -> bool {
        let mut inner = self.lock();
        let Some((_, provider)) = inner.providers.iter_mut().find(|(k, _)| *k == kind) else {
            return false;
        };
        if !provider.categories().contains(category) {
            return false;
        }
        provider.set_category_enabled(category, enabled);
        debug!(
            "{} category '{}' {}",
            kind,
            category,
            if enabled { "enabled" } else { "disabled" }
        );
        true
    }

    pub fn cache_len(&self) -> usize {
        self.lock().cache.len()
    }

    /// Whether `text` currently has a cached result. Does not touch recency.
    pub fn is_cached(&self, text: &str) -> bool {
        self.lock().cache.contains(&Fingerprint::of(text))
    }

    pub fn cache_stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.cache.len(),
            capacity: inner.cache.cap().get(),
        }
    }

    /// Drop every cached result and reset counters.
    pub fn clear_cache(&self) {
        let mut inner = self.lock();
        inner.invalidate("cleared by caller");
        inner.hits = 0;
        inner.misses = 0;
    }
}
