//! # Provider Registry
//!
//! Ordered set of provider descriptors plus the factories that have been
//! loaded for them. The registry answers three questions:
//!
//! - which provider should play a given source ([`ProviderRegistry::choose`])
//! - which providers a playlist needs before it can play
//!   ([`ProviderRegistry::required`])
//! - how two providers rank against each other
//!   ([`ProviderRegistry::priority`])
//!
//! Descriptor order is preference order: the earliest descriptor whose
//! `supports` predicate accepts a source wins. The registry is built once
//! and shared by every session of a player as an `Arc<ProviderRegistry>`;
//! only the factory table changes after construction.
//!
//! ## Usage
//!
//! ```rust
//! use bridge_traits::playback::{ProviderKind, Source};
//! use core_playback::registry::{ProviderDescriptor, ProviderRegistry};
//!
//! let registry = ProviderRegistry::new(vec![
//!     ProviderDescriptor::new(ProviderKind::html5(), |s: &Source| {
//!         s.resolved_type().as_deref() == Some("mp4")
//!     }),
//!     ProviderDescriptor::new(ProviderKind::youtube(), |s: &Source| {
//!         s.file.contains("youtu")
//!     }),
//! ]);
//!
//! let chosen = registry.choose(&Source::new("clip.mp4")).unwrap();
//! assert_eq!(chosen.kind(), &ProviderKind::html5());
//! ```

use bridge_traits::playback::{
    PlaylistItem, ProviderFactory, ProviderKind, ProviderLoader, Source,
};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::PlaybackError;

/// Capability predicate over a single source.
pub type SupportsFn = dyn Fn(&Source) -> bool + Send + Sync;

/// Static description of a provider: its kind and what it can play.
#[derive(Clone)]
pub struct ProviderDescriptor {
    kind: ProviderKind,
    supports: Arc<SupportsFn>,
}

impl ProviderDescriptor {
    pub fn new<F>(kind: ProviderKind, supports: F) -> Self
    where
        F: Fn(&Source) -> bool + Send + Sync + 'static,
    {
        Self {
            kind,
            supports: Arc::new(supports),
        }
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn supports(&self, source: &Source) -> bool {
        (self.supports)(source)
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("kind", &self.kind)
            .finish()
    }
}

pub struct ProviderRegistry {
    descriptors: Vec<ProviderDescriptor>,
    factories: RwLock<HashMap<ProviderKind, Arc<dyn ProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a registry whose preference order is the order of `descriptors`.
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        Self {
            descriptors,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Move the configured primary provider to the front of the preference
    /// order by swapping it with the current first descriptor.
    ///
    /// Unknown kinds leave the order unchanged.
    pub fn with_primary(mut self, primary: &ProviderKind) -> Self {
        if let Some(idx) = self.position(primary) {
            if idx != 0 {
                debug!(provider = %primary, "Promoting primary provider");
                self.descriptors.swap(0, idx);
            }
        }
        self
    }

    /// Add a descriptor at the lowest preference.
    pub fn register(&mut self, descriptor: ProviderDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, kind: &ProviderKind) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.descriptors.iter().map(|d| d.kind().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn position(&self, kind: &ProviderKind) -> Option<usize> {
        self.descriptors.iter().position(|d| d.kind() == kind)
    }

    /// First descriptor, in preference order, that supports `source`.
    pub fn choose(&self, source: &Source) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.supports(source))
    }

    /// Descriptor for an item, judged by its first source only.
    pub fn choose_for_item(&self, item: &PlaylistItem) -> Option<&ProviderDescriptor> {
        item.first_source().and_then(|source| self.choose(source))
    }

    /// Providers needed to play `playlist`, in preference order.
    ///
    /// Greedy: each descriptor claims every still-unclaimed item whose first
    /// source it supports. Items no descriptor claims contribute nothing.
    pub fn required(&self, playlist: &[PlaylistItem]) -> Vec<ProviderKind> {
        let mut remaining: Vec<&PlaylistItem> = playlist.iter().collect();
        let mut required = Vec::new();

        for descriptor in &self.descriptors {
            let before = remaining.len();
            remaining.retain(|item| {
                !item
                    .first_source()
                    .map(|source| descriptor.supports(source))
                    .unwrap_or(false)
            });
            if remaining.len() != before {
                required.push(descriptor.kind().clone());
            }
        }

        required
    }

    /// Rank of a provider: higher is preferred. Unknown providers rank
    /// below every registered one.
    pub fn priority(&self, kind: &ProviderKind) -> i64 {
        match self.position(kind) {
            Some(idx) => (self.descriptors.len() - idx) as i64,
            None => i64::MIN,
        }
    }

    /// Drop sources no provider can play.
    ///
    /// Within an item the first playable source fixes the provider and
    /// media type; later sources are kept only when they share both, so a
    /// quality switch never needs a different backend. Items left without
    /// sources are removed.
    pub fn filter_playlist(&self, playlist: &[PlaylistItem]) -> Vec<PlaylistItem> {
        playlist
            .iter()
            .filter_map(|item| {
                let sources = self.filter_sources(&item.sources);
                if sources.is_empty() {
                    debug!(
                        title = item.title.as_deref().unwrap_or(""),
                        "Dropping item without playable sources"
                    );
                    return None;
                }
                let mut item = item.clone();
                item.sources = sources;
                Some(item)
            })
            .collect()
    }

    fn filter_sources(&self, sources: &[Source]) -> Vec<Source> {
        let mut chosen: Option<(&ProviderDescriptor, Option<String>)> = None;
        let mut kept = Vec::new();

        for source in sources {
            match &chosen {
                None => {
                    if let Some(descriptor) = self.choose(source) {
                        chosen = Some((descriptor, source.resolved_type()));
                        kept.push(source.clone());
                    }
                }
                Some((descriptor, media_type)) => {
                    if source.resolved_type() == *media_type && descriptor.supports(source) {
                        kept.push(source.clone());
                    }
                }
            }
        }

        kept
    }

    // ========================================================================
    // Factories
    // ========================================================================

    pub fn register_factory(&self, factory: Arc<dyn ProviderFactory>) {
        let kind = factory.kind();
        debug!(provider = %kind, "Registering provider factory");
        self.factories.write().insert(kind, factory);
    }

    pub fn factory(&self, kind: &ProviderKind) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.read().get(kind).cloned()
    }

    pub fn is_loaded(&self, kind: &ProviderKind) -> bool {
        self.factories.read().contains_key(kind)
    }

    /// Load every provider `playlist` needs that is not loaded yet.
    ///
    /// Loads run concurrently. Each failure is reported on its own; the
    /// providers that did load are registered regardless.
    pub async fn load_required(
        &self,
        playlist: &[PlaylistItem],
        loader: &dyn ProviderLoader,
    ) -> Vec<PlaybackError> {
        let missing: Vec<ProviderKind> = self
            .required(playlist)
            .into_iter()
            .filter(|kind| !self.is_loaded(kind))
            .collect();

        if missing.is_empty() {
            return Vec::new();
        }

        info!(count = missing.len(), "Loading providers");
        let results = join_all(missing.iter().map(|kind| loader.load(kind))).await;

        let mut failures = Vec::new();
        for (kind, result) in missing.into_iter().zip(results) {
            match result {
                Ok(factory) => self.register_factory(factory),
                Err(e) => {
                    warn!(provider = %kind, error = %e, "Provider failed to load");
                    failures.push(PlaybackError::ProviderLoadFailed {
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }
        failures
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("descriptors", &self.kinds())
            .field("loaded", &self.factories.read().keys().cloned().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_type(kind: &str, types: &'static [&'static str]) -> ProviderDescriptor {
        ProviderDescriptor::new(ProviderKind::new(kind), move |s: &Source| {
            s.resolved_type()
                .map(|t| types.contains(&t.as_str()))
                .unwrap_or(false)
        })
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(vec![
            by_type("html5", &["mp4", "webm"]),
            by_type("flash", &["mp4", "flv"]),
            by_type("youtube", &["youtube"]),
        ])
    }

    #[test]
    fn earliest_supporting_descriptor_wins() {
        let registry = registry();
        let chosen = registry.choose(&Source::new("a.mp4")).unwrap();
        assert_eq!(chosen.kind().as_str(), "html5");
        assert!(registry.choose(&Source::new("a.xyz")).is_none());
    }

    #[test]
    fn primary_swaps_to_front() {
        let registry = registry().with_primary(&ProviderKind::flash());
        assert_eq!(
            registry.kinds(),
            vec![ProviderKind::flash(), ProviderKind::html5(), ProviderKind::youtube()]
        );
        assert_eq!(
            registry.choose(&Source::new("a.mp4")).unwrap().kind(),
            &ProviderKind::flash()
        );
    }

    #[test]
    fn priority_follows_order() {
        let registry = registry();
        assert_eq!(registry.priority(&ProviderKind::html5()), 3);
        assert_eq!(registry.priority(&ProviderKind::youtube()), 1);
        assert_eq!(registry.priority(&ProviderKind::new("dash")), i64::MIN);
    }

    #[test]
    fn filter_keeps_sources_matching_first_choice() {
        let registry = registry();
        let item = PlaylistItem::new(vec![
            Source::new("a.xyz"),
            Source::new("hd.mp4"),
            Source::new("clip.flv"),
            Source::new("sd.mp4"),
        ]);

        let filtered = registry.filter_playlist(&[item]);
        let files: Vec<_> = filtered[0].sources.iter().map(|s| s.file.as_str()).collect();
        assert_eq!(files, vec!["hd.mp4", "sd.mp4"]);
    }
}
