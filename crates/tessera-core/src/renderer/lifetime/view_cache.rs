// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Per-texture cache of lazily created views.

use crate::renderer::api::texture::{TextureViewKind, ViewHandle, ViewKey};
use crate::renderer::error::GraphicsError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A backend view object stored in a [`ViewCache`].
pub trait CachedView {
    /// The handle returned to callers for this view.
    fn handle(&self) -> ViewHandle;
}

/// Views of one texture keyed by kind and packed `(mip, slice)`.
///
/// Entries live until the texture is destroyed, at which point the owner
/// [`drain`](Self::drain)s the cache before releasing the texture itself.
#[derive(Debug)]
pub struct ViewCache<V> {
    views: Mutex<HashMap<(TextureViewKind, ViewKey), V>>,
}

impl<V> Default for ViewCache<V> {
    fn default() -> Self {
        Self {
            views: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: CachedView> ViewCache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached view for `(kind, key)`, creating it on first use.
    ///
    /// `create` runs at most once per key; a failed creation leaves no entry.
    pub fn get_or_create<F>(
        &self,
        kind: TextureViewKind,
        key: ViewKey,
        create: F,
    ) -> Result<ViewHandle, GraphicsError>
    where
        F: FnOnce() -> Result<V, GraphicsError>,
    {
        let mut views = self.lock();
        if let Some(view) = views.get(&(kind, key)) {
            return Ok(view.handle());
        }
        let view = create()?;
        let handle = view.handle();
        views.insert((kind, key), view);
        Ok(handle)
    }

    /// Looks up a view without creating it.
    pub fn get(&self, kind: TextureViewKind, key: ViewKey) -> Option<ViewHandle> {
        self.lock().get(&(kind, key)).map(CachedView::handle)
    }

    /// Removes and returns every cached view.
    pub fn drain(&self) -> Vec<V> {
        self.lock().drain().map(|(_, view)| view).collect()
    }

    /// The number of cached views.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no view has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(TextureViewKind, ViewKey), V>> {
        self.views.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeView(u64);

    impl CachedView for FakeView {
        fn handle(&self) -> ViewHandle {
            ViewHandle(self.0)
        }
    }

    #[test]
    fn same_key_creates_once() {
        let cache = ViewCache::new();
        let created = Cell::new(0);
        let make = || {
            created.set(created.get() + 1);
            Ok(FakeView(42))
        };

        let first = cache.get_or_create(TextureViewKind::RenderTarget, ViewKey::new(0, 0), make).unwrap();
        let second = cache
            .get_or_create(TextureViewKind::RenderTarget, ViewKey::new(0, 0), || Ok(FakeView(99)))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(created.get(), 1);
    }

    #[test]
    fn kinds_and_keys_are_distinct_entries() {
        let cache = ViewCache::new();
        cache.get_or_create(TextureViewKind::RenderTarget, ViewKey::new(0, 0), || Ok(FakeView(1))).unwrap();
        cache.get_or_create(TextureViewKind::ShaderResource, ViewKey::new(0, 0), || Ok(FakeView(2))).unwrap();
        cache.get_or_create(TextureViewKind::RenderTarget, ViewKey::new(1, 0), || Ok(FakeView(3))).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(TextureViewKind::ShaderResource, ViewKey::new(0, 0)), Some(ViewHandle(2)));
    }

    #[test]
    fn failed_creation_leaves_no_entry() {
        let cache: ViewCache<FakeView> = ViewCache::new();
        let result = cache.get_or_create(TextureViewKind::DepthStencil, ViewKey::new(0, 0), || {
            Err(GraphicsError::creation_failed("depth-stencil view", "bad format"))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn drain_empties_the_cache() {
        let cache = ViewCache::new();
        cache.get_or_create(TextureViewKind::UnorderedAccess, ViewKey::new(0, 0), || Ok(FakeView(5))).unwrap();
        assert_eq!(cache.drain().len(), 1);
        assert!(cache.is_empty());
    }
}
