// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped dependency container.
//!
//! A [`Container`] maps a Rust type to one shared instance and may have a
//! parent. Lookups walk from the child up to the root; registrations only
//! touch the container they are made on. A dispatch creates a child scope
//! with [`Container::scoped`], registers per-message values into it, and
//! throws it away when the workflow finishes.
//!
//! Resolving `Arc<Container>` always yields the container the lookup
//! started from, so code holding a scope sees that scope, never the root.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use chatflow_core::ChatflowError;
use dashmap::DashMap;
use tracing::trace;

tokio::task_local! {
    static CURRENT: Arc<Container>;
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// A type-keyed instance map with an optional parent scope.
pub struct Container {
    parent: Option<Arc<Container>>,
    entries: DashMap<TypeId, Entry>,
    this: Weak<Container>,
}

impl Container {
    /// Create a root container.
    pub fn new() -> Arc<Self> {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Arc<Container>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            parent,
            entries: DashMap::new(),
            this: this.clone(),
        })
    }

    /// Create a child scope whose lookups fall back to `self`.
    pub fn scoped(self: &Arc<Self>) -> Arc<Container> {
        Self::with_parent(Some(Arc::clone(self)))
    }

    /// The parent scope, if this is not the root.
    pub fn parent(&self) -> Option<&Arc<Container>> {
        self.parent.as_ref()
    }

    /// Bind `value` in this scope, replacing any previous binding of `T` here.
    pub fn register<T>(&self, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        trace!(ty = type_name::<T>(), "registering dependency");
        self.entries.insert(
            TypeId::of::<T>(),
            Entry {
                value: Arc::new(value),
                type_name: type_name::<T>(),
            },
        );
    }

    /// Look up `T`, walking child to parent.
    pub fn resolve<T>(&self) -> Result<T, ChatflowError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.try_resolve::<T>()
            .ok_or_else(|| ChatflowError::not_found("dependency", type_name::<T>()))
    }

    /// Like [`resolve`](Self::resolve) but returns `None` on a miss.
    pub fn try_resolve<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        if TypeId::of::<T>() == TypeId::of::<Arc<Container>>() {
            let this: Box<dyn Any> = Box::new(self.this.upgrade()?);
            return this.downcast::<T>().ok().map(|b| *b);
        }

        let mut node = Some(self);
        while let Some(container) = node {
            if let Some(entry) = container.entries.get(&TypeId::of::<T>()) {
                return entry.value.downcast_ref::<T>().cloned();
            }
            node = container.parent.as_deref();
        }
        None
    }

    /// Whether `T` resolves from this scope.
    pub fn has<T>(&self) -> bool
    where
        T: Clone + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        if id == TypeId::of::<Arc<Container>>() {
            return true;
        }
        let mut node = Some(self);
        while let Some(container) = node {
            if container.entries.contains_key(&id) {
                return true;
            }
            node = container.parent.as_deref();
        }
        false
    }

    /// Whether `T` is bound directly in this scope (parents are not consulted).
    pub fn has_local<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Drop every binding held by this scope. Parents are untouched.
    ///
    /// Scopes frequently hold values that point back at the scope, so
    /// dropping the last `Arc` alone would leak; call this when done.
    pub fn dispose(&self) {
        let count = self.entries.len();
        self.entries.clear();
        trace!(count, "disposed container scope");
    }

    /// Run `fut` with `scope` bound as the task's current container.
    pub async fn with_current<F>(scope: Arc<Container>, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(scope, fut).await
    }

    /// The innermost container bound by [`with_current`](Self::with_current)
    /// on this task, if any.
    pub fn current() -> Option<Arc<Container>> {
        CURRENT.try_with(Arc::clone).ok()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&'static str> = self.entries.iter().map(|e| e.type_name).collect();
        names.sort_unstable();
        f.debug_struct("Container")
            .field("bindings", &names)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Greeting(String);

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(u32);

    #[test]
    fn resolve_unbound_is_not_found() {
        let root = Container::new();
        let err = root.resolve::<Greeting>().unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Greeting"));
    }

    #[test]
    fn register_then_resolve() {
        let root = Container::new();
        root.register(Greeting("hi".into()));
        assert_eq!(root.resolve::<Greeting>().unwrap(), Greeting("hi".into()));
        assert!(root.has::<Greeting>());
    }

    #[test]
    fn child_sees_parent_binding() {
        let root = Container::new();
        root.register(Counter(1));
        let child = root.scoped();
        assert_eq!(child.resolve::<Counter>().unwrap(), Counter(1));
        assert!(!child.has_local::<Counter>());
    }

    #[test]
    fn child_binding_is_invisible_to_parent() {
        let root = Container::new();
        let child = root.scoped();
        child.register(Greeting("scoped".into()));

        assert_eq!(
            child.resolve::<Greeting>().unwrap(),
            Greeting("scoped".into())
        );
        assert!(root.resolve::<Greeting>().is_err());
    }

    #[test]
    fn child_binding_shadows_parent() {
        let root = Container::new();
        root.register(Counter(1));
        let child = root.scoped();
        child.register(Counter(2));
        assert_eq!(child.resolve::<Counter>().unwrap(), Counter(2));
        assert_eq!(root.resolve::<Counter>().unwrap(), Counter(1));
    }

    #[test]
    fn container_resolves_to_innermost_scope() {
        let root = Container::new();
        let child = root.scoped();
        child.register(Greeting("inner".into()));

        let resolved = child.resolve::<Arc<Container>>().unwrap();
        assert!(Arc::ptr_eq(&resolved, &child));
        assert!(resolved.has_local::<Greeting>());

        let resolved_root = root.resolve::<Arc<Container>>().unwrap();
        assert!(Arc::ptr_eq(&resolved_root, &root));
    }

    #[test]
    fn dispose_clears_only_the_child() {
        let root = Container::new();
        root.register(Counter(7));
        let child = root.scoped();
        child.register(Greeting("bye".into()));

        child.dispose();
        assert!(child.resolve::<Greeting>().is_err());
        assert_eq!(child.resolve::<Counter>().unwrap(), Counter(7));
        assert_eq!(root.resolve::<Counter>().unwrap(), Counter(7));
    }

    #[test]
    fn trait_objects_can_be_bound_behind_arc() {
        trait Named: Send + Sync {
            fn name(&self) -> &str;
        }
        struct Bot;
        impl Named for Bot {
            fn name(&self) -> &str {
                "bot"
            }
        }

        let root = Container::new();
        root.register::<Arc<dyn Named>>(Arc::new(Bot));
        let named = root.resolve::<Arc<dyn Named>>().unwrap();
        assert_eq!(named.name(), "bot");
    }

    #[tokio::test]
    async fn current_tracks_innermost_scope() {
        assert!(Container::current().is_none());

        let root = Container::new();
        let child = root.scoped();
        let outer = Arc::clone(&root);
        let inner = Arc::clone(&child);

        Container::with_current(root, async move {
            let seen = Container::current().unwrap();
            assert!(Arc::ptr_eq(&seen, &outer));

            Container::with_current(child, async move {
                let seen = Container::current().unwrap();
                assert!(Arc::ptr_eq(&seen, &inner));
            })
            .await;

            let seen = Container::current().unwrap();
            assert!(Arc::ptr_eq(&seen, &outer));
        })
        .await;
    }
}
