//! Callbacks for out-of-band server notifications.
//!
//! Environment changes and EED messages arrive interleaved with results. The
//! dispatcher passes each one to the hooks registered here before it
//! continues, so hooks observe notifications in stream order.
//!
//! ```rust,ignore
//! use ase_client::HookRegistry;
//! use ase_protocol::EnvChangeType;
//!
//! let hooks = HookRegistry::builder()
//!     .on_env_change(EnvChangeType::Database, |_, old, new| {
//!         tracing::info!(old, new, "database changed");
//!     })
//!     .on_eed(|eed| tracing::info!(number = eed.number, "{}", eed.message))
//!     .build();
//! ```
//!
//! Hooks run synchronously on the task driving the connection. A panicking
//! hook unwinds through the call that dispatched the notification.

use std::fmt;
use std::sync::Arc;

use ase_protocol::{Eed, EnvChange, EnvChangeType};

/// Callback for environment changes: `(type, old value, new value)`.
pub type EnvChangeHook = Box<dyn Fn(EnvChangeType, &str, &str) + Send + Sync>;

/// Callback for EED messages.
pub type EedHook = Box<dyn Fn(&Eed) + Send + Sync>;

/// Frozen set of hooks, shared by the connections it was handed to.
#[derive(Default)]
pub struct HookRegistry {
    env_change: Vec<(EnvChangeType, EnvChangeHook)>,
    eed: Vec<EedHook>,
}

impl HookRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    /// A registry with no hooks.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Call every hook registered for `change.env_type`, in registration order.
    pub fn fire_env_change(&self, change: &EnvChange) {
        for (env_type, hook) in &self.env_change {
            if *env_type == change.env_type {
                tracing::debug!(
                    env_type = ?change.env_type,
                    old = %change.old_value,
                    new = %change.new_value,
                    "firing env change hook"
                );
                hook(change.env_type, &change.old_value, &change.new_value);
            }
        }
    }

    /// Call every EED hook, in registration order.
    pub fn fire_eed(&self, eed: &Eed) {
        for hook in &self.eed {
            tracing::debug!(number = eed.number, severity = eed.severity, "firing eed hook");
            hook(eed);
        }
    }

    /// Number of environment change hooks for `env_type`.
    #[must_use]
    pub fn env_change_hooks(&self, env_type: EnvChangeType) -> usize {
        self.env_change
            .iter()
            .filter(|(ty, _)| *ty == env_type)
            .count()
    }

    /// Number of EED hooks.
    #[must_use]
    pub fn eed_hooks(&self) -> usize {
        self.eed.len()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("env_change", &self.env_change.len())
            .field("eed", &self.eed.len())
            .finish()
    }
}

/// Builder for [`HookRegistry`].
#[derive(Default)]
pub struct HookRegistryBuilder {
    registry: HookRegistry,
}

impl HookRegistryBuilder {
    /// Register a hook for one environment change type.
    #[must_use]
    pub fn on_env_change<F>(mut self, env_type: EnvChangeType, hook: F) -> Self
    where
        F: Fn(EnvChangeType, &str, &str) + Send + Sync + 'static,
    {
        self.registry.env_change.push((env_type, Box::new(hook)));
        self
    }

    /// Register a hook for EED messages.
    #[must_use]
    pub fn on_eed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Eed) + Send + Sync + 'static,
    {
        self.registry.eed.push(Box::new(hook));
        self
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> Arc<HookRegistry> {
        Arc::new(self.registry)
    }
}

impl fmt::Debug for HookRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistryBuilder")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_env_change_hooks_fire_in_order_for_matching_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());

        let hooks = HookRegistry::builder()
            .on_env_change(EnvChangeType::Database, move |_, old, new| {
                a.lock().unwrap().push(format!("first {old}->{new}"));
            })
            .on_env_change(EnvChangeType::CharSet, move |_, _, _| {
                b.lock().unwrap().push("charset".to_string());
            })
            .on_env_change(EnvChangeType::Database, move |ty, _, new| {
                c.lock().unwrap().push(format!("second {ty:?} {new}"));
            })
            .build();

        hooks.fire_env_change(&EnvChange::new(EnvChangeType::Database, "master", "pubs2"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first master->pubs2", "second Database pubs2"]
        );
        assert_eq!(hooks.env_change_hooks(EnvChangeType::Database), 2);
        assert_eq!(hooks.env_change_hooks(EnvChangeType::Language), 0);
    }

    #[test]
    fn test_eed_hooks_fire_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (log.clone(), log.clone());

        let hooks = HookRegistry::builder()
            .on_eed(move |eed| a.lock().unwrap().push((1, eed.number)))
            .on_eed(move |eed| b.lock().unwrap().push((2, eed.number)))
            .build();

        hooks.fire_eed(&Eed::new(5701, 10, "changed database context"));
        assert_eq!(*log.lock().unwrap(), vec![(1, 5701), (2, 5701)]);
    }

    #[test]
    fn test_empty_registry() {
        let hooks = HookRegistry::empty();
        hooks.fire_eed(&Eed::new(1, 1, "ignored"));
        hooks.fire_env_change(&EnvChange::new(EnvChangeType::Language, "", "us_english"));
        assert_eq!(hooks.eed_hooks(), 0);
    }

    #[test]
    #[should_panic(expected = "hook failed")]
    fn test_panicking_hook_propagates() {
        let hooks = HookRegistry::builder()
            .on_eed(|_| panic!("hook failed"))
            .build();
        hooks.fire_eed(&Eed::new(1, 16, "boom"));
    }
}
