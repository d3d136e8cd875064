use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::scope::Scope;

/// Computes a feature's value on a cache and store miss.
pub trait Resolver: Send + Sync {
    /// Returns `None` when no definition exists for `feature`.
    fn resolve(&self, feature: &str, scope: &Scope) -> Option<Value>;

    /// Names of every known feature, in definition order.
    fn defined(&self) -> Vec<String> {
        Vec::new()
    }
}

type ResolveFn = dyn Fn(&Scope) -> Value + Send + Sync;

/// How a registered feature produces its value.
#[derive(Clone)]
pub enum Definition {
    Fixed(Value),
    Dynamic(Arc<ResolveFn>),
}

impl Definition {
    pub fn dynamic(f: impl Fn(&Scope) -> Value + Send + Sync + 'static) -> Self {
        Definition::Dynamic(Arc::new(f))
    }

    fn evaluate(&self, scope: &Scope) -> Value {
        match self {
            Definition::Fixed(value) => value.clone(),
            Definition::Dynamic(f) => f(scope),
        }
    }
}

macro_rules! fixed_definition_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Definition {
                fn from(value: $t) -> Self {
                    Definition::Fixed(value.into())
                }
            }
        )*
    };
}

fixed_definition_from!(Value, bool, i64, f64, &str, String);

#[derive(Default)]
struct Registry {
    order: Vec<String>,
    definitions: HashMap<String, Definition>,
}

/// In-process feature definitions.
#[derive(Default)]
pub struct FeatureRegistry {
    inner: RwLock<Registry>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `feature`. Defining it again replaces the previous definition.
    pub fn define(&self, feature: &str, definition: impl Into<Definition>) {
        let mut registry = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if registry
            .definitions
            .insert(feature.to_string(), definition.into())
            .is_none()
        {
            registry.order.push(feature.to_string());
        }
    }

    pub fn is_defined(&self, feature: &str) -> bool {
        let registry = self.inner.read().unwrap_or_else(|e| e.into_inner());
        registry.definitions.contains_key(feature)
    }
}

impl Resolver for FeatureRegistry {
    fn resolve(&self, feature: &str, scope: &Scope) -> Option<Value> {
        // Clone the definition out so closures run without the lock held.
        let definition = {
            let registry = self.inner.read().unwrap_or_else(|e| e.into_inner());
            registry.definitions.get(feature).cloned()
        }?;
        Some(definition.evaluate(scope))
    }

    fn defined(&self) -> Vec<String> {
        let registry = self.inner.read().unwrap_or_else(|e| e.into_inner());
        registry.order.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unknown_feature_resolves_to_none() {
        let registry = FeatureRegistry::new();
        assert!(registry.resolve("foo", &Scope::Null).is_none());
        assert!(!registry.is_defined("foo"));
    }

    #[test]
    fn test_fixed_and_dynamic_definitions() {
        let registry = FeatureRegistry::new();
        registry.define("foo", true);
        registry.define("config", json!({"timeout": 30}));
        registry.define(
            "per-scope",
            Definition::dynamic(|scope| Value::String(scope.to_string())),
        );

        assert_eq!(registry.resolve("foo", &Scope::Null), Some(json!(true)));
        assert_eq!(
            registry.resolve("config", &Scope::Null),
            Some(json!({"timeout": 30}))
        );
        assert_eq!(
            registry.resolve("per-scope", &Scope::from("tim")),
            Some(json!("tim"))
        );
    }

    #[test]
    fn test_defined_keeps_first_definition_order() {
        let registry = FeatureRegistry::new();
        registry.define("foo", true);
        registry.define("bar", false);
        registry.define("baz", false);
        registry.define("foo", false);

        assert_eq!(registry.defined(), vec!["foo", "bar", "baz"]);
        assert_eq!(registry.resolve("foo", &Scope::Null), Some(json!(false)));
    }

    #[test]
    fn test_dynamic_definition_is_called_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = FeatureRegistry::new();
        registry.define(
            "foo",
            Definition::dynamic(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                json!(true)
            }),
        );

        registry.resolve("foo", &Scope::Null);
        registry.resolve("foo", &Scope::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
