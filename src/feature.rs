use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::context::{default_scope, RequestContext};
use crate::driver::{Driver, FeatureValues};
use crate::error::{FlagsyncError, FlagsyncResult};
use crate::scope::Scope;

/// One or many feature names.
pub trait Features {
    fn names(self) -> Vec<String>;
}

impl Features for &str {
    fn names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl Features for String {
    fn names(self) -> Vec<String> {
        vec![self]
    }
}

impl Features for &[&str] {
    fn names(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl<const N: usize> Features for [&str; N] {
    fn names(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl Features for Vec<String> {
    fn names(self) -> Vec<String> {
        self
    }
}

impl Features for &[String] {
    fn names(self) -> Vec<String> {
        self.to_vec()
    }
}

fn is_active(value: &Value) -> bool {
    *value != Value::Bool(false)
}

/// Entry point for checking and changing features.
///
/// Calls without an explicit scope use the authenticated actor, or the null
/// scope when nobody is authenticated.
pub struct FeatureManager {
    driver: Arc<dyn Driver>,
    context: Arc<dyn RequestContext>,
}

impl FeatureManager {
    pub fn new(driver: Arc<dyn Driver>, context: Arc<dyn RequestContext>) -> Self {
        Self { driver, context }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn for_scope(&self, scope: impl Into<Scope>) -> PendingInteraction<'_> {
        PendingInteraction {
            driver: self.driver.as_ref(),
            scopes: vec![scope.into()],
        }
    }

    pub fn for_scopes<I, S>(&self, scopes: I) -> PendingInteraction<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<Scope>,
    {
        PendingInteraction {
            driver: self.driver.as_ref(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn for_default(&self) -> PendingInteraction<'_> {
        self.for_scope(default_scope(self.context.as_ref()))
    }

    pub fn active(&self, feature: &str) -> FlagsyncResult<bool> {
        self.for_default().active(feature)
    }

    pub fn inactive(&self, feature: &str) -> FlagsyncResult<bool> {
        self.for_default().inactive(feature)
    }

    pub fn value(&self, feature: &str) -> FlagsyncResult<Value> {
        self.for_default().value(feature)
    }

    pub fn values(&self, features: impl Features) -> FlagsyncResult<HashMap<String, Value>> {
        self.for_default().values(features)
    }

    pub fn all(&self) -> FlagsyncResult<HashMap<String, Value>> {
        self.for_default().all()
    }

    pub fn activate(&self, features: impl Features) -> FlagsyncResult<()> {
        self.for_default().activate(features)
    }

    pub fn activate_with(
        &self,
        features: impl Features,
        value: impl Into<Value>,
    ) -> FlagsyncResult<()> {
        self.for_default().activate_with(features, value)
    }

    pub fn deactivate(&self, features: impl Features) -> FlagsyncResult<()> {
        self.for_default().deactivate(features)
    }

    pub fn forget(&self, features: impl Features) -> FlagsyncResult<()> {
        self.for_default().forget(features)
    }

    pub fn activate_for_everyone(&self, features: impl Features) -> FlagsyncResult<()> {
        self.activate_for_everyone_with(features, true)
    }

    pub fn activate_for_everyone_with(
        &self,
        features: impl Features,
        value: impl Into<Value>,
    ) -> FlagsyncResult<()> {
        let value = value.into();
        for feature in features.names() {
            self.driver.set_for_all_scopes(&feature, value.clone())?;
        }
        Ok(())
    }

    pub fn deactivate_for_everyone(&self, features: impl Features) -> FlagsyncResult<()> {
        self.activate_for_everyone_with(features, false)
    }

    pub fn purge(&self, features: impl Features) -> FlagsyncResult<()> {
        self.driver.purge(Some(features.names().as_slice()))
    }

    pub fn purge_all(&self) -> FlagsyncResult<()> {
        self.driver.purge(None)
    }

    pub fn defined(&self) -> Vec<String> {
        self.driver.defined()
    }
}

/// Feature operations bound to one or more scopes.
pub struct PendingInteraction<'a> {
    driver: &'a dyn Driver,
    scopes: Vec<Scope>,
}

impl PendingInteraction<'_> {
    fn single_scope(&self, operation: &str) -> FlagsyncResult<&Scope> {
        match self.scopes.as_slice() {
            [scope] => Ok(scope),
            _ => Err(FlagsyncError::InvalidOperation(format!(
                "{} needs exactly one scope, got {}",
                operation,
                self.scopes.len()
            ))),
        }
    }

    /// `check` holds for every scope, given that scope's feature values.
    fn every_scope(
        &self,
        features: Vec<String>,
        check: impl Fn(&[Value]) -> bool,
    ) -> FlagsyncResult<bool> {
        for scope in &self.scopes {
            let values = features
                .iter()
                .map(|feature| self.driver.get(feature, scope))
                .collect::<FlagsyncResult<Vec<_>>>()?;
            if !check(&values) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Active for every scope.
    pub fn active(&self, feature: &str) -> FlagsyncResult<bool> {
        self.all_are_active(feature)
    }

    /// Inactive for every scope.
    pub fn inactive(&self, feature: &str) -> FlagsyncResult<bool> {
        self.all_are_inactive(feature)
    }

    pub fn all_are_active(&self, features: impl Features) -> FlagsyncResult<bool> {
        self.every_scope(features.names(), |values| values.iter().all(is_active))
    }

    pub fn some_are_active(&self, features: impl Features) -> FlagsyncResult<bool> {
        self.every_scope(features.names(), |values| values.iter().any(is_active))
    }

    pub fn all_are_inactive(&self, features: impl Features) -> FlagsyncResult<bool> {
        self.every_scope(features.names(), |values| {
            values.iter().all(|v| !is_active(v))
        })
    }

    pub fn some_are_inactive(&self, features: impl Features) -> FlagsyncResult<bool> {
        self.every_scope(features.names(), |values| {
            values.iter().any(|v| !is_active(v))
        })
    }

    pub fn value(&self, feature: &str) -> FlagsyncResult<Value> {
        let scope = self.single_scope("value")?;
        self.driver.get(feature, scope)
    }

    pub fn values(&self, features: impl Features) -> FlagsyncResult<HashMap<String, Value>> {
        let scope = self.single_scope("values")?;
        features
            .names()
            .into_iter()
            .map(|feature| self.driver.get(&feature, scope).map(|value| (feature, value)))
            .collect()
    }

    /// Values of every defined feature.
    pub fn all(&self) -> FlagsyncResult<HashMap<String, Value>> {
        self.values(self.driver.defined())
    }

    pub fn activate(&self, features: impl Features) -> FlagsyncResult<()> {
        self.activate_with(features, true)
    }

    pub fn activate_with(
        &self,
        features: impl Features,
        value: impl Into<Value>,
    ) -> FlagsyncResult<()> {
        let value = value.into();
        for feature in features.names() {
            for scope in &self.scopes {
                self.driver.set(&feature, scope, value.clone())?;
            }
        }
        Ok(())
    }

    pub fn deactivate(&self, features: impl Features) -> FlagsyncResult<()> {
        self.activate_with(features, false)
    }

    /// Drop stored values so they are resolved again on the next check.
    pub fn forget(&self, features: impl Features) -> FlagsyncResult<()> {
        for feature in features.names() {
            for scope in &self.scopes {
                self.driver.delete(&feature, scope)?;
            }
        }
        Ok(())
    }

    /// Resolve and store the given features for every scope at once.
    pub fn load(&self, features: impl Features) -> FlagsyncResult<FeatureValues> {
        let request: HashMap<String, Vec<Scope>> = features
            .names()
            .into_iter()
            .map(|feature| (feature, self.scopes.clone()))
            .collect();
        self.driver.get_all(&request)
    }
}
