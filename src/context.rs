use crate::scope::{Identity, Scope};

/// Read-only view of who is acting and whether we are serving an
/// interactive request (as opposed to a batch job or a console command).
pub trait RequestContext: Send + Sync {
    fn is_interactive(&self) -> bool;

    fn current_actor(&self) -> Option<Identity>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Interactive,
    Batch,
}

/// A fixed context, set up once per request or per command.
#[derive(Debug, Clone)]
pub struct StaticContext {
    mode: ExecutionMode,
    actor: Option<Identity>,
}

impl StaticContext {
    pub fn new(mode: ExecutionMode, actor: Option<Identity>) -> Self {
        Self { mode, actor }
    }

    pub fn interactive() -> Self {
        Self::new(ExecutionMode::Interactive, None)
    }

    pub fn batch() -> Self {
        Self::new(ExecutionMode::Batch, None)
    }

    pub fn acting_as(mut self, actor: impl Into<Identity>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

impl RequestContext for StaticContext {
    fn is_interactive(&self) -> bool {
        self.mode == ExecutionMode::Interactive
    }

    fn current_actor(&self) -> Option<Identity> {
        self.actor.clone()
    }
}

/// The scope used when the caller does not name one: the authenticated
/// actor if there is one, otherwise the null scope.
pub fn default_scope(context: &dyn RequestContext) -> Scope {
    context.current_actor().map(Scope::Identity).unwrap_or_default()
}

/// Replace [`Scope::CurrentActor`] with the concrete scope it stands for.
pub fn resolve_scope(scope: &Scope, context: &dyn RequestContext) -> Scope {
    match scope {
        Scope::CurrentActor => default_scope(context),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_actor_resolution() {
        let anonymous = StaticContext::interactive();
        assert_eq!(resolve_scope(&Scope::CurrentActor, &anonymous), Scope::Null);

        let logged_in = StaticContext::interactive().acting_as(Identity::model("User", 1));
        assert_eq!(
            resolve_scope(&Scope::CurrentActor, &logged_in),
            Scope::from(Identity::model("User", 1))
        );
        assert_eq!(resolve_scope(&Scope::from("tim"), &logged_in), Scope::from("tim"));
    }

    #[test]
    fn test_modes() {
        assert!(StaticContext::interactive().is_interactive());
        assert!(!StaticContext::batch().is_interactive());
        assert_eq!(StaticContext::batch().mode(), ExecutionMode::Batch);
    }
}
