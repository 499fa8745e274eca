//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter turns one Effect into provider calls. Callers walk the
//! Plan themselves so they can record state between Effects.

use log::{debug, info};

use crate::effect::Effect;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{ResourceId, State};
use crate::waiter::Timeouts;

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Read succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Old resource deleted and new one created
    Replaced { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
}

/// Executes Effects against a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a single Effect
    pub async fn execute_effect(&self, effect: &Effect) -> ProviderResult<EffectOutcome> {
        debug!("executing {} for {}", effect.kind(), effect.resource_id());

        match effect {
            Effect::Read { resource } => {
                let state = self.provider.read_data_source(resource).await?;
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let state = self.provider.create(resource).await?;
                info!("created {}", resource.id);
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                let identifier = from.identifier.as_deref().ok_or_else(|| {
                    ProviderError::new("no identifier recorded in state").for_resource(id.clone())
                })?;
                let state = self.provider.update(id, identifier, from, to).await?;
                info!("updated {}", id);
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to, .. } => {
                if let Some(identifier) = from.identifier.as_deref() {
                    let timeouts = Timeouts::from_attributes(&to.attributes)
                        .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
                    self.provider.delete(id, identifier, timeouts).await?;
                    info!("deleted {} for replacement", id);
                }
                let state = self.provider.create(to).await?;
                info!("created {}", id);
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete {
                id,
                identifier,
                timeouts,
            } => {
                self.provider.delete(id, identifier, *timeouts).await?;
                info!("deleted {}", id);
                Ok(EffectOutcome::Deleted { id: id.clone() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::provider::{BoxFuture, ResourceType};
    use crate::resource::Resource;

    #[derive(Default)]
    struct TestProvider {
        calls: Mutex<Vec<String>>,
    }

    impl TestProvider {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            id: &ResourceId,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            self.record(format!("create {}", resource.id));
            let state = State::existing(resource.id.clone(), resource.attributes.clone())
                .with_identifier("test-id");
            Box::pin(async move { Ok(state) })
        }

        fn update(
            &self,
            id: &ResourceId,
            identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            self.record(format!("update {} {}", id, identifier));
            let state = State::existing(id.clone(), to.attributes.clone());
            Box::pin(async move { Ok(state) })
        }

        fn delete(
            &self,
            id: &ResourceId,
            identifier: &str,
            _timeouts: Timeouts,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            self.record(format!("delete {} {}", id, identifier));
            if identifier == "fail" {
                let id = id.clone();
                return Box::pin(async move { Err(ProviderError::new("boom").for_resource(id)) });
            }
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn create_returns_new_state() {
        let interpreter = Interpreter::new(TestProvider::default());
        let effect = Effect::Create(Resource::new("test", "example"));

        let outcome = interpreter.execute_effect(&effect).await.unwrap();

        let EffectOutcome::Created { state } = outcome else {
            panic!("expected Created");
        };
        assert_eq!(state.identifier.as_deref(), Some("test-id"));
    }

    #[tokio::test]
    async fn replace_deletes_before_creating() {
        let interpreter = Interpreter::new(TestProvider::default());
        let id = ResourceId::new("test", "example");
        let effect = Effect::Replace {
            id: id.clone(),
            from: State::existing(id.clone(), Default::default()).with_identifier("old-id"),
            to: Resource::new("test", "example"),
            changed_attributes: vec!["name".to_string()],
        };

        let outcome = interpreter.execute_effect(&effect).await.unwrap();

        assert!(matches!(outcome, EffectOutcome::Replaced { .. }));
        assert_eq!(
            *interpreter.provider().calls.lock().unwrap(),
            vec![
                "delete test.example old-id".to_string(),
                "create test.example".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn update_requires_recorded_identifier() {
        let interpreter = Interpreter::new(TestProvider::default());
        let id = ResourceId::new("test", "example");
        let effect = Effect::Update {
            id: id.clone(),
            from: State::existing(id.clone(), Default::default()),
            to: Resource::new("test", "example"),
            changed_attributes: vec!["name".to_string()],
        };

        let err = interpreter.execute_effect(&effect).await.unwrap_err();
        assert!(err.to_string().contains("no identifier recorded"));
        assert!(interpreter.provider().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_is_returned() {
        let interpreter = Interpreter::new(TestProvider::default());
        let effect = Effect::Delete {
            id: ResourceId::new("test", "a"),
            identifier: "fail".to_string(),
            timeouts: Timeouts::default(),
        };

        let err = interpreter.execute_effect(&effect).await.unwrap_err();
        assert_eq!(err.to_string(), "[test.a] boom");
    }

    #[tokio::test]
    async fn read_effect_without_data_source_support_fails() {
        let interpreter = Interpreter::new(TestProvider::default());
        let effect = Effect::Read {
            resource: Resource::new("test", "lookup").with_read_only(true),
        };
        assert!(interpreter.execute_effect(&effect).await.is_err());
    }
}
