use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::runtime::context::Actor;
use crate::runtime::graph::NodeId;
use crate::runtime::instance::{InstanceId, ProcessInstance};
use crate::runtime::token::{Token, TokenArena, TokenId};

/// In-memory home of all process instances and their tokens.
///
/// Token mutation only happens through [`ExecutionStore::swap`], so the
/// active set of an instance is never observed half updated.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStore {
    instances: BTreeMap<InstanceId, ProcessInstance>,
    tokens: TokenArena,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` and restores the previous state of the store if it fails.
    pub fn transaction<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                *self = snapshot;
                Err(e)
            }
        }
    }

    pub fn insert_instance(&mut self, instance: ProcessInstance) -> InstanceId {
        let id = instance.id;
        self.instances.insert(id, instance);
        id
    }

    pub fn instance(&self, id: InstanceId) -> EngineResult<&ProcessInstance> {
        self.instances.get(&id).ok_or(EngineError::InstanceNotFound(id))
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> EngineResult<&mut ProcessInstance> {
        self.instances.get_mut(&id).ok_or(EngineError::InstanceNotFound(id))
    }

    pub fn instances(&self) -> impl Iterator<Item = &ProcessInstance> {
        self.instances.values()
    }

    /// Ids of all running instances, in a stable order.
    pub fn live_instances(&self) -> BTreeSet<InstanceId> {
        self.instances
            .values()
            .filter(|i| i.is_running())
            .map(|i| i.id)
            .collect()
    }

    pub fn token(&self, id: TokenId) -> EngineResult<&Token> {
        self.tokens.get(id).ok_or(EngineError::TokenNotFound(id))
    }

    pub fn tokens(&self) -> &TokenArena {
        &self.tokens
    }

    /// Active tokens of `instance` that sit on `node`.
    pub fn tokens_at(&self, instance: InstanceId, node: NodeId) -> EngineResult<BTreeSet<TokenId>> {
        let instance = self.instance(instance)?;
        Ok(instance
            .active_tokens
            .iter()
            .copied()
            .filter(|t| self.tokens.get(*t).is_some_and(|token| token.node == node))
            .collect())
    }

    /// Creates a new, not yet active token for `instance`.
    pub fn create_token(
        &mut self,
        instance: InstanceId,
        node: NodeId,
        previous: BTreeSet<TokenId>,
        now: DateTime<Utc>,
    ) -> EngineResult<TokenId> {
        let id = self.tokens.allocate(instance, node, previous, now);
        self.instance_mut(instance)?.all_tokens.push(id);
        Ok(id)
    }

    /// Finishes every token in `remove` and activates `add`, as one step.
    pub fn swap(
        &mut self,
        instance: InstanceId,
        remove: &[TokenId],
        add: Option<TokenId>,
        now: DateTime<Utc>,
        actor: Option<&Actor>,
    ) -> EngineResult<()> {
        for id in remove.iter().chain(add.iter()) {
            let token = self.tokens.get(*id).ok_or(EngineError::TokenNotFound(*id))?;
            if token.instance != instance {
                return Err(EngineError::TokenNotFound(*id));
            }
        }

        let target = self
            .instances
            .get_mut(&instance)
            .ok_or(EngineError::InstanceNotFound(instance))?;
        for id in remove {
            if target.active_tokens.remove(id) {
                if let Some(token) = self.tokens.get_mut(*id) {
                    token.active = false;
                    token.finished_at = Some(now);
                    token.finished_by = actor.cloned();
                }
            }
        }
        if let Some(id) = add {
            target.active_tokens.insert(id);
            if let Some(token) = self.tokens.get_mut(id) {
                token.active = true;
            }
        }
        Ok(())
    }
}
