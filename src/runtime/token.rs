use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime::context::Actor;
use crate::runtime::graph::NodeId;
use crate::runtime::instance::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Marks the position of one thread of control inside a process instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub instance: InstanceId,
    pub node: NodeId,
    /// Lineage only: more than one entry after a parallel merge.
    pub previous: BTreeSet<TokenId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub finished_by: Option<Actor>,
}

/// Append-only token storage. Tokens are never removed, finished tokens stay
/// for history.
#[derive(Debug, Clone, Default)]
pub struct TokenArena {
    tokens: Vec<Token>,
}

impl TokenArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an inactive token; activation goes through the store's swap.
    pub fn allocate(
        &mut self,
        instance: InstanceId,
        node: NodeId,
        previous: BTreeSet<TokenId>,
        created_at: DateTime<Utc>,
    ) -> TokenId {
        let id = TokenId(self.tokens.len() as u64);
        self.tokens.push(Token {
            id,
            instance,
            node,
            previous,
            active: false,
            created_at,
            finished_at: None,
            finished_by: None,
        });
        id
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(id.0 as usize)
    }

    pub(crate) fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.tokens.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }
}
