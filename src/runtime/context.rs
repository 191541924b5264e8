use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Someone who finishes tokens: a user or a technical account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Actor(pub String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the surrounding transaction knows about "now" and "who".
pub trait Session: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
    fn current_actor(&self) -> Option<Actor>;
}

/// Wall clock plus a fixed actor.
#[derive(Debug, Default, Clone)]
pub struct SystemSession {
    actor: Option<Actor>,
}

impl SystemSession {
    pub fn new(actor: Option<Actor>) -> Self {
        Self { actor }
    }
}

impl Session for SystemSession {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn current_actor(&self) -> Option<Actor> {
        self.actor.clone()
    }
}

/// A session whose clock and actor are moved by hand, for hosts that replay
/// time and for tests.
#[derive(Debug)]
pub struct ManualSession {
    now: Mutex<DateTime<Utc>>,
    actor: Mutex<Option<Actor>>,
}

impl ManualSession {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            actor: Mutex::new(None),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }

    pub fn set_actor(&self, actor: Option<Actor>) {
        *self.actor.lock().unwrap_or_else(|e| e.into_inner()) = actor;
    }
}

impl Session for ManualSession {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_actor(&self) -> Option<Actor> {
        self.actor.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
