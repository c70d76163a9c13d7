//! The responder's model: named values and behaviours served to the initiator.
//!
//! Each member is one of four variants and every read goes through
//! [`Member::resolve`]; there is no runtime type inspection.
//!
//! | variant         | `get`                         | `call`              |
//! |-----------------|-------------------------------|---------------------|
//! | `Value`         | the value                     | ignored             |
//! | `Function`      | invoked with `null`           | invoked with data   |
//! | `AsyncFunction` | invoked with `null`, awaited  | invoked with data   |
//! | `Pending`       | awaited                       | ignored             |

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type SyncFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub type AsyncFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

#[derive(Clone)]
pub enum Member {
    Value(Value),
    Function(SyncFn),
    AsyncFunction(AsyncFn),
    /// A value that is still being produced. Every reader sees the same result.
    Pending(Shared<BoxFuture<'static, Value>>),
}

impl Member {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn async_function<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self::AsyncFunction(Arc::new(move |arg| f(arg).boxed()))
    }

    pub fn pending<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self::Pending(fut.boxed().shared())
    }

    pub fn is_invocable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::AsyncFunction(_))
    }

    /// The value a `get` of this member yields.
    pub async fn resolve(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Function(f) => f(Value::Null),
            Self::AsyncFunction(f) => f(Value::Null).await,
            Self::Pending(shared) => shared.clone().await,
        }
    }

    /// Run the member as a `call` target. Synchronous functions run before
    /// this returns; the returned future only needs driving for async ones.
    /// `None` when the member is not invocable.
    pub fn invoke(&self, data: Value) -> Option<BoxFuture<'static, Value>> {
        match self {
            Self::Function(f) => Some(futures::future::ready(f(data)).boxed()),
            Self::AsyncFunction(f) => Some(f(data)),
            Self::Value(_) | Self::Pending(_) => None,
        }
    }
}

impl From<Value> for Member {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::AsyncFunction(_) => f.write_str("AsyncFunction(..)"),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Which side wins when a key is in both the responder's own model and the
/// defaults the initiator sends with its handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    #[default]
    ResponderWins,
    InitiatorWins,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    members: HashMap<String, Member>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, member: impl Into<Member>) -> Self {
        self.insert(name, member);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, member: impl Into<Member>) {
        self.members.insert(name.into(), member.into());
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Fold initiator-supplied defaults into this model.
    pub fn merge_defaults(&mut self, defaults: Map<String, Value>, policy: MergePolicy) {
        for (key, value) in defaults {
            match policy {
                MergePolicy::ResponderWins => {
                    self.members.entry(key).or_insert(Member::Value(value));
                }
                MergePolicy::InitiatorWins => {
                    self.members.insert(key, Member::Value(value));
                }
            }
        }
    }

    /// Resolve `property` for a `get`. Unknown properties read as `null`.
    pub fn resolve(&self, property: &str) -> BoxFuture<'static, Value> {
        match self.get(property).cloned() {
            Some(member) => async move { member.resolve().await }.boxed(),
            None => futures::future::ready(Value::Null).boxed(),
        }
    }

    /// Invoke `property` for a `call`. `None` unless it names an invocable member.
    pub fn invoke(&self, property: &str, data: Value) -> Option<BoxFuture<'static, Value>> {
        self.get(property)?.invoke(data)
    }
}
