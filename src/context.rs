//! Request-scoped values.
//!
//! A [`Context`] is an immutable overlay: [`Context::with_value`] returns a
//! new context that sees the new value on top of everything the receiver
//! holds, and leaves the receiver untouched. Two concurrent requests can
//! derive from the same parent without ever observing each other's values.
//!
//! Values are keyed by type. Wrap primitives in a newtype so unrelated
//! middleware cannot collide:
//!
//! ```rust
//! use errmux::Context;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct UserId(u64);
//!
//! let base = Context::new();
//! let ctx = base.with_value(UserId(1)).with_value(UserId(2));
//!
//! assert_eq!(ctx.get::<UserId>(), Some(&UserId(2)));
//! assert_eq!(base.get::<UserId>(), None);
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Immutable, cheaply clonable key-value overlay attached to a request.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

struct Node {
    key: TypeId,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a context carrying `value`, shadowing any earlier value of
    /// the same type.
    #[must_use]
    pub fn with_value<T: Send + Sync + 'static>(&self, value: T) -> Self {
        Self {
            head: Some(Arc::new(Node {
                key: TypeId::of::<T>(),
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// The most recently attached value of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        let key = TypeId::of::<T>();
        self.nodes()
            .find(|node| node.key == key)
            .and_then(|node| node.value.downcast_ref::<T>())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.get::<T>().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(self.head.as_deref(), |node| node.parent.as_deref())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.nodes().count())
            .finish()
    }
}
