//! Callback registry for dispatching step-loop lifecycle events.

use std::sync::Arc;

use super::context::CallbackContext;
use super::handlers::Priority;
use crate::step::StepEvent;

type CallbackFn = dyn Fn(&StepEvent, &CallbackContext) + Send + Sync;

struct Handler {
    priority: Priority,
    callback: Arc<CallbackFn>,
}

/// Registry of callbacks dispatched on every step-loop [`StepEvent`].
///
/// Handlers run in priority order (lowest value first); handlers registered
/// at the same priority run in registration order.
///
/// # Example
///
/// ```rust
/// use agentcore::callback::{CallbackRegistry, Priority};
///
/// let registry = CallbackRegistry::builder()
///     .on(|event, _ctx| {
///         println!("{}", event.kind());
///     })
///     .with_logging()
///     .build();
/// ```
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: Vec<Handler>,
}

impl CallbackRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for fluent construction.
    #[must_use]
    pub fn builder() -> CallbackRegistryBuilder {
        CallbackRegistryBuilder::new()
    }

    /// Register a callback, run at [`Priority::NORMAL`].
    pub fn register<F>(&mut self, callback: F)
    where
        F: Fn(&StepEvent, &CallbackContext) + Send + Sync + 'static,
    {
        self.register_with_priority(callback, Priority::NORMAL);
    }

    /// Register a callback with an explicit priority.
    pub fn register_with_priority<F>(&mut self, callback: F, priority: Priority)
    where
        F: Fn(&StepEvent, &CallbackContext) + Send + Sync + 'static,
    {
        self.handlers.push(Handler {
            priority,
            callback: Arc::new(callback),
        });
        self.handlers.sort_by_key(|h| h.priority);
    }

    /// Dispatch an event to every registered handler, in priority order.
    pub fn dispatch(&self, event: &StepEvent, ctx: &CallbackContext) {
        for handler in &self.handlers {
            (handler.callback)(event, ctx);
        }
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Remove all registered handlers.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("handler_count", &self.handler_count())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`CallbackRegistry`] with a fluent API.
#[derive(Default)]
pub struct CallbackRegistryBuilder {
    registry: CallbackRegistry,
}

impl std::fmt::Debug for CallbackRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistryBuilder")
            .field("registry", &self.registry)
            .finish()
    }
}

impl CallbackRegistryBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback at [`Priority::NORMAL`].
    #[must_use]
    pub fn on<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StepEvent, &CallbackContext) + Send + Sync + 'static,
    {
        self.registry.register(callback);
        self
    }

    /// Register a callback with an explicit priority.
    #[must_use]
    pub fn on_with_priority<F>(mut self, callback: F, priority: Priority) -> Self
    where
        F: Fn(&StepEvent, &CallbackContext) + Send + Sync + 'static,
    {
        self.registry.register_with_priority(callback, priority);
        self
    }

    /// Add a handler that logs every dispatched event at `debug` level.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.on_with_priority(
            |event, ctx| {
                tracing::debug!(event = event.kind(), step = ctx.step(), "step event");
            },
            Priority::LOWEST,
        )
    }

    /// Build the registry.
    #[must_use]
    pub fn build(self) -> CallbackRegistry {
        self.registry
    }
}
