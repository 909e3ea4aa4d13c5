//! Priority-ordered, cancellable publish/subscribe.
//!
//! Every extensibility hook in the game is an [`Event`]. Handlers run in
//! ascending [`Priority`] order, with registration order breaking ties. Any
//! handler may cancel the args; later handlers are skipped unless they were
//! registered with `ignore_cancel`.
//!
//! Dispatch is fail-fast: the first handler error stops the pass and is
//! returned to whoever invoked the event. Side effects of the handlers that
//! already ran stay in place.

pub mod game;

pub use game::{
    BlockPlacedArgs, BlockPlacingArgs, ChatArgs, EventManager, PlayerJoinedArgs, PlayerLeftArgs,
};

use std::fmt;
use std::sync::{Arc, RwLock};

/// Error type handlers report failures with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A registered callback. Identity (the `Arc` allocation) is what
/// [`Event::remove_handler`] matches on.
pub type Handler<A> = Arc<dyn Fn(&mut A) -> Result<(), HandlerError> + Send + Sync>;

/// Wrap a closure as a [`Handler`], keeping a clone for later removal.
pub fn handler<A, F>(f: F) -> Handler<A>
where
    F: Fn(&mut A) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Arguments passed through an event. Each carries a cancelled flag that
/// starts out false.
pub trait EventArgs {
    fn is_cancelled(&self) -> bool;
    fn cancel(&mut self);
}

/// Handler ordering, `0..=100`. Lower runs first.
///
/// `0` and `100` are reserved for the core; extensions use the named bands
/// or any other value in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Core only: runs before everything else.
    pub const INTERNAL_INITIAL: Priority = Priority(0);
    /// Should cancel the event if needed, e.g. block protection.
    pub const INITIAL: Priority = Priority(1);
    pub const LOWEST: Priority = Priority(15);
    pub const LOW: Priority = Priority(35);
    pub const NORMAL: Priority = Priority(50);
    pub const HIGH: Priority = Priority(65);
    pub const HIGHEST: Priority = Priority(85);
    /// Should only observe the outcome, e.g. logging.
    pub const FINAL: Priority = Priority(99);
    /// Core only: runs after everything else.
    pub const INTERNAL_FINAL: Priority = Priority(100);

    pub fn new(value: u8) -> Result<Self, EventError> {
        if value > 100 {
            return Err(EventError::InvalidPriority(value));
        }
        Ok(Self(value))
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn is_reserved(self) -> bool {
        self.0 == Self::INTERNAL_INITIAL.0 || self.0 == Self::INTERNAL_FINAL.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<u8> for Priority {
    type Error = EventError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("priority {0} is outside 0..=100")]
    InvalidPriority(u8),
    #[error("priority {0} is reserved for the core")]
    ReservedPriority(u8),
    #[error("{event} handler at priority {priority} failed")]
    HandlerFailed {
        event: &'static str,
        priority: u8,
        #[source]
        source: HandlerError,
    },
}

struct Registration<A> {
    handler: Handler<A>,
    priority: Priority,
    ignore_cancel: bool,
}

impl<A> Clone for Registration<A> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            priority: self.priority,
            ignore_cancel: self.ignore_cancel,
        }
    }
}

/// The handlers of one kind of game event.
///
/// Registration takes `&self`, so an event can be shared through an `Arc`
/// and extended from any thread. `invoke` dispatches over a snapshot of the
/// list, so handlers may (un)register during dispatch; the change applies
/// from the next invoke on.
pub struct Event<A> {
    name: &'static str,
    handlers: RwLock<Vec<Registration<A>>>,
}

impl<A: EventArgs> Event<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register `handler` at `priority`. The same handler may be added more
    /// than once and then runs once per registration.
    pub fn add_handler(&self, handler: Handler<A>, priority: Priority, ignore_cancel: bool) -> Result<(), EventError> {
        if priority.is_reserved() {
            return Err(EventError::ReservedPriority(priority.value()));
        }
        self.insert(handler, priority, ignore_cancel);
        Ok(())
    }

    /// Like [`Event::add_handler`], but the reserved bands are allowed.
    pub fn add_core_handler(&self, handler: Handler<A>, priority: Priority, ignore_cancel: bool) {
        self.insert(handler, priority, ignore_cancel);
    }

    /// Register a closure at [`Priority::NORMAL`] that respects cancellation.
    /// Returns the handler so it can be removed later.
    pub fn subscribe<F>(&self, f: F) -> Handler<A>
    where
        F: Fn(&mut A) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler: Handler<A> = Arc::new(f);
        self.insert(Arc::clone(&handler), Priority::NORMAL, false);
        handler
    }

    fn insert(&self, handler: Handler<A>, priority: Priority, ignore_cancel: bool) {
        let mut handlers = self.handlers.write().expect("event handlers poisoned");
        handlers.push(Registration {
            handler,
            priority,
            ignore_cancel,
        });
        // Stable: equal priorities keep registration order.
        handlers.sort_by_key(|r| r.priority);
    }

    /// Remove every registration of `handler`. Returns how many were removed.
    pub fn remove_handler(&self, handler: &Handler<A>) -> usize {
        let mut handlers = self.handlers.write().expect("event handlers poisoned");
        let before = handlers.len();
        handlers.retain(|r| !std::ptr::addr_eq(Arc::as_ptr(&r.handler), Arc::as_ptr(handler)));
        before - handlers.len()
    }

    pub fn clear_handlers(&self) {
        self.handlers.write().expect("event handlers poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.read().expect("event handlers poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the handlers in priority order.
    ///
    /// The cancelled flag is checked before every call, so a cancellation
    /// only affects handlers that have not run yet.
    pub fn invoke(&self, args: &mut A) -> Result<(), EventError> {
        let snapshot = self.handlers.read().expect("event handlers poisoned").clone();
        for registration in &snapshot {
            if args.is_cancelled() && !registration.ignore_cancel {
                continue;
            }
            (registration.handler)(args).map_err(|source| EventError::HandlerFailed {
                event: self.name,
                priority: registration.priority.value(),
                source,
            })?;
        }
        Ok(())
    }
}

impl<A> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("handlers", &handlers)
            .finish()
    }
}
