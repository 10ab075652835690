//! Incremental computation graph: memoizing nodes with push invalidation
//! and pull evaluation.
//!
//! A graph is built from two kinds of node:
//!
//! - [`ConstantNode`]: a leaf holding a value that callers can replace.
//! - [`Node`]: a derived value computed by a closure from one to four
//!   typed input slots.
//!
//! Both expose the [`Output`] trait, which is what a slot connects to.
//!
//! # Invalidation and evaluation
//!
//! Replacing a constant marks it dirty and immediately notifies every
//! registered [`Listener`]. A derived node's listener marks the node dirty
//! and notifies its own listeners in turn, so one mutation eagerly flags
//! every transitive dependent. Nothing is recomputed at that point.
//!
//! Work happens when a value is pulled. [`Output::output`] on an invalid
//! node pulls each input (which resolves its own validity first), runs the
//! closure, caches the result and only then clears the dirty flag. A node
//! is valid iff it is not dirty and every connected input is valid, so a
//! chain of mutations followed by one pull recomputes each affected node
//! exactly once, against the final parameter values.
//!
//! # Wiring
//!
//! Slots are typed per position: a node built over
//! `(Slot<A>, Slot<B>)` accepts an `Output<A>` in slot 0 and an
//! `Output<B>` in slot 1, checked at compile time through [`SlotAt`].
//!
//! ```rust
//! # use stereogram_pipeline::node::{ConstantNode, Node, Output, Slot};
//! # fn main() -> Result<(), stereogram_pipeline::PipelineError> {
//! let width = ConstantNode::new("width", 3_u32);
//! let height = ConstantNode::new("height", 4_u32);
//! let area = Node::<(Slot<u32>, Slot<u32>), u32>::new("area", |(w, h)| Ok(w * h));
//! area.connect::<0>(&width);
//! area.connect::<1>(&height);
//!
//! assert_eq!(area.output()?, 12);
//! height.set(5);
//! assert!(!area.is_valid());
//! assert_eq!(area.output()?, 15);
//! # Ok(())
//! # }
//! ```
//!
//! The graph is single-threaded: nodes live behind `Rc` and use
//! `Cell`/`RefCell` for their state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::types::PipelineError;

/// Receives invalidation notifications from an upstream node.
pub trait Listener {
    /// Called when one of the inputs this listener is registered on has
    /// been marked dirty.
    fn input_invalidated(&self);
}

/// Something in the graph that produces a value of type `T`.
pub trait Output<T> {
    /// Name used in logs, errors and diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the cached value can be returned without recomputing.
    fn is_valid(&self) -> bool;

    /// Return the value, recomputing it first if the node is invalid.
    ///
    /// # Errors
    ///
    /// Propagates any error raised while computing this node or one of
    /// its inputs, and returns [`PipelineError::UnconnectedInput`] if a
    /// slot on the path was never connected. A failed pull leaves the
    /// node dirty.
    fn output(&self) -> Result<T, PipelineError>;

    /// Register a listener to be notified when this node becomes dirty.
    ///
    /// Registering the same listener twice has no effect.
    fn add_listener(&self, listener: Weak<dyn Listener>);

    /// Remove a previously registered listener.
    fn remove_listener(&self, listener: &Weak<dyn Listener>);

    /// How many times this node has produced a fresh value.
    fn recompute_count(&self) -> u64;
}

/// Shared handle to any node producing `T`.
pub type NodeRef<T> = Rc<dyn Output<T>>;

/// Dirty flag plus the listeners to notify when it is raised.
struct Invalidation {
    dirty: Cell<bool>,
    listeners: RefCell<Vec<Weak<dyn Listener>>>,
}

impl Invalidation {
    const fn new() -> Self {
        Self {
            dirty: Cell::new(true),
            listeners: RefCell::new(Vec::new()),
        }
    }

    fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    fn set_dirty(&self, dirty: bool) {
        self.dirty.set(dirty);
        if dirty {
            self.notify();
        }
    }

    fn notify(&self) {
        // Snapshot first: a listener may re-enter and register or drop
        // listeners on this node.
        let listeners: Vec<Weak<dyn Listener>> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.clone()
        };
        for listener in listeners {
            if let Some(listener) = listener.upgrade() {
                listener.input_invalidated();
            }
        }
    }

    fn add(&self, listener: Weak<dyn Listener>) {
        let mut listeners = self.listeners.borrow_mut();
        if !listeners.iter().any(|l| Weak::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    fn remove(&self, listener: &Weak<dyn Listener>) {
        self.listeners
            .borrow_mut()
            .retain(|l| !Weak::ptr_eq(l, listener));
    }

    fn listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }
}

// ───────────────────────── Constant nodes ──────────────────────────

/// A leaf node whose value is set from outside the graph.
///
/// [`set`](Self::set) always marks the node dirty, even when the new
/// value equals the old one. Reading the value clears the flag.
pub struct ConstantNode<T> {
    name: &'static str,
    value: RefCell<T>,
    state: Invalidation,
    reads: Cell<u64>,
}

impl<T: Clone + fmt::Debug + 'static> ConstantNode<T> {
    /// Create a constant holding `value`. It starts dirty.
    #[must_use]
    pub fn new(name: &'static str, value: T) -> Rc<Self> {
        Rc::new(Self {
            name,
            value: RefCell::new(value),
            state: Invalidation::new(),
            reads: Cell::new(0),
        })
    }

    /// Replace the value and notify every dependent.
    pub fn set(&self, value: T) {
        *self.value.borrow_mut() = value;
        self.state.set_dirty(true);
    }

    /// Current value. Unlike [`Output::output`] this does not count as a
    /// read and leaves the dirty flag alone.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Number of live listeners registered on this node.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.listener_count()
    }
}

impl<T: Clone + fmt::Debug + 'static> Output<T> for ConstantNode<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_valid(&self) -> bool {
        !self.state.is_dirty()
    }

    fn output(&self) -> Result<T, PipelineError> {
        let value = self.value.borrow().clone();
        if self.state.is_dirty() {
            tracing::trace!(node = self.name, ?value, "reading updated constant");
            self.reads.set(self.reads.get() + 1);
            self.state.set_dirty(false);
        }
        Ok(value)
    }

    fn add_listener(&self, listener: Weak<dyn Listener>) {
        self.state.add(listener);
    }

    fn remove_listener(&self, listener: &Weak<dyn Listener>) {
        self.state.remove(listener);
    }

    fn recompute_count(&self) -> u64 {
        self.reads.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for ConstantNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantNode")
            .field("name", &self.name)
            .field("value", &self.value.borrow())
            .field("dirty", &self.state.is_dirty())
            .finish_non_exhaustive()
    }
}

// ───────────────────────── Input slots ──────────────────────────

/// One typed input position of a [`Node`].
pub struct Slot<S> {
    upstream: RefCell<Option<NodeRef<S>>>,
}

impl<S> Default for Slot<S> {
    fn default() -> Self {
        Self {
            upstream: RefCell::new(None),
        }
    }
}

impl<S> Slot<S> {
    /// Whether an upstream node has been connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.upstream.borrow().is_some()
    }

    fn is_valid(&self) -> bool {
        self.upstream.borrow().as_ref().is_some_and(|u| u.is_valid())
    }

    fn pull(&self, node: &'static str, slot: usize) -> Result<S, PipelineError> {
        // Release the borrow before pulling so upstream work cannot
        // observe this slot mid-borrow.
        let upstream = self.upstream.borrow().clone();
        upstream
            .ok_or(PipelineError::UnconnectedInput { node, slot })?
            .output()
    }

    fn replace(&self, upstream: NodeRef<S>) -> Option<NodeRef<S>> {
        self.upstream.borrow_mut().replace(upstream)
    }

    fn take(&self) -> Option<NodeRef<S>> {
        self.upstream.borrow_mut().take()
    }
}

/// A fixed set of input slots, implemented for tuples of one to four
/// [`Slot`]s.
pub trait Inputs: Default + 'static {
    /// The tuple of input values handed to a node's compute closure.
    type Values;

    /// Number of slots.
    const ARITY: usize;

    /// Pull every slot, in order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an upstream node, or
    /// [`PipelineError::UnconnectedInput`] for an empty slot.
    fn pull(&self, node: &'static str) -> Result<Self::Values, PipelineError>;

    /// True iff every slot is connected to a valid upstream node.
    fn all_valid(&self) -> bool;

    /// Unregister `listener` from every connected upstream node.
    fn detach(&self, listener: &Weak<dyn Listener>);
}

macro_rules! impl_inputs {
    ($arity:literal; $($S:ident $idx:tt),+) => {
        impl<$($S: 'static),+> Inputs for ($(Slot<$S>,)+) {
            type Values = ($($S,)+);
            const ARITY: usize = $arity;

            fn pull(&self, node: &'static str) -> Result<Self::Values, PipelineError> {
                Ok(($(self.$idx.pull(node, $idx)?,)+))
            }

            fn all_valid(&self) -> bool {
                $(self.$idx.is_valid())&&+
            }

            fn detach(&self, listener: &Weak<dyn Listener>) {
                $(
                    if let Some(upstream) = self.$idx.take() {
                        upstream.remove_listener(listener);
                    }
                )+
            }
        }
    };
}

impl_inputs!(1; A 0);
impl_inputs!(2; A 0, B 1);
impl_inputs!(3; A 0, B 1, C 2);
impl_inputs!(4; A 0, B 1, C 2, D 3);

/// Compile-time access to slot `N` of an input tuple.
pub trait SlotAt<const N: usize> {
    /// Value type carried by the slot.
    type Value: 'static;

    /// Borrow the slot.
    fn slot(&self) -> &Slot<Self::Value>;
}

macro_rules! impl_slot_at {
    (($($S:ident),+) $idx:tt => $V:ident) => {
        impl<$($S: 'static),+> SlotAt<$idx> for ($(Slot<$S>,)+) {
            type Value = $V;

            fn slot(&self) -> &Slot<$V> {
                &self.$idx
            }
        }
    };
}

impl_slot_at!((A) 0 => A);
impl_slot_at!((A, B) 0 => A);
impl_slot_at!((A, B) 1 => B);
impl_slot_at!((A, B, C) 0 => A);
impl_slot_at!((A, B, C) 1 => B);
impl_slot_at!((A, B, C) 2 => C);
impl_slot_at!((A, B, C, D) 0 => A);
impl_slot_at!((A, B, C, D) 1 => B);
impl_slot_at!((A, B, C, D) 2 => C);
impl_slot_at!((A, B, C, D) 3 => D);

// ───────────────────────── Derived nodes ──────────────────────────

type Compute<V, T> = Box<dyn Fn(V) -> Result<T, PipelineError>>;

/// A memoized value derived from the node's inputs by a pure closure.
pub struct Node<I: Inputs, T: 'static> {
    name: &'static str,
    inputs: I,
    compute: Compute<I::Values, T>,
    cached: RefCell<Option<T>>,
    state: Invalidation,
    recomputes: Cell<u64>,
    this: Weak<Self>,
}

impl<I: Inputs, T: Clone + 'static> Node<I, T> {
    /// Create an unconnected node. It starts dirty.
    #[must_use]
    pub fn new<F>(name: &'static str, compute: F) -> Rc<Self>
    where
        F: Fn(I::Values) -> Result<T, PipelineError> + 'static,
    {
        Rc::new_cyclic(|this| Self {
            name,
            inputs: I::default(),
            compute: Box::new(compute),
            cached: RefCell::new(None),
            state: Invalidation::new(),
            recomputes: Cell::new(0),
            this: this.clone(),
        })
    }

    /// Connect slot `N` to `upstream`.
    ///
    /// A node previously connected to the same slot stops notifying this
    /// one. The node is marked dirty either way.
    pub fn connect<const N: usize>(
        &self,
        upstream: &Rc<impl Output<<I as SlotAt<N>>::Value> + 'static>,
    ) where
        I: SlotAt<N>,
    {
        let upstream: NodeRef<<I as SlotAt<N>>::Value> = upstream.clone();
        let listener = self.listener();
        if let Some(previous) = <I as SlotAt<N>>::slot(&self.inputs).replace(upstream.clone()) {
            previous.remove_listener(&listener);
        }
        upstream.add_listener(listener);
        self.state.set_dirty(true);
    }

    /// Whether slot `N` has been connected.
    #[must_use]
    pub fn is_connected<const N: usize>(&self) -> bool
    where
        I: SlotAt<N>,
    {
        <I as SlotAt<N>>::slot(&self.inputs).is_connected()
    }

    /// Number of input slots.
    #[must_use]
    pub const fn arity(&self) -> usize {
        I::ARITY
    }

    /// Number of live listeners registered on this node.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.listener_count()
    }

    fn listener(&self) -> Weak<dyn Listener> {
        self.this.clone()
    }
}

impl<I: Inputs, T: 'static> Listener for Node<I, T> {
    fn input_invalidated(&self) {
        self.state.set_dirty(true);
    }
}

impl<I: Inputs, T: Clone + 'static> Output<T> for Node<I, T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_valid(&self) -> bool {
        !self.state.is_dirty() && self.inputs.all_valid()
    }

    fn output(&self) -> Result<T, PipelineError> {
        if self.is_valid()
            && let Some(value) = self.cached.borrow().as_ref()
        {
            return Ok(value.clone());
        }

        let _span = tracing::debug_span!("recompute", node = self.name).entered();
        let values = self.inputs.pull(self.name)?;
        let value = (self.compute)(values)?;
        *self.cached.borrow_mut() = Some(value.clone());
        self.recomputes.set(self.recomputes.get() + 1);
        self.state.set_dirty(false);
        tracing::debug!(node = self.name, "recomputed");
        Ok(value)
    }

    fn add_listener(&self, listener: Weak<dyn Listener>) {
        self.state.add(listener);
    }

    fn remove_listener(&self, listener: &Weak<dyn Listener>) {
        self.state.remove(listener);
    }

    fn recompute_count(&self) -> u64 {
        self.recomputes.get()
    }
}

impl<I: Inputs, T: 'static> Drop for Node<I, T> {
    fn drop(&mut self) {
        // `this` can no longer be upgraded here, but it still compares
        // equal to the registrations made through it.
        let listener: Weak<dyn Listener> = self.this.clone();
        self.inputs.detach(&listener);
    }
}

impl<I: Inputs, T: 'static> fmt::Debug for Node<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("arity", &I::ARITY)
            .field("dirty", &self.state.is_dirty())
            .field("cached", &self.cached.borrow().is_some())
            .field("recomputes", &self.recomputes.get())
            .finish_non_exhaustive()
    }
}
