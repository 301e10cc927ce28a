//! Host boundary.
//!
//! The engine never talks to a concrete document. Everything it needs from the
//! hosting environment is expressed by the traits in this module:
//!
//! - [`HostNode`]: tree traversal, text read/write, identity and weak handles.
//! - [`HostDocument`]: ready state, the body, ready notification and
//!   change-notification subscriptions.
//! - [`Scheduler`]: a clock, timers and (optionally) idle callbacks.
//!
//! The host is assumed single-threaded and cooperative: callbacks registered
//! through these traits run one at a time from the host's task queue, and
//! mutation records are delivered *asynchronously*, never from inside the text
//! write that caused them.
//!
//! [`Document`] and [`EventLoop`] are a complete in-memory host with a virtual
//! clock. Tests and the CLI drive the engine through them.

#[path = "host/event_loop.rs"]
mod event_loop;
#[path = "host/memory.rs"]
mod memory;

pub use event_loop::EventLoop;
pub use memory::{Document, MemorySubscription, Node, WeakNode};

use std::time::Duration;

/// A unit of deferred work queued on the host.
pub type Task = Box<dyn FnOnce()>;

/// Receives each batch of mutation records.
pub type MutationCallback<N> = Box<dyn FnMut(&[MutationRecord<N>])>;

/// Identity of a node. Unique among live nodes of one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub usize);

/// What a node is, as far as the walker cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind<'a> {
    Document,
    Element(&'a str),
    Text,
    Comment,
}

bitflags::bitflags! {
    /// Which changes a subscription reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObserveOptions: u8 {
        /// Children added to or removed from the target.
        const CHILD_LIST     = 1 << 0;
        /// Extend observation to every descendant of the target.
        const SUBTREE        = 1 << 1;
        /// Text content of character-data nodes changed.
        const CHARACTER_DATA = 1 << 2;
    }
}

impl Default for ObserveOptions {
    fn default() -> Self {
        ObserveOptions::all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    ChildList,
    CharacterData,
}

/// One observed change.
#[derive(Debug, Clone)]
pub struct MutationRecord<N> {
    pub kind: MutationKind,
    /// The parent whose children changed, or the character-data node itself.
    pub target: N,
    pub added: Vec<N>,
    pub removed: Vec<N>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    /// At least minimally loaded (interactive or complete).
    pub fn is_ready(self) -> bool {
        self != ReadyState::Loading
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("document body is not available")]
    MissingBody,
    #[error("cannot observe a node that is not attached to this document")]
    DetachedTarget,
}

/// Non-owning handle to a node.
pub trait NodeHandle: 'static {
    /// False once the node has been reclaimed by the host.
    fn is_live(&self) -> bool;
}

pub trait HostNode: Clone + 'static {
    type Handle: NodeHandle;

    fn key(&self) -> NodeKey;
    fn kind(&self) -> NodeKind<'_>;
    /// Direct children in document order.
    fn children(&self) -> Vec<Self>;
    fn parent(&self) -> Option<Self>;
    /// Character data of text and comment nodes; `None` for everything else.
    fn text(&self) -> Option<String>;
    fn set_text(&self, text: &str);
    fn downgrade(&self) -> Self::Handle;
}

/// A live change subscription. Dropping it must also stop delivery.
pub trait Subscription {
    fn disconnect(&mut self);
}

pub trait HostDocument: 'static {
    type Node: HostNode;
    type Subscription: Subscription;

    fn ready_state(&self) -> ReadyState;
    fn body(&self) -> Option<Self::Node>;
    /// Run `task` once the document is at least interactive. If it already
    /// is, the task is queued right away.
    fn on_ready(&self, task: Task);
    fn observe(
        &self,
        target: &Self::Node,
        options: ObserveOptions,
        callback: MutationCallback<Self::Node>,
    ) -> Result<Self::Subscription, HostError>;
}

pub trait Scheduler: 'static {
    /// Time elapsed on the host clock.
    fn now(&self) -> Duration;
    fn set_timeout(&self, delay: Duration, task: Task);
    /// Queue `task` for when the host is idle. Hands the task back when the
    /// host has no idle scheduling.
    fn request_idle(&self, task: Task) -> Result<(), Task>;
}
