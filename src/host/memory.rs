//! In-memory document.
//!
//! A small `Rc` tree with just enough DOM behaviour for the engine: elements,
//! text and comment nodes, child insertion/removal, character-data writes,
//! a ready state and subtree observers. Mutation records are batched per
//! observer and delivered from a microtask on the owning [`EventLoop`].
//!
//! Ownership: the document owns its root, parents own their children, and
//! every back-reference (child → parent, node → document) is weak. Dropping a
//! detached subtree reclaims it.

use super::{
    EventLoop, HostDocument, HostError, HostNode, MutationCallback, MutationKind, MutationRecord, NodeHandle, NodeKey,
    NodeKind, ObserveOptions, ReadyState, Subscription, Task,
};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

const BODY_TAG: &str = "body";

enum Kind {
    Document,
    Element(Box<str>),
    Text,
    Comment,
}

#[derive(Default)]
struct Tree {
    parent: Weak<NodeData>,
    children: Vec<Node>,
    text: Option<String>,
}

struct NodeData {
    kind: Kind,
    doc: Weak<DocShared>,
    tree: RefCell<Tree>,
}

impl Drop for NodeData {
    // Unlink uniquely owned descendants iteratively; the default drop would
    // recurse once per tree level.
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.tree.get_mut().children);
        while let Some(node) = stack.pop() {
            if Rc::strong_count(&node.0) == 1 {
                stack.append(&mut node.0.tree.borrow_mut().children);
            }
        }
    }
}

/// Strong reference to a node.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

/// Weak reference to a node.
#[derive(Clone)]
pub struct WeakNode(Weak<NodeData>);

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0.kind {
            Kind::Document => write!(f, "#document"),
            Kind::Element(tag) => write!(f, "<{tag}>"),
            Kind::Text => write!(f, "{:?}", self.0.tree.borrow().text.as_deref().unwrap_or("")),
            Kind::Comment => write!(f, "<!--{}-->", self.0.tree.borrow().text.as_deref().unwrap_or("")),
        }
    }
}

impl std::fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WeakNode").field(&self.is_live()).finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }
}

impl NodeHandle for WeakNode {
    fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Node {
    fn new(doc: Weak<DocShared>, kind: Kind, text: Option<String>) -> Self {
        Node(Rc::new(NodeData { kind, doc, tree: RefCell::new(Tree { text, ..Tree::default() }) }))
    }

    pub fn tag_name(&self) -> Option<&str> {
        match &self.0.kind {
            Kind::Element(tag) => Some(&**tag),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.tree.borrow().children.clone()
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.tree.borrow().parent.upgrade().map(Node)
    }

    pub fn text(&self) -> Option<String> {
        self.0.tree.borrow().text.clone()
    }

    /// Replace the character data of a text or comment node. Ignored for
    /// other kinds.
    pub fn set_text(&self, text: &str) {
        if !matches!(self.0.kind, Kind::Text | Kind::Comment) {
            return;
        }
        self.0.tree.borrow_mut().text = Some(text.to_string());
        self.notify(MutationKind::CharacterData, Vec::new(), Vec::new());
    }

    /// Concatenated text of all descendant text nodes, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let tree = node.0.tree.borrow();
            if matches!(node.0.kind, Kind::Text) {
                out.push_str(tree.text.as_deref().unwrap_or(""));
            }
            stack.extend(tree.children.iter().rev().cloned());
        }
        out
    }

    /// Append `child`, moving it out of its previous parent. Appending a node
    /// to itself or to one of its descendants is ignored.
    pub fn append_child(&self, child: &Node) {
        if self.is_inclusive_descendant_of(child) {
            return;
        }
        if let Some(old_parent) = child.parent() {
            old_parent.remove_child(child);
        }

        child.0.tree.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.tree.borrow_mut().children.push(child.clone());
        self.notify(MutationKind::ChildList, vec![child.clone()], Vec::new());
    }

    /// Detach `child`. Returns false if it is not a child of `self`.
    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut tree = self.0.tree.borrow_mut();
            let Some(index) = tree.children.iter().position(|c| c == child) else {
                return false;
            };
            tree.children.remove(index)
        };
        removed.0.tree.borrow_mut().parent = Weak::new();
        self.notify(MutationKind::ChildList, Vec::new(), vec![removed]);
        true
    }

    pub fn key(&self) -> NodeKey {
        NodeKey(Rc::as_ptr(&self.0) as usize)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    fn is_inclusive_descendant_of(&self, ancestor: &Node) -> bool {
        let mut cursor = Some(self.clone());
        while let Some(node) = cursor {
            if node == *ancestor {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    fn notify(&self, kind: MutationKind, added: Vec<Node>, removed: Vec<Node>) {
        let Some(doc) = self.0.doc.upgrade() else {
            return;
        };
        doc.mutations.set(doc.mutations.get() + 1);

        let record = MutationRecord { kind, target: self.clone(), added, removed };
        let mut observers = doc.observers.borrow_mut();
        for entry in observers.iter_mut() {
            if !entry.wants(&record) {
                continue;
            }
            entry.pending.push(record.clone());
            if !entry.scheduled {
                entry.scheduled = true;
                let weak = Rc::downgrade(&doc);
                let id = entry.id;
                doc.event_loop.queue_microtask(move || deliver(&weak, id));
            }
        }
    }
}

impl HostNode for Node {
    type Handle = WeakNode;

    fn key(&self) -> NodeKey {
        Node::key(self)
    }

    fn kind(&self) -> NodeKind<'_> {
        match &self.0.kind {
            Kind::Document => NodeKind::Document,
            Kind::Element(tag) => NodeKind::Element(&**tag),
            Kind::Text => NodeKind::Text,
            Kind::Comment => NodeKind::Comment,
        }
    }

    fn children(&self) -> Vec<Self> {
        Node::children(self)
    }

    fn parent(&self) -> Option<Self> {
        Node::parent(self)
    }

    fn text(&self) -> Option<String> {
        Node::text(self)
    }

    fn set_text(&self, text: &str) {
        Node::set_text(self, text)
    }

    fn downgrade(&self) -> WeakNode {
        Node::downgrade(self)
    }
}

// --- Observers ---------------------------------------------------------------

struct ObserverEntry {
    id: u64,
    target: Node,
    options: ObserveOptions,
    callback: Rc<RefCell<MutationCallback<Node>>>,
    pending: Vec<MutationRecord<Node>>,
    scheduled: bool,
}

impl ObserverEntry {
    fn wants(&self, record: &MutationRecord<Node>) -> bool {
        let kind_enabled = match record.kind {
            MutationKind::ChildList => self.options.contains(ObserveOptions::CHILD_LIST),
            MutationKind::CharacterData => self.options.contains(ObserveOptions::CHARACTER_DATA),
        };
        if !kind_enabled {
            return false;
        }
        if record.target == self.target {
            return true;
        }
        self.options.contains(ObserveOptions::SUBTREE) && record.target.is_inclusive_descendant_of(&self.target)
    }
}

fn deliver(doc: &Weak<DocShared>, id: u64) {
    let Some(doc) = doc.upgrade() else {
        return;
    };
    let (callback, records) = {
        let mut observers = doc.observers.borrow_mut();
        let Some(entry) = observers.iter_mut().find(|e| e.id == id) else {
            return;
        };
        entry.scheduled = false;
        (entry.callback.clone(), std::mem::take(&mut entry.pending))
    };
    if records.is_empty() {
        return;
    }

    let mut callback = callback.borrow_mut();
    (&mut *callback)(&records);
}

/// Handle returned by [`Document::observe`](HostDocument::observe).
/// Disconnects on drop; pending undelivered records are discarded.
pub struct MemorySubscription {
    doc: Weak<DocShared>,
    id: u64,
}

impl std::fmt::Debug for MemorySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySubscription").field("id", &self.id).finish()
    }
}

impl Subscription for MemorySubscription {
    fn disconnect(&mut self) {
        if let Some(doc) = self.doc.upgrade() {
            doc.observers.borrow_mut().retain(|e| e.id != self.id);
        }
        self.doc = Weak::new();
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// --- Document ----------------------------------------------------------------

struct DocShared {
    event_loop: EventLoop,
    root: Node,
    ready_state: Cell<ReadyState>,
    ready_waiters: RefCell<Vec<Task>>,
    observers: RefCell<Vec<ObserverEntry>>,
    next_observer: Cell<u64>,
    mutations: Cell<u64>,
}

/// An in-memory document bound to one [`EventLoop`]. Cheap to clone.
#[derive(Clone)]
pub struct Document {
    shared: Rc<DocShared>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("ready_state", &self.shared.ready_state.get())
            .field("observers", &self.shared.observers.borrow().len())
            .field("mutations", &self.shared.mutations.get())
            .finish()
    }
}

impl Document {
    /// A fully loaded document with an empty body.
    pub fn new(event_loop: &EventLoop) -> Self {
        let doc = Document::empty(event_loop, ReadyState::Complete);
        doc.attach_body();
        doc
    }

    /// A document that is still loading, with an empty body.
    pub fn loading(event_loop: &EventLoop) -> Self {
        let doc = Document::empty(event_loop, ReadyState::Loading);
        doc.attach_body();
        doc
    }

    /// A document without a body.
    pub fn empty(event_loop: &EventLoop, ready_state: ReadyState) -> Self {
        let shared = Rc::new_cyclic(|weak: &Weak<DocShared>| DocShared {
            event_loop: event_loop.clone(),
            root: Node::new(weak.clone(), Kind::Document, None),
            ready_state: Cell::new(ready_state),
            ready_waiters: RefCell::new(Vec::new()),
            observers: RefCell::new(Vec::new()),
            next_observer: Cell::new(0),
            mutations: Cell::new(0),
        });
        Document { shared }
    }

    pub fn root(&self) -> Node {
        self.shared.root.clone()
    }

    pub fn body(&self) -> Option<Node> {
        self.shared
            .root
            .children()
            .into_iter()
            .find(|c| c.tag_name().is_some_and(|t| t.eq_ignore_ascii_case(BODY_TAG)))
    }

    /// Return the body, creating it first if the document has none.
    pub fn attach_body(&self) -> Node {
        if let Some(body) = self.body() {
            return body;
        }
        let body = self.create_element(BODY_TAG);
        self.shared.root.append_child(&body);
        body
    }

    pub fn create_element(&self, tag: &str) -> Node {
        Node::new(Rc::downgrade(&self.shared), Kind::Element(tag.into()), None)
    }

    pub fn create_text(&self, text: &str) -> Node {
        Node::new(Rc::downgrade(&self.shared), Kind::Text, Some(text.to_string()))
    }

    pub fn create_comment(&self, text: &str) -> Node {
        Node::new(Rc::downgrade(&self.shared), Kind::Comment, Some(text.to_string()))
    }

    pub fn ready_state(&self) -> ReadyState {
        self.shared.ready_state.get()
    }

    /// Leaving `Loading` queues every pending ready waiter as a task.
    pub fn set_ready_state(&self, state: ReadyState) {
        let previous = self.shared.ready_state.replace(state);
        if previous.is_ready() || !state.is_ready() {
            return;
        }
        let waiters = std::mem::take(&mut *self.shared.ready_waiters.borrow_mut());
        for task in waiters {
            self.shared.event_loop.queue_task(task);
        }
    }

    /// Total number of mutations performed on nodes of this document.
    pub fn mutation_count(&self) -> u64 {
        self.shared.mutations.get()
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.borrow().len()
    }

    /// Text content of the body, or an empty string without one.
    pub fn text_content(&self) -> String {
        self.body().map(|b| b.text_content()).unwrap_or_default()
    }
}

impl HostDocument for Document {
    type Node = Node;
    type Subscription = MemorySubscription;

    fn ready_state(&self) -> ReadyState {
        Document::ready_state(self)
    }

    fn body(&self) -> Option<Node> {
        Document::body(self)
    }

    fn on_ready(&self, task: Task) {
        if self.ready_state().is_ready() {
            self.shared.event_loop.queue_task(task);
        } else {
            self.shared.ready_waiters.borrow_mut().push(task);
        }
    }

    fn observe(
        &self,
        target: &Node,
        options: ObserveOptions,
        callback: MutationCallback<Node>,
    ) -> Result<MemorySubscription, HostError> {
        if !target.is_inclusive_descendant_of(&self.shared.root) {
            return Err(HostError::DetachedTarget);
        }

        let id = self.shared.next_observer.get();
        self.shared.next_observer.set(id + 1);
        self.shared.observers.borrow_mut().push(ObserverEntry {
            id,
            target: target.clone(),
            options,
            callback: Rc::new(RefCell::new(callback)),
            pending: Vec::new(),
            scheduled: false,
        });

        Ok(MemorySubscription { doc: Rc::downgrade(&self.shared), id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<Vec<MutationKind>>>>, MutationCallback<Node>) {
        let batches = Rc::new(RefCell::new(Vec::new()));
        let sink = batches.clone();
        let callback: MutationCallback<Node> = Box::new(move |records: &[MutationRecord<Node>]| {
            sink.borrow_mut().push(records.iter().map(|r| r.kind).collect());
        });
        (batches, callback)
    }

    #[test]
    fn records_are_batched_and_delivered_asynchronously() {
        let el = EventLoop::new();
        let doc = Document::new(&el);
        let body = doc.body().unwrap();
        let (batches, callback) = recorder();
        let _sub = doc.observe(&body, ObserveOptions::default(), callback).unwrap();

        let p = doc.create_element("p");
        let text = doc.create_text("hello");
        p.append_child(&text);
        body.append_child(&p);
        text.set_text("bye");
        assert!(batches.borrow().is_empty());

        el.run_until_stalled();
        assert_eq!(*batches.borrow(), vec![vec![MutationKind::ChildList, MutationKind::CharacterData]]);
    }

    #[test]
    fn subtree_flag_controls_descendant_records() {
        let el = EventLoop::new();
        let doc = Document::new(&el);
        let body = doc.body().unwrap();
        let div = doc.create_element("div");
        body.append_child(&div);
        let (batches, callback) = recorder();
        let _sub = doc.observe(&body, ObserveOptions::CHILD_LIST, callback).unwrap();

        div.append_child(&doc.create_text("nested"));
        el.run_until_stalled();
        assert!(batches.borrow().is_empty());

        body.append_child(&doc.create_text("direct"));
        el.run_until_stalled();
        assert_eq!(batches.borrow().len(), 1);
    }

    #[test]
    fn disconnect_discards_pending_records() {
        let el = EventLoop::new();
        let doc = Document::new(&el);
        let body = doc.body().unwrap();
        let (batches, callback) = recorder();
        let mut sub = doc.observe(&body, ObserveOptions::default(), callback).unwrap();

        body.append_child(&doc.create_text("x"));
        sub.disconnect();
        el.run_until_stalled();

        assert!(batches.borrow().is_empty());
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn observing_a_detached_node_fails() {
        let el = EventLoop::new();
        let doc = Document::new(&el);
        let (_, callback) = recorder();

        let err = doc.observe(&doc.create_element("div"), ObserveOptions::default(), callback).unwrap_err();
        assert_eq!(err, HostError::DetachedTarget);
    }

    #[test]
    fn ready_waiters_run_when_loading_ends() {
        let el = EventLoop::new();
        let doc = Document::loading(&el);
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        doc.on_ready(Box::new(move || flag.set(true)));

        el.run_until_stalled();
        assert!(!fired.get());

        doc.set_ready_state(ReadyState::Interactive);
        el.run_until_stalled();
        assert!(fired.get());
    }

    #[test]
    fn appending_an_ancestor_is_ignored() {
        let el = EventLoop::new();
        let doc = Document::new(&el);
        let outer = doc.create_element("div");
        let inner = doc.create_element("span");
        outer.append_child(&inner);

        inner.append_child(&outer);
        assert_eq!(outer.children(), vec![inner.clone()]);
        assert!(inner.children().is_empty());
    }

    #[test]
    fn moving_a_child_detaches_it_from_the_old_parent() {
        let el = EventLoop::new();
        let doc = Document::new(&el);
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        let text = doc.create_text("t");
        a.append_child(&text);
        b.append_child(&text);

        assert!(a.children().is_empty());
        assert_eq!(text.parent(), Some(b.clone()));
    }
}
