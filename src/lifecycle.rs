//! Lifecycle controller.
//!
//! One [`Controller`] per document. It owns the enabled flag, the visited set,
//! the processing gate and the single long-lived change subscription.
//!
//! ```text
//!                 enable (epoch += 1)
//!   ┌──────────┐ ─────────────────────────> ┌─────────┐
//!   │ Disabled │                            │ Enabled │ ──┐ enable: re-initialise
//!   └──────────┘ <───────────────────────── └─────────┘ <─┘
//!                 disable (epoch += 1)
//!
//! enable:  reset visited set, drop stale subscription,
//!          defer { full pass from the body, then attach subscriber }
//! disable: drop subscription (visited set and gate untouched)
//! ```
//!
//! ## Invariants
//!
//! - The walker only runs while the state is `Enabled`.
//! - A deferred initial pass carries the epoch of the transition that
//!   scheduled it and does nothing if another transition happened since.
//! - Host callbacks hold `Weak` references; dropping the controller cancels
//!   every pending task and disconnects the subscription.

use crate::api::default_rewriter;
use crate::coalescer::{ProcessingGate, defer};
use crate::control::{Ack, ControlMessage, PreferenceStore, resolve_enabled};
use crate::engine::{PassMetrics, Rewriter, TreeWalker, VisitedSet};
use crate::host::{HostDocument, HostError, HostNode, Scheduler, Subscription, Task};
use crate::{Error, Options, subscriber};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Disabled,
    Enabled,
}

/// Counters accumulated over the controller's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Walks run, initial and change-triggered.
    pub passes: usize,
    /// Text nodes written across all passes.
    pub writes: usize,
    /// Mutation batches delivered to the subscriber.
    pub triggers: usize,
    /// Batches dropped by the throttle.
    pub throttled: usize,
    /// Admitted batches dropped because a pass was already outstanding.
    pub gated: usize,
    pub last_pass: Option<PassMetrics>,
}

pub(crate) struct Shared<D: HostDocument, S> {
    pub(crate) document: D,
    pub(crate) scheduler: S,
    pub(crate) rewriter: &'static Rewriter<'static>,
    pub(crate) options: Options,
    pub(crate) state: Cell<State>,
    pub(crate) epoch: Cell<u64>,
    pub(crate) visited: RefCell<VisitedSet<<D::Node as HostNode>::Handle>>,
    pub(crate) gate: ProcessingGate,
    pub(crate) subscription: RefCell<Option<D::Subscription>>,
    pub(crate) stats: RefCell<ControllerStats>,
}

impl<D: HostDocument, S: Scheduler> Shared<D, S> {
    pub(crate) fn is_enabled(&self) -> bool {
        self.state.get() == State::Enabled
    }

    /// One walk from the document body.
    pub(crate) fn run_pass(&self) -> Result<PassMetrics, HostError> {
        let body = self.document.body().ok_or(HostError::MissingBody)?;
        let metrics = {
            let mut visited = self.visited.borrow_mut();
            TreeWalker::<D::Node>::new(self.rewriter, &self.options.opaque_tags, &mut *visited).walk(&body)
        };

        debug!(
            writes = metrics.writes,
            visited = metrics.visited,
            text_nodes = metrics.text_nodes,
            skipped_processed = metrics.skipped_processed,
            skipped_opaque = metrics.skipped_opaque,
            elapsed_us = metrics.duration.as_micros() as u64,
            "pass complete"
        );

        let mut stats = self.stats.borrow_mut();
        stats.passes += 1;
        stats.writes += metrics.writes;
        stats.last_pass = Some(metrics.clone());
        Ok(metrics)
    }

    fn bump_epoch(&self) -> u64 {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        epoch
    }

    fn detach(&self) {
        let stale = self.subscription.borrow_mut().take();
        if let Some(mut sub) = stale {
            sub.disconnect();
            debug!("subscriber detached");
        }
    }
}

fn transition<D: HostDocument, S: Scheduler>(shared: &Rc<Shared<D, S>>, enabled: bool) {
    match (shared.state.get(), enabled) {
        (State::Disabled, false) => trace!("already disabled"),
        (_, true) => enable(shared),
        (State::Enabled, false) => disable(shared),
    }
}

fn enable<D: HostDocument, S: Scheduler>(shared: &Rc<Shared<D, S>>) {
    let epoch = shared.bump_epoch();
    shared.state.set(State::Enabled);
    *shared.visited.borrow_mut() = VisitedSet::new();
    shared.detach();
    debug!(epoch, "enabled");

    let weak = Rc::downgrade(shared);
    defer(
        &shared.scheduler,
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                initialize(&shared, epoch, true);
            }
        }),
    );
}

fn disable<D: HostDocument, S: Scheduler>(shared: &Rc<Shared<D, S>>) {
    let epoch = shared.bump_epoch();
    shared.state.set(State::Disabled);
    shared.detach();
    debug!(epoch, "disabled");
}

/// Full pass, then subscribe. A failed subscription is retried once, after
/// the document reports ready, and the retry repeats the pass.
fn initialize<D: HostDocument, S: Scheduler>(shared: &Rc<Shared<D, S>>, epoch: u64, retry: bool) {
    if shared.epoch.get() != epoch || !shared.is_enabled() {
        trace!(epoch, current = shared.epoch.get(), "stale initial pass skipped");
        return;
    }

    if let Err(err) = shared.run_pass() {
        debug!(%err, "initial pass skipped");
    }

    match subscriber::attach(shared) {
        Ok(sub) => {
            *shared.subscription.borrow_mut() = Some(sub);
            debug!(epoch, "subscriber attached");
        }
        Err(err) if retry => {
            debug!(%err, "subscription failed; retrying once the document is ready");
            let weak = Rc::downgrade(shared);
            shared.document.on_ready(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    initialize(&shared, epoch, false);
                }
            }));
        }
        Err(err) => warn!(%err, "subscription failed again; running without change notifications"),
    }
}

/// Drives rewriting for one document.
pub struct Controller<D: HostDocument, S: Scheduler> {
    shared: Rc<Shared<D, S>>,
}

impl<D: HostDocument, S: Scheduler> Controller<D, S> {
    /// A disabled controller using the built-in vocabulary.
    pub fn new(document: D, scheduler: S, options: Options) -> Self {
        let shared = Shared {
            document,
            scheduler,
            rewriter: default_rewriter(),
            options,
            state: Cell::new(State::Disabled),
            epoch: Cell::new(0),
            visited: RefCell::new(VisitedSet::new()),
            gate: ProcessingGate::new(),
            subscription: RefCell::new(None),
            stats: RefCell::new(ControllerStats::default()),
        };
        Controller { shared: Rc::new(shared) }
    }

    /// Apply the stored preference once the document allows it: after the
    /// ready notification if it is still loading, otherwise after
    /// `Options::startup_grace`.
    pub fn start<P: PreferenceStore + ?Sized>(&self, prefs: &P) {
        let enabled = resolve_enabled(prefs);
        debug!(enabled, "startup preference resolved");

        let weak = Rc::downgrade(&self.shared);
        let apply: Task = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                transition(&shared, enabled);
            }
        });

        if self.shared.document.ready_state().is_ready() {
            self.shared.scheduler.set_timeout(self.shared.options.startup_grace, apply);
        } else {
            self.shared.document.on_ready(apply);
        }
    }

    /// Enabling always re-initialises, even when already enabled.
    pub fn set_enabled(&self, enabled: bool) {
        transition(&self.shared, enabled);
    }

    /// Only a well-formed toggle changes state; every message is acknowledged.
    pub fn handle_control(&self, msg: &ControlMessage) -> Ack {
        match msg.toggle_target() {
            Some(enabled) => self.set_enabled(enabled),
            None => debug!(action = ?msg.action, enabled = ?msg.enabled, "control message ignored"),
        }
        Ack::ok()
    }

    pub fn handle_message(&self, raw: &str) -> Ack {
        match ControlMessage::parse(raw) {
            Ok(msg) => self.handle_control(&msg),
            Err(err) => {
                debug!(%err, "malformed control message");
                Ack::ok()
            }
        }
    }

    /// Walk now, outside the scheduler. `None` while disabled.
    pub fn run_pass(&self) -> Result<Option<PassMetrics>, Error> {
        if !self.shared.is_enabled() {
            return Ok(None);
        }
        Ok(Some(self.shared.run_pass()?))
    }

    pub fn state(&self) -> State {
        self.shared.state.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// A change-triggered pass is scheduled or running.
    pub fn is_processing(&self) -> bool {
        self.shared.gate.is_busy()
    }

    pub fn is_subscribed(&self) -> bool {
        self.shared.subscription.borrow().is_some()
    }

    pub fn stats(&self) -> ControllerStats {
        self.shared.stats.borrow().clone()
    }
}

impl<D: HostDocument, S: Scheduler> std::fmt::Debug for Controller<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.shared.state.get())
            .field("epoch", &self.shared.epoch.get())
            .field("subscribed", &self.is_subscribed())
            .field("stats", &*self.shared.stats.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryPreferences;
    use crate::host::{Document, EventLoop, Node, ObserveOptions, ReadyState};
    use std::time::Duration;

    fn paragraph(doc: &Document, text: &str) -> Node {
        let p = doc.create_element("p");
        p.append_child(&doc.create_text(text));
        doc.body().unwrap().append_child(&p);
        p
    }

    fn setup(el: &EventLoop, options: Options) -> (Document, Controller<Document, EventLoop>) {
        let doc = Document::new(el);
        let controller = Controller::new(doc.clone(), el.clone(), options);
        (doc, controller)
    }

    fn enabled(el: &EventLoop, options: Options) -> (Document, Controller<Document, EventLoop>) {
        let (doc, controller) = setup(el, options);
        controller.set_enabled(true);
        el.run_until_stalled();
        (doc, controller)
    }

    #[test]
    fn start_applies_the_default_after_the_grace_delay() {
        let el = EventLoop::new();
        let (doc, controller) = setup(&el, Options::default());
        paragraph(&doc, "Israel rises");

        controller.start(&MemoryPreferences::new());
        el.advance(Duration::from_millis(99));
        assert_eq!(doc.text_content(), "Israel rises");
        assert_eq!(controller.state(), State::Disabled);

        el.advance(Duration::from_millis(1));
        assert_eq!(doc.text_content(), "💩 rises");
        assert!(controller.is_enabled());
        assert!(controller.is_subscribed());
        assert_eq!(controller.stats().passes, 1);
    }

    #[test]
    fn start_waits_for_a_loading_document() {
        let el = EventLoop::new();
        let doc = Document::loading(&el);
        let controller = Controller::new(doc.clone(), el.clone(), Options::default());
        paragraph(&doc, "Netanyahu");

        controller.start(&MemoryPreferences::new());
        el.advance(Duration::from_secs(5));
        assert_eq!(doc.text_content(), "Netanyahu");

        doc.set_ready_state(ReadyState::Interactive);
        el.run_until_stalled();
        assert_eq!(doc.text_content(), "🤡");
    }

    #[test]
    fn disabled_preference_leaves_the_document_untouched() {
        let el = EventLoop::new();
        let (doc, controller) = setup(&el, Options::default());
        paragraph(&doc, "Israel");
        let before = doc.mutation_count();

        controller.start(&MemoryPreferences::with_enabled(false));
        el.advance(Duration::from_secs(1));

        assert_eq!(controller.state(), State::Disabled);
        assert_eq!(doc.text_content(), "Israel");
        assert_eq!(doc.mutation_count(), before);
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn inserted_content_is_rewritten() {
        let el = EventLoop::new();
        let (doc, controller) = enabled(&el, Options::default());

        paragraph(&doc, "breaking: Netanyahu");
        el.run_until_stalled();

        assert_eq!(doc.text_content(), "breaking: 🤡");
        assert_eq!(controller.stats().passes, 2);
    }

    #[test]
    fn text_changed_under_a_processed_element_is_rewritten() {
        let el = EventLoop::new();
        let (doc, controller) = enabled(&el, Options::default());
        let p = paragraph(&doc, "calm");
        el.run_until_stalled();
        assert_eq!(controller.stats().passes, 2);

        el.advance(Duration::from_millis(500));
        p.children()[0].set_text("Israel again");
        el.run_until_stalled();

        assert_eq!(doc.text_content(), "💩 again");
    }

    #[test]
    fn detached_subtree_appended_under_a_processed_element_is_rewritten() {
        let el = EventLoop::new();
        let (doc, controller) = setup(&el, Options::default());
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        let calm = doc.create_element("p");
        calm.append_child(&doc.create_text("calm"));
        inner.append_child(&calm);
        outer.append_child(&inner);
        doc.body().unwrap().append_child(&outer);
        controller.set_enabled(true);
        el.run_until_stalled();
        assert_eq!(controller.stats().passes, 1);

        el.advance(Duration::from_millis(500));
        let article = doc.create_element("article");
        let section = doc.create_element("section");
        let p = doc.create_element("p");
        let text = doc.create_text("Netanyahu");
        p.append_child(&text);
        section.append_child(&p);
        article.append_child(&section);
        inner.append_child(&article);
        el.run_until_stalled();

        assert_eq!(text.text().as_deref(), Some("🤡"));
        assert_eq!(doc.text_content(), "calm🤡");
        let stats = controller.stats();
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.last_pass.map(|m| m.skipped_processed), Some(1));
    }

    #[test]
    fn character_data_changes_are_ignored_when_not_observed() {
        let el = EventLoop::new();
        let options = Options { observe: ObserveOptions::CHILD_LIST | ObserveOptions::SUBTREE, ..Options::default() };
        let (doc, controller) = setup(&el, options);
        let p = paragraph(&doc, "calm");
        controller.set_enabled(true);
        el.run_until_stalled();

        el.advance(Duration::from_millis(500));
        p.children()[0].set_text("Israel");
        el.run_until_stalled();

        assert_eq!(doc.text_content(), "Israel");
        let stats = controller.stats();
        assert_eq!(stats.triggers, 0);
        assert_eq!(stats.passes, 1);
    }

    #[test]
    fn mutations_within_one_interval_trigger_at_most_one_walk() {
        let el = EventLoop::new();
        let (doc, controller) = enabled(&el, Options::default());

        for _ in 0..10 {
            paragraph(&doc, "Israel");
            el.advance(Duration::from_millis(10));
        }

        let stats = controller.stats();
        assert_eq!(stats.passes, 2);
        assert!(stats.throttled >= 9);
        // Only the paragraph present at the admitted walk was rewritten.
        assert!(doc.text_content().starts_with("💩Israel"));
    }

    #[test]
    fn trigger_while_a_pass_is_outstanding_is_dropped() {
        let el = EventLoop::new();
        let options = Options { throttle_interval: Duration::ZERO, ..Options::default() };
        let (doc, controller) = enabled(&el, options);

        paragraph(&doc, "Israel");
        let second = doc.clone();
        el.queue_task(move || {
            paragraph(&second, "Netanyahu");
        });
        el.run_until_stalled();

        let stats = controller.stats();
        assert_eq!(stats.gated, 1);
        // The outstanding walk saw both paragraphs.
        assert_eq!(doc.text_content(), "💩🤡");
        assert_eq!(stats.writes, 2);
        assert!(!controller.is_processing());
    }

    #[test]
    fn toggle_resets_tracking_without_rewriting_twice() {
        let el = EventLoop::new();
        let (doc, controller) = setup(&el, Options::default());
        paragraph(&doc, "Israel");
        controller.set_enabled(true);
        el.run_until_stalled();
        assert_eq!(doc.text_content(), "💩");

        let ack = controller.handle_message(r#"{"action":"toggle","enabled":false}"#);
        assert!(ack.success);
        assert!(!controller.is_subscribed());

        paragraph(&doc, "Netanyahu");
        el.advance(Duration::from_secs(1));
        assert_eq!(doc.text_content(), "💩Netanyahu");

        controller.handle_control(&ControlMessage::toggle(true));
        el.run_until_stalled();

        assert_eq!(doc.text_content(), "💩🤡");
        assert_eq!(controller.stats().last_pass.map(|m| m.writes), Some(1));
        assert!(controller.is_subscribed());
    }

    #[test]
    fn enabling_a_clean_document_performs_no_mutations() {
        let el = EventLoop::new();
        let (doc, controller) = setup(&el, Options::default());
        paragraph(&doc, "a quiet afternoon");
        let before = doc.mutation_count();

        controller.set_enabled(true);
        el.run_until_stalled();

        assert_eq!(doc.mutation_count(), before);
        assert_eq!(controller.stats().writes, 0);
        assert_eq!(controller.stats().passes, 1);
    }

    #[test]
    fn disabling_stops_rewriting() {
        let el = EventLoop::new();
        let (doc, controller) = enabled(&el, Options::default());

        controller.set_enabled(false);
        paragraph(&doc, "Israel");
        el.advance(Duration::from_secs(2));

        assert_eq!(doc.text_content(), "Israel");
        assert_eq!(controller.stats().passes, 1);
        assert_eq!(controller.run_pass().unwrap(), None);
    }

    #[test]
    fn malformed_messages_are_acknowledged_without_change() {
        let el = EventLoop::new();
        let (_doc, controller) = enabled(&el, Options::default());

        for raw in ["garbage", "{}", r#"{"action":"toggle"}"#, r#"{"action":"other","enabled":false}"#] {
            assert_eq!(controller.handle_message(raw), Ack::ok());
            assert!(controller.is_enabled());
        }
    }

    #[test]
    fn stale_initial_pass_is_skipped() {
        let el = EventLoop::new();
        let (doc, controller) = setup(&el, Options::default());
        paragraph(&doc, "Israel");

        controller.set_enabled(true);
        controller.set_enabled(false);
        el.run_until_stalled();
        assert_eq!(doc.text_content(), "Israel");
        assert_eq!(controller.stats().passes, 0);

        controller.set_enabled(true);
        controller.set_enabled(true);
        el.run_until_stalled();
        assert_eq!(doc.text_content(), "💩");
        assert_eq!(controller.stats().passes, 1);
    }

    #[test]
    fn missing_body_is_retried_after_ready() {
        let el = EventLoop::new();
        let doc = Document::empty(&el, ReadyState::Loading);
        let controller = Controller::new(doc.clone(), el.clone(), Options::default());

        controller.set_enabled(true);
        el.run_until_stalled();
        assert!(!controller.is_subscribed());
        assert_eq!(controller.stats().passes, 0);

        doc.attach_body();
        paragraph(&doc, "Israel");
        doc.set_ready_state(ReadyState::Interactive);
        el.run_until_stalled();

        assert!(controller.is_subscribed());
        assert_eq!(doc.text_content(), "💩");
    }

    #[test]
    fn second_subscription_failure_leaves_controller_enabled() {
        let el = EventLoop::new();
        let doc = Document::empty(&el, ReadyState::Complete);
        let controller = Controller::new(doc.clone(), el.clone(), Options::default());

        controller.set_enabled(true);
        el.run_until_stalled();

        assert!(controller.is_enabled());
        assert!(!controller.is_subscribed());
        assert!(matches!(controller.run_pass(), Err(Error::Host(HostError::MissingBody))));
    }

    #[test]
    fn hosts_without_idle_callbacks_use_a_timer() {
        let el = EventLoop::without_idle();
        let (doc, controller) = setup(&el, Options::default());
        paragraph(&doc, "Netanyahu");

        controller.set_enabled(true);
        assert_eq!(el.pending_timers(), 1);
        el.run_until_stalled();

        assert_eq!(doc.text_content(), "🤡");
        assert!(controller.is_subscribed());
    }

    #[test]
    fn dropping_the_controller_disconnects() {
        let el = EventLoop::new();
        let (doc, controller) = enabled(&el, Options::default());
        assert_eq!(doc.observer_count(), 1);

        drop(controller);
        paragraph(&doc, "Israel");
        el.advance(Duration::from_secs(1));

        assert_eq!(doc.observer_count(), 0);
        assert_eq!(doc.text_content(), "Israel");
    }
}
