//! Change subscriber.
//!
//! Deep observation of the document body. The callback never walks; it only
//! invalidates the touched spine of the visited set and pokes the coalescer.
//!
//! ```text
//! records ──> invalidate target + ancestors ──> throttle ──> gate ──> defer(walk from body)
//! ```

use crate::coalescer::{defer, throttle};
use crate::host::{HostDocument, HostError, MutationRecord, Scheduler};
use crate::lifecycle::Shared;
use std::rc::Rc;
use tracing::{trace, warn};

pub(crate) fn attach<D, S>(shared: &Rc<Shared<D, S>>) -> Result<D::Subscription, HostError>
where
    D: HostDocument,
    S: Scheduler,
{
    let body = shared.document.body().ok_or(HostError::MissingBody)?;

    let clock = Rc::downgrade(shared);
    let target = Rc::downgrade(shared);
    let mut trigger = throttle(
        shared.options.throttle_interval,
        move || clock.upgrade().map(|s| s.scheduler.now()).unwrap_or_default(),
        move || {
            if let Some(shared) = target.upgrade() {
                schedule_pass(&shared);
            }
        },
    );

    let weak = Rc::downgrade(shared);
    shared.document.observe(
        &body,
        shared.options.observe,
        Box::new(move |records: &[MutationRecord<D::Node>]| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            note_records(&shared, records);
            if !trigger() {
                shared.stats.borrow_mut().throttled += 1;
            }
        }),
    )
}

fn note_records<D: HostDocument, S: Scheduler>(shared: &Shared<D, S>, records: &[MutationRecord<D::Node>]) {
    let invalidated: usize = {
        let mut visited = shared.visited.borrow_mut();
        records.iter().map(|r| visited.invalidate(&r.target)).sum()
    };
    shared.stats.borrow_mut().triggers += 1;
    trace!(records = records.len(), invalidated, "mutation batch");
}

fn schedule_pass<D: HostDocument, S: Scheduler>(shared: &Rc<Shared<D, S>>) {
    if !shared.is_enabled() {
        return;
    }
    let Some(guard) = shared.gate.try_begin() else {
        shared.stats.borrow_mut().gated += 1;
        trace!("pass already outstanding; trigger dropped");
        return;
    };

    let weak = Rc::downgrade(shared);
    defer(
        &shared.scheduler,
        Box::new(move || {
            let _guard = guard;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if !shared.is_enabled() {
                return;
            }
            if let Err(err) = shared.run_pass() {
                warn!(%err, "change-triggered pass failed");
            }
        }),
    );
}
