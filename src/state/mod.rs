// src/state/mod.rs

//! Hierarchical progress and cancellation coordinator
//!
//! A [`State`] is one node of a progress tree, representing one unit of
//! declared work. Callers declare a step count once per generation, then
//! call [`State::done`] after each step. For nested work, a caller obtains
//! a sub-node with [`State::get_child`], passes it down, and the child's
//! percentage/cancellability/activity events are interpolated into the
//! parent automatically, so an arbitrarily deep call chain reports one
//! monotonically increasing 0-100% value at the root.
//!
//! A node with a single step is transparent: its child's percentage is
//! forwarded 1:1, which keeps wrapper functions from flattening progress
//! resolution.
//!
//! # Example
//!
//! ```
//! use zest::State;
//!
//! fn refresh(state: &State) -> zest::Result<()> {
//!     state.set_number_of_steps(2)?;
//!
//!     // download, delegating progress to a sub-node
//!     let child = state.get_child();
//!     child.set_number_of_steps(10)?;
//!     for _ in 0..10 {
//!         child.done()?;
//!     }
//!     state.done()?;
//!
//!     // parse
//!     state.done()?;
//!     Ok(())
//! }
//!
//! let state = State::new();
//! refresh(&state).unwrap();
//! assert_eq!(state.percentage(), 100);
//! ```
//!
//! The model is single-threaded and cooperative: nothing here spawns
//! threads or performs I/O, and every transition happens synchronously on
//! the caller's stack. Only the shared cancellation token may be set from
//! another thread.

mod action;
mod cancel;
mod events;
mod weights;

pub use action::Action;
pub use cancel::Cancellation;
pub use events::{ActionChange, HandlerId, PackageProgress};

use std::cell::RefCell;
use std::panic::Location;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::error::{Error, ErrorAction, Result};
use crate::lock::{LockId, LockKind, LockMode, LockPolicy};
use events::Signals;
use weights::StepWeights;

/// Nodes whose share of the root's range falls below this stop emitting;
/// their contribution would not move the root by a full percent.
const GLOBAL_SHARE_THRESHOLD: f64 = 0.01;

/// Number of throughput samples kept for smoothing.
const SPEED_SAMPLES: usize = 5;

/// Injected policy deciding whether an error is ignorable or fatal.
pub type ErrorPolicy = Rc<dyn Fn(&Error) -> ErrorAction>;

/// One node of the progress tree. Cheap to clone; clones share the node.
///
/// A tree is owned by whoever created the root. Each node owns at most one
/// active child; requesting another child replaces and disconnects the
/// previous one. The parent back-pointer is weak and used only for
/// diagnostics.
#[derive(Clone)]
pub struct State {
    inner: Rc<RefCell<Inner>>,
    signals: Rc<Signals>,
}

#[derive(Clone)]
struct WeakState {
    inner: Weak<RefCell<Inner>>,
    signals: Weak<Signals>,
}

impl WeakState {
    fn upgrade(&self) -> Option<State> {
        Some(State {
            inner: self.inner.upgrade()?,
            signals: self.signals.upgrade()?,
        })
    }
}

/// Listener ids the parent holds on its child, disconnected when the child
/// is replaced or the parent is reset.
struct ChildHandlers {
    percentage: HandlerId,
    subpercentage: HandlerId,
    allow_cancel: HandlerId,
    action: HandlerId,
    speed: HandlerId,
    package_progress: HandlerId,
}

impl ChildHandlers {
    fn disconnect(&self, signals: &Signals) {
        signals.percentage.disconnect(self.percentage);
        signals.subpercentage.disconnect(self.subpercentage);
        signals.allow_cancel.disconnect(self.allow_cancel);
        signals.action.disconnect(self.action);
        signals.speed.disconnect(self.speed);
        signals.package_progress.disconnect(self.package_progress);
    }
}

struct Inner {
    steps: u32,
    current: u32,
    last_percentage: u32,
    weights: Option<StepWeights>,
    /// Where the steps were declared, for chain diagnostics.
    declared_at: Option<String>,
    allow_cancel: bool,
    allow_cancel_child: bool,
    /// Last AND-reduced value reported to observers, to dedupe events.
    reported_allow_cancel: bool,
    action: Option<Action>,
    last_action: Option<Action>,
    action_hint: Option<String>,
    child: Option<State>,
    child_handlers: Option<ChildHandlers>,
    parent: Weak<RefCell<Inner>>,
    /// Fraction of the root's 0-100 range this node represents.
    global_share: f64,
    speed: u64,
    speed_samples: [u64; SPEED_SAMPLES],
    speed_index: usize,
    locks: Vec<LockId>,
    cancellation: Option<Cancellation>,
    error_policy: Option<ErrorPolicy>,
    lock_policy: Option<Rc<dyn LockPolicy>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            steps: 0,
            current: 0,
            last_percentage: 0,
            weights: None,
            declared_at: None,
            allow_cancel: true,
            allow_cancel_child: true,
            reported_allow_cancel: true,
            action: None,
            last_action: None,
            action_hint: None,
            child: None,
            child_handlers: None,
            parent: Weak::new(),
            global_share: 1.0,
            speed: 0,
            speed_samples: [0; SPEED_SAMPLES],
            speed_index: 0,
            locks: Vec::new(),
            cancellation: None,
            error_policy: None,
            lock_policy: None,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // residual claims are released on teardown, exactly once
        let ids = std::mem::take(&mut self.locks);
        if ids.is_empty() {
            return;
        }
        if let Some(policy) = &self.lock_policy {
            for id in ids {
                if let Err(err) = policy.release(id) {
                    warn!("failed to release lock {id} on teardown: {err}");
                }
            }
        } else {
            warn!("{} lock(s) dropped with no lock handler", ids.len());
        }
    }
}

/// Discrete step count to percentage, truncating.
fn discrete_to_percent(discrete: u32, steps: u32) -> u32 {
    if discrete > steps {
        return 100;
    }
    if steps == 0 {
        warn!("converting a discrete value with zero steps");
        return 0;
    }
    discrete * 100 / steps
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Create a fresh, unconfigured root node.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::default())),
            signals: Rc::new(Signals::default()),
        }
    }

    fn downgrade(&self) -> WeakState {
        WeakState {
            inner: Rc::downgrade(&self.inner),
            signals: Rc::downgrade(&self.signals),
        }
    }

    // ---- step configuration -------------------------------------------

    /// Declare `steps` uniform sub-steps for this generation.
    ///
    /// `steps == 0` succeeds and leaves the node unconfigured ("nothing to
    /// do"). Declaring steps twice in one generation is `InvalidState`.
    #[track_caller]
    pub fn set_number_of_steps(&self, steps: u32) -> Result<()> {
        let caller = Location::caller();
        if steps == 0 {
            debug!("zero steps declared at {caller}, nothing to do");
            return Ok(());
        }
        self.check_steps_unset(caller)?;
        // implicit reset of the previous generation
        self.reset();
        let mut inner = self.inner.borrow_mut();
        inner.steps = steps;
        inner.declared_at = Some(caller.to_string());
        Ok(())
    }

    /// Declare weighted sub-steps; the weights must sum to exactly 100.
    #[track_caller]
    pub fn set_weighted_steps(&self, weights: &[u32]) -> Result<()> {
        let caller = Location::caller();
        self.check_steps_unset(caller)?;
        let table = StepWeights::new(weights)?;
        self.reset();
        let mut inner = self.inner.borrow_mut();
        inner.steps = table.len();
        inner.weights = Some(table);
        inner.declared_at = Some(caller.to_string());
        Ok(())
    }

    fn check_steps_unset(&self, caller: &Location<'_>) -> Result<()> {
        let existing = self.inner.borrow().steps;
        if existing != 0 {
            self.log_chain();
            return Err(Error::InvalidState(format!(
                "steps already set to {existing} [{caller}]"
            )));
        }
        Ok(())
    }

    /// Return the node to unconfigured for reuse as a new sibling step.
    ///
    /// Clears the step counters, the percentage watermark and the child
    /// wiring; the cancellation token, global share and injected policies
    /// survive.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.inner.borrow_mut();
            inner.steps = 0;
            inner.current = 0;
            inner.last_percentage = 0;
            inner.weights = None;
            inner.declared_at = None;
            inner.child_handlers.take().zip(inner.child.take())
        };
        if let Some((handlers, child)) = previous {
            handlers.disconnect(&child.signals);
        }
    }

    // ---- advancing ----------------------------------------------------

    /// Mark the current sub-step as finished and advance the percentage.
    ///
    /// Fails with `InvalidState` if no steps were declared or the node is
    /// already complete, and with `Cancelled` if the shared token is set
    /// (unless the injected error policy chooses to ignore it).
    #[track_caller]
    pub fn done(&self) -> Result<()> {
        let caller = Location::caller();
        if let Err(err) = self.check() {
            match self.error_handler(&err) {
                ErrorAction::Ignore => warn!("ignoring cancellation at {caller}"),
                ErrorAction::Fatal => return Err(err),
            }
        }
        {
            let inner = self.inner.borrow();
            if inner.steps == 0 {
                drop(inner);
                self.log_chain();
                return Err(Error::InvalidState(format!(
                    "done with no steps declared [{caller}]"
                )));
            }
            if inner.current == inner.steps {
                drop(inner);
                self.log_chain();
                return Err(Error::InvalidState(format!(
                    "already at 100% [{caller}]"
                )));
            }
            if let Some(child) = &inner.child {
                let child_inner = child.inner.borrow();
                if child_inner.current != child_inner.steps {
                    debug!(
                        "child at {}/{} steps when parent finished its step [{caller}]",
                        child_inner.current, child_inner.steps
                    );
                }
            }
        }

        // cancellation was just checked, so this is a safe point again
        self.set_allow_cancel(true);

        let percentage = {
            let mut inner = self.inner.borrow_mut();
            inner.current += 1;
            match &inner.weights {
                Some(weights) => weights.completed_percent(inner.current),
                None => discrete_to_percent(inner.current, inner.steps),
            }
        };
        self.set_percentage(percentage)?;

        // ready the child for the next sibling step
        let child = self.inner.borrow().child.clone();
        if let Some(child) = child {
            child.reset();
        }
        Ok(())
    }

    /// Force-complete the node: all remaining steps are considered done.
    ///
    /// Succeeds if the node is already complete. Used for early, successful
    /// exits; triggers the same completion side effects as reaching 100%
    /// through `done()`.
    pub fn finished(&self) -> Result<()> {
        self.check()?;
        {
            let mut inner = self.inner.borrow_mut();
            if inner.current == inner.steps {
                return Ok(());
            }
            inner.current = inner.steps;
        }
        self.set_percentage(100)?;
        Ok(())
    }

    // ---- percentage ---------------------------------------------------

    /// The watermarked 0-100 value for this node.
    pub fn percentage(&self) -> u32 {
        self.inner.borrow().last_percentage
    }

    /// Set the percentage directly.
    ///
    /// Values below the watermark are rejected (logged, watermark kept) and
    /// values above 100 are a hard error. Returns whether an event was
    /// emitted. Reaching 100 forces the node cancellable again, stops any
    /// open activity, releases the locks held through this node and resets
    /// the smoothed speed.
    pub fn set_percentage(&self, percentage: u32) -> Result<bool> {
        if percentage > 100 {
            return Err(Error::InvalidState(format!(
                "percentage {percentage} is out of range"
            )));
        }
        {
            let inner = self.inner.borrow();
            if percentage == inner.last_percentage {
                return Ok(false);
            }
            if percentage < inner.last_percentage {
                warn!(
                    "percentage cannot go down from {} to {}",
                    inner.last_percentage, percentage
                );
                return Ok(false);
            }
        }

        if percentage == 100 {
            self.complete();
        }

        let emit = {
            let mut inner = self.inner.borrow_mut();
            inner.last_percentage = percentage;
            inner.global_share >= GLOBAL_SHARE_THRESHOLD
        };
        if emit {
            self.signals.percentage.emit(&percentage);
        }
        Ok(true)
    }

    /// Side effects of reaching 100%.
    fn complete(&self) {
        self.set_allow_cancel(true);
        if self.inner.borrow().action.is_some() {
            debug!("complete, stopping open activity");
            self.action_stop();
        }
        self.release_locks();
        let mut inner = self.inner.borrow_mut();
        inner.speed = 0;
        inner.speed_samples = [0; SPEED_SAMPLES];
        inner.speed_index = 0;
    }

    fn emit_subpercentage(&self, percentage: u32) {
        if self.inner.borrow().global_share < GLOBAL_SHARE_THRESHOLD {
            return;
        }
        self.signals.subpercentage.emit(&percentage);
    }

    // ---- child creation and propagation -------------------------------

    /// Obtain a sub-node for delegating one step's work to a nested
    /// operation.
    ///
    /// Replaces and disconnects any previously active child. The child
    /// shares the cancellation token (created now if the tree has none),
    /// inherits the error and lock policies as configured at this moment,
    /// and represents this node's share of the root range divided by its
    /// step count.
    pub fn get_child(&self) -> State {
        // at most one active child
        let previous = {
            let mut inner = self.inner.borrow_mut();
            inner.child_handlers.take().zip(inner.child.take())
        };
        if let Some((handlers, old_child)) = previous {
            handlers.disconnect(&old_child.signals);
        }

        let token = self.cancellation_token();
        let child = State::new();
        {
            let inner = self.inner.borrow();
            let mut child_inner = child.inner.borrow_mut();
            child_inner.parent = Rc::downgrade(&self.inner);
            child_inner.cancellation = Some(token);
            child_inner.global_share = inner.global_share / inner.steps.max(1) as f64;
            child_inner.error_policy = inner.error_policy.clone();
            child_inner.lock_policy = inner.lock_policy.clone();
        }

        let weak = self.downgrade();
        let handlers = ChildHandlers {
            percentage: child.signals.percentage.connect({
                let weak = weak.clone();
                move |pct| {
                    if let Some(parent) = weak.upgrade() {
                        parent.child_percentage_changed(*pct);
                    }
                }
            }),
            subpercentage: child.signals.subpercentage.connect({
                let weak = weak.clone();
                move |pct| {
                    if let Some(parent) = weak.upgrade() {
                        parent.child_subpercentage_changed(*pct);
                    }
                }
            }),
            allow_cancel: child.signals.allow_cancel.connect({
                let weak = weak.clone();
                move |allow| {
                    if let Some(parent) = weak.upgrade() {
                        parent.child_allow_cancel_changed(*allow);
                    }
                }
            }),
            action: child.signals.action.connect({
                let weak = weak.clone();
                move |change: &ActionChange| {
                    if let Some(parent) = weak.upgrade() {
                        parent.child_action_changed(change);
                    }
                }
            }),
            speed: child.signals.speed.connect({
                let weak = weak.clone();
                move |speed| {
                    if let Some(parent) = weak.upgrade() {
                        parent.child_speed_changed(*speed);
                    }
                }
            }),
            package_progress: child.signals.package_progress.connect({
                let weak = weak.clone();
                move |progress: &PackageProgress| {
                    if let Some(parent) = weak.upgrade() {
                        parent.signals.package_progress.emit(progress);
                    }
                }
            }),
        };

        {
            let mut inner = self.inner.borrow_mut();
            inner.child = Some(child.clone());
            inner.child_handlers = Some(handlers);
        }
        child
    }

    /// Interpolate a child percentage into this node's range.
    fn child_percentage_changed(&self, percentage: u32) {
        {
            let inner = self.inner.borrow();
            // a single-step node is transparent to its child
            if inner.steps == 1 {
                drop(inner);
                let _ = self.set_percentage(percentage);
                return;
            }
            if inner.steps == 0 {
                warn!("child reported {percentage}% but no steps are declared");
                return;
            }
        }

        self.emit_subpercentage(percentage);

        let value = {
            let inner = self.inner.borrow();
            if inner.current >= inner.steps {
                warn!(
                    "child reported {percentage}% but node is already at {}/{} steps",
                    inner.current, inner.steps
                );
                return;
            }
            match &inner.weights {
                Some(weights) => weights.interpolate(inner.current, percentage),
                None => {
                    let offset = discrete_to_percent(inner.current, inner.steps);
                    let range = discrete_to_percent(inner.current + 1, inner.steps) - offset;
                    if range == 0 {
                        warn!("step range is empty at {}/{} steps", inner.current, inner.steps);
                        return;
                    }
                    offset + percentage * range / 100
                }
            }
        };
        let _ = self.set_percentage(value);
    }

    fn child_subpercentage_changed(&self, percentage: u32) {
        // only meaningful when this node is transparent
        if self.inner.borrow().steps != 1 {
            return;
        }
        self.emit_subpercentage(percentage);
    }

    fn child_allow_cancel_changed(&self, allow_cancel: bool) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            inner.allow_cancel_child = allow_cancel;
            let reduced = inner.allow_cancel && inner.allow_cancel_child;
            if reduced != inner.reported_allow_cancel {
                inner.reported_allow_cancel = reduced;
                Some(reduced)
            } else {
                None
            }
        };
        if let Some(reduced) = changed {
            self.signals.allow_cancel.emit(&reduced);
        }
    }

    fn child_action_changed(&self, change: &ActionChange) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.action = change.action;
            inner.action_hint = change.hint.clone();
        }
        self.signals.action.emit(change);
    }

    fn child_speed_changed(&self, speed: u64) {
        self.inner.borrow_mut().speed = speed;
        self.signals.speed.emit(&speed);
    }

    // ---- cancellability -----------------------------------------------

    /// Whether interrupting the tree here is currently safe: the AND of
    /// this node's flag and its active child's.
    pub fn allow_cancel(&self) -> bool {
        let inner = self.inner.borrow();
        inner.allow_cancel && inner.allow_cancel_child
    }

    /// Set whether this node's own work can be interrupted safely. An
    /// event fires only when the AND-reduced value actually changes.
    pub fn set_allow_cancel(&self, allow_cancel: bool) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            inner.allow_cancel = allow_cancel;
            let reduced = inner.allow_cancel && inner.allow_cancel_child;
            if reduced != inner.reported_allow_cancel {
                inner.reported_allow_cancel = reduced;
                Some(reduced)
            } else {
                None
            }
        };
        if let Some(reduced) = changed {
            self.signals.allow_cancel.emit(&reduced);
        }
    }

    // ---- cancellation -------------------------------------------------

    /// The shared cancellation token for this tree, created on first use.
    pub fn cancellation_token(&self) -> Cancellation {
        let mut inner = self.inner.borrow_mut();
        inner.cancellation.get_or_insert_with(Cancellation::new).clone()
    }

    /// Convert a set cancellation token into a `Cancelled` error.
    ///
    /// Long-running work should call this between chunks; `done()` calls it
    /// at every step boundary.
    pub fn check(&self) -> Result<()> {
        let cancelled = self
            .inner
            .borrow()
            .cancellation
            .as_ref()
            .is_some_and(Cancellation::is_cancelled);
        if cancelled {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    // ---- error policy -------------------------------------------------

    /// Install the error policy inherited by children created afterwards.
    pub fn set_error_handler(&self, handler: impl Fn(&Error) -> ErrorAction + 'static) {
        self.inner.borrow_mut().error_policy = Some(Rc::new(handler));
    }

    /// Ask the injected policy whether `error` may be swallowed. With no
    /// policy installed every error is fatal.
    pub fn error_handler(&self, error: &Error) -> ErrorAction {
        let policy = self.inner.borrow().error_policy.clone();
        match policy {
            Some(policy) => {
                let verdict = policy(error);
                debug!("error policy returned {verdict:?} for: {error}");
                verdict
            }
            None => ErrorAction::Fatal,
        }
    }

    // ---- activity -----------------------------------------------------

    /// The activity currently reported by this node, if any.
    pub fn action(&self) -> Option<Action> {
        self.inner.borrow().action
    }

    pub fn action_hint(&self) -> Option<String> {
        self.inner.borrow().action_hint.clone()
    }

    /// Report a named activity, e.g. downloading a particular file.
    ///
    /// A repeated call with an identical `(action, hint)` pair is a no-op.
    /// The previous activity is kept on a one-level undo stack for
    /// [`State::action_stop`]. Returns whether an event was emitted.
    pub fn action_start(&self, action: Action, hint: Option<&str>) -> bool {
        let change = {
            let mut inner = self.inner.borrow_mut();
            if inner.action == Some(action) && inner.action_hint.as_deref() == hint {
                debug!("activity {action} already current, ignoring");
                return false;
            }
            inner.last_action = inner.action;
            inner.action = Some(action);
            inner.action_hint = hint.map(str::to_string);
            ActionChange {
                action: Some(action),
                hint: inner.action_hint.clone(),
            }
        };
        self.signals.action.emit(&change);
        true
    }

    /// Pop back to the previous activity. Returns whether an event was
    /// emitted; stopping with no activity open is a no-op.
    pub fn action_stop(&self) -> bool {
        let change = {
            let mut inner = self.inner.borrow_mut();
            if inner.action.is_none() {
                debug!("no activity to stop");
                return false;
            }
            inner.action = inner.last_action.take();
            inner.action_hint = None;
            ActionChange {
                action: inner.action,
                hint: None,
            }
        };
        self.signals.action.emit(&change);
        true
    }

    // ---- locks --------------------------------------------------------

    /// Install the lock policy used by `take_lock`, inherited by children
    /// created afterwards.
    pub fn set_lock_handler(&self, policy: Rc<dyn LockPolicy>) {
        self.inner.borrow_mut().lock_policy = Some(policy);
    }

    /// Request a resource claim and tie its release to this node reaching
    /// 100% (or being dropped).
    pub fn take_lock(&self, kind: LockKind, mode: LockMode) -> Result<LockId> {
        let policy = self.inner.borrow().lock_policy.clone().ok_or_else(|| {
            Error::LockUnavailable("no lock handler configured".to_string())
        })?;
        let id = policy.take(kind, mode)?;
        self.inner.borrow_mut().locks.push(id);
        debug!("took {kind} lock {id} ({mode})");
        Ok(id)
    }

    fn release_locks(&self) {
        let (ids, policy) = {
            let mut inner = self.inner.borrow_mut();
            (std::mem::take(&mut inner.locks), inner.lock_policy.clone())
        };
        if ids.is_empty() {
            return;
        }
        match policy {
            Some(policy) => {
                for id in ids {
                    if let Err(err) = policy.release(id) {
                        warn!("failed to release lock {id}: {err}");
                    }
                }
            }
            None => warn!("{} lock(s) recorded with no lock handler", ids.len()),
        }
    }

    // ---- speed --------------------------------------------------------

    /// Smoothed throughput in bytes per second.
    pub fn speed(&self) -> u64 {
        self.inner.borrow().speed
    }

    /// Record a throughput sample; the reported speed is the average of
    /// the non-zero entries of the last five samples.
    pub fn set_speed(&self, bytes_per_sec: u64) {
        let average = {
            let mut inner = self.inner.borrow_mut();
            let index = inner.speed_index;
            inner.speed_samples[index] = bytes_per_sec;
            inner.speed_index = (index + 1) % SPEED_SAMPLES;
            let (sum, count) = inner
                .speed_samples
                .iter()
                .filter(|sample| **sample != 0)
                .fold((0u64, 0u64), |(sum, count), sample| (sum + sample, count + 1));
            inner.speed = if count == 0 { 0 } else { sum / count };
            inner.speed
        };
        self.signals.speed.emit(&average);
    }

    // ---- package progress ---------------------------------------------

    /// Report per-package progress, e.g. while installing one member of a
    /// transaction. The event is re-emitted by every ancestor up to the
    /// root, where UI layers usually listen.
    pub fn set_package_progress(&self, package_id: &str, action: Action, percentage: u32) {
        let progress = PackageProgress {
            package_id: package_id.to_string(),
            action,
            percentage,
        };
        self.signals.package_progress.emit(&progress);
    }

    // ---- observers ----------------------------------------------------

    pub fn connect_percentage_changed(&self, f: impl Fn(u32) + 'static) -> HandlerId {
        self.signals.percentage.connect(move |pct| f(*pct))
    }

    pub fn disconnect_percentage_changed(&self, id: HandlerId) {
        self.signals.percentage.disconnect(id);
    }

    pub fn connect_subpercentage_changed(&self, f: impl Fn(u32) + 'static) -> HandlerId {
        self.signals.subpercentage.connect(move |pct| f(*pct))
    }

    pub fn disconnect_subpercentage_changed(&self, id: HandlerId) {
        self.signals.subpercentage.disconnect(id);
    }

    pub fn connect_allow_cancel_changed(&self, f: impl Fn(bool) + 'static) -> HandlerId {
        self.signals.allow_cancel.connect(move |allow| f(*allow))
    }

    pub fn disconnect_allow_cancel_changed(&self, id: HandlerId) {
        self.signals.allow_cancel.disconnect(id);
    }

    pub fn connect_action_changed(&self, f: impl Fn(&ActionChange) + 'static) -> HandlerId {
        self.signals.action.connect(f)
    }

    pub fn disconnect_action_changed(&self, id: HandlerId) {
        self.signals.action.disconnect(id);
    }

    pub fn connect_speed_changed(&self, f: impl Fn(u64) + 'static) -> HandlerId {
        self.signals.speed.connect(move |speed| f(*speed))
    }

    pub fn disconnect_speed_changed(&self, id: HandlerId) {
        self.signals.speed.disconnect(id);
    }

    pub fn connect_package_progress_changed(
        &self,
        f: impl Fn(&PackageProgress) + 'static,
    ) -> HandlerId {
        self.signals.package_progress.connect(f)
    }

    pub fn disconnect_package_progress_changed(&self, id: HandlerId) {
        self.signals.package_progress.disconnect(id);
    }

    // ---- diagnostics --------------------------------------------------

    /// Log the active chain from this node up to the root.
    fn log_chain(&self) {
        let mut lines = Vec::new();
        let mut level = 0;
        let mut node = Some(Rc::clone(&self.inner));
        while let Some(cell) = node {
            let inner = cell.borrow();
            lines.push(format!(
                "{level}) {} ({}/{})",
                inner.declared_at.as_deref().unwrap_or("?"),
                inner.current,
                inner.steps
            ));
            node = inner.parent.upgrade();
            level += 1;
        }
        warn!("state chain:\n{}", lines.join("\n"));
    }
}
