use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::actions::{ActionArgs, ActionCenter, ActionId, ActionState, ActionTable, NoActionState};
use crate::error::{Result, UiError};
use crate::routine::{Step, TransitionTask};
use crate::state::{Transition, ViewState};

/// Key identifying the template a view was instantiated from.
pub type ViewKey = String;

/// Opaque user payload threaded through transitions.
pub type UserData = Rc<dyn Any>;

/// Identifier of one state-changed subscription.
pub type ObserverId = u64;

/// Whether a state observer stays subscribed after a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Listen {
    Keep,
    Cancel,
}

pub(crate) type StateObserver = Rc<dyn Fn(&ViewHandle, ViewState) -> Listen>;

/// Reusable definition a view instance is created from.
///
/// Loaded by the host's [`ViewLoader`](crate::loader::ViewLoader) and
/// retained by the cache; one template serves every instance of its key.
pub trait ViewTemplate {
    /// Instantiate the per-view behavior.
    fn instantiate(&self) -> Box<dyn ViewBehavior>;

    /// Build the handler table shared by every instance of this template.
    /// Called once per cache entry.
    fn build_actions(&self) -> Result<ActionTable> {
        Ok(ActionTable::empty())
    }

    /// Create the per-instance domain state for the dispatch object.
    fn create_action_state(&self) -> Box<dyn ActionState> {
        Box::new(NoActionState)
    }
}

/// Per-instance behavior of one concrete view type.
///
/// The four transition hooks supply the visual open/close/suspend/resume
/// work as an optional cooperative task; returning `None` makes that
/// transition purely synchronous. Everything else is a notification hook
/// with an empty default.
pub trait ViewBehavior {
    /// Called once, when the instance is first created.
    fn on_create(&mut self) {}

    fn on_open(&mut self, user_data: Option<&UserData>) -> Option<TransitionTask> {
        let _ = user_data;
        None
    }

    fn on_close(&mut self, user_data: Option<&UserData>) -> Option<TransitionTask> {
        let _ = user_data;
        None
    }

    fn on_suspend(&mut self, user_data: Option<&UserData>) -> Option<TransitionTask> {
        let _ = user_data;
        None
    }

    fn on_resume(&mut self, user_data: Option<&UserData>) -> Option<TransitionTask> {
        let _ = user_data;
        None
    }

    /// Called when the dispatch object reports a domain state change.
    fn on_refresh(&mut self, state: &dyn ActionState) {
        let _ = state;
    }

    /// Called once per tick while the instance is enabled.
    fn on_tick(&mut self, dt: Duration) {
        let _ = dt;
    }

    /// Visibility toggle, driven by the navigation stack.
    fn set_enabled(&mut self, enabled: bool) {
        let _ = enabled;
    }

    /// Called once, when the instance is destroyed rather than pooled.
    fn on_destroy(&mut self) {}
}

struct InFlight {
    target: ViewState,
    /// `None` marks a queued synchronous transition: it spends the one
    /// tick its turn in the driver costs, then commits.
    task: Option<TransitionTask>,
}

struct ViewCore {
    state: ViewState,
    transforming: bool,
    in_flight: Option<InFlight>,
    queue: VecDeque<(ViewState, Option<UserData>)>,
    behavior: Box<dyn ViewBehavior>,
    actions: ActionCenter,
    refresh_pending: Rc<Cell<bool>>,
    enabled: bool,
    destroyed: bool,
}

impl ViewCore {
    fn begin(
        &mut self,
        transition: Transition,
        user_data: Option<&UserData>,
    ) -> Option<TransitionTask> {
        match transition {
            Transition::Open => self.behavior.on_open(user_data),
            Transition::Close => self.behavior.on_close(user_data),
            Transition::Suspend => self.behavior.on_suspend(user_data),
            Transition::Resume => self.behavior.on_resume(user_data),
        }
    }

    /// Start the next queued request inside the same driver, or release
    /// the in-flight mark when the queue is empty.
    fn begin_next_queued(&mut self) -> Result<()> {
        match self.queue.pop_front() {
            None => {
                self.transforming = false;
                self.in_flight = None;
                Ok(())
            }
            Some((target, user_data)) => match Transition::between(self.state, target) {
                Ok(transition) => {
                    let task = self.begin(transition, user_data.as_ref());
                    self.in_flight = Some(InFlight { target, task });
                    Ok(())
                }
                Err(err) => {
                    // A queued request went illegal by the time it was
                    // dequeued. Fail loudly and drop the driver state so
                    // the view is not left wedged mid-transition.
                    self.queue.clear();
                    self.in_flight = None;
                    self.transforming = false;
                    Err(err)
                }
            },
        }
    }
}

struct ObserverSet {
    next_id: ObserverId,
    entries: Vec<(ObserverId, StateObserver)>,
}

pub(crate) struct ViewShared {
    key: ViewKey,
    core: RefCell<ViewCore>,
    observers: RefCell<ObserverSet>,
}

/// Handle to one view instance. Clones are cheap and share the instance;
/// the stack, the pool and the host all hold the same underlying view.
#[derive(Clone)]
pub struct ViewHandle {
    shared: Rc<ViewShared>,
}

impl ViewHandle {
    pub(crate) fn new(key: ViewKey, behavior: Box<dyn ViewBehavior>, actions: ActionCenter) -> ViewHandle {
        let mut behavior = behavior;
        behavior.on_create();

        let refresh_pending = Rc::new(Cell::new(false));
        let mut actions = actions;
        {
            let flag = refresh_pending.clone();
            actions.set_refresh(Rc::new(move |_state| flag.set(true)));
        }

        ViewHandle {
            shared: Rc::new(ViewShared {
                key,
                core: RefCell::new(ViewCore {
                    state: ViewState::Closed,
                    transforming: false,
                    in_flight: None,
                    queue: VecDeque::new(),
                    behavior,
                    actions,
                    refresh_pending,
                    enabled: false,
                    destroyed: false,
                }),
                observers: RefCell::new(ObserverSet {
                    next_id: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    /// The key this instance was loaded under.
    pub fn key(&self) -> &ViewKey {
        &self.shared.key
    }

    pub fn state(&self) -> ViewState {
        self.shared.core.borrow().state
    }

    /// Whether a transition is currently in flight.
    pub fn is_transitioning(&self) -> bool {
        self.shared.core.borrow().transforming
    }

    /// Number of transition requests waiting behind the in-flight one.
    pub fn pending_transitions(&self) -> usize {
        self.shared.core.borrow().queue.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.core.borrow().enabled
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.core.borrow().destroyed
    }

    /// Whether both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &ViewHandle) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Request a state transition.
    ///
    /// With no transition in flight the pair is validated immediately: an
    /// illegal pair (including a request for the current state) fails with
    /// [`UiError::InvalidTransition`] and leaves the view untouched. A
    /// synchronous transition commits here and emits one state-changed
    /// notification; an asynchronous one marks the view transitioning and
    /// is driven by subsequent ticks.
    ///
    /// While a transition is in flight, the request is queued FIFO and
    /// picked up by the same driver; no second driver is ever started.
    pub fn request_transition(&self, target: ViewState, user_data: Option<UserData>) -> Result<()> {
        enum Outcome {
            Queued,
            Started,
            Committed(ViewState),
        }

        let outcome = {
            let mut core = self.shared.core.borrow_mut();
            if core.destroyed {
                return Err(UiError::DefunctView);
            }

            if core.transforming {
                core.queue.push_back((target, user_data));
                Outcome::Queued
            } else {
                let transition = Transition::between(core.state, target)?;
                match core.begin(transition, user_data.as_ref()) {
                    None => {
                        core.state = target;
                        Outcome::Committed(target)
                    }
                    Some(task) => {
                        core.transforming = true;
                        core.in_flight = Some(InFlight {
                            target,
                            task: Some(task),
                        });
                        Outcome::Started
                    }
                }
            }
        };

        match outcome {
            Outcome::Queued => {
                log::debug!("view {:?}: queued transition to {target:?}", self.shared.key);
            }
            Outcome::Started => {
                log::debug!("view {:?}: began transition to {target:?}", self.shared.key);
            }
            Outcome::Committed(state) => {
                log::debug!("view {:?}: committed {state:?}", self.shared.key);
                self.emit_state_changed(state);
            }
        }
        Ok(())
    }

    /// Advance this view by one tick: one step of the transition driver,
    /// one step of every in-flight action routine, then the behavior's
    /// tick hook (while enabled).
    pub fn tick(&self, dt: Duration) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }

        let mut committed = None;
        let mut driver_error = None;
        {
            let mut core = self.shared.core.borrow_mut();
            let core = &mut *core;
            if let Some(flight) = core.in_flight.as_mut() {
                let step = match flight.task.as_mut() {
                    Some(task) => task(dt),
                    None => Step::Done,
                };
                if let Step::Done = step {
                    let target = flight.target;
                    core.state = target;
                    committed = Some(target);
                    if let Err(err) = core.begin_next_queued() {
                        driver_error = Some(err);
                    }
                }
            }
        }

        if let Some(state) = committed {
            log::debug!("view {:?}: committed {state:?}", self.shared.key);
            self.emit_state_changed(state);
        }
        if let Some(err) = driver_error {
            return Err(err);
        }

        let mut core = self.shared.core.borrow_mut();
        if core.destroyed {
            // The commit notification may have torn this instance down.
            return Ok(());
        }
        let core = &mut *core;
        core.actions.drive_routines();
        if core.refresh_pending.take() {
            core.behavior.on_refresh(core.actions.state());
        }
        if core.enabled {
            core.behavior.on_tick(dt);
        }
        Ok(())
    }

    /// Route a command to this view's dispatch object.
    pub fn dispatch(&self, id: ActionId, args: ActionArgs) {
        let mut core = self.shared.core.borrow_mut();
        let core = &mut *core;
        core.actions.dispatch(id, args);
        if core.refresh_pending.take() {
            core.behavior.on_refresh(core.actions.state());
        }
    }

    /// Number of registered actions on this view's dispatch object.
    pub fn action_count(&self) -> usize {
        self.shared.core.borrow().actions.action_count()
    }

    /// Number of action routines currently in flight.
    pub fn routine_count(&self) -> usize {
        self.shared.core.borrow().actions.routine_count()
    }

    /// Read access to the dispatch object.
    pub fn with_actions<R>(&self, f: impl FnOnce(&ActionCenter) -> R) -> R {
        f(&self.shared.core.borrow().actions)
    }

    /// Subscribe to state commits. Delivery is synchronous, on commit, in
    /// subscription order.
    pub fn on_state_changed(&self, f: impl Fn(&ViewHandle, ViewState) + 'static) -> ObserverId {
        self.subscribe(Rc::new(move |view, state| {
            f(view, state);
            Listen::Keep
        }))
    }

    /// Remove a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.shared.observers.borrow_mut();
        let before = observers.entries.len();
        observers.entries.retain(|(entry_id, _)| *entry_id != id);
        observers.entries.len() != before
    }

    pub(crate) fn subscribe(&self, observer: StateObserver) -> ObserverId {
        let mut observers = self.shared.observers.borrow_mut();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.entries.push((id, observer));
        id
    }

    /// Reset the dispatch object's domain state before the view opens.
    pub(crate) fn on_before_open(&self) {
        self.shared.core.borrow_mut().actions.reset();
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        let mut core = self.shared.core.borrow_mut();
        if core.destroyed || core.enabled == enabled {
            return;
        }
        core.enabled = enabled;
        core.behavior.set_enabled(enabled);
    }

    /// Tear the instance down. Idempotent; pending transitions are dropped.
    pub(crate) fn destroy(&self) {
        let mut core = self.shared.core.borrow_mut();
        if core.destroyed {
            return;
        }
        core.destroyed = true;
        core.transforming = false;
        core.in_flight = None;
        core.queue.clear();
        core.behavior.on_destroy();
    }

    /// A closed instance with nothing queued; safe to stop ticking.
    pub(crate) fn is_settled(&self) -> bool {
        let core = self.shared.core.borrow();
        core.destroyed
            || (core.state == ViewState::Closed && !core.transforming && core.queue.is_empty())
    }

    fn emit_state_changed(&self, state: ViewState) {
        // Snapshot so observers may subscribe or cancel re-entrantly.
        let snapshot: Vec<(ObserverId, StateObserver)> =
            self.shared.observers.borrow().entries.clone();

        let mut cancelled = Vec::new();
        for (id, observer) in snapshot {
            if observer(self, state) == Listen::Cancel {
                cancelled.push(id);
            }
        }

        if !cancelled.is_empty() {
            let mut observers = self.shared.observers.borrow_mut();
            observers.entries.retain(|(id, _)| !cancelled.contains(id));
        }
    }
}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.borrow();
        f.debug_struct("ViewHandle")
            .field("key", &self.shared.key)
            .field("state", &core.state)
            .field("transforming", &core.transforming)
            .field("queued", &core.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::routine::wait_ticks;

    const DT: Duration = Duration::from_millis(16);

    /// Behavior whose transitions each take a fixed number of ticks.
    struct TickedBehavior {
        ticks: u32,
    }

    impl ViewBehavior for TickedBehavior {
        fn on_open(&mut self, _user_data: Option<&UserData>) -> Option<TransitionTask> {
            Some(wait_ticks(self.ticks))
        }

        fn on_close(&mut self, _user_data: Option<&UserData>) -> Option<TransitionTask> {
            Some(wait_ticks(self.ticks))
        }

        fn on_suspend(&mut self, _user_data: Option<&UserData>) -> Option<TransitionTask> {
            Some(wait_ticks(self.ticks))
        }

        fn on_resume(&mut self, _user_data: Option<&UserData>) -> Option<TransitionTask> {
            Some(wait_ticks(self.ticks))
        }
    }

    struct SyncBehavior;

    impl ViewBehavior for SyncBehavior {}

    fn sync_view() -> ViewHandle {
        let center = ActionCenter::new(Rc::new(ActionTable::empty()), Box::new(NoActionState)).unwrap();
        ViewHandle::new("test".into(), Box::new(SyncBehavior), center)
    }

    fn ticked_view(ticks: u32) -> ViewHandle {
        let center = ActionCenter::new(Rc::new(ActionTable::empty()), Box::new(NoActionState)).unwrap();
        ViewHandle::new("test".into(), Box::new(TickedBehavior { ticks }), center)
    }

    fn record_states(view: &ViewHandle) -> Rc<RefCell<Vec<ViewState>>> {
        let states = Rc::new(RefCell::new(Vec::new()));
        let sink = states.clone();
        view.on_state_changed(move |_view, state| sink.borrow_mut().push(state));
        states
    }

    #[test]
    fn synchronous_transition_commits_immediately() {
        let view = sync_view();
        let states = record_states(&view);

        view.request_transition(ViewState::Active, None).unwrap();
        assert_eq!(view.state(), ViewState::Active);
        assert!(!view.is_transitioning());
        assert_eq!(*states.borrow(), vec![ViewState::Active]);
    }

    #[test]
    fn every_legal_pair_commits_and_emits_once() {
        let view = sync_view();
        let states = record_states(&view);

        view.request_transition(ViewState::Active, None).unwrap();
        view.request_transition(ViewState::Suspended, None).unwrap();
        view.request_transition(ViewState::Active, None).unwrap();
        view.request_transition(ViewState::Closed, None).unwrap();

        assert_eq!(
            *states.borrow(),
            vec![
                ViewState::Active,
                ViewState::Suspended,
                ViewState::Active,
                ViewState::Closed,
            ]
        );
    }

    #[test]
    fn illegal_request_fails_and_leaves_state_untouched() {
        let view = sync_view();
        let err = view
            .request_transition(ViewState::Suspended, None)
            .unwrap_err();
        assert!(matches!(err, UiError::InvalidTransition { .. }));
        assert_eq!(view.state(), ViewState::Closed);

        // Requesting the current state is equally illegal.
        assert!(view.request_transition(ViewState::Closed, None).is_err());
    }

    #[test]
    fn async_transition_commits_after_its_ticks() {
        let view = ticked_view(2);
        let states = record_states(&view);

        view.request_transition(ViewState::Active, None).unwrap();
        assert!(view.is_transitioning());
        assert_eq!(view.state(), ViewState::Closed);

        view.tick(DT).unwrap();
        view.tick(DT).unwrap();
        assert_eq!(view.state(), ViewState::Closed);
        view.tick(DT).unwrap();
        assert_eq!(view.state(), ViewState::Active);
        assert!(!view.is_transitioning());
        assert_eq!(*states.borrow(), vec![ViewState::Active]);
    }

    #[test]
    fn queued_requests_drain_fifo_with_one_driver() {
        let view = ticked_view(1);
        let states = record_states(&view);

        view.request_transition(ViewState::Active, None).unwrap();
        view.request_transition(ViewState::Suspended, None).unwrap();
        view.request_transition(ViewState::Active, None).unwrap();
        assert_eq!(view.pending_transitions(), 2);
        assert!(view.is_transitioning());

        // Drain: each transition takes one pending tick plus its commit.
        for _ in 0..10 {
            view.tick(DT).unwrap();
        }

        assert_eq!(
            *states.borrow(),
            vec![ViewState::Active, ViewState::Suspended, ViewState::Active]
        );
        assert_eq!(view.pending_transitions(), 0);
        assert!(!view.is_transitioning());
        assert_eq!(view.state(), ViewState::Active);
    }

    #[test]
    fn queued_synchronous_transition_consumes_one_tick() {
        // Open takes ticks; the queued suspend is synchronous for this
        // behavior mix: use a ticked open then a sync everything else.
        struct MixedBehavior;
        impl ViewBehavior for MixedBehavior {
            fn on_open(&mut self, _user_data: Option<&UserData>) -> Option<TransitionTask> {
                Some(wait_ticks(0))
            }
        }

        let center = ActionCenter::new(Rc::new(ActionTable::empty()), Box::new(NoActionState)).unwrap();
        let view = ViewHandle::new("test".into(), Box::new(MixedBehavior), center);
        let states = record_states(&view);

        view.request_transition(ViewState::Active, None).unwrap();
        view.request_transition(ViewState::Suspended, None).unwrap();

        view.tick(DT).unwrap();
        assert_eq!(view.state(), ViewState::Active);
        // The queued synchronous suspend waits its one tick in the driver.
        assert!(view.is_transitioning());
        view.tick(DT).unwrap();
        assert_eq!(view.state(), ViewState::Suspended);
        assert!(!view.is_transitioning());

        assert_eq!(
            *states.borrow(),
            vec![ViewState::Active, ViewState::Suspended]
        );
    }

    #[test]
    fn illegal_queued_request_surfaces_from_tick() {
        let view = ticked_view(0);
        view.request_transition(ViewState::Active, None).unwrap();
        // Queue a request that will be illegal once Active commits.
        view.request_transition(ViewState::Active, None).unwrap();

        let err = view.tick(DT).unwrap_err();
        assert!(matches!(err, UiError::InvalidTransition { .. }));
        assert_eq!(view.state(), ViewState::Active);
        assert!(!view.is_transitioning());
        assert_eq!(view.pending_transitions(), 0);
    }

    #[test]
    fn observers_fire_in_subscription_order() {
        let view = sync_view();
        let order = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let sink = order.clone();
            view.on_state_changed(move |_view, _state| sink.borrow_mut().push(tag));
        }

        view.request_transition(ViewState::Active, None).unwrap();
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribed_observer_stops_receiving() {
        let view = sync_view();
        let states = record_states(&view);
        let count = Rc::new(Cell::new(0u32));
        let sink = count.clone();
        let id = view.on_state_changed(move |_view, _state| sink.set(sink.get() + 1));

        view.request_transition(ViewState::Active, None).unwrap();
        assert!(view.unsubscribe(id));
        view.request_transition(ViewState::Suspended, None).unwrap();

        assert_eq!(count.get(), 1);
        assert_eq!(states.borrow().len(), 2);
        assert!(!view.unsubscribe(id));
    }

    #[test]
    fn destroyed_view_rejects_requests() {
        let view = sync_view();
        view.destroy();
        let err = view.request_transition(ViewState::Active, None).unwrap_err();
        assert!(matches!(err, UiError::DefunctView));
    }
}
