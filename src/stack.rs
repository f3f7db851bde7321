use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Result, UiError};
use crate::manager::RootSlot;
use crate::state::ViewState;
use crate::view::{Listen, ObserverId, UserData, ViewHandle};

type StackObserver = Rc<dyn Fn(&ViewHandle)>;

struct StackInner {
    /// Index 0 is the bottom; the top lives at `len - 1`.
    items: RefCell<Vec<ViewHandle>>,
    /// Bumped on every push/pop/clear; live iterators check it.
    version: Cell<u64>,
    min_grow: usize,
    root: Rc<RootSlot>,
    next_observer: Cell<ObserverId>,
    push_observers: RefCell<Vec<(ObserverId, StackObserver)>>,
    pop_observers: RefCell<Vec<(ObserverId, StackObserver)>>,
}

/// LIFO collection of the currently open views.
///
/// Pushing and popping are coupled to the state machines of the two
/// topmost elements: exactly the top view is active (or transitioning into
/// active); everything below it is suspended. Clones share the stack.
#[derive(Clone)]
pub struct ViewStack {
    inner: Rc<StackInner>,
}

impl ViewStack {
    pub fn new(min_grow: usize) -> ViewStack {
        Self::with_root(min_grow, Rc::new(RefCell::new(None)))
    }

    pub(crate) fn with_root(min_grow: usize, root: Rc<RootSlot>) -> ViewStack {
        ViewStack {
            inner: Rc::new(StackInner {
                items: RefCell::new(Vec::new()),
                version: Cell::new(0),
                min_grow: min_grow.max(1),
                root,
                next_observer: Cell::new(0),
                push_observers: RefCell::new(Vec::new()),
                pop_observers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Capacity of the backing storage.
    pub fn capacity(&self) -> usize {
        self.inner.items.borrow().capacity()
    }

    /// Place `view` on top of the stack.
    ///
    /// The previous top is asked to suspend, the new view gets its domain
    /// state reset (`on_before_open`) and is asked to open, and the push
    /// notification fires once the open request has been *issued* — not
    /// once the underlying transition completes.
    pub fn push(&self, view: ViewHandle, user_data: Option<UserData>) -> Result<()> {
        if view.is_destroyed() {
            return Err(UiError::DefunctView);
        }

        let previous_top = self.inner.items.borrow().last().cloned();
        if let Some(top) = previous_top {
            top.request_transition(ViewState::Suspended, user_data.clone())?;
        }

        {
            let mut items = self.inner.items.borrow_mut();
            if items.len() == items.capacity() {
                let capacity = items.capacity();
                let wanted = (capacity * 2).max(capacity + self.inner.min_grow);
                let current_len = items.len();
                items.reserve_exact(wanted - current_len);
            }
            items.push(view.clone());
            self.bump_version();
        }

        self.subscribe_visibility(&view);
        view.on_before_open();
        view.request_transition(ViewState::Active, user_data)?;

        log::debug!("stack: pushed view {:?} (depth {})", view.key(), self.len());
        self.notify(&self.inner.push_observers, &view);
        Ok(())
    }

    /// Remove and close the top view, resuming the one it uncovers.
    /// A pop on an empty stack is a no-op.
    pub fn pop(&self, user_data: Option<UserData>) -> Result<Option<ViewHandle>> {
        let view = {
            let mut items = self.inner.items.borrow_mut();
            match items.pop() {
                Some(view) => {
                    self.bump_version();
                    view
                }
                None => return Ok(None),
            }
        };

        view.request_transition(ViewState::Closed, user_data.clone())?;

        let exposed = self.inner.items.borrow().last().cloned();
        if let Some(top) = exposed {
            top.request_transition(ViewState::Active, user_data)?;
        }

        log::debug!("stack: popped view {:?} (depth {})", view.key(), self.len());
        self.notify(&self.inner.pop_observers, &view);
        Ok(Some(view))
    }

    /// The element `depth` positions below the top (`0` = top), if any.
    pub fn peek(&self, depth: usize) -> Option<ViewHandle> {
        let items = self.inner.items.borrow();
        let index = items.len().checked_sub(depth + 1)?;
        items.get(index).cloned()
    }

    /// The top view, if any.
    pub fn top(&self) -> Option<ViewHandle> {
        self.peek(0)
    }

    /// Pop every view, top to bottom, closing each and raising a pop
    /// notification per element.
    ///
    /// Buried views are suspended, and `Suspended -> Closed` is not a
    /// legal transition; each one is resumed first, then closed, through
    /// its own request queue.
    pub fn clear(&self, user_data: Option<UserData>) -> Result<()> {
        let mut exposed = false;
        loop {
            let view = {
                let mut items = self.inner.items.borrow_mut();
                match items.pop() {
                    Some(view) => {
                        self.bump_version();
                        view
                    }
                    None => break,
                }
            };

            if exposed {
                view.request_transition(ViewState::Active, user_data.clone())?;
            }
            view.request_transition(ViewState::Closed, user_data.clone())?;
            exposed = true;

            self.notify(&self.inner.pop_observers, &view);
        }
        log::debug!("stack: cleared");
        Ok(())
    }

    /// Lazy top-to-bottom traversal.
    ///
    /// The iterator is invalidated by any push, pop or clear; its `next`
    /// panics rather than yielding stale or duplicated elements.
    pub fn iter(&self) -> StackIter {
        StackIter {
            inner: self.inner.clone(),
            version: self.inner.version.get(),
            offset: 0,
        }
    }

    /// Subscribe to push notifications.
    pub fn on_push(&self, f: impl Fn(&ViewHandle) + 'static) -> ObserverId {
        Self::add_observer(&self.inner, &self.inner.push_observers, Rc::new(f))
    }

    /// Subscribe to pop notifications.
    pub fn on_pop(&self, f: impl Fn(&ViewHandle) + 'static) -> ObserverId {
        Self::add_observer(&self.inner, &self.inner.pop_observers, Rc::new(f))
    }

    /// Remove a push or pop subscription.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut removed = false;
        for list in [&self.inner.push_observers, &self.inner.pop_observers] {
            let mut observers = list.borrow_mut();
            let before = observers.len();
            observers.retain(|(entry_id, _)| *entry_id != id);
            removed |= observers.len() != before;
        }
        removed
    }

    fn add_observer(
        inner: &StackInner,
        list: &RefCell<Vec<(ObserverId, StackObserver)>>,
        observer: StackObserver,
    ) -> ObserverId {
        let id = inner.next_observer.get();
        inner.next_observer.set(id + 1);
        list.borrow_mut().push((id, observer));
        id
    }

    fn notify(&self, list: &RefCell<Vec<(ObserverId, StackObserver)>>, view: &ViewHandle) {
        let snapshot: Vec<StackObserver> =
            list.borrow().iter().map(|(_, observer)| observer.clone()).collect();
        for observer in snapshot {
            observer(view);
        }
    }

    fn bump_version(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
    }

    /// Auto-manage visibility for a pushed view: active views are enabled
    /// and raised to the front of the render order, suspended and closed
    /// ones disabled. The subscription removes itself once the view
    /// closes; the next push installs a fresh one.
    fn subscribe_visibility(&self, view: &ViewHandle) {
        let root: Weak<RootSlot> = Rc::downgrade(&self.inner.root);
        view.subscribe(Rc::new(move |view, state| match state {
            ViewState::Active => {
                view.set_enabled(true);
                if let Some(slot) = root.upgrade() {
                    if let Some(root) = slot.borrow_mut().as_mut() {
                        root.bring_to_front(view);
                    }
                }
                Listen::Keep
            }
            ViewState::Suspended => {
                view.set_enabled(false);
                Listen::Keep
            }
            ViewState::Closed => {
                view.set_enabled(false);
                Listen::Cancel
            }
        }));
    }
}

impl fmt::Debug for ViewStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewStack")
            .field("len", &self.len())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

/// Iterator over a [`ViewStack`], top to bottom.
pub struct StackIter {
    inner: Rc<StackInner>,
    version: u64,
    offset: usize,
}

impl Iterator for StackIter {
    type Item = ViewHandle;

    fn next(&mut self) -> Option<ViewHandle> {
        assert_eq!(
            self.version,
            self.inner.version.get(),
            "view stack mutated during iteration"
        );
        let items = self.inner.items.borrow();
        let index = items.len().checked_sub(self.offset + 1)?;
        self.offset += 1;
        items.get(index).cloned()
    }
}
