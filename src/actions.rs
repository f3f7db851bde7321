use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{Result, UiError};
use crate::routine::{ActionRoutine, Step};

/// Integer identifier routing a runtime command to a handler.
pub type ActionId = u32;

/// Upper bound on the argument slots one dispatch may carry.
pub const MAX_ACTION_ARGS: usize = 4;

/// One typed argument slot of a dispatched action.
#[derive(Clone)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Structured payload for commands that carry more than scalars.
    Json(Value),
    /// Opaque host object.
    Opaque(Rc<dyn Any>),
}

impl ArgValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ArgValue::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Rc<dyn Any>> {
        match self {
            ArgValue::Opaque(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(value) => write!(f, "Bool({value})"),
            ArgValue::Int(value) => write!(f, "Int({value})"),
            ArgValue::Float(value) => write!(f, "Float({value})"),
            ArgValue::Text(value) => write!(f, "Text({value:?})"),
            ArgValue::Json(value) => write!(f, "Json({value})"),
            ArgValue::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Int(value.into())
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Text(value)
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        ArgValue::Json(value)
    }
}

/// Argument payload for one dispatch: up to [`MAX_ACTION_ARGS`] slots.
#[derive(Debug, Clone, Default)]
pub struct ActionArgs {
    slots: Vec<ArgValue>,
}

impl ActionArgs {
    /// An empty payload.
    pub fn none() -> Self {
        Self::default()
    }

    /// Append one slot. Panics past [`MAX_ACTION_ARGS`]; passing more is a
    /// programming error, matching the handler arity bound.
    pub fn with(mut self, value: impl Into<ArgValue>) -> Self {
        assert!(
            self.slots.len() < MAX_ACTION_ARGS,
            "action arguments are limited to {MAX_ACTION_ARGS} slots"
        );
        self.slots.push(value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.slots.get(index)
    }

    pub fn bool_at(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(ArgValue::as_bool)
    }

    pub fn int_at(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(ArgValue::as_int)
    }

    pub fn float_at(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(ArgValue::as_float)
    }

    pub fn text_at(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(ArgValue::as_text)
    }

    pub fn json_at(&self, index: usize) -> Option<&Value> {
        self.get(index).and_then(ArgValue::as_json)
    }
}

/// Mutable per-instance domain state owned by an [`ActionCenter`].
///
/// The engine treats it as opaque; handlers downcast to the concrete type
/// their table was built for.
pub trait ActionState: Any {
    /// Restore the state to its initial configuration.
    fn reset(&mut self);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Domain state for view types that keep none.
#[derive(Debug, Default)]
pub struct NoActionState;

impl ActionState for NoActionState {
    fn reset(&mut self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type ImmediateFn = Rc<dyn Fn(&mut dyn ActionState, &ActionArgs) -> bool>;
type SpawnFn = Rc<dyn Fn(&ActionArgs) -> ActionRoutine>;

/// How a handler runs when its id is dispatched.
#[derive(Clone)]
enum HandlerKind {
    /// Runs at dispatch time; `true` marks the domain state as changed.
    Immediate(ImmediateFn),
    /// Spawns a cooperative routine driven once per tick thereafter.
    Routine(SpawnFn),
}

/// Registration record for one action id.
#[derive(Clone)]
struct HandlerDesc {
    arity: usize,
    kind: HandlerKind,
}

/// Immutable mapping from action ids to handlers.
///
/// One table is built per view type and shared by every dispatch object
/// allocated for that type. Handlers are instance-free: they receive the
/// owning center's domain state explicitly, so sharing the table never
/// leaks state between instances and the prototype is never mutated.
pub struct ActionTable {
    handlers: HashMap<ActionId, HandlerDesc>,
    state_type: TypeId,
    state_name: &'static str,
}

impl ActionTable {
    /// Start building a table whose handlers operate on domain state `S`.
    pub fn builder<S: ActionState>() -> ActionTableBuilder<S> {
        ActionTableBuilder {
            handlers: HashMap::new(),
            error: None,
            _state: PhantomData,
        }
    }

    /// A table with no handlers, for view types without runtime commands.
    pub fn empty() -> ActionTable {
        ActionTable {
            handlers: HashMap::new(),
            state_type: TypeId::of::<NoActionState>(),
            state_name: std::any::type_name::<NoActionState>(),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Ids with a registered handler, in no particular order.
    pub fn action_ids(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.handlers.keys().copied()
    }

    /// Declared arity of the handler for `id`, if one is registered.
    pub fn arity_of(&self, id: ActionId) -> Option<usize> {
        self.handlers.get(&id).map(|desc| desc.arity)
    }

    fn expects(&self, state: &dyn ActionState) -> bool {
        state.as_any().type_id() == self.state_type
    }
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionTable")
            .field("handlers", &self.handlers.len())
            .field("state", &self.state_name)
            .finish()
    }
}

/// Builds the handler table for one view type.
///
/// Configuration errors (arity above [`MAX_ACTION_ARGS`], duplicate ids)
/// are collected and surfaced once from [`build`](Self::build), so a bad
/// registration fails when the table is first assembled rather than on
/// every dispatch.
pub struct ActionTableBuilder<S: ActionState> {
    handlers: HashMap<ActionId, HandlerDesc>,
    error: Option<UiError>,
    _state: PhantomData<S>,
}

impl<S: ActionState> ActionTableBuilder<S> {
    /// Register a synchronous handler. Returning `true` reports that the
    /// domain state changed and triggers the refresh callback.
    pub fn immediate(
        mut self,
        id: ActionId,
        arity: usize,
        handler: impl Fn(&mut S, &ActionArgs) -> bool + 'static,
    ) -> Self {
        let run: ImmediateFn = Rc::new(move |state, args| {
            let state = state
                .as_any_mut()
                .downcast_mut::<S>()
                .expect("domain state type verified when the center was allocated");
            handler(state, args)
        });
        self.insert(
            id,
            HandlerDesc {
                arity,
                kind: HandlerKind::Immediate(run),
            },
        );
        self
    }

    /// Register a cooperative handler. The spawn closure runs at dispatch
    /// time and returns the routine the center drives once per tick.
    pub fn routine(
        mut self,
        id: ActionId,
        arity: usize,
        spawn: impl Fn(&ActionArgs) -> Box<dyn FnMut(&mut S) -> Step> + 'static,
    ) -> Self {
        let spawn: SpawnFn = Rc::new(move |args| {
            let mut inner = spawn(args);
            Box::new(move |state: &mut dyn ActionState| {
                let state = state
                    .as_any_mut()
                    .downcast_mut::<S>()
                    .expect("domain state type verified when the center was allocated");
                inner(state)
            })
        });
        self.insert(
            id,
            HandlerDesc {
                arity,
                kind: HandlerKind::Routine(spawn),
            },
        );
        self
    }

    /// Map an additional id onto an already registered handler.
    pub fn alias(mut self, id: ActionId, existing: ActionId) -> Self {
        match self.handlers.get(&existing) {
            Some(desc) => {
                let desc = desc.clone();
                self.insert(id, desc);
            }
            None => self.record_error(format!("alias {id} refers to unregistered action {existing}")),
        }
        self
    }

    pub fn build(self) -> Result<ActionTable> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(ActionTable {
            handlers: self.handlers,
            state_type: TypeId::of::<S>(),
            state_name: std::any::type_name::<S>(),
        })
    }

    fn insert(&mut self, id: ActionId, desc: HandlerDesc) {
        if desc.arity > MAX_ACTION_ARGS {
            self.record_error(format!(
                "action {id} declares arity {}, maximum is {MAX_ACTION_ARGS}",
                desc.arity
            ));
            return;
        }
        if self.handlers.insert(id, desc).is_some() {
            self.record_error(format!("action {id} is registered twice"));
        }
    }

    fn record_error(&mut self, reason: String) {
        // Keep the first error; later ones are usually knock-on effects.
        if self.error.is_none() {
            self.error = Some(UiError::HandlerConfiguration { reason });
        }
    }
}

/// Per-view command router: a shared handler table, this instance's domain
/// state, the in-flight routine list, and the refresh callback registered
/// by the owning view.
pub struct ActionCenter {
    table: Rc<ActionTable>,
    state: Box<dyn ActionState>,
    routines: Vec<ActionRoutine>,
    refresh: Option<Rc<dyn Fn(&dyn ActionState)>>,
}

impl ActionCenter {
    /// Allocate a center over a shared table. Fails when the state value
    /// is not the type the table's handlers were registered for; this is
    /// the first-use check that makes later dispatch downcasts infallible.
    pub(crate) fn new(table: Rc<ActionTable>, state: Box<dyn ActionState>) -> Result<ActionCenter> {
        if !table.expects(state.as_ref()) {
            return Err(UiError::HandlerConfiguration {
                reason: format!(
                    "action table expects domain state {}, got a different type",
                    table.state_name
                ),
            });
        }
        Ok(ActionCenter {
            table,
            state,
            routines: Vec::new(),
            refresh: None,
        })
    }

    /// Route a command to its handler.
    ///
    /// Unknown ids are ignored. A synchronous handler runs now and, when it
    /// reports a state change, the refresh callback fires once. A routine
    /// handler is spawned into the in-flight list and driven by the next
    /// ticks instead of running here.
    pub fn dispatch(&mut self, id: ActionId, args: ActionArgs) {
        let kind = match self.table.handlers.get(&id) {
            Some(desc) => desc.kind.clone(),
            None => {
                log::debug!("no handler for action {id}, ignoring");
                return;
            }
        };

        match kind {
            HandlerKind::Immediate(run) => {
                if run(self.state.as_mut(), &args) {
                    self.notify_refresh();
                }
            }
            HandlerKind::Routine(spawn) => {
                self.routines.push(spawn(&args));
            }
        }
    }

    /// Drop every in-flight routine and reset the domain state.
    ///
    /// The handler table and the refresh callback survive; a recycled view
    /// keeps dispatching through the same wiring.
    pub fn reset(&mut self) {
        self.routines.clear();
        self.state.reset();
    }

    /// Advance every in-flight routine one step, in list order.
    ///
    /// Finished routines are removed. State-affected steps are OR-reduced
    /// into at most one refresh-callback invocation per call.
    pub(crate) fn drive_routines(&mut self) {
        if self.routines.is_empty() {
            return;
        }

        let mut state_changed = false;
        let mut index = 0;
        while index < self.routines.len() {
            let routine = &mut self.routines[index];
            match routine(self.state.as_mut()) {
                Step::Pending => index += 1,
                Step::StateAffected => {
                    state_changed = true;
                    index += 1;
                }
                Step::Done => {
                    self.routines.remove(index);
                }
            }
        }

        if state_changed {
            self.notify_refresh();
        }
    }

    pub(crate) fn set_refresh(&mut self, refresh: Rc<dyn Fn(&dyn ActionState)>) {
        self.refresh = Some(refresh);
    }

    /// Number of registered actions.
    pub fn action_count(&self) -> usize {
        self.table.len()
    }

    /// Number of routines currently in flight.
    pub fn routine_count(&self) -> usize {
        self.routines.len()
    }

    pub fn state(&self) -> &dyn ActionState {
        self.state.as_ref()
    }

    /// The domain state downcast to its concrete type.
    pub fn state_as<T: ActionState>(&self) -> Option<&T> {
        self.state.as_any().downcast_ref::<T>()
    }

    fn notify_refresh(&self) {
        if let Some(refresh) = &self.refresh {
            refresh(self.state.as_ref());
        }
    }
}

impl fmt::Debug for ActionCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCenter")
            .field("table", &self.table)
            .field("routines", &self.routines.len())
            .finish()
    }
}
