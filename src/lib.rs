//! Lifecycle, navigation, pooling and per-instance command dispatch for
//! modal UI views.
//!
//! The engine is deliberately renderer-agnostic: visuals enter through the
//! [`ViewBehavior`] transition hooks and the [`ViewRoot`] collaborator,
//! assets through the [`ViewLoader`] collaborator. Everything runs
//! single-threaded under a cooperative tick — "asynchronous" transitions
//! and action routines are resumable tasks advanced once per call to
//! [`UiManager::tick`], not threads.

pub mod actions;
pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod manager;
pub mod routine;
pub mod stack;
pub mod state;
pub mod view;

pub use actions::{
    ActionArgs, ActionCenter, ActionId, ActionState, ActionTable, ActionTableBuilder, ArgValue,
    NoActionState, MAX_ACTION_ARGS,
};
pub use cache::ViewCache;
pub use config::UiSettings;
pub use error::{Result, UiError};
pub use loader::{LoadCallback, ViewLoader};
pub use manager::{UiManager, ViewRoot};
pub use routine::{timed, wait_ticks, ActionRoutine, Step, TransitionTask};
pub use stack::{StackIter, ViewStack};
pub use state::{Transition, ViewState};
pub use view::{ObserverId, UserData, ViewBehavior, ViewHandle, ViewKey, ViewTemplate};
