use std::time::Duration;

use crate::actions::ActionState;

/// Result of advancing a cooperative task by one step.
///
/// Tasks are plain resumable objects driven once per tick by their owner;
/// there is no implicit suspension and no preemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The task yielded and wants another step next tick.
    Pending,

    /// The task yielded, and this step changed the shared domain state.
    /// Transition drivers treat this the same as [`Step::Pending`].
    StateAffected,

    /// The task finished. Its driver removes it and releases it.
    Done,
}

/// A resumable visual-transition task, advanced once per tick with the
/// tick's elapsed time. Returning [`Step::Done`] commits the transition.
pub type TransitionTask = Box<dyn FnMut(Duration) -> Step>;

/// A resumable action routine, advanced once per tick with the owning
/// dispatch object's domain state.
pub type ActionRoutine = Box<dyn FnMut(&mut dyn ActionState) -> Step>;

/// A task that idles for `ticks` steps before completing.
///
/// `wait_ticks(0)` completes on its first step, which still costs one tick;
/// a truly synchronous transition returns no task at all.
pub fn wait_ticks(ticks: u32) -> TransitionTask {
    let mut remaining = ticks;
    Box::new(move |_dt| {
        if remaining == 0 {
            Step::Done
        } else {
            remaining -= 1;
            Step::Pending
        }
    })
}

/// A task that reports progress in `0.0..=1.0` until `total` time elapses.
///
/// `f` is called once per step; it receives `1.0` exactly once, on the
/// final step. Suits timed effects such as fades.
pub fn timed(total: Duration, mut f: impl FnMut(f32) + 'static) -> TransitionTask {
    let mut elapsed = Duration::ZERO;
    Box::new(move |dt| {
        elapsed += dt;
        if elapsed >= total {
            f(1.0);
            Step::Done
        } else {
            f(elapsed.as_secs_f32() / total.as_secs_f32());
            Step::Pending
        }
    })
}
