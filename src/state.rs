use crate::error::UiError;

/// Lifecycle state of a view instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewState {
    /// The view is closed. Initial state, and the end of every cycle; a
    /// pooled instance re-enters `Active` from here.
    #[default]
    Closed,

    /// The view is on top of the navigation stack and receiving input.
    Active,

    /// The view sits below the top of the stack, retained but inert.
    Suspended,
}

/// A legal move between two view states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Closed -> Active`
    Open,
    /// `Active -> Suspended`
    Suspend,
    /// `Suspended -> Active`
    Resume,
    /// `Active -> Closed`
    Close,
}

impl Transition {
    /// Look up the transition for a state pair.
    ///
    /// Pairs outside the table fail with [`UiError::InvalidTransition`].
    /// That covers self-transitions and `Suspended -> Closed`; a suspended
    /// view must be resumed before it can close.
    pub fn between(from: ViewState, to: ViewState) -> Result<Transition, UiError> {
        match (from, to) {
            (ViewState::Closed, ViewState::Active) => Ok(Transition::Open),
            (ViewState::Active, ViewState::Suspended) => Ok(Transition::Suspend),
            (ViewState::Suspended, ViewState::Active) => Ok(Transition::Resume),
            (ViewState::Active, ViewState::Closed) => Ok(Transition::Close),
            _ => Err(UiError::InvalidTransition { from, to }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_pairs_resolve() {
        assert_eq!(
            Transition::between(ViewState::Closed, ViewState::Active).unwrap(),
            Transition::Open
        );
        assert_eq!(
            Transition::between(ViewState::Active, ViewState::Suspended).unwrap(),
            Transition::Suspend
        );
        assert_eq!(
            Transition::between(ViewState::Suspended, ViewState::Active).unwrap(),
            Transition::Resume
        );
        assert_eq!(
            Transition::between(ViewState::Active, ViewState::Closed).unwrap(),
            Transition::Close
        );
    }

    #[test]
    fn suspended_to_closed_is_rejected() {
        let err = Transition::between(ViewState::Suspended, ViewState::Closed).unwrap_err();
        assert!(matches!(
            err,
            UiError::InvalidTransition {
                from: ViewState::Suspended,
                to: ViewState::Closed
            }
        ));
    }

    #[test]
    fn self_transitions_are_rejected() {
        for state in [ViewState::Closed, ViewState::Active, ViewState::Suspended] {
            assert!(Transition::between(state, state).is_err());
        }
    }

    #[test]
    fn closed_to_suspended_is_rejected() {
        assert!(Transition::between(ViewState::Closed, ViewState::Suspended).is_err());
    }
}
