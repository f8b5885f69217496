//! Reducer trait and the store that applies it.

use std::fmt::{Debug, Display};
use tracing::{debug, instrument, trace};

/// Outcome of an accepted action: the replacement state and an optional
/// effect for the driver to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<S, E> {
    /// The state that replaces the current one.
    pub state: S,
    /// Collaborator request to launch, if any.
    pub effect: Option<E>,
}

impl<S, E> Step<S, E> {
    /// A transition with no side effect.
    pub fn to(state: S) -> Self {
        Self {
            state,
            effect: None,
        }
    }

    /// A transition that also asks a collaborator for something.
    pub fn with_effect(state: S, effect: E) -> Self {
        Self {
            state,
            effect: Some(effect),
        }
    }
}

/// A game whose state changes only through [`Reducer::reduce`].
///
/// Implementations must be pure: the current state is never mutated and a
/// rejection leaves nothing behind.
pub trait Reducer: Clone + Sized {
    /// Inputs accepted by the game.
    type Action: Debug;
    /// Requests the game makes of its collaborator.
    type Effect: Debug;
    /// Why an action was refused.
    type Rejection: Debug + Display;

    /// Count of accepted transitions that produced this state.
    ///
    /// Every accepted action must yield a strictly larger version.
    fn version(&self) -> u64;

    /// Computes the next state for `action`.
    fn reduce(&self, action: Self::Action) -> Result<Step<Self, Self::Effect>, Self::Rejection>;
}

/// Holds the current state record and replaces it wholesale on every
/// accepted action.
#[derive(Debug, Clone)]
pub struct Store<S> {
    state: S,
}

impl<S: Reducer> Store<S> {
    /// Creates a store around an initial state.
    pub fn new(state: S) -> Self {
        Self { state }
    }

    /// The current state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Version of the current state.
    pub fn version(&self) -> u64 {
        self.state.version()
    }

    /// Applies one action.
    ///
    /// On success the state is replaced and the effect, if any, is returned.
    /// On rejection the state is untouched.
    #[instrument(skip(self), fields(version = self.state.version()))]
    pub fn dispatch(&mut self, action: S::Action) -> Result<Option<S::Effect>, S::Rejection> {
        match self.state.reduce(action) {
            Ok(step) => {
                self.state = step.state;
                trace!(version = self.state.version(), effect = ?step.effect, "Action accepted");
                Ok(step.effect)
            }
            Err(rejection) => {
                debug!(%rejection, "Action rejected");
                Err(rejection)
            }
        }
    }

    /// Replaces the state without going through the reducer.
    #[instrument(skip_all, fields(from = self.state.version(), to = state.version()))]
    pub fn reset(&mut self, state: S) {
        debug!("Resetting store");
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: u8,
        version: u64,
    }

    impl Counter {
        fn at(value: u8) -> Self {
            Self { value, version: 0 }
        }
    }

    impl Reducer for Counter {
        type Action = u8;
        type Effect = &'static str;
        type Rejection = String;

        fn version(&self) -> u64 {
            self.version
        }

        fn reduce(&self, action: u8) -> Result<Step<Self, Self::Effect>, String> {
            let value = self.value.checked_add(action).ok_or("overflow")?;
            let next = Counter {
                value,
                version: self.version + 1,
            };
            if value == 10 {
                Ok(Step::with_effect(next, "ten"))
            } else {
                Ok(Step::to(next))
            }
        }
    }

    #[test]
    fn test_dispatch_replaces_state() {
        let mut store = Store::new(Counter::at(1));
        assert_eq!(store.dispatch(2), Ok(None));
        assert_eq!(store.state().value, 3);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_dispatch_returns_effect() {
        let mut store = Store::new(Counter::at(4));
        assert_eq!(store.dispatch(6), Ok(Some("ten")));
    }

    #[test]
    fn test_rejection_leaves_state() {
        let mut store = Store::new(Counter::at(250));
        assert!(store.dispatch(10).is_err());
        assert_eq!(store.state(), &Counter::at(250));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_version_follows_state() {
        let resumed = Counter {
            value: 0,
            version: 41,
        };
        let mut store = Store::new(resumed.clone());
        assert_eq!(store.version(), 41);

        store.dispatch(1).unwrap();
        assert_eq!(store.version(), store.state().version());
        assert_eq!(store.version(), 42);

        store.reset(resumed);
        assert_eq!(store.version(), 41);
    }
}
