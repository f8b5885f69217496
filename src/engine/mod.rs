//! Turn engine shared by every game.
//!
//! A game is a [`Reducer`]: a pure function from the current state and one
//! action to either a rejection or the next state plus an optional effect.
//! Effects are requests to an external collaborator (an AI opponent, a
//! narrator) and are executed by [`InFlight`], whose replies re-enter the
//! reducer as ordinary actions.

mod inflight;
mod reducer;

pub use inflight::{CollaboratorError, InFlight, Reply, Ticket};
pub use reducer::{Reducer, Step, Store};
