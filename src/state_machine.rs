//! Call-progression state machine
//!
//! Pure phase transitions in the Elm style: `transition` maps a phase and
//! the caller's latest utterance to the next phase plus the effects the
//! session must carry out. `CallSession` owns one call's phase and
//! transcript and executes those effects.

mod effect;
mod session;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use session::{CallSession, SessionSnapshot, Turn};
pub use state::{CallPhase, Script, SessionContext};
pub use transition::{transition, InvalidStateError, TransitionResult};
