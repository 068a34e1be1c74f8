//! Domain types shared by every pipeline stage.

pub mod error;
pub mod event;
pub mod revision;

pub use error::{KustomizerError, Result};
pub use event::{CheckoutTarget, EventKind, InboundEvent, Strategy, Trigger};
pub use revision::Revision;
