//! Event bus: the boundary between the core and the UI.

mod bus;
mod event;

pub use bus::{EventBus, EventStream, Subscription};
pub use event::LinkEvent;
