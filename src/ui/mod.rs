//! Terminal UI: state machine, rendering and the terminal runtime.

pub mod app;
pub mod input;
pub mod runtime;
pub mod spinner;
pub mod view;

pub use app::{App, Mode, WorkerSlot};
pub use runtime::{event_loop, run};
pub use spinner::Spinner;
