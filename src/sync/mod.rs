// Sync module - keeps censor overlays in step with playback
// Contains: geometry tracking, coordinate mapping, overlay ledger, label policy, controller

mod controller;
mod events;
mod geometry;
mod ledger;
mod policy;
mod session;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{ControllerSettings, Health, SyncController, TickReport};
pub use events::{GeometryField, PlayerEvent};
pub use policy::{LabelPolicy, DEFAULT_CENSORED_LABELS};
pub use session::run_session;
pub use transform::ScreenRect;
