//! Timeline playback: controller, activity line, clock, jumps, tick sweep.

mod clock;
mod controller;
mod jump;
mod line;
mod tick;

#[cfg(test)]
mod controller_tests;

pub use clock::TimelineClock;
pub use controller::{
    ActivityView, ControllerSettings, TimelineController, TimelineStatus,
};
pub use line::{ActivityInstance, ActivityLine, CapturedMatch};
