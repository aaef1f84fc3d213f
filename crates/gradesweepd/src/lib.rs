//! gradesweepd - drives the sweep engine against an assessment surface

pub mod command_surface;
pub mod driver;
pub mod lock;
pub mod notifier;
pub mod prior;
pub mod score_text;
pub mod simulated;
pub mod surface;

pub use driver::{AttemptError, Driver, DriverError, Outcome};
pub use surface::{AssessmentSurface, SurfaceError};
