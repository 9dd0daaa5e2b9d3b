/// Monitoring engine module - keeps target status up to date
///
/// This module is responsible for:
/// - Probing targets over HTTP and classifying them up/down
/// - Running the paced monitor loop over every registered target
/// - Publishing status transitions
/// - Validating target URLs and timing settings
pub mod checker;
pub mod clock;
pub mod events;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use checker::{HttpProbe, Probe};
pub use scheduler::MonitorLoop;
pub use types::TargetStatus;
