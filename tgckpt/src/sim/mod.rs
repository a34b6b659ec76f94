//! In-process stand-ins for the scheduler and the capture collaborators, so a
//! thread group can be driven through a checkpoint with real OS threads.

pub mod group;
pub mod producer;
pub mod scheduler;

pub use group::{SimBehavior, SimGroup, SimReport};
pub use producer::{CollectingSink, InMemoryProducer, ProducerProbes};
pub use scheduler::{ParkingScheduler, SchedProbes};
