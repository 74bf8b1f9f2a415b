pub mod feed;
pub mod images;
pub mod migration;
pub mod processor;
pub mod queue;
pub mod safety;
pub mod scheduler;
pub mod workers;

pub use feed::FeedPoller;
pub use images::{ImageService, ServedImage};
pub use migration::{MigrationReport, MigrationService};
pub use processor::{ImagePipeline, PostProcessor};
pub use queue::{CandidateQueue, OverflowPolicy};
pub use safety::SafetyFilter;
pub use scheduler::{spawn_periodic, Schedule};
pub use workers::WorkerPool;
