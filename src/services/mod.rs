pub mod cache;
pub use cache::{DbCache, KeyValueCache};

pub mod information;
pub use information::{FollowUp, InformationService};

pub mod information_worker;
pub use information_worker::{InformationTask, InformationWorker, JobRouter};

pub mod processor;
pub use processor::ScrapeProcessor;

pub mod queue;
pub use queue::{JobHandler, JobKind, JobQueue, ScrapeJob, WorkerPool};

pub mod scheduler;
pub use scheduler::{Dispatcher, ScheduledTask, Scheduler};

pub mod source;
pub use source::SourceService;
