pub mod scheduler;

pub use scheduler::SchedulerWorker;
