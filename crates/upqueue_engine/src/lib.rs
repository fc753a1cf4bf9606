pub mod admission;
pub mod batch;
pub mod error;
pub mod events;
pub mod progress;
pub mod queue;
pub mod scheduler;

pub use admission::AdmissionReport;
pub use batch::EntryResolution;
pub use error::QueueError;
pub use events::QueueEvent;
pub use progress::summarize;
pub use queue::UploadQueue;
