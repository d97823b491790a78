pub mod gate;
pub mod local;
pub mod progress;
pub mod store;

pub use gate::{GateState, Location, Resolution, RetryGate, Sleeper, ThreadSleeper};
pub use local::LocalDirStore;
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressSink, ProgressStatus};
pub use store::{SweepReport, UploadStore, make_token, original_name_of, sanitize_name, validate_token};
