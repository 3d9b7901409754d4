pub mod fs;
pub mod ids;
pub mod logging;

pub use ids::{allocate_run_id, RunId};
pub use logging::RunLog;
