pub mod errors;
pub mod formats;
pub mod jobs;
pub mod logging;
pub mod paths;
pub mod results;
