pub mod album;
pub mod apply;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod grouper;
pub mod hasher;
pub mod model;
pub mod progress;
pub mod quality;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod staging;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use hasher::{Algorithm, AudioHasher};
pub use progress::{ProgressReporter, SilentReporter};
pub use scanner::TrackScanner;
