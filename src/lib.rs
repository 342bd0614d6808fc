pub mod cli;
pub mod config;
pub mod database;
pub mod detector;
pub mod error;
pub mod image;
pub mod matrix;
pub mod pipeline;
pub mod source;
pub mod utils;

pub use config::{CollisionPolicy, DetectorOptions, Opts};
pub use database::{Database, DatabaseReader, ObjectRecord, read_database, write_database};
pub use detector::{BriskDetector, Detector, DetectorFactory, Features, Keypoint};
pub use error::{Error, Result};
pub use matrix::{DescriptorMatrix, Matrix};
pub use pipeline::Coordinator;
pub use source::{ObjectKey, SourceIndex, SourceRow};
