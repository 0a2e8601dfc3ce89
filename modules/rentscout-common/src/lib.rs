pub mod config;
pub mod error;
pub mod types;

pub use config::{
    CleaningSettings, Config, ExportSettings, ExtractionSettings, KeyScope, ScoutSettings,
    UploadSettings,
};
pub use error::ScoutError;
pub use types::*;
