pub mod analytics;
pub mod catalog;
pub mod cleaning;
pub mod dedup;
pub mod export;
pub mod fetchers;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod storage;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
