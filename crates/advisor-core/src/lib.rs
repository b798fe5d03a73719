// Library root for the advisor's domain logic: configuration, CSV datasets,
// data profiling, prompt templates, and analysis-plan execution.

pub mod config;
pub mod dataset;
pub mod plan;
pub mod profile;
pub mod prompt;
pub mod request;
pub mod response;
