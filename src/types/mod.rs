//! Type definitions

pub mod guest;
pub mod import;
pub mod import_job;
pub mod messages;

pub use guest::*;
pub use import::*;
pub use import_job::*;
pub use messages::*;
