//! Business logic services

pub mod guest_store;
pub mod import_session;
pub mod importer;
