//! Database queries

pub mod guest;
