pub mod document;
pub mod query;
pub mod task;
