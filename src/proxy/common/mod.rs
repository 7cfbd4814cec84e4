// Common tools

pub mod body;
pub mod query;
