pub mod candidate;
pub mod job;
pub mod processed;
pub mod record;
