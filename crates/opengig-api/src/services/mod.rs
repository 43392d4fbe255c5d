pub mod jobs;
pub mod notify;
