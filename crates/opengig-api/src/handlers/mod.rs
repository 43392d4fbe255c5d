pub mod admin;
pub mod applications;
pub mod auth;
pub mod contracts;
pub mod disputes;
pub mod files;
pub mod health;
pub mod jobs;
pub mod messages;
pub mod milestones;
pub mod notifications;
pub mod readiness;
pub mod reviews;
pub mod submissions;
pub mod users;
