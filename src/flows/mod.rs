pub mod availability;
pub mod pickup;
pub mod status;
pub mod submission;
pub mod wait;
