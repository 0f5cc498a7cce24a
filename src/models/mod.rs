pub mod job;
pub mod order;
pub mod request;
