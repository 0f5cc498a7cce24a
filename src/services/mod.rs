pub mod integrations;
pub mod order_service;
pub mod producer;
pub mod queue;
pub mod redis_queue;
pub mod retry;
pub mod worker;
