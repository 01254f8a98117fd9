pub mod command;
pub mod delivery_mode;
pub mod error;
pub mod message;
pub mod queue;
pub mod subscriber;
