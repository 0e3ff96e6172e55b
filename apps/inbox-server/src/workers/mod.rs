pub mod outbound_sender;
pub mod webhook_processor;
