pub mod bus;
pub mod mirror;

pub use bus::EventBus;
pub use mirror::spawn_bridge;
