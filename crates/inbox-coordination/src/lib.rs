pub mod pubsub;
pub mod store;

pub use pubsub::{spawn_mirror, MirroredMessage};
pub use store::CoordinationStore;
