pub mod dto;
pub mod entities;
pub mod error;
pub mod events;
pub mod payload;
pub mod validate;

pub use entities::*;
pub use error::{AppError, AppResult};
