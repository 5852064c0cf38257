pub mod api;
pub mod clock;
pub mod cursor;
pub mod error;
pub mod models;

pub use error::{BlogError, Result};
