//! Common types shared by the Beds24 credential crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
