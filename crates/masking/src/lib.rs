#![forbid(unsafe_code)]
#![warn(missing_docs)]

//!
//! Wrapper types and traits for credentials, so they are not accidentally logged or
//! printed while they travel through configuration.
//!

mod strategy;

pub use strategy::{Strategy, WithType, WithoutType};
mod abs;
pub use abs::{ExposeInterface, PeekInterface};

mod secret;
pub use secret::Secret;

mod serde;

/// `use masking::prelude::*;`
pub mod prelude {
    pub use super::{ExposeInterface, PeekInterface};
}
