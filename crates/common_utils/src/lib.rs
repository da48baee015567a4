#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unreachable,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

//! Utilities shared across the admin backend crates: error aliases, extension
//! traits and small functional helpers.

pub mod errors;
pub mod ext_traits;

/// Functional programming utilities
pub mod fp_utils {
    /// Run `f` and return its result when `predicate` holds, `Ok(())` otherwise.
    pub fn when<W, F>(predicate: bool, f: F) -> Result<(), W>
    where
        F: FnOnce() -> Result<(), W>,
    {
        if predicate {
            f()
        } else {
            Ok(())
        }
    }
}
