// scrubline-entropy/src/lib.rs
//! Statistical secret detection for scrubline.
//!
//! The crate is `no_std` (with `alloc`) and works on byte slices so callers can
//! scan borrowed text without copying. The sanitizer in `scrubline-core` uses
//! [`engine::EntropyEngine`] to find random-looking tokens that no explicit
//! credential pattern covers.
#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod context;
pub mod engine;
pub mod entropy;
pub mod scoring;

/// Common type definitions
pub type EntropyScore = f64;

pub use engine::{EntropyConfig, EntropyEngine, EntropyMatch};
