//! Rule handling: compilation, fingerprinting, scope resolution and matching.
//!
//! The pieces here are leaves of the pipeline. [`crate::engine::RuleEngine`]
//! composes them over an ordered rule list.

pub mod compiler;
pub mod fingerprint;
pub mod matcher;
pub mod scope;
