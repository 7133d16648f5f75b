//! Business logic services.
//!
//! Services contain the core logic separated from HTTP handlers. They depend
//! on the store traits and on the upstream clients, never on a pool directly.

pub mod analyzer;
pub mod github;
pub mod ledger;
pub mod openai;
pub mod summarizer;

#[cfg(test)]
pub mod fakes;
