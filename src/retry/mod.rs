// src/retry/mod.rs
mod strategy;

pub use strategy::{AttemptContext, AttemptError, RetriesExhausted, RetryStrategy};
