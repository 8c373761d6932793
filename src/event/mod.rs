//! Contains the events and handler traits for monitoring holder behavior.

pub mod pool;
