//! Shared fixtures for integration tests.

pub mod range_server;
