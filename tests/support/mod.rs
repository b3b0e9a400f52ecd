//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod responders;
pub mod socket_guard;
