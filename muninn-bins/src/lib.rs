//! Shared bootstrap code for the muninn binaries.

pub mod common;
