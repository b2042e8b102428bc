//! Integration-style tests that need real media files

pub mod fixtures;
