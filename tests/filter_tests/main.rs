//! Compaction filter tests

#[path = "../common/mod.rs"]
mod common;

mod cassandra_filter_tests;
mod header_tests;
