#[path = "../common/mod.rs"]
mod common;

mod wrapper_tests;
