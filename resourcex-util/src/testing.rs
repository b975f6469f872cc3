//! Test helpers shared across the ResourceX crates.

/// Initialize logging once for tests, ignoring repeated calls.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
