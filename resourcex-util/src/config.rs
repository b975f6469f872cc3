//! Configuration lookup, parsing, and merging.
//!
//! This module provides helpers for sourcing configuration options from
//! multiple layers and merging them, without ever letting an unset layer
//! clobber a value set by a narrower one.

/// Assign to destination if source value is `Some`.
#[macro_export]
macro_rules! assign_if_some {
    ( $dst:expr, $src:expr ) => {{
        if let Some(x) = $src {
            $dst = x.into();
        };
    }};
}

/// Try to merge configuration options into runtime settings.
///
/// This consumes a generic configuration fragment, trying to merge its
/// options into existing settings. It only overlays populated values,
/// leaving unset ones preserved as-is.
pub trait MergeOptions<T> {
    /// Merge values from `options` into `self`.
    fn try_merge(&mut self, options: T) -> crate::errors::Result<()>;
}

/// Resolve an environment variable, trying `primary` before `fallback`.
///
/// Matches the `RESOURCEX_*` / `RX_*` dual-naming convention used throughout
/// the on-disk and HTTP surfaces.
pub fn env_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .or_else(|| std::env::var(fallback).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn primary_wins_over_fallback() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("RXU_TEST_PRIMARY", "primary");
        std::env::set_var("RXU_TEST_FALLBACK", "fallback");
        assert_eq!(
            env_with_fallback("RXU_TEST_PRIMARY", "RXU_TEST_FALLBACK").as_deref(),
            Some("primary")
        );
        std::env::remove_var("RXU_TEST_PRIMARY");
        std::env::remove_var("RXU_TEST_FALLBACK");
    }

    #[test]
    fn fallback_used_when_primary_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("RXU_TEST_PRIMARY2");
        std::env::set_var("RXU_TEST_FALLBACK2", "fallback");
        assert_eq!(
            env_with_fallback("RXU_TEST_PRIMARY2", "RXU_TEST_FALLBACK2").as_deref(),
            Some("fallback")
        );
        std::env::remove_var("RXU_TEST_FALLBACK2");
    }

    #[test]
    fn none_when_both_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("RXU_TEST_PRIMARY3");
        std::env::remove_var("RXU_TEST_FALLBACK3");
        assert_eq!(
            env_with_fallback("RXU_TEST_PRIMARY3", "RXU_TEST_FALLBACK3"),
            None
        );
    }
}
