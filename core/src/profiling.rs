//! Profiling support via Tracy.
//!
//! This module provides optional profiling instrumentation using the
//! [Tracy profiler](https://github.com/wolfpld/tracy). Profiling is enabled
//! via the `profiling` Cargo feature.
//!
//! # Enabling Profiling
//!
//! ```toml
//! [dependencies]
//! nightshade-core = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! # CPU Profiling
//!
//! ```ignore
//! use nightshade_core::profiling::{profile_scope, profile_function};
//!
//! fn expensive_operation() {
//!     profile_function!();
//!
//!     {
//!         profile_scope!("inner_work");
//!         // ... do work ...
//!     }
//! }
//! ```
//!
//! When profiling is disabled (the default), all macros compile to no-ops with
//! zero runtime overhead.

// Re-export tracy-client types when profiling is enabled
#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, Span, span};

/// Profile a named scope.
///
/// The span ends when the enclosing scope ends.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _span = $crate::profiling::span!($name);
    };
}

/// Profile a named scope (no-op: profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Profile the current function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _span = $crate::profiling::span!();
    };
}

/// Profile the current function (no-op: profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

pub use profile_function;
pub use profile_scope;

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_compile() {
        super::profile_function!();
        super::profile_scope!("test_scope");
    }
}
