//! Constellation Emulator Fuzz Harness
//!
//! Shared property-based testing strategies: vertex paths, link endpoint
//! sets and link geometry.
//!
//! # Usage
//!
//! ```rust
//! use fuzz_harness::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_fuzz_test(path in simple_path(20, 2, 10)) {
//!         prop_assert!(path.len() >= 2);
//!     }
//! }
//! ```

pub mod generators;

pub mod prelude {
    pub use crate::generators::*;
    pub use crate::config;
    pub use proptest::prelude::*;
}

// Re-export proptest for convenience
pub use proptest;

/// Proptest configuration with a fixed case count.
pub fn config(cases: u32) -> proptest::test_runner::Config {
    proptest::test_runner::Config {
        cases,
        ..proptest::test_runner::Config::default()
    }
}
