//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use netexp_rs::{ChipCoord, CoreAddr, DriverConfig};

/// Shorthand for a core address
pub fn core(x: u32, y: u32, c: u8) -> CoreAddr {
    CoreAddr::new(ChipCoord::new(x, y), c)
}

/// Driver settings with a fixed seed and a short poll budget
pub fn test_config() -> DriverConfig {
    DriverConfig::default().with_seed(0x5EED).with_poll(1, 5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
