//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::sync::Once;
use std::time::Duration;
use voxflow::{Image, Pixel, Region};

static TRACING: Once = Once::new();

/// Install a test subscriber once per test binary; `RUST_LOG` selects levels
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// How long a test waits for something another thread should do
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
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

/// Pixels of `image` over `region`, in buffer order
pub fn pixels_in<P: Pixel, const D: usize>(image: &Image<P, D>, region: &Region<D>) -> Vec<P> {
    image
        .extract(region)
        .unwrap_or_else(|e| panic!("{} not buffered: {}", region, e))
}

/// Assert the region invariant `requested ⊆ buffered ⊆ largest`
pub fn assert_region_invariant<P: Pixel, const D: usize>(image: &Image<P, D>) {
    let requested = image.requested_region();
    let buffered = image.buffered_region();
    let largest = image.largest_possible_region();
    assert!(
        buffered.contains(&requested),
        "requested {} not inside buffered {}",
        requested,
        buffered
    );
    assert!(
        largest.contains(&buffered),
        "buffered {} not inside largest {}",
        buffered,
        largest
    );
}
