//! Scalar pixel types.

use std::fmt;

/// A numeric scalar that can live in an image buffer.
///
/// Filters that need arithmetic go through `f64`; conversions back into
/// integer types round to nearest and saturate at the type's bounds.
pub trait Pixel:
    Copy + Default + PartialEq + PartialOrd + fmt::Debug + Send + Sync + 'static
{
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_pixel_int {
    ($($t:ty),*) => {
        $(
            impl Pixel for $t {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value.round() as $t
                }
            }
        )*
    };
}

macro_rules! impl_pixel_float {
    ($($t:ty),*) => {
        $(
            impl Pixel for $t {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_pixel_int!(u8, i8, u16, i16, u32, i32, u64, i64);
impl_pixel_float!(f32, f64);
