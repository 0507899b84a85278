// SPDX-License-Identifier: GPL-3.0-or-later

//! A handful of `f32` intrinsics that don't exist in `core` under `no_std`.
//!
//! Under `std` we use the inherent `f32` methods; under `no_std` we reach for
//! `libm`, the same way `oldsheep68-mpu6886` and `stepper-motion-rs` do for
//! sqrt/fabs on targets without `std`.

#[cfg(feature = "std")]
#[inline(always)]
pub fn sqrtf(v: f32) -> f32 {
    v.sqrt()
}

#[cfg(not(feature = "std"))]
#[inline(always)]
pub fn sqrtf(v: f32) -> f32 {
    libm::sqrtf(v)
}

#[cfg(feature = "std")]
#[inline(always)]
pub fn fabsf(v: f32) -> f32 {
    v.abs()
}

#[cfg(not(feature = "std"))]
#[inline(always)]
pub fn fabsf(v: f32) -> f32 {
    libm::fabsf(v)
}

#[cfg(feature = "std")]
#[inline(always)]
pub fn sinf(v: f32) -> f32 {
    v.sin()
}

#[cfg(not(feature = "std"))]
#[inline(always)]
pub fn sinf(v: f32) -> f32 {
    libm::sinf(v)
}

#[cfg(feature = "std")]
#[inline(always)]
pub fn cosf(v: f32) -> f32 {
    v.cos()
}

#[cfg(not(feature = "std"))]
#[inline(always)]
pub fn cosf(v: f32) -> f32 {
    libm::cosf(v)
}

#[inline(always)]
pub fn minf(a: f32, b: f32) -> f32 {
    if a <= b { a } else { b }
}

#[inline(always)]
pub fn maxf(a: f32, b: f32) -> f32 {
    if a >= b { a } else { b }
}
