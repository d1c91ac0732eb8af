//! Deterministic Fixed-Point Mathematics
//!
//! > "God does not play dice with floating point numbers."
//!
//! # Overview
//!
//! Bit-exact arithmetic that produces identical results on x86, ARM, WASM or
//! any other target. The simulation path never touches IEEE 754 floating
//! point; `f64` only appears in the host-facing conversions behind the `std`
//! feature.
//!
//! # Types
//!
//! - `Fix64` (Q32.32): 64-bit fixed-point, 32 integer bits, 32 fractional bits
//! - `Vec2Fix` / `Vec3Fix`: vectors with `Fix64` components
//! - `Rot`: rotation stored as a sine/cosine pair
//! - `Transform`: translation plus rotation
//! - `Mat22` / `Mat33`: small matrices for constraint effective masses
//! - `Sweep`: start/end pose of a body over one step, used by continuous collision
//!
//! # Overflow policy
//!
//! `+`, `-`, `*`, negation and [`Fix64::from_int`] saturate at [`Fix64::MAX`] / [`Fix64::MIN`].
//! Division by zero yields zero. A saturated value is reported as invalid by
//! [`Fix64::is_valid`], which is what the world setters assert on.
//!
//! # Precision
//!
//! - Range: ±2.1 × 10^9
//! - Resolution: ~2.3 × 10^-10

use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

// ============================================================================
// Fix64 (Q32.32)
// ============================================================================

const FRAC_BITS: u32 = 32;

/// 64-bit fixed-point number (32 integer bits, 32 fractional bits)
///
/// Internal representation: `value = raw / 2^32`
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Fix64(i64);

#[inline]
fn saturate(v: i128) -> Fix64 {
    if v > i64::MAX as i128 {
        Fix64::MAX
    } else if v < i64::MIN as i128 {
        Fix64::MIN
    } else {
        Fix64(v as i64)
    }
}

impl Fix64 {
    /// Zero constant
    pub const ZERO: Self = Self(0);

    /// One constant (1.0)
    pub const ONE: Self = Self(1 << FRAC_BITS);

    /// One half (0.5)
    pub const HALF: Self = Self(1 << (FRAC_BITS - 1));

    /// Two (2.0)
    pub const TWO: Self = Self(2 << FRAC_BITS);

    /// Negative one (-1.0)
    pub const NEG_ONE: Self = Self(-(1 << FRAC_BITS));

    /// Pi (π), rounded to the nearest representable value
    pub const PI: Self = Self(13_493_037_705);

    /// Half Pi (π/2)
    pub const HALF_PI: Self = Self(6_746_518_852);

    /// Two Pi (2π)
    pub const TWO_PI: Self = Self(26_986_075_409);

    /// Smallest positive value (2^-32)
    pub const EPSILON: Self = Self(1);

    /// Largest representable value; also the saturation ceiling
    pub const MAX: Self = Self(i64::MAX);

    /// Smallest representable value; also the saturation floor
    pub const MIN: Self = Self(i64::MIN);

    /// Create from integer, saturating outside the 32-bit integer range
    #[inline]
    pub const fn from_int(n: i64) -> Self {
        if n > i32::MAX as i64 {
            Self::MAX
        } else if n < i32::MIN as i64 {
            Self::MIN
        } else {
            Self(n << FRAC_BITS)
        }
    }

    /// Create from the raw Q32.32 bit pattern
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw Q32.32 bit pattern
    #[inline]
    pub const fn to_raw(self) -> i64 {
        self.0
    }

    /// Create from fraction (numerator / denominator), truncating toward zero.
    ///
    /// A zero denominator yields zero.
    pub const fn from_ratio(num: i64, denom: i64) -> Self {
        if denom == 0 {
            return Self::ZERO;
        }
        let scaled = ((num as i128) << FRAC_BITS) / denom as i128;
        if scaled > i64::MAX as i128 {
            Self::MAX
        } else if scaled < i64::MIN as i128 {
            Self::MIN
        } else {
            Self(scaled as i64)
        }
    }

    /// Create from f64 (host-facing conversion only, never used by the solver).
    ///
    /// # Panics
    ///
    /// Panics on NaN or infinite input: a non-finite value entering the
    /// simulation would corrupt determinism irrecoverably.
    #[cfg(feature = "std")]
    pub fn from_f64(f: f64) -> Self {
        assert!(f.is_finite(), "non-finite value {f} passed to Fix64::from_f64");
        Self((f * (1u64 << FRAC_BITS) as f64).round() as i64)
    }

    /// Convert to f64 (for rendering and debugging only)
    #[cfg(feature = "std")]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1u64 << FRAC_BITS) as f64
    }

    /// Integer part, rounded toward negative infinity
    #[inline]
    pub const fn to_int(self) -> i64 {
        self.0 >> FRAC_BITS
    }

    /// `false` once a value has hit the saturation bounds
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != i64::MAX && self.0 != i64::MIN
    }

    /// Check if zero
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Check if negative
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Check if strictly positive
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Absolute value (saturating)
    #[inline]
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// -1, 0 or 1
    #[inline]
    pub const fn signum(self) -> Self {
        match self.0 {
            0 => Self::ZERO,
            r if r > 0 => Self::ONE,
            _ => Self::NEG_ONE,
        }
    }

    /// Smaller of two values
    #[inline]
    pub fn min(self, rhs: Self) -> Self {
        if self <= rhs {
            self
        } else {
            rhs
        }
    }

    /// Larger of two values
    #[inline]
    pub fn max(self, rhs: Self) -> Self {
        if self >= rhs {
            self
        } else {
            rhs
        }
    }

    /// Clamp into `[lo, hi]`
    #[inline]
    pub fn clamp(self, lo: Self, hi: Self) -> Self {
        self.max(lo).min(hi)
    }

    /// Floor (round toward negative infinity)
    #[inline]
    pub const fn floor(self) -> Self {
        Self(self.0 & !((1i64 << FRAC_BITS) - 1))
    }

    /// Divide by 2 (arithmetic shift)
    #[inline]
    pub const fn half(self) -> Self {
        Self(self.0 >> 1)
    }

    /// Multiply by 2 (saturating)
    #[inline]
    pub const fn double(self) -> Self {
        Self(self.0.saturating_mul(2))
    }

    /// Square root, exact to the last bit (floor of the true root).
    ///
    /// Non-positive inputs yield zero.
    pub fn sqrt(self) -> Self {
        if self.0 <= 0 {
            return Self::ZERO;
        }
        let n = (self.0 as u128) << FRAC_BITS;
        Self(isqrt_u128(n) as i64)
    }

    /// Sine using CORDIC (deterministic, any input range)
    #[inline]
    pub fn sin(self) -> Self {
        self.sin_cos().0
    }

    /// Cosine using CORDIC (deterministic, any input range)
    #[inline]
    pub fn cos(self) -> Self {
        self.sin_cos().1
    }

    /// Simultaneous sine and cosine
    pub fn sin_cos(self) -> (Self, Self) {
        cordic_sin_cos(self.0)
    }

    /// Four-quadrant arctangent of `y / x`, in `(-π, π]`
    pub fn atan2(y: Self, x: Self) -> Self {
        cordic_atan2(y.0, x.0)
    }

    /// Arccosine, input clamped to `[-1, 1]`
    pub fn acos(self) -> Self {
        let x = self.clamp(Self::NEG_ONE, Self::ONE);
        let s = (Self::ONE - x * x).sqrt();
        Self::atan2(s, x)
    }

    /// Arcsine, input clamped to `[-1, 1]`
    pub fn asin(self) -> Self {
        let x = self.clamp(Self::NEG_ONE, Self::ONE);
        let c = (Self::ONE - x * x).sqrt();
        Self::atan2(x, c)
    }
}

/// Floor of the square root of a 128-bit integer (Newton iteration from above).
fn isqrt_u128(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let bits = 128 - n.leading_zeros();
    let mut x = 1u128 << bits.div_ceil(2);
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

impl Add for Fix64 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Fix64 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Mul for Fix64 {
    type Output = Self;

    /// Full 128-bit product, rounded half up, saturated.
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let p = (self.0 as i128) * (rhs.0 as i128);
        saturate((p + (1i128 << (FRAC_BITS - 1))) >> FRAC_BITS)
    }
}

impl Div for Fix64 {
    type Output = Self;

    /// Truncating division; dividing by zero yields zero.
    #[inline]
    fn div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return Self::ZERO;
        }
        saturate(((self.0 as i128) << FRAC_BITS) / rhs.0 as i128)
    }
}

impl Neg for Fix64 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl AddAssign for Fix64 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Fix64 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Fix64 {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Fix64 {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl fmt::Debug for Fix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fix64({self})")
    }
}

impl fmt::Display for Fix64 {
    /// Decimal rendering with nine fractional digits, integer math only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let neg = self.0 < 0;
        let mag = (self.0 as i128).unsigned_abs();
        let int = mag >> FRAC_BITS;
        let frac = mag & ((1u128 << FRAC_BITS) - 1);
        let digits = (frac * 1_000_000_000 + (1u128 << (FRAC_BITS - 1))) >> FRAC_BITS;
        let (int, digits) = if digits >= 1_000_000_000 {
            (int + 1, digits - 1_000_000_000)
        } else {
            (int, digits)
        };
        if neg {
            write!(f, "-{int}.{digits:09}")
        } else {
            write!(f, "{int}.{digits:09}")
        }
    }
}

// ============================================================================
// CORDIC (Coordinate Rotation Digital Computer)
// ============================================================================

const CORDIC_ITERATIONS: usize = 32;

/// arctan(2^-i) in Q32.32
const CORDIC_ANGLES: [i64; CORDIC_ITERATIONS] = [
    3_373_259_426,
    1_991_351_318,
    1_052_175_346,
    534_100_635,
    268_086_748,
    134_174_063,
    67_103_403,
    33_553_749,
    16_777_131,
    8_388_597,
    4_194_303,
    2_097_152,
    1_048_576,
    524_288,
    262_144,
    131_072,
    65_536,
    32_768,
    16_384,
    8_192,
    4_096,
    2_048,
    1_024,
    512,
    256,
    128,
    64,
    32,
    16,
    8,
    4,
    2,
];

/// CORDIC gain K = prod(cos(arctan(2^-i))) ≈ 0.607252935 in Q32.32
const CORDIC_K: i64 = 2_608_131_496;

fn cordic_sin_cos(angle: i64) -> (Fix64, Fix64) {
    let pi = Fix64::PI.0;
    let half_pi = Fix64::HALF_PI.0;
    let two_pi = Fix64::TWO_PI.0;

    // Reduce to (-π, π], then fold into [-π/2, π/2] where CORDIC converges
    let mut theta = angle.rem_euclid(two_pi);
    if theta > pi {
        theta -= two_pi;
    }
    if theta == 0 {
        return (Fix64::ZERO, Fix64::ONE);
    }
    let mut flip_cos = false;
    if theta > half_pi {
        theta = pi - theta;
        flip_cos = true;
    } else if theta < -half_pi {
        theta = -pi - theta;
        flip_cos = true;
    }

    let mut x = CORDIC_K;
    let mut y = 0i64;
    let mut z = theta;
    for (i, &step) in CORDIC_ANGLES.iter().enumerate() {
        let dx = y >> i;
        let dy = x >> i;
        if z >= 0 {
            x -= dx;
            y += dy;
            z -= step;
        } else {
            x += dx;
            y -= dy;
            z += step;
        }
    }

    let one = Fix64::ONE.0;
    let sin = y.clamp(-one, one);
    let cos = x.clamp(-one, one);
    (Fix64(sin), Fix64(if flip_cos { -cos } else { cos }))
}

fn cordic_atan2(y: i64, x: i64) -> Fix64 {
    if y == 0 {
        return if x < 0 { Fix64::PI } else { Fix64::ZERO };
    }

    let mut xr = x as i128;
    let mut yr = y as i128;
    let mut offset = 0i64;
    if xr < 0 {
        // Rotate by π into the right half-plane
        xr = -xr;
        yr = -yr;
        offset = if y >= 0 { Fix64::PI.0 } else { -Fix64::PI.0 };
    }

    // atan2 is scale invariant: bring the larger magnitude to 2^40
    let m = xr.unsigned_abs().max(yr.unsigned_abs());
    let bits = 128 - m.leading_zeros();
    if bits > 41 {
        xr >>= bits - 41;
        yr >>= bits - 41;
    } else {
        xr <<= 41 - bits;
        yr <<= 41 - bits;
    }

    let mut z = 0i64;
    for (i, &step) in CORDIC_ANGLES.iter().enumerate() {
        let dx = yr >> i;
        let dy = xr >> i;
        if yr > 0 {
            xr += dx;
            yr -= dy;
            z += step;
        } else {
            xr -= dx;
            yr += dy;
            z -= step;
        }
    }

    Fix64(z + offset)
}

// ============================================================================
// Vec2Fix — 2D Vector
// ============================================================================

/// 2D vector using [`Fix64`] components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Vec2Fix {
    /// X component
    pub x: Fix64,
    /// Y component
    pub y: Fix64,
}

impl Vec2Fix {
    /// Zero vector (0, 0)
    pub const ZERO: Self = Self::new(Fix64::ZERO, Fix64::ZERO);

    /// One vector (1, 1)
    pub const ONE: Self = Self::new(Fix64::ONE, Fix64::ONE);

    /// Unit X vector (1, 0)
    pub const UNIT_X: Self = Self::new(Fix64::ONE, Fix64::ZERO);

    /// Unit Y vector (0, 1)
    pub const UNIT_Y: Self = Self::new(Fix64::ZERO, Fix64::ONE);

    /// Create a new 2D vector.
    #[inline]
    #[must_use]
    pub const fn new(x: Fix64, y: Fix64) -> Self {
        Self { x, y }
    }

    /// Create from integer components.
    #[inline]
    #[must_use]
    pub const fn from_int(x: i64, y: i64) -> Self {
        Self::new(Fix64::from_int(x), Fix64::from_int(y))
    }

    /// Create from ratios `(xn / d, yn / d)`.
    #[inline]
    #[must_use]
    pub const fn from_ratio(xn: i64, yn: i64, d: i64) -> Self {
        Self::new(Fix64::from_ratio(xn, d), Fix64::from_ratio(yn, d))
    }

    /// Host-facing constructor (not deterministic across toolchains' float parsing).
    #[cfg(feature = "std")]
    #[must_use]
    pub fn from_f64(x: f64, y: f64) -> Self {
        Self::new(Fix64::from_f64(x), Fix64::from_f64(y))
    }

    /// Both components valid (not saturated).
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.x.is_valid() && self.y.is_valid()
    }

    /// Squared length (avoids sqrt).
    #[inline]
    #[must_use]
    pub fn length_squared(self) -> Fix64 {
        self.x * self.x + self.y * self.y
    }

    /// Length (magnitude).
    #[inline]
    #[must_use]
    pub fn length(self) -> Fix64 {
        self.length_squared().sqrt()
    }

    /// Normalize to unit length. Returns `ZERO` for near-zero vectors.
    #[inline]
    #[must_use]
    pub fn normalize(self) -> Self {
        self.normalize_with_length().0
    }

    /// Normalize and also return the original length.
    #[must_use]
    pub fn normalize_with_length(self) -> (Self, Fix64) {
        let len = self.length();
        if len < Fix64::EPSILON.double() {
            (Self::ZERO, Fix64::ZERO)
        } else {
            (self / len, len)
        }
    }

    /// Dot product.
    #[inline]
    #[must_use]
    pub fn dot(self, rhs: Self) -> Fix64 {
        self.x * rhs.x + self.y * rhs.y
    }

    /// 2D cross product (`a.x * b.y - a.y * b.x`).
    #[inline]
    #[must_use]
    pub fn cross(self, rhs: Self) -> Fix64 {
        self.x * rhs.y - self.y * rhs.x
    }

    /// Cross product of this vector with a scalar: `(s * y, -s * x)`.
    #[inline]
    #[must_use]
    pub fn cross_scalar(self, s: Fix64) -> Self {
        Self::new(s * self.y, -s * self.x)
    }

    /// Cross product of a scalar with a vector: `(-s * v.y, s * v.x)`.
    #[inline]
    #[must_use]
    pub fn scalar_cross(s: Fix64, v: Self) -> Self {
        Self::new(-s * v.y, s * v.x)
    }

    /// Perpendicular (90 degrees counter-clockwise): `(-y, x)`.
    #[inline]
    #[must_use]
    pub fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Distance to another point.
    #[inline]
    #[must_use]
    pub fn distance_to(self, other: Self) -> Fix64 {
        (other - self).length()
    }

    /// Squared distance to another point.
    #[inline]
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fix64 {
        (other - self).length_squared()
    }

    /// Linear interpolation: `self + (other - self) * t`.
    #[inline]
    #[must_use]
    pub fn lerp(self, other: Self, t: Fix64) -> Self {
        self + (other - self) * t
    }

    /// Component-wise absolute value.
    #[inline]
    #[must_use]
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs())
    }

    /// Component-wise minimum.
    #[inline]
    #[must_use]
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y))
    }

    /// Component-wise maximum.
    #[inline]
    #[must_use]
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y))
    }

    /// Scale by a scalar.
    #[inline]
    #[must_use]
    pub fn scale(self, s: Fix64) -> Self {
        Self::new(self.x * s, self.y * s)
    }
}

impl Add for Vec2Fix {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2Fix {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<Fix64> for Vec2Fix {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Fix64) -> Self {
        self.scale(rhs)
    }
}

impl Mul<Vec2Fix> for Fix64 {
    type Output = Vec2Fix;

    #[inline]
    fn mul(self, rhs: Vec2Fix) -> Vec2Fix {
        rhs.scale(self)
    }
}

impl Div<Fix64> for Vec2Fix {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Fix64) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2Fix {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl AddAssign for Vec2Fix {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Vec2Fix {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign<Fix64> for Vec2Fix {
    #[inline]
    fn mul_assign(&mut self, rhs: Fix64) {
        *self = *self * rhs;
    }
}

// ============================================================================
// Vec3Fix — 3D Vector (block constraint solves)
// ============================================================================

/// 3D vector using [`Fix64`] components. Used for 3x3 block solves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Vec3Fix {
    pub x: Fix64,
    pub y: Fix64,
    pub z: Fix64,
}

impl Vec3Fix {
    /// Zero vector
    pub const ZERO: Self = Self::new(Fix64::ZERO, Fix64::ZERO, Fix64::ZERO);

    /// Create new vector
    #[inline]
    pub const fn new(x: Fix64, y: Fix64, z: Fix64) -> Self {
        Self { x, y, z }
    }

    /// Dot product
    #[inline]
    pub fn dot(self, rhs: Self) -> Fix64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Cross product
    #[inline]
    pub fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    /// XY part as a 2D vector
    #[inline]
    pub fn xy(self) -> Vec2Fix {
        Vec2Fix::new(self.x, self.y)
    }
}

impl Add for Vec3Fix {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3Fix {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<Fix64> for Vec3Fix {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Fix64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3Fix {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ============================================================================
// Rot / Transform
// ============================================================================

/// Rotation stored as sine and cosine of the angle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rot {
    /// Sine
    pub s: Fix64,
    /// Cosine
    pub c: Fix64,
}

impl Rot {
    /// No rotation
    pub const IDENTITY: Self = Self {
        s: Fix64::ZERO,
        c: Fix64::ONE,
    };

    /// Rotation by `angle` radians (counter-clockwise).
    #[inline]
    pub fn from_angle(angle: Fix64) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    /// Angle in `(-π, π]`.
    #[inline]
    pub fn angle(self) -> Fix64 {
        Fix64::atan2(self.s, self.c)
    }

    /// Rotated x-axis
    #[inline]
    pub fn x_axis(self) -> Vec2Fix {
        Vec2Fix::new(self.c, self.s)
    }

    /// Rotated y-axis
    #[inline]
    pub fn y_axis(self) -> Vec2Fix {
        Vec2Fix::new(-self.s, self.c)
    }

    /// Rotate a vector.
    #[inline]
    pub fn apply(self, v: Vec2Fix) -> Vec2Fix {
        Vec2Fix::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotate a vector.
    #[inline]
    pub fn apply_inv(self, v: Vec2Fix) -> Vec2Fix {
        Vec2Fix::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Composition `self * rhs`.
    #[inline]
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            s: self.s * rhs.c + self.c * rhs.s,
            c: self.c * rhs.c - self.s * rhs.s,
        }
    }

    /// Relative rotation `self^T * rhs`.
    #[inline]
    pub fn mul_inv(self, rhs: Self) -> Self {
        Self {
            s: self.c * rhs.s - self.s * rhs.c,
            c: self.c * rhs.c + self.s * rhs.s,
        }
    }
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rigid transform: translation plus rotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transform {
    /// Translation
    pub p: Vec2Fix,
    /// Rotation
    pub q: Rot,
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        p: Vec2Fix::ZERO,
        q: Rot::IDENTITY,
    };

    /// Create from a position and an angle.
    #[inline]
    pub fn new(p: Vec2Fix, angle: Fix64) -> Self {
        Self {
            p,
            q: Rot::from_angle(angle),
        }
    }

    /// Local point to world.
    #[inline]
    pub fn apply(&self, v: Vec2Fix) -> Vec2Fix {
        self.q.apply(v) + self.p
    }

    /// World point to local.
    #[inline]
    pub fn apply_inv(&self, v: Vec2Fix) -> Vec2Fix {
        self.q.apply_inv(v - self.p)
    }

    /// Composition `self * rhs`.
    pub fn mul(&self, rhs: &Self) -> Self {
        Self {
            q: self.q.mul(rhs.q),
            p: self.q.apply(rhs.p) + self.p,
        }
    }

    /// Relative transform `self^-1 * rhs`.
    pub fn mul_inv(&self, rhs: &Self) -> Self {
        Self {
            q: self.q.mul_inv(rhs.q),
            p: self.q.apply_inv(rhs.p - self.p),
        }
    }
}

// ============================================================================
// Mat22 / Mat33
// ============================================================================

/// 2x2 matrix stored by columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mat22 {
    /// Column 0
    pub ex: Vec2Fix,
    /// Column 1
    pub ey: Vec2Fix,
}

impl Mat22 {
    /// Zero matrix
    pub const ZERO: Self = Self {
        ex: Vec2Fix::ZERO,
        ey: Vec2Fix::ZERO,
    };

    /// Create from columns
    #[inline]
    pub const fn from_cols(ex: Vec2Fix, ey: Vec2Fix) -> Self {
        Self { ex, ey }
    }

    fn det(&self) -> Fix64 {
        self.ex.x * self.ey.y - self.ey.x * self.ex.y
    }

    /// Inverse; a singular matrix yields zero.
    pub fn inverse(&self) -> Self {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = self.det();
        if !det.is_zero() {
            det = Fix64::ONE / det;
        }
        Self {
            ex: Vec2Fix::new(det * d, -det * c),
            ey: Vec2Fix::new(-det * b, det * a),
        }
    }

    /// Solve `A * x = b`; a singular matrix yields zero.
    pub fn solve(&self, b: Vec2Fix) -> Vec2Fix {
        let mut det = self.det();
        if !det.is_zero() {
            det = Fix64::ONE / det;
        }
        Vec2Fix::new(
            det * (self.ey.y * b.x - self.ey.x * b.y),
            det * (self.ex.x * b.y - self.ex.y * b.x),
        )
    }

    /// Matrix-vector product.
    #[inline]
    pub fn mul_vec(&self, v: Vec2Fix) -> Vec2Fix {
        Vec2Fix::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

/// 3x3 matrix stored by columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mat33 {
    /// Column 0
    pub ex: Vec3Fix,
    /// Column 1
    pub ey: Vec3Fix,
    /// Column 2
    pub ez: Vec3Fix,
}

impl Mat33 {
    /// Zero matrix
    pub const ZERO: Self = Self {
        ex: Vec3Fix::ZERO,
        ey: Vec3Fix::ZERO,
        ez: Vec3Fix::ZERO,
    };

    /// Solve `A * x = b` for the full 3x3 system; singular yields zero.
    pub fn solve33(&self, b: Vec3Fix) -> Vec3Fix {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if !det.is_zero() {
            det = Fix64::ONE / det;
        }
        Vec3Fix::new(
            det * b.dot(self.ey.cross(self.ez)),
            det * self.ex.dot(b.cross(self.ez)),
            det * self.ex.dot(self.ey.cross(b)),
        )
    }

    /// Solve the upper-left 2x2 block `A * x = b`; singular yields zero.
    pub fn solve22(&self, b: Vec2Fix) -> Vec2Fix {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if !det.is_zero() {
            det = Fix64::ONE / det;
        }
        Vec2Fix::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }

    /// Inverse of the upper-left 2x2 block, zero elsewhere.
    pub fn inverse22(&self) -> Self {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if !det.is_zero() {
            det = Fix64::ONE / det;
        }
        Self {
            ex: Vec3Fix::new(det * d, -det * c, Fix64::ZERO),
            ey: Vec3Fix::new(-det * b, det * a, Fix64::ZERO),
            ez: Vec3Fix::ZERO,
        }
    }

    /// Inverse of a symmetric matrix; singular yields zero.
    pub fn sym_inverse33(&self) -> Self {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if !det.is_zero() {
            det = Fix64::ONE / det;
        }

        let (a11, a12, a13) = (self.ex.x, self.ey.x, self.ez.x);
        let (a22, a23) = (self.ey.y, self.ez.y);
        let a33 = self.ez.z;

        let ex = Vec3Fix::new(
            det * (a22 * a33 - a23 * a23),
            det * (a13 * a23 - a12 * a33),
            det * (a12 * a23 - a13 * a22),
        );
        let ey = Vec3Fix::new(ex.y, det * (a11 * a33 - a13 * a13), det * (a13 * a12 - a11 * a23));
        let ez = Vec3Fix::new(ex.z, ey.z, det * (a11 * a22 - a12 * a12));
        Self { ex, ey, ez }
    }

    /// Matrix-vector product.
    #[inline]
    pub fn mul_vec(&self, v: Vec3Fix) -> Vec3Fix {
        self.ex * v.x + self.ey * v.y + self.ez * v.z
    }

    /// Product with the upper-left 2x2 block.
    #[inline]
    pub fn mul_vec22(&self, v: Vec2Fix) -> Vec2Fix {
        Vec2Fix::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

// ============================================================================
// Sweep
// ============================================================================

/// Motion of a body over one step, used by time of impact.
///
/// `c0, a0` is the pose at `alpha0`, `c, a` the pose at the end of the step.
/// Positions refer to the center of mass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Center of mass in body-local coordinates
    pub local_center: Vec2Fix,
    /// World center at `alpha0`
    pub c0: Vec2Fix,
    /// World center at the end of the step
    pub c: Vec2Fix,
    /// Angle at `alpha0`
    pub a0: Fix64,
    /// Angle at the end of the step
    pub a: Fix64,
    /// Fraction of the step already consumed, in `[0, 1)`
    pub alpha0: Fix64,
}

impl Sweep {
    /// Interpolated transform at `beta` in `[0, 1]`.
    pub fn transform(&self, beta: Fix64) -> Transform {
        let one_minus = Fix64::ONE - beta;
        let p = self.c0 * one_minus + self.c * beta;
        let angle = one_minus * self.a0 + beta * self.a;
        let q = Rot::from_angle(angle);
        Transform {
            p: p - q.apply(self.local_center),
            q,
        }
    }

    /// Advance the start of the sweep to `alpha`, keeping the end pose.
    pub fn advance(&mut self, alpha: Fix64) {
        debug_assert!(self.alpha0 < Fix64::ONE);
        let beta = (alpha - self.alpha0) / (Fix64::ONE - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Wrap angles into `[0, 2π)` relative to `a0`.
    pub fn normalize(&mut self) {
        let turns = (self.a0 / Fix64::TWO_PI).floor();
        let d = Fix64::TWO_PI * turns;
        self.a0 -= d;
        self.a -= d;
    }
}

// ============================================================================
// Tests
// ============================================================================
