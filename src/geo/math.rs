// src/geo/math.rs
//! Bounded-error inverse trigonometry
//!
//! These approximations only need `sqrt` and the four arithmetic operations,
//! so the geodesy layer does not depend on the platform's inverse trig
//! functions. Absolute error of `atan` stays below 1e-8 rad over the whole
//! real line and every function here is semi-monotonic.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_6, PI};

/// Reduction threshold: arguments above tan(pi/12) are rotated by pi/6.
const FRAC_PI_12: f64 = PI / 12.0;

/// sqrt(3) = tan(pi/3), used by the pi/6 rotation step.
const ROTATION_CONSTANT: f64 = 1.732050807569;

/// Arc tangent in [-pi/2, pi/2].
///
/// NaN maps to NaN and a signed zero is returned unchanged.
pub fn atan(a: f64) -> f64 {
    if a.is_nan() {
        return f64::NAN;
    }
    if a == 0.0 {
        return a;
    }

    let negative = a < 0.0;
    let mut x = a.abs();

    // atan(x) = pi/2 - atan(1/x)
    let inverted = x > 1.0;
    if inverted {
        x = 1.0 / x;
    }

    // atan(x) = pi/6 + atan((sqrt(3)x - 1) / (x + sqrt(3)))
    let mut rotations = 0u32;
    while x > FRAC_PI_12 {
        rotations += 1;
        x = (x * ROTATION_CONSTANT - 1.0) / (x + ROTATION_CONSTANT);
    }

    let x2 = x * x;
    let mut result = (0.55913709 / (x2 + 1.4087812) + 0.60310579 - 0.05160454 * x2) * x;
    result += f64::from(rotations) * FRAC_PI_6;

    if inverted {
        result = FRAC_PI_2 - result;
    }
    if negative {
        -result
    } else {
        result
    }
}

/// Two-argument arc tangent of `y / x` in [-pi, pi].
///
/// Follows the IEEE 754 special-case table: signed zeros select the half
/// plane, infinities resolve to multiples of pi/4, NaN in either argument
/// yields NaN.
pub fn atan2(y: f64, x: f64) -> f64 {
    if y.is_nan() || x.is_nan() {
        return f64::NAN;
    }

    if y == 0.0 {
        // +0 and +x keep the zero, -0 and -x go to the negative axis
        return if x > 0.0 || (x == 0.0 && x.is_sign_positive()) {
            y
        } else {
            PI.copysign(y)
        };
    }

    if y.is_infinite() {
        return match (x.is_infinite(), x > 0.0) {
            (true, true) => FRAC_PI_4.copysign(y),
            (true, false) => (3.0 * FRAC_PI_4).copysign(y),
            (false, _) => FRAC_PI_2.copysign(y),
        };
    }

    if x == 0.0 {
        return FRAC_PI_2.copysign(y);
    }

    if x.is_infinite() {
        return if x > 0.0 {
            0.0_f64.copysign(y)
        } else {
            PI.copysign(y)
        };
    }

    // Divide by the larger magnitude so the atan argument stays in [-1, 1].
    if x.abs() > y.abs() {
        let t = atan(y / x);
        if x > 0.0 {
            t
        } else if y < 0.0 {
            t - PI
        } else {
            t + PI
        }
    } else {
        FRAC_PI_2.copysign(y) - atan(x / y)
    }
}

/// Arc sine in [-pi/2, pi/2]; NaN outside [-1, 1].
pub fn asin(a: f64) -> f64 {
    if a.is_nan() || a.abs() > 1.0 {
        return f64::NAN;
    }
    if a == 0.0 {
        return a;
    }
    atan2(a, (1.0 - a * a).sqrt())
}
