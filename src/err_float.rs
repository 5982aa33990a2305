use crate::Float;
use std::ops::{Add, Sub, Mul, Div, Neg};

pub const MACHINE_EPSILON: f32 = std::f32::EPSILON * 0.5;

/// A float value tracked alongside a running error bound, following the
/// running-error analysis used throughout the ray/triangle intersection
/// routines (see `shapes/triangle.rs`, `math::quadratic`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EFloat {
    pub v: Float,
    low: Float,
    high: Float,
}

impl EFloat {
    pub fn new(v: Float, err: Float) -> Self {
        Self::with_err(v, err)
    }

    pub fn with_err(v: Float, err: Float) -> Self {
        if err == 0.0 {
            EFloat { v, low: v, high: v }
        } else {
            EFloat { v, low: next_float_down(v - err), high: next_float_up(v + err) }
        }
    }

    pub fn absolute_error(&self) -> Float {
        self.high - self.low
    }

    pub fn lower_bound(&self) -> Float {
        self.low
    }

    pub fn upper_bound(&self) -> Float {
        self.high
    }
}

impl From<Float> for EFloat {
    fn from(v: Float) -> Self {
        EFloat { v, low: v, high: v }
    }
}

impl Add for EFloat {
    type Output = EFloat;
    fn add(self, rhs: EFloat) -> EFloat {
        let v = self.v + rhs.v;
        let low = next_float_down(self.low + rhs.low);
        let high = next_float_up(self.high + rhs.high);
        EFloat { v, low, high }
    }
}

impl Sub for EFloat {
    type Output = EFloat;
    fn sub(self, rhs: EFloat) -> EFloat {
        let v = self.v - rhs.v;
        let low = next_float_down(self.low - rhs.high);
        let high = next_float_up(self.high - rhs.low);
        EFloat { v, low, high }
    }
}

impl Mul for EFloat {
    type Output = EFloat;
    fn mul(self, rhs: EFloat) -> EFloat {
        let v = self.v * rhs.v;
        let prods = [
            self.low * rhs.low, self.low * rhs.high,
            self.high * rhs.low, self.high * rhs.high,
        ];
        let low = next_float_down(prods.iter().cloned().fold(Float::INFINITY, Float::min));
        let high = next_float_up(prods.iter().cloned().fold(Float::NEG_INFINITY, Float::max));
        EFloat { v, low, high }
    }
}

impl Mul<Float> for EFloat {
    type Output = EFloat;
    fn mul(self, rhs: Float) -> EFloat {
        self * EFloat::from(rhs)
    }
}

impl Mul<EFloat> for Float {
    type Output = EFloat;
    fn mul(self, rhs: EFloat) -> EFloat {
        EFloat::from(self) * rhs
    }
}

impl Div for EFloat {
    type Output = EFloat;
    fn div(self, rhs: EFloat) -> EFloat {
        let v = self.v / rhs.v;
        if rhs.low < 0.0 && rhs.high > 0.0 {
            // division by an interval straddling zero; widen to infinity
            return EFloat { v, low: Float::NEG_INFINITY, high: Float::INFINITY };
        }
        let quots = [
            self.low / rhs.low, self.low / rhs.high,
            self.high / rhs.low, self.high / rhs.high,
        ];
        let low = next_float_down(quots.iter().cloned().fold(Float::INFINITY, Float::min));
        let high = next_float_up(quots.iter().cloned().fold(Float::NEG_INFINITY, Float::max));
        EFloat { v, low, high }
    }
}

impl Neg for EFloat {
    type Output = EFloat;
    fn neg(self) -> EFloat {
        EFloat { v: -self.v, low: -self.high, high: -self.low }
    }
}

pub const fn gamma(n: i32) -> Float {
    let n = n as Float;
    (n * MACHINE_EPSILON) / (1.0 - n * MACHINE_EPSILON)
}

pub fn next_float_up(mut v: f32) -> f32 {
    if v == std::f32::INFINITY { return v; }

    if v == -0.0 { v = 0.0 }

    let bits = v.to_bits();
    let bits = if v >= 0.0 { bits + 1 } else { bits - 1 };
    f32::from_bits(bits)
}

pub fn next_float_down(mut v: f32) -> f32 {
    if v == std::f32::NEG_INFINITY { return v; }

    if v == 0.0 { v = -0.0 }

    let bits = v.to_bits();
    let bits = if v >= 0.0 { bits - 1 } else { bits + 1 };
    f32::from_bits(bits)
}