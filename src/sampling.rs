use crate::{Point2f, Vec2f, Vec3f, Float, Point3f};
use std::f32;
use rand::Rng;

pub fn concentric_sample_disk(u: Point2f) -> Point2f {
    // map sample from [0, 1] to [-1, 1]
    let u_offset = 2.0 * u - Vec2f::new(1.0, 1.0);
    if u_offset == Point2f::new(0.0, 0.0) {
        return Point2f::new(0.0, 0.0);
    }

    let (theta, r) = if u_offset.x.abs() > u_offset.y.abs() {
        (u_offset.x, f32::consts::FRAC_PI_4 * (u_offset.y / u_offset.x))
    } else {
        (u_offset.y, f32::consts::FRAC_PI_2 - f32::consts::FRAC_PI_4 * (u_offset.x / u_offset.y))
    };

    r * Point2f::new(theta.cos(), theta.sin())
}

pub fn cosine_sample_hemisphere(u: Point2f) -> Vec3f {
    let d = concentric_sample_disk(u);
    let z = Float::sqrt(Float::max(0.0, 1.0 - d.x * d.x - d.y * d.y));
    Vec3f::new(d.x, d.y, z)
}

pub fn rejection_sample_shere(rng: &mut impl Rng, radius: Float) -> Point3f {
    let p = loop {
        let x = rng.gen_range(-radius, radius);
        let y = rng.gen_range(-radius, radius);
        let z = rng.gen_range(-radius, radius);
        let d = x * x + y * y + z * z;
        if d < radius * radius { break Point3f::new(x, y, z) }
    };
    p
}

/// Uniformly distributed direction over the full sphere.
pub fn uniform_sample_sphere(u: Point2f) -> Vec3f {
    let z = 1.0 - 2.0 * u.x;
    let r = Float::max(0.0, 1.0 - z * z).sqrt();
    let phi = 2.0 * f32::consts::PI * u.y;
    Vec3f::new(r * phi.cos(), r * phi.sin(), z)
}

pub const UNIFORM_SPHERE_PDF: Float = 1.0 / (4.0 * f32::consts::PI);

/// Uniformly samples barycentric coordinates over a triangle, returning
/// `[b0, b1]` (the third weight is `1 - b0 - b1`).
pub fn uniform_sample_triangle(u: Point2f) -> [Float; 2] {
    let su0 = u.x.sqrt();
    [1.0 - su0, u.y * su0]
}

/// Veach's power heuristic (beta = 2) for combining two sampling strategies
/// in multiple importance sampling.
pub fn power_heuristic(nf: Float, f_pdf: Float, ng: Float, g_pdf: Float) -> Float {
    let f = nf * f_pdf;
    let g = ng * g_pdf;
    if f == 0.0 && g == 0.0 {
        return 0.0;
    }
    (f * f) / (f * f + g * g)
}

/// Piecewise-constant 1D distribution over `n` bins, inverse-transform
/// sampled via its CDF. Used both for the light-selector pdf (spec.md §4.D
/// step 1) and as the row/column marginals of `Distribution2D` below.
pub struct Distribution1D {
    func: Vec<Float>,
    cdf: Vec<Float>,
    pub func_int: Float,
}

impl Distribution1D {
    pub fn new(func: Vec<Float>) -> Self {
        let n = func.len();
        let mut cdf = Vec::with_capacity(n + 1);
        cdf.push(0.0);
        for i in 0..n {
            let prev = cdf[i];
            cdf.push(prev + func[i] / n as Float);
        }

        let func_int = cdf[n];
        if func_int == 0.0 {
            for (i, c) in cdf.iter_mut().enumerate().skip(1) {
                *c = i as Float / n as Float;
            }
        } else {
            for c in cdf.iter_mut().skip(1) {
                *c /= func_int;
            }
        }

        Self { func, cdf, func_int }
    }

    pub fn count(&self) -> usize {
        self.func.len()
    }

    /// Inverse-transform sample: returns `(continuous value in [0,1), pdf, discrete bin)`.
    pub fn sample_continuous(&self, u: Float) -> (Float, Float, usize) {
        let offset = find_interval(&self.cdf, u);
        let mut du = u - self.cdf[offset];
        let span = self.cdf[offset + 1] - self.cdf[offset];
        if span > 0.0 {
            du /= span;
        }
        let pdf = if self.func_int > 0.0 {
            self.func[offset] / self.func_int
        } else {
            0.0
        };
        ((offset as Float + du) / self.count() as Float, pdf, offset)
    }

    /// Discrete sample over the `n` bins: returns `(bin, pmf)`.
    pub fn sample_discrete(&self, u: Float) -> (usize, Float) {
        let offset = find_interval(&self.cdf, u);
        let pmf = if self.func_int > 0.0 {
            self.func[offset] / (self.func_int * self.count() as Float)
        } else {
            1.0 / self.count() as Float
        };
        (offset, pmf)
    }

    pub fn discrete_pdf(&self, index: usize) -> Float {
        if self.func_int > 0.0 {
            self.func[index] / (self.func_int * self.count() as Float)
        } else {
            1.0 / self.count() as Float
        }
    }
}

fn find_interval(cdf: &[Float], u: Float) -> usize {
    let mut lo = 0usize;
    let mut hi = cdf.len() - 1;
    while lo + 1 < hi {
        let mid = (lo + hi) / 2;
        if cdf[mid] <= u {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo.min(cdf.len() - 2)
}

/// Piecewise-constant 2D distribution over a `width x height` grid of
/// non-negative weights: one marginal `Distribution1D` over rows, and one
/// conditional `Distribution1D` per row. Used by the importance-sampled
/// final-gather hemisphere histogram (spec.md §4.F) and, incidentally,
/// by environment-map light sampling.
pub struct Distribution2D {
    conditional: Vec<Distribution1D>,
    marginal: Distribution1D,
}

impl Distribution2D {
    pub fn new(func: &[Float], width: usize, height: usize) -> Self {
        let conditional: Vec<Distribution1D> = (0..height)
            .map(|v| Distribution1D::new(func[v * width..(v + 1) * width].to_vec()))
            .collect();

        let marginal_func: Vec<Float> = conditional.iter().map(|c| c.func_int).collect();
        let marginal = Distribution1D::new(marginal_func);

        Self { conditional, marginal }
    }

    /// Returns `((u, v) in [0,1)^2, combined pdf)`.
    pub fn sample_continuous(&self, u: Point2f) -> (Point2f, Float) {
        let (d1, pdf1, v_bin) = self.marginal.sample_continuous(u.y);
        let (d0, pdf0, _u_bin) = self.conditional[v_bin].sample_continuous(u.x);
        (Point2f::new(d0, d1), pdf0 * pdf1)
    }

    pub fn pdf(&self, p: Point2f) -> Float {
        let width = self.conditional[0].count();
        let height = self.conditional.len();
        let iu = ((p.x * width as Float) as usize).min(width - 1);
        let iv = ((p.y * height as Float) as usize).min(height - 1);
        if self.marginal.func_int == 0.0 {
            0.0
        } else {
            self.conditional[iv].func[iu] / self.marginal.func_int
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution1d_uniform_weights_give_uniform_pdf() {
        let dist = Distribution1D::new(vec![1.0, 1.0, 1.0, 1.0]);
        for i in 0..4 {
            assert!((dist.discrete_pdf(i) - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn distribution1d_favors_heavier_bins() {
        let dist = Distribution1D::new(vec![1.0, 0.0, 0.0, 3.0]);
        assert!(dist.discrete_pdf(3) > dist.discrete_pdf(0));
        let (bin, _) = dist.sample_discrete(0.999);
        assert_eq!(bin, 3);
    }

    #[test]
    fn distribution2d_sample_matches_heavy_region() {
        // 2x2 grid, all weight in the bottom-right cell.
        let func = vec![0.0, 0.0, 0.0, 1.0];
        let dist = Distribution2D::new(&func, 2, 2);
        let (p, pdf) = dist.sample_continuous(Point2f::new(0.999, 0.999));
        assert!(p.x >= 0.5 && p.y >= 0.5);
        assert!(pdf > 0.0);
    }
}