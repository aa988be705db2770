//! Special functions used by the model likelihoods and expectations

pub use statrs::function::gamma::ln_gamma;

/// Maximum number of series terms for the hypergeometric function
const MAX_SERIES_TERMS: usize = 100_000;

/// Relative precision at which the series is truncated
const SERIES_EPSILON: f64 = 1e-15;

/// Numerically stable `ln(exp(a) + exp(b))`
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// `c * 2F1(a, b; c; z)` for `c > -1` and `0 <= z < 1`.
///
/// The leading `c` is folded into the series, so the value stays finite
/// as `c` approaches 0 (where `2F1` itself has a pole) and keeps its sign
/// for negative `c`. Term `n >= 1` is `(a)_n (b)_n z^n / (n! (c+1)_(n-1))`.
/// The series is only truncated once the term index has passed the
/// parameters, where the term ratio approaches `z` and the remaining tail
/// is geometric. Returns NaN outside the domain or when the series does
/// not settle within the term budget.
pub fn scaled_hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    if !(0.0..1.0).contains(&z) || c <= -1.0 {
        return f64::NAN;
    }
    if z == 0.0 {
        return c;
    }

    let settle_after = a.abs().max(b.abs()).max(c.abs());
    let mut term = a * b * z;
    let mut sum = c + term;

    for n in 1..MAX_SERIES_TERMS {
        if !sum.is_finite() {
            return sum;
        }
        let nf = n as f64;
        let settled = nf > settle_after
            && term.abs() <= SERIES_EPSILON * sum.abs().max(f64::MIN_POSITIVE);
        if term == 0.0 || settled {
            return sum;
        }
        term *= (a + nf) * (b + nf) / ((nf + 1.0) * (c + nf)) * z;
        sum += term;
    }

    f64::NAN
}
