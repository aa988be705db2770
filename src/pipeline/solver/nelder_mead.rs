//! Nelder-Mead simplex minimisation with a deadline

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{SolverConfig, SolverResult};
use crate::pipeline::error::{Result, ValuationError};

/// Offset applied to each coordinate of the start point to build the initial simplex
const INITIAL_STEP: f64 = 0.5;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

struct Vertex {
    point: Vec<f64>,
    value: f64,
}

/// Minimise `objective` starting from `start`.
///
/// Non-finite objective values are treated as +inf so the simplex moves away
/// from them. Fails with `Convergence` (tagged with `model`) when the start
/// point is not finite, the iteration limit is reached, or the deadline
/// elapses before the simplex collapses below the configured tolerance.
pub fn minimize<F>(
    model: &'static str,
    objective: F,
    start: &[f64],
    config: &SolverConfig,
) -> Result<SolverResult>
where
    F: Fn(&[f64]) -> f64,
{
    let started = Instant::now();
    let deadline = started + Duration::from_secs(config.timeout_seconds);
    let x_tolerance = config.tolerance.sqrt();
    let n = start.len();

    let eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let start_value = eval(start);
    if !start_value.is_finite() {
        return Err(ValuationError::convergence(
            model,
            0,
            "objective is not finite at the starting point",
        ));
    }

    let mut simplex: Vec<Vertex> = Vec::with_capacity(n + 1);
    simplex.push(Vertex {
        point: start.to_vec(),
        value: start_value,
    });
    for i in 0..n {
        let mut point = start.to_vec();
        point[i] += INITIAL_STEP;
        let value = eval(&point);
        simplex.push(Vertex { point, value });
    }

    let mut iterations = 0usize;
    loop {
        simplex.sort_by(|a, b| a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal));

        if has_converged(&simplex, config.tolerance, x_tolerance) {
            let best = &simplex[0];
            let solve_time_ms = started.elapsed().as_millis() as u64;
            debug!(model, iterations, value = best.value, solve_time_ms, "Simplex converged");
            return Ok(SolverResult {
                point: best.point.clone(),
                value: best.value,
                iterations,
                solve_time_ms,
            });
        }

        if iterations >= config.max_iterations {
            return Err(ValuationError::convergence(
                model,
                iterations,
                format!(
                    "iteration limit reached (objective spread {:.3e})",
                    objective_spread(&simplex)
                ),
            ));
        }
        if Instant::now() >= deadline {
            return Err(ValuationError::convergence(
                model,
                iterations,
                format!("deadline of {}s elapsed", config.timeout_seconds),
            ));
        }
        iterations += 1;

        let worst = n;
        let centroid = centroid(&simplex[..worst]);
        let worst_point = simplex[worst].point.clone();
        let worst_value = simplex[worst].value;
        let second_worst_value = simplex[worst - 1].value;
        let best_value = simplex[0].value;

        let reflected = along(&centroid, &worst_point, -REFLECTION);
        let reflected_value = eval(&reflected);

        if reflected_value < best_value {
            let expanded = along(&centroid, &reflected, EXPANSION);
            let expanded_value = eval(&expanded);
            simplex[worst] = if expanded_value < reflected_value {
                Vertex { point: expanded, value: expanded_value }
            } else {
                Vertex { point: reflected, value: reflected_value }
            };
            continue;
        }

        if reflected_value < second_worst_value {
            simplex[worst] = Vertex { point: reflected, value: reflected_value };
            continue;
        }

        let (contracted, accept) = if reflected_value < worst_value {
            let outside = along(&centroid, &reflected, CONTRACTION);
            let value = eval(&outside);
            (Vertex { point: outside, value }, value <= reflected_value)
        } else {
            let inside = along(&centroid, &worst_point, CONTRACTION);
            let value = eval(&inside);
            (Vertex { point: inside, value }, value < worst_value)
        };

        if accept {
            simplex[worst] = contracted;
            continue;
        }

        let best_point = simplex[0].point.clone();
        for vertex in simplex.iter_mut().skip(1) {
            vertex.point = along(&best_point, &vertex.point, SHRINK);
            vertex.value = eval(&vertex.point);
        }
    }
}

/// `origin + factor * (towards - origin)`
fn along(origin: &[f64], towards: &[f64], factor: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(towards)
        .map(|(o, t)| o + factor * (t - o))
        .collect()
}

fn centroid(vertices: &[Vertex]) -> Vec<f64> {
    let dim = vertices[0].point.len();
    let count = vertices.len() as f64;
    (0..dim)
        .map(|j| vertices.iter().map(|v| v.point[j]).sum::<f64>() / count)
        .collect()
}

fn objective_spread(simplex: &[Vertex]) -> f64 {
    let best = simplex[0].value;
    simplex
        .iter()
        .map(|v| (v.value - best).abs())
        .fold(0.0, f64::max)
}

fn has_converged(simplex: &[Vertex], f_tolerance: f64, x_tolerance: f64) -> bool {
    if objective_spread(simplex) > f_tolerance {
        return false;
    }
    let best = &simplex[0].point;
    simplex.iter().skip(1).all(|v| {
        v.point
            .iter()
            .zip(best)
            .all(|(a, b)| (a - b).abs() <= x_tolerance)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(x: &[f64]) -> f64 {
        (x[0] - 1.5).powi(2) + 2.0 * (x[1] + 0.5).powi(2)
    }

    #[test]
    fn test_minimizes_quadratic_bowl() {
        let result = minimize("test", quadratic, &[0.0, 0.0], &SolverConfig::default()).unwrap();
        assert!((result.point[0] - 1.5).abs() < 1e-3, "x0 = {}", result.point[0]);
        assert!((result.point[1] + 0.5).abs() < 1e-3, "x1 = {}", result.point[1]);
        assert!(result.value < 1e-6);
    }

    #[test]
    fn test_minimizes_rosenbrock() {
        let rosenbrock = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let config = SolverConfig {
            tolerance: 1e-12,
            ..SolverConfig::default()
        };
        let result = minimize("test", rosenbrock, &[-1.2, 1.0], &config).unwrap();
        assert!((result.point[0] - 1.0).abs() < 1e-3);
        assert!((result.point[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_iteration_limit_is_a_convergence_error() {
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let err = minimize("test", quadratic, &[10.0, 10.0], &config).unwrap_err();
        assert!(err.is_convergence());
        assert!(err.to_string().contains("iteration limit"));
    }

    #[test]
    fn test_zero_deadline_is_a_convergence_error() {
        let config = SolverConfig {
            timeout_seconds: 0,
            ..SolverConfig::default()
        };
        let err = minimize("test", quadratic, &[10.0, 10.0], &config).unwrap_err();
        assert!(err.to_string().contains("deadline"));
    }

    #[test]
    fn test_non_finite_start_is_rejected() {
        let err = minimize("test", |_| f64::NAN, &[0.0], &SolverConfig::default()).unwrap_err();
        assert!(err.to_string().contains("starting point"));
    }

    #[test]
    fn test_steps_away_from_non_finite_region() {
        // Undefined for x <= 0; minimum at x = 2
        let objective = |x: &[f64]| x[0] - 2.0 * x[0].ln();
        let result = minimize("test", objective, &[0.2], &SolverConfig::default()).unwrap();
        assert!((result.point[0] - 2.0).abs() < 1e-3);
    }
}
