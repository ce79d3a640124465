//! Projected gradient ascent on the constrained simplex

use super::{composite_score, project, Objective, SolverRun, WeightBounds};

/// Deterministic bounded solve. Gradients are central finite differences of
/// the composite score; each step is projected back onto the feasible set.
#[allow(clippy::too_many_arguments)]
pub(crate) fn solve(
    columns: &[Vec<f64>],
    target: &[f64],
    objective: Objective,
    bounds: WeightBounds,
    start: &[f64],
    max_iters: usize,
    tolerance: f64,
) -> SolverRun {
    let n = start.len();
    let mut weights = start.to_vec();
    let mut score = composite_score(columns, target, &weights, objective);
    let mut learning_rate = 0.1;
    let mut stalled = 0usize;
    let mut iterations = 0usize;

    const EPS: f64 = 1e-6;

    for _ in 0..max_iters {
        iterations += 1;

        let mut gradient = vec![0.0; n];
        for i in 0..n {
            let mut up = weights.clone();
            up[i] += EPS;
            let mut down = weights.clone();
            down[i] -= EPS;
            gradient[i] = (composite_score(columns, target, &up, objective)
                - composite_score(columns, target, &down, objective))
                / (2.0 * EPS);
        }

        let mut candidate: Vec<f64> = weights
            .iter()
            .zip(gradient.iter())
            .map(|(w, g)| w + learning_rate * g)
            .collect();
        project(&mut candidate, bounds);
        let candidate_score = composite_score(columns, target, &candidate, objective);

        if candidate_score > score + tolerance {
            weights = candidate;
            score = candidate_score;
            stalled = 0;
        } else {
            learning_rate *= 0.5;
            stalled += 1;
            if stalled >= 8 || learning_rate < 1e-10 {
                return SolverRun {
                    weights,
                    score,
                    iterations,
                    converged: score.is_finite(),
                };
            }
        }
    }

    SolverRun {
        weights,
        score,
        iterations,
        converged: score.is_finite(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_weight_onto_the_informative_factor() {
        // Target follows the first factor only
        let x1: Vec<f64> = (0..20).map(|i| i as f64 / 10.0).collect();
        let x2: Vec<f64> = (0..20).map(|i| ((i * 13) % 7) as f64 / 7.0).collect();
        let target: Vec<f64> = x1.iter().map(|v| 4.0 * v).collect();

        let bounds = WeightBounds { min: 0.05, max: 0.95 };
        let run = solve(
            &[x1, x2],
            &target,
            Objective::MaximizeR2,
            bounds,
            &[0.5, 0.5],
            300,
            1e-9,
        );
        assert!(run.converged);
        assert!(
            run.weights[0] > run.weights[1],
            "weights {:?}",
            run.weights
        );
    }
}
