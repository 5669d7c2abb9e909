//! Derivative-free minimisation (Nelder–Mead simplex).
//!
//! Standard coefficients: reflection 1, expansion 2, contraction 0.5,
//! shrink 0.5. Converged when both the spread of objective values across
//! the simplex and the simplex diameter fall below their tolerances.

/// Tuning knobs for [`nelder_mead`].
#[derive(Debug, Clone, Copy)]
pub struct NelderMeadOptions {
    pub max_iter: usize,
    /// Tolerance on the objective spread across simplex vertices.
    pub f_tol: f64,
    /// Tolerance on the largest vertex distance from the best vertex.
    pub x_tol: f64,
    /// Edge length of the initial simplex.
    pub initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iter: 4000,
            f_tol: 1e-10,
            x_tol: 1e-7,
            initial_step: 0.1,
        }
    }
}

/// Outcome of a minimisation.
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    pub x: Vec<f64>,
    pub f: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise `f` starting from `x0`.
///
/// Non-finite objective values are treated as `+∞`, so the simplex moves
/// away from regions where the objective is undefined.
pub fn nelder_mead<F>(f: F, x0: &[f64], opts: NelderMeadOptions) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    if n == 0 {
        let v = eval(x0);
        return NelderMeadResult {
            x: Vec::new(),
            f: v,
            iterations: 0,
            converged: v.is_finite(),
        };
    }

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut v = x0.to_vec();
        v[i] += if v[i].abs() > 1e-8 {
            opts.initial_step * v[i].abs().max(1.0)
        } else {
            opts.initial_step
        };
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iter {
        iterations += 1;

        // Order vertices best → worst
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let best = values[0];
        let worst = values[n];
        let f_spread = (worst - best).abs();
        let x_spread = simplex[1..]
            .iter()
            .map(|v| {
                v.iter()
                    .zip(&simplex[0])
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max)
            })
            .fold(0.0, f64::max);
        if best.is_finite() && f_spread <= opts.f_tol && x_spread <= opts.x_tol {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n])
                .map(|(c, w)| c + t * (w - c))
                .collect()
        };

        let reflected = along(-1.0);
        let f_r = eval(&reflected);

        if f_r < values[0] {
            let expanded = along(-2.0);
            let f_e = eval(&expanded);
            if f_e < f_r {
                simplex[n] = expanded;
                values[n] = f_e;
            } else {
                simplex[n] = reflected;
                values[n] = f_r;
            }
            continue;
        }

        if f_r < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_r;
            continue;
        }

        let (contracted, f_c) = if f_r < values[n] {
            let c = along(-0.5);
            let fc = eval(&c);
            (c, fc)
        } else {
            let c = along(0.5);
            let fc = eval(&c);
            (c, fc)
        };
        if f_c < values[n].min(f_r) {
            simplex[n] = contracted;
            values[n] = f_c;
            continue;
        }

        // Shrink towards the best vertex
        let best_vertex = simplex[0].clone();
        for i in 1..=n {
            let shrunk: Vec<f64> = best_vertex
                .iter()
                .zip(&simplex[i])
                .map(|(b, v)| b + 0.5 * (v - b))
                .collect();
            values[i] = eval(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let best_idx = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    NelderMeadResult {
        x: simplex[best_idx].clone(),
        f: values[best_idx],
        iterations,
        converged,
    }
}
