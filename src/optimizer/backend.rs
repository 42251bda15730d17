use thiserror::Error;

use super::LinearProgram;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("problem is infeasible")]
    Infeasible,
    #[error("problem is unbounded")]
    Unbounded,
    #[error("numerical failure: {0}")]
    Numerical(String),
    #[error("no LP backend compiled in (enable the `optimization` feature)")]
    Unavailable,
}

/// Solves a [`LinearProgram`], returning one value per variable in
/// declaration order.
#[cfg_attr(test, mockall::automock)]
pub trait LpBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, program: &LinearProgram) -> Result<Vec<f64>, BackendError>;
}

/// `good_lp` with the pure-Rust `minilp` simplex solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpBackend;

#[cfg(feature = "optimization")]
impl LpBackend for GoodLpBackend {
    fn name(&self) -> &'static str {
        "good_lp/minilp"
    }

    fn solve(&self, program: &LinearProgram) -> Result<Vec<f64>, BackendError> {
        use good_lp::{variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel};

        use super::Comparison;

        let mut vars = ProblemVariables::new();
        let handles: Vec<good_lp::Variable> = program
            .variables()
            .iter()
            .map(|spec| {
                vars.add(
                    variable()
                        .name(spec.name.clone())
                        .min(spec.lower)
                        .max(spec.upper),
                )
            })
            .collect();

        let mut objective = Expression::from(0.0);
        for (var, coefficient) in program.objective() {
            objective.add_mul(*coefficient, handles[var.index()]);
        }

        let mut model = vars.minimise(objective).using(good_lp::minilp);
        for constraint in program.constraints() {
            let mut lhs = Expression::from(0.0);
            for (var, coefficient) in &constraint.terms {
                lhs.add_mul(*coefficient, handles[var.index()]);
            }
            let row = match constraint.comparison {
                Comparison::Eq => lhs.eq(constraint.rhs),
                Comparison::Le => lhs.leq(constraint.rhs),
                Comparison::Ge => lhs.geq(constraint.rhs),
            };
            model.add_constraint(row);
        }

        let solution = model.solve().map_err(|e| match e {
            ResolutionError::Infeasible => BackendError::Infeasible,
            ResolutionError::Unbounded => BackendError::Unbounded,
            ResolutionError::Other(msg) => BackendError::Numerical(msg.to_string()),
            ResolutionError::Str(msg) => BackendError::Numerical(msg),
        })?;

        let values: Vec<f64> = handles.iter().map(|v| solution.value(*v)).collect();
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(BackendError::Numerical(format!(
                "variable {} has non-finite value",
                program.variables()[i].name
            )));
        }
        Ok(values)
    }
}

#[cfg(not(feature = "optimization"))]
impl LpBackend for GoodLpBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn solve(&self, _program: &LinearProgram) -> Result<Vec<f64>, BackendError> {
        Err(BackendError::Unavailable)
    }
}

#[cfg(all(test, feature = "optimization"))]
mod tests {
    use super::*;
    use crate::optimizer::Comparison;

    #[test]
    fn test_solves_small_program() {
        // min x + 2y  s.t.  x + y = 4,  x <= 3
        let mut lp = LinearProgram::new();
        let x = lp.add_variable("x", 0.0, f64::INFINITY);
        let y = lp.add_variable("y", 0.0, f64::INFINITY);
        lp.add_objective_term(x, 1.0);
        lp.add_objective_term(y, 2.0);
        lp.add_constraint("sum", [(x, 1.0), (y, 1.0)], Comparison::Eq, 4.0);
        lp.add_constraint("cap", [(x, 1.0)], Comparison::Le, 3.0);

        let values = GoodLpBackend.solve(&lp).unwrap();
        assert!((values[0] - 3.0).abs() < 1e-6);
        assert!((values[1] - 1.0).abs() < 1e-6);
        assert!(lp.max_violation(&values).0 < 1e-6);
    }

    #[test]
    fn test_reports_infeasibility() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable("x", 0.0, 1.0);
        lp.add_objective_term(x, 1.0);
        lp.add_constraint("floor", [(x, 1.0)], Comparison::Ge, 2.0);
        assert_eq!(GoodLpBackend.solve(&lp), Err(BackendError::Infeasible));
    }
}
