//! Backend-neutral linear program.
//!
//! The schedule solver describes its problem here; an [`LpBackend`](super::LpBackend)
//! turns it into whatever its solver library expects.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Le,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub comparison: Comparison,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * values[v.index()]).sum()
    }

    /// How far `values` are from satisfying this constraint (0 when satisfied).
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.lhs(values);
        match self.comparison {
            Comparison::Eq => (lhs - self.rhs).abs(),
            Comparison::Le => (lhs - self.rhs).max(0.0),
            Comparison::Ge => (self.rhs - lhs).max(0.0),
        }
    }
}

/// Minimization problem over bounded continuous variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearProgram {
    variables: Vec<VariableSpec>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<(VarId, f64)>,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.variables.push(VariableSpec {
            name: name.into(),
            lower,
            upper,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: impl IntoIterator<Item = (VarId, f64)>,
        comparison: Comparison,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            terms: terms.into_iter().collect(),
            comparison,
            rhs,
        });
    }

    pub fn add_objective_term(&mut self, var: VarId, coefficient: f64) {
        self.objective.push((var, coefficient));
    }

    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &[(VarId, f64)] {
        &self.objective
    }

    pub fn evaluate_objective(&self, values: &[f64]) -> f64 {
        self.objective.iter().map(|(v, c)| c * values[v.index()]).sum()
    }

    /// Largest bound or constraint violation of `values`, with the name of
    /// the offending variable or constraint.
    pub fn max_violation<'a>(&'a self, values: &[f64]) -> (f64, Option<&'a str>) {
        let bounds = self.variables.iter().zip(values).map(|(spec, value)| {
            let v = (spec.lower - value).max(value - spec.upper).max(0.0);
            (v, spec.name.as_str())
        });
        let rows = self
            .constraints
            .iter()
            .map(|c| (c.violation(values), c.name.as_str()));
        bounds
            .chain(rows)
            .fold((0.0, None), |(worst, name), (v, n)| {
                if v > worst {
                    (v, Some(n))
                } else {
                    (worst, name)
                }
            })
    }
}
