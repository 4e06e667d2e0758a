use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};

/// A variable standing for the product `x * b` of a continuous `x ∈ [0, upper]` and a binary `b`.
///
/// The product equals `x` when `b = 1` and is forced to zero otherwise, while never exceeding `x`:
///
/// ```text
///   p <= x
///   p <= upper * b
///   p >= x - upper * (1 - b)
///   p >= 0
/// ```
///
/// `upper` must bound `x` from above, otherwise the third inequality cuts off feasible points.
#[derive(Debug, Clone, Copy)]
pub struct BigMProduct {
    pub value: Variable,
    x: Variable,
    b: Variable,
    upper: f64,
}

impl BigMProduct {
    pub fn new(vars: &mut ProblemVariables, x: Variable, b: Variable, upper: f64) -> BigMProduct {
        debug_assert!(upper >= 0.0);
        let value = vars.add(variable().min(0.0).max(upper));
        BigMProduct { value, x, b, upper }
    }

    #[inline]
    pub fn upper(&self) -> f64 { self.upper }

    pub fn constraints(&self) -> Vec<Constraint> {
        let gated = self.upper * self.b;
        let floor = Expression::from(self.x) - self.upper + self.upper * self.b;
        vec![
            constraint!(self.value <= self.x),
            constraint!(self.value <= gated),
            constraint!(self.value >= floor),
            constraint!(self.value >= 0.0),
        ]
    }
}
