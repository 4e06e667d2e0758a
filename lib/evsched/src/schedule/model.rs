use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Solution, Variable};
use tracing::*;

use crate::data::evrp::*;
use crate::route::Leg;
use super::linearize::BigMProduct;
use super::{ChargePin, Schedule, Traversal, Visit};

struct OptionVars {
    option: ChargingOption,
    w: Variable,
    /// `phi * w`
    used: BigMProduct,
}

struct VisitVars {
    loc: Loc,
    t: Variable,
    depart: Variable,
    ya: Variable,
    yd: Variable,
    phi: Variable,
    /// Upper bound on the charging duration, zero at nodes without options.
    phi_ub: Time,
    /// No-charge selector, present only at nodes with options.
    w0: Option<Variable>,
    options: Vec<OptionVars>,
}

struct LegVars {
    s: Variable,
    /// Selector and `s * z` product, on wireless legs only.
    wireless: Option<(Variable, BigMProduct)>,
}

/// Variable layout of the charging-and-speed model of a single route.
///
/// Built in two stages: [`ScheduleModel::new`] creates every variable (with its bounds) and hands the variable
/// container back so the caller can attach the objective and a backend; the model keeps the handles to emit
/// constraints and to read a solution back.
pub(super) struct ScheduleModel<'a> {
    data: &'a EvrpInstance,
    legs: Vec<Leg>,
    visits: Vec<VisitVars>,
    traversals: Vec<LegVars>,
}

impl<'a> ScheduleModel<'a> {
    #[instrument(level="trace", skip(legs, data))]
    pub fn new(route: &[Loc], legs: Vec<Leg>, data: &'a EvrpInstance) -> (ProblemVariables, ScheduleModel<'a>) {
        debug_assert_eq!(legs.len() + 1, route.len());
        let params = &data.params;
        let (soc_lb, soc_ub) = (params.min_soc(), params.capacity);
        let mut vars = ProblemVariables::new();

        let visits: Vec<_> = route.iter().map(|&loc| {
            let options = data.charging_options(loc);
            let phi_ub = options.iter()
                .map(|o| o.rate)
                .min_by(|a, b| a.total_cmp(b))
                .map(|r| params.capacity / r)
                .unwrap_or(0.0);

            let t = vars.add(variable().min(0.0));
            let depart = vars.add(variable().min(0.0));
            let ya = vars.add(variable().min(soc_lb).max(soc_ub));
            let yd = vars.add(variable().min(soc_lb).max(soc_ub));
            let phi = vars.add(variable().min(0.0).max(phi_ub));

            let w0 = if options.is_empty() { None } else { Some(vars.add(variable().binary())) };
            let options = options.into_iter().map(|option| {
                let w = vars.add(variable().binary());
                let used = BigMProduct::new(&mut vars, phi, w, phi_ub);
                OptionVars { option, w, used }
            }).collect();

            VisitVars { loc, t, depart, ya, yd, phi, phi_ub, w0, options }
        }).collect();

        let traversals = legs.iter().map(|leg| {
            let s = vars.add(variable().min(leg.min_s).max(leg.max_s));
            let wireless = if leg.wireless {
                let z = vars.add(variable().binary());
                Some((z, BigMProduct::new(&mut vars, s, z, leg.max_s)))
            } else {
                None
            };
            LegVars { s, wireless }
        }).collect();

        trace!(visits = visits.len(), "variables created");
        (vars, ScheduleModel { data, legs, visits, traversals })
    }

    pub fn objective(&self) -> Expression {
        let params = &self.data.params;
        let mut obj = Expression::from(0.0);
        for v in &self.visits {
            for o in &v.options {
                obj = obj + (o.option.cost * o.option.rate) * o.used.value;
            }
        }
        for (leg, lv) in self.legs.iter().zip(&self.traversals) {
            if let Some((_, ws)) = &lv.wireless {
                obj = obj + (params.wireless_cost * leg.beta) * ws.value;
            }
        }
        if let Some(last) = self.visits.last() {
            obj = obj + params.time_cost * last.t;
        }
        obj
    }

    pub fn constraints(&self) -> Vec<Constraint> {
        let params = &self.data.params;
        let mut cons = Vec::with_capacity(8 * self.visits.len() + 6 * self.traversals.len());

        if let Some(first) = self.visits.first() {
            cons.push(constraint!(first.t == 0.0));
            cons.push(constraint!(first.ya == params.initial_soc));
        }

        for v in &self.visits {
            match v.w0 {
                None => {
                    cons.push(constraint!(v.phi == 0.0));
                    cons.push(constraint!(v.yd == v.ya));
                    let service = self.data.nodes[v.loc].service_time;
                    let ready = Expression::from(v.t) + service;
                    cons.push(constraint!(v.depart == ready));
                }
                Some(w0) => {
                    let mut selected = Expression::from(w0);
                    let mut gained = Expression::from(v.ya);
                    for o in &v.options {
                        cons.extend(o.used.constraints());
                        selected = selected + o.w;
                        gained = gained + o.option.rate * o.used.value;
                    }
                    cons.push(constraint!(selected == 1.0));
                    // no-charge selected means no dwell time either
                    let dwell_ub = Expression::from(v.phi_ub) - v.phi_ub * w0;
                    cons.push(constraint!(v.phi <= dwell_ub));
                    cons.push(constraint!(v.yd == gained));
                    let ready = Expression::from(v.t) + v.phi;
                    cons.push(constraint!(v.depart == ready));
                }
            }
        }

        for (k, (leg, lv)) in self.legs.iter().zip(&self.traversals).enumerate() {
            let (prev, next) = (&self.visits[k], &self.visits[k + 1]);
            let earliest = Expression::from(prev.depart) + lv.s;
            cons.push(constraint!(next.t >= earliest));

            let mut soc = Expression::from(prev.yd) - leg.consumption(params);
            if let Some((_, ws)) = &lv.wireless {
                cons.extend(ws.constraints());
                soc = soc + leg.beta * ws.value;
            }
            cons.push(constraint!(next.ya == soc));
        }

        cons
    }

    /// The equality fixing the charging duration at a route position, or `None` if the position is not on the route.
    pub fn pin(&self, pin: &ChargePin) -> Option<Constraint> {
        let v = self.visits.get(pin.position)?;
        Some(constraint!(v.phi == pin.duration))
    }

    pub fn extract(&self, sol: &impl Solution) -> Schedule {
        let params = &self.data.params;
        let mut cost = 0.0;

        let visits = self.visits.iter().map(|v| {
            let mut option = None;
            for o in &v.options {
                cost += o.option.cost * o.option.rate * sol.value(o.used.value);
                if sol.value(o.w) > 0.5 {
                    option = Some(o.option);
                }
            }
            Visit {
                loc: v.loc,
                arrival: sol.value(v.t),
                departure: sol.value(v.depart),
                soc_arrival: sol.value(v.ya),
                soc_departure: sol.value(v.yd),
                charge_time: sol.value(v.phi),
                option,
            }
        }).collect::<Vec<_>>();

        let legs = self.legs.iter().zip(&self.traversals).map(|(leg, lv)| {
            let (wireless, wireless_time) = match &lv.wireless {
                Some((z, ws)) => (sol.value(*z) > 0.5, sol.value(ws.value)),
                None => (false, 0.0),
            };
            cost += params.wireless_cost * leg.beta * wireless_time;
            Traversal {
                from: leg.from,
                to: leg.to,
                time: sol.value(lv.s),
                wireless,
                wireless_time,
                energy_credit: leg.beta * wireless_time,
            }
        }).collect();

        if let Some(last) = visits.last() {
            cost += params.time_cost * last.arrival;
        }
        Schedule { cost, visits, legs }
    }
}
