//! Minimum-cost charging and speed schedule of a fixed route.
//!
//! For a visiting sequence the model decides how long to charge at every stop and with which tariff, how long
//! to spend on every leg, and on which wireless legs to draw power.  Time and state-of-charge propagate along
//! the route; both must stay within their bounds at every visit, so a route either has an optimal schedule or
//! is reported infeasible.
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use good_lp::{ResolutionError, SolverModel};
use good_lp::solvers::{microlp::microlp, Solver};
use rayon::prelude::*;
use tracing::*;

use crate::data::evrp::*;
use crate::route::{self, RouteError};

mod linearize;
mod model;

use model::ScheduleModel;

#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub loc: Loc,
    pub arrival: Time,
    pub departure: Time,
    pub soc_arrival: Energy,
    pub soc_departure: Energy,
    pub charge_time: Time,
    /// Tariff used for stationary charging, `None` if the vehicle does not charge here.
    pub option: Option<ChargingOption>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub from: Loc,
    pub to: Loc,
    pub time: Time,
    /// Whether wireless power is drawn on this leg.
    pub wireless: bool,
    pub wireless_time: Time,
    pub energy_credit: Energy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub cost: Cost,
    pub visits: Vec<Visit>,
    pub legs: Vec<Traversal>,
}

impl Schedule {
    #[inline]
    pub fn route(&self) -> Vec<Loc> {
        self.visits.iter().map(|v| v.loc).collect()
    }

    #[inline]
    pub fn duration(&self) -> Time {
        self.visits.last().map(|v| v.arrival).unwrap_or(0.0)
    }
}

/// Fixes the stationary charging duration at a route position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargePin {
    pub position: usize,
    pub duration: Time,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Infeasibility {
    /// Malformed route, detected before any model is built.
    Route(RouteError),
    /// A pin refers to a position past the end of the route.
    InvalidPin(usize),
    /// The backend proved the model infeasible.
    Model,
    /// The backend failed, reported an unbounded model or panicked.
    Solver(String),
}

impl fmt::Display for Infeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Infeasibility::Route(e) => write!(f, "invalid route: {}", e),
            Infeasibility::InvalidPin(p) => write!(f, "charge pin at position {} is off the route", p),
            Infeasibility::Model => f.write_str("no feasible schedule"),
            Infeasibility::Solver(msg) => write!(f, "solver fault: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Feasible(Schedule),
    Infeasible(Infeasibility),
}

impl Evaluation {
    #[inline]
    pub fn is_feasible(&self) -> bool {
        matches!(self, Evaluation::Feasible(_))
    }

    pub fn cost(&self) -> Option<Cost> {
        self.schedule().map(|s| s.cost)
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        match self {
            Evaluation::Feasible(s) => Some(s),
            Evaluation::Infeasible(_) => None,
        }
    }
}

impl From<Infeasibility> for Evaluation {
    fn from(reason: Infeasibility) -> Self { Evaluation::Infeasible(reason) }
}

/// Evaluates `route` with the default MILP backend.
pub fn evaluate(route: &[Loc], data: &EvrpInstance) -> Evaluation {
    evaluate_with(route, data, &[], microlp)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Evaluates `route` with charging durations fixed by `pins`, using any `good_lp` backend.
///
/// Never fails: malformed routes, infeasible models and backend faults all come back as
/// [`Evaluation::Infeasible`].  Backend faults (including panics) are logged at `warn`.
#[instrument(level="debug", skip(data, solver), fields(instance=%data.id))]
pub fn evaluate_with<S>(route: &[Loc], data: &EvrpInstance, pins: &[ChargePin], solver: S) -> Evaluation
where
    S: Solver,
    S::Model: SolverModel<Error=ResolutionError>,
{
    let legs = match route::legs(route, data) {
        Ok(legs) => legs,
        Err(e) => {
            debug!(%e, "route rejected");
            return Infeasibility::Route(e).into();
        }
    };

    let (vars, model) = ScheduleModel::new(route, legs, data);
    let mut constraints = model.constraints();
    for pin in pins {
        match model.pin(pin) {
            Some(c) => constraints.push(c),
            None => return Infeasibility::InvalidPin(pin.position).into(),
        }
    }
    let problem = vars.minimise(model.objective());

    let result = catch_unwind(AssertUnwindSafe(move || {
        constraints.into_iter()
            .fold(problem.using(solver), |p, c| p.with(c))
            .solve()
            .map(|sol| model.extract(&sol))
    }));

    match result {
        Ok(Ok(schedule)) => {
            debug!(cost=schedule.cost, "feasible");
            Evaluation::Feasible(schedule)
        }
        Ok(Err(ResolutionError::Infeasible)) => {
            debug!("infeasible");
            Infeasibility::Model.into()
        }
        Ok(Err(e)) => {
            warn!(%e, ?route, "solver error");
            Infeasibility::Solver(e.to_string()).into()
        }
        Err(payload) => {
            let msg = panic_message(payload);
            warn!(%msg, ?route, "solver panicked");
            Infeasibility::Solver(msg).into()
        }
    }
}

/// Evaluates every route in parallel on the current rayon pool.  Results are in input order.
pub fn evaluate_many<R>(routes: &[R], data: &EvrpInstance) -> Vec<Evaluation>
where
    R: AsRef<[Loc]> + Sync,
{
    evaluate_many_with(routes, data, microlp)
}

/// [`evaluate_many`] with a given backend; each route gets its own copy of `solver`.
pub fn evaluate_many_with<R, S>(routes: &[R], data: &EvrpInstance, solver: S) -> Vec<Evaluation>
where
    R: AsRef<[Loc]> + Sync,
    S: Solver + Clone + Sync,
    S::Model: SolverModel<Error=ResolutionError>,
{
    routes.par_iter().map(|r| evaluate_with(r.as_ref(), data, &[], solver.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use good_lp::solvers::microlp::MicroLpProblem;
    use good_lp::variable::UnsolvedProblem;
    use crate::{init_test_logging, Map};
    use crate::test_utils::*;
    use crate::data::tests::fixture;

    /// depot (0,0), customer (10,0)
    fn single_arc() -> EvrpInstance {
        instance(vec![
            node(0, NodeKind::Depot, 0.0, 0.0),
            node(1, NodeKind::Customer, 10.0, 0.0),
        ], Params::new(50.0, 0.2, 1.0, 0.15, 0.1))
    }

    /// depot (0,0), station (40,0), customer (80,0): the customer is only reachable after charging.
    fn needs_station() -> EvrpInstance {
        let mut data = instance(vec![
            node(0, NodeKind::Depot, 0.0, 0.0),
            node(1, NodeKind::ChargingStation, 40.0, 0.0),
            node(2, NodeKind::Customer, 80.0, 0.0),
        ], Params::new(50.0, 1.0, 10.0, 0.15, 0.1));
        offer(&mut data, 1, 1, 10.0, 0.5);
        offer(&mut data, 1, 2, 20.0, 0.6);
        data
    }

    fn arc(from: Loc, to: Loc, distance: f64, beta: Option<f64>, speed_min: f64, speed_max: f64) -> Arc {
        Arc {
            from,
            to,
            distance,
            travel_time: distance / speed_max,
            wireless: beta.is_some(),
            beta: beta.unwrap_or(0.0),
            speed_min,
            speed_max,
        }
    }

    /// Three nodes, round trip 0 -> 1 -> 2 -> 0 with speed ranges on every leg and a wireless middle leg.
    fn three_node() -> EvrpInstance {
        let mut params = Params::new(50.0, 0.2, 10.0, 0.15, 0.1);
        params.min_soc_frac = 0.0;
        let mut data = instance(vec![
            node(0, NodeKind::Depot, 0.0, 0.0),
            node(1, NodeKind::Customer, 10.0, 0.0),
            node(2, NodeKind::Customer, 5.0, 0.0),
        ], params);
        let arcs = vec![
            arc(0, 1, 10.0, None, 5.0, 10.0),
            arc(1, 2, 15.0, Some(2.0), 4.0, 8.0),
            arc(2, 0, 5.0, None, 6.0, 12.0),
        ];
        data.arcs = arcs.into_iter().map(|a| ((a.from, a.to), a)).collect::<Map<_, _>>();
        offer(&mut data, 0, 1, 10.0, 0.1);
        offer(&mut data, 2, 1, 5.0, 0.2);
        data
    }

    #[test]
    fn single_arc_cost_is_travel_time() {
        let _g = init_test_logging(LOGFILE);
        let data = single_arc();
        let eval = evaluate(&[0, 1], &data);
        let s = eval.schedule().unwrap();
        assert_close(s.cost, 1.0);
        assert_close(s.visits[1].arrival, 10.0);
        assert_close(s.visits[1].soc_arrival, 48.0);
        assert_eq!(s.route(), vec![0, 1]);
    }

    #[test]
    fn missing_arc_skips_solver() {
        let mut data = single_arc();
        data.arcs.remove(&(0, 1));
        let calls = Cell::new(0);
        let eval = evaluate_with(&[0, 1], &data, &[], |p: UnsolvedProblem| {
            calls.set(calls.get() + 1);
            microlp(p)
        });
        assert_eq!(eval, Evaluation::Infeasible(Infeasibility::Route(RouteError::MissingArc { from: 0, to: 1 })));
        assert_eq!(calls.get(), 0);
        assert_eq!(eval.cost(), None);
    }

    #[test]
    fn clock_not_capped_by_big_m() {
        let mut data = single_arc();
        data.params.big_m = 5.0;
        let s = evaluate(&[0, 1], &data).schedule().cloned().unwrap();
        assert_close(s.duration(), 10.0);
        assert_close(s.cost, 1.0);
    }

    #[test]
    fn solver_panic_is_infeasible() {
        let data = single_arc();
        let eval = evaluate_with(&[0, 1], &data, &[], |_: UnsolvedProblem| -> MicroLpProblem { panic!("boom") });
        assert_eq!(eval, Evaluation::Infeasible(Infeasibility::Solver("boom".to_string())));
        if let Evaluation::Infeasible(reason) = &eval {
            assert_eq!(reason.to_string(), "solver fault: boom");
        }
    }

    #[test]
    fn one_faulting_route_keeps_batch() {
        let data = needs_station();
        let tripped = AtomicBool::new(false);
        let tripped = &tripped;
        let solver = move |p: UnsolvedProblem| -> MicroLpProblem {
            if !tripped.swap(true, Ordering::SeqCst) {
                panic!("boom");
            }
            microlp(p)
        };
        let routes = vec![vec![0, 1, 2]; 4];
        let evals = evaluate_many_with(&routes, &data, solver);
        assert_eq!(evals.len(), 4);
        let faults = evals.iter()
            .filter(|e| **e == Evaluation::Infeasible(Infeasibility::Solver("boom".to_string())))
            .count();
        assert_eq!(faults, 1);
        assert_eq!(evals.iter().filter(|e| e.is_feasible()).count(), 3);
    }

    #[test]
    fn charge_pins() {
        let data = instance(vec![
            node(0, NodeKind::Depot, 0.0, 0.0),
            node(1, NodeKind::ChargingStation, 10.0, 0.0),
            node(2, NodeKind::Customer, 20.0, 0.0),
        ], Params::new(50.0, 0.2, 1.0, 0.15, 0.1));
        let route = [0, 1, 2];
        let pin = |duration| [ChargePin { position: 1, duration }];

        assert_eq!(evaluate_with(&route, &data, &pin(5.0), microlp), Evaluation::Infeasible(Infeasibility::Model));
        assert!(evaluate_with(&route, &data, &pin(0.0), microlp).is_feasible());
        let off_route = [ChargePin { position: 3, duration: 0.0 }];
        assert_eq!(evaluate_with(&route, &data, &off_route, microlp), Evaluation::Infeasible(Infeasibility::InvalidPin(3)));
    }

    #[test]
    fn pinned_charging_is_paid_for() {
        let data = needs_station();
        let free = evaluate(&[0, 1, 2], &data).cost().unwrap();
        let pinned = evaluate_with(&[0, 1, 2], &data, &[ChargePin { position: 1, duration: 4.0 }], microlp);
        let s = pinned.schedule().unwrap();
        assert_close(s.visits[1].charge_time, 4.0);
        assert!(s.cost > free);
    }

    #[test]
    fn no_worse_than_never_charging() {
        let data = three_node();
        let route = [0, 1, 2, 0];
        let idle: Vec<_> = (0..route.len()).map(|position| ChargePin { position, duration: 0.0 }).collect();
        let idle_cost = evaluate_with(&route, &data, &idle, microlp).cost().unwrap();
        let cost = evaluate(&route, &data).cost().unwrap();
        assert!(cost <= idle_cost + 1e-9);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let data = needs_station();
        assert_eq!(evaluate(&[0, 1, 2], &data), evaluate(&[0, 1, 2], &data));
    }

    #[test]
    fn min_soc_monotone() {
        let mut data = instance(vec![
            node(0, NodeKind::Depot, 0.0, 0.0),
            node(1, NodeKind::Customer, 40.0, 0.0),
        ], Params::new(50.0, 1.0, 10.0, 0.15, 0.1));

        let mut last = 0.0;
        for &frac in &[0.0, 0.1, 0.15] {
            data.params.min_soc_frac = frac;
            let cost = evaluate(&[0, 1], &data).cost().unwrap();
            assert!(cost >= last - 1e-9);
            last = cost;
        }
        // arrival SOC is exactly 10
        data.params.min_soc_frac = 0.25;
        assert_eq!(evaluate(&[0, 1], &data), Evaluation::Infeasible(Infeasibility::Model));
    }

    #[test]
    fn soc_stays_in_bounds() {
        let data = needs_station();
        let s = evaluate(&[0, 1, 2], &data).schedule().cloned().unwrap();
        let (lb, ub) = (data.params.min_soc(), data.params.capacity);
        for v in &s.visits {
            assert!(v.soc_arrival >= lb - 1e-6 && v.soc_arrival <= ub + 1e-6, "{:?}", v);
            assert!(v.soc_departure >= lb - 1e-6 && v.soc_departure <= ub + 1e-6, "{:?}", v);
            assert!(v.departure >= v.arrival - 1e-6);
        }
    }

    #[test]
    fn station_charging() {
        let _g = init_test_logging(LOGFILE);
        let data = needs_station();
        assert_eq!(evaluate(&[0, 2], &data), Evaluation::Infeasible(Infeasibility::Model));

        let s = evaluate(&[0, 1, 2], &data).schedule().cloned().unwrap();
        // 35 energy units at rate 10 for 0.5 each, plus 11.5 time units at 0.1
        assert_close(s.cost, 18.65);
        let stop = &s.visits[1];
        assert_eq!(stop.option.map(|o| o.index), Some(1));
        assert_close(stop.charge_time, 3.5);
        assert_close(stop.soc_arrival, 10.0);
        assert_close(stop.soc_departure, 45.0);
        assert_close(stop.departure, 7.5);
        assert_close(s.duration(), 11.5);
        assert_eq!(s.visits[0].option, None);
    }

    #[test]
    fn wireless_required() {
        let mut data = instance(vec![
            node(0, NodeKind::Depot, 0.0, 0.0),
            node(1, NodeKind::Customer, 60.0, 0.0),
        ], Params::new(50.0, 1.0, 10.0, 0.15, 0.1));
        data.set_wireless(0, 1, 3.0, 5.0, 10.0).unwrap();

        let s = evaluate(&[0, 1], &data).schedule().cloned().unwrap();
        let leg = &s.legs[0];
        assert!(leg.wireless);
        assert_close(leg.time, 6.0);
        assert_close(leg.wireless_time, 6.0);
        assert_close(leg.energy_credit, 18.0);
        assert_close(s.visits[1].soc_arrival, 8.0);
        assert_close(s.cost, 3.3);
    }

    #[test]
    fn wireless_credit_bounded() {
        let data = three_node();
        let legs = route::legs(&[0, 1, 2, 0], &data).unwrap();
        let s = evaluate(&[0, 1, 2, 0], &data).schedule().cloned().unwrap();
        for (leg, t) in legs.iter().zip(&s.legs) {
            assert!(t.energy_credit <= leg.max_credit() + 1e-6);
            assert!(t.time >= leg.min_s - 1e-6 && t.time <= leg.max_s + 1e-6);
            if !leg.wireless {
                assert!(!t.wireless);
                assert_eq!(t.energy_credit, 0.0);
            }
        }
    }

    #[test]
    fn three_node_round_trip() {
        let data = three_node();
        let s = evaluate(&[0, 1, 2, 0], &data).schedule().cloned().unwrap();
        // fastest traversal everywhere, no charging
        assert_close(s.cost, 0.1 * (1.0 + 1.875 + 5.0 / 12.0));
        assert!(s.cost >= data.params.time_cost * s.legs.iter().map(|l| l.time).sum::<f64>() - 1e-6);
        assert!(s.visits.iter().all(|v| v.option.is_none()));
        assert!(!s.legs[1].wireless);
    }

    #[test]
    fn batch_keeps_order() {
        let data = needs_station();
        let routes = vec![vec![0, 1, 2], vec![0, 2], vec![0, 9]];
        let evals = evaluate_many(&routes, &data);
        assert_eq!(evals.len(), 3);
        assert!(evals[0].is_feasible());
        assert_eq!(evals[1], Evaluation::Infeasible(Infeasibility::Model));
        assert_eq!(evals[2], Evaluation::Infeasible(Infeasibility::Route(RouteError::UnknownNode(9))));
    }

    #[test]
    fn fixture_direct_route() {
        let data = fixture();
        let mut route = vec![data.o_depot];
        route.extend(&data.C);
        route.push(data.d_depot);
        let s = evaluate(&route, &data).schedule().cloned().unwrap();
        assert_eq!(s.visits.len(), route.len());
        assert_eq!(s.legs.len(), route.len() - 1);

        // plenty of energy and top speed is the reference speed: drive fast, never charge
        let legs = route::legs(&route, &data).unwrap();
        let drive: f64 = legs.iter().map(|l| l.min_s).sum();
        let service: f64 = data.C.iter().map(|&c| data.nodes[c].service_time).sum();
        assert_close(s.duration(), drive + service);
        assert_close(s.cost, data.params.time_cost * (drive + service));
        assert!(s.legs.iter().all(|l| !l.wireless));
    }
}
