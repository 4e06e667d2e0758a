use std::fmt;
use itertools::Itertools;
use tracing::*;

use crate::data::evrp::*;

/// The part of an arc a route actually uses, with traversal time bounds derived from the speed range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub from: Loc,
    pub to: Loc,
    pub distance: f64,
    pub wireless: bool,
    pub beta: f64,
    /// Fastest traversal, `distance / U_max`
    pub min_s: Time,
    /// Slowest traversal, `distance / U_min`
    pub max_s: Time,
}

impl Leg {
    pub fn new(arc: &Arc) -> Leg {
        Leg {
            from: arc.from,
            to: arc.to,
            distance: arc.distance,
            wireless: arc.wireless,
            beta: if arc.wireless { arc.beta } else { 0.0 },
            min_s: arc.distance / arc.speed_max,
            max_s: arc.distance / arc.speed_min,
        }
    }

    #[inline]
    pub fn consumption(&self, params: &Params) -> Energy {
        params.consumption * self.distance
    }

    /// Most energy wireless charging can deliver on this leg: full transfer at the slowest speed.
    #[inline]
    pub fn max_credit(&self) -> Energy {
        self.beta * self.max_s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    Empty,
    UnknownNode(Loc),
    MissingArc { from: Loc, to: Loc },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Empty => write!(f, "empty route"),
            RouteError::UnknownNode(i) => write!(f, "unknown node {}", i),
            RouteError::MissingArc { from, to } => write!(f, "no arc {} -> {}", from, to),
        }
    }
}

impl std::error::Error for RouteError {}

/// Looks up the arc behind every consecutive pair of `route`.  Fails on the first pair without an arc.
#[instrument(level="trace", skip(data))]
pub fn legs(route: &[Loc], data: &EvrpInstance) -> Result<Vec<Leg>, RouteError> {
    if route.is_empty() {
        return Err(RouteError::Empty);
    }
    if let Some(&i) = route.iter().find(|&&i| i >= data.nodes.len()) {
        trace!(i, "unknown node");
        return Err(RouteError::UnknownNode(i));
    }

    let mut legs = Vec::with_capacity(route.len() - 1);
    for (&i, &j) in route.iter().tuple_windows() {
        match data.arcs.get(&(i, j)) {
            None => {
                trace!(i, j, "no physical arc");
                return Err(RouteError::MissingArc { from: i, to: j });
            },
            Some(arc) => legs.push(Leg::new(arc)),
        }
    }
    return Ok(legs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn line() -> EvrpInstance {
        let mut data = instance(vec![
            node(0, NodeKind::Depot, 0.0, 0.0),
            node(1, NodeKind::Customer, 10.0, 0.0),
            node(2, NodeKind::Customer, 10.0, 6.0),
        ], Params::new(50.0, 0.2, 2.0, 0.15, 0.1));
        data.set_wireless(1, 2, 0.5, 1.0, 3.0).unwrap();
        data
    }

    #[test]
    fn fixed_time_on_plain_arcs() {
        let data = line();
        let legs = legs(&[0, 1], &data).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].min_s, 5.0);
        assert_eq!(legs[0].max_s, 5.0);
        assert_eq!(legs[0].max_credit(), 0.0);
        assert_close(legs[0].consumption(&data.params), 2.0);
    }

    #[test]
    fn wireless_time_window() {
        let data = line();
        let legs = legs(&[0, 1, 2, 1], &data).unwrap();
        assert_eq!(legs.len(), 3);
        let w = legs[1];
        assert!(w.wireless);
        assert_eq!(w.min_s, 2.0);
        assert_eq!(w.max_s, 6.0);
        assert_eq!(w.max_credit(), 3.0);
        assert_eq!(legs[2], Leg { from: 2, to: 1, ..w });
    }

    #[test]
    fn missing_arc() {
        let mut data = line();
        data.arcs.remove(&(1, 2));
        assert_eq!(legs(&[0, 1, 2], &data), Err(RouteError::MissingArc { from: 1, to: 2 }));
        assert_eq!(legs(&[0, 0], &data), Err(RouteError::MissingArc { from: 0, to: 0 }));
    }

    #[test]
    fn unknown_and_empty() {
        let data = line();
        assert_eq!(legs(&[0, 7], &data), Err(RouteError::UnknownNode(7)));
        assert_eq!(legs(&[], &data), Err(RouteError::Empty));
        assert_eq!(legs(&[1], &data), Ok(vec![]));
    }
}
