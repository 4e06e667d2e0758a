use std::fmt;
use tracing::*;

use crate::data::evrp::*;
use crate::Set;

/// The route could not be completed; `partial` is the sequence built up to the node where the vehicle got stuck.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionFailed {
    pub partial: Vec<Loc>,
    pub at: Loc,
    pub soc: Energy,
}

impl fmt::Display for ConstructionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stranded at node {} with SOC {:.3} after {} stops", self.at, self.soc, self.partial.len())
    }
}

impl std::error::Error for ConstructionFailed {}

/// SOC left after driving `i -> j` starting with `soc`, assuming full wireless exposure (slowest speed) on
/// wireless arcs.  `None` if there is no arc or the battery would run flat.
fn soc_after(data: &EvrpInstance, i: Loc, j: Loc, soc: Energy) -> Option<Energy> {
    let arc = data.arc(i, j)?;
    let credit = if arc.wireless { arc.beta * arc.distance / arc.speed_min } else { 0.0 };
    let soc = soc - data.params.consumption * arc.distance + credit;
    if soc >= 0.0 {
        Some(soc.min(data.params.capacity))
    } else {
        None
    }
}

struct Builder<'a> {
    data: &'a EvrpInstance,
    route: Vec<Loc>,
    at: Loc,
    soc: Energy,
    /// Stations recharged at since the last customer; cleared whenever a customer is served.
    detour: Set<Loc>,
}

impl<'a> Builder<'a> {
    fn new(data: &'a EvrpInstance) -> Self {
        Builder {
            data,
            route: vec![data.o_depot],
            at: data.o_depot,
            soc: data.params.initial_soc,
            detour: Set::default(),
        }
    }

    /// Closest reachable candidate and the SOC on arrival there.  Ties go to the smaller node id.
    fn nearest(&self, candidates: impl Iterator<Item=Loc>) -> Option<(Loc, Energy)> {
        let data = self.data;
        candidates
            .filter_map(|j| soc_after(data, self.at, j, self.soc).map(|soc| (j, soc)))
            .min_by(|&(a, _), &(b, _)| {
                data.arcs[&(self.at, a)].distance.total_cmp(&data.arcs[&(self.at, b)].distance)
                    .then(a.cmp(&b))
            })
    }

    fn nearest_station(&self) -> Option<Loc> {
        let at = self.at;
        let candidates = self.data.F.iter().copied().filter(|f| *f != at && !self.detour.contains(f));
        self.nearest(candidates).map(|(f, _)| f)
    }

    fn move_to(&mut self, j: Loc, soc: Energy) {
        trace!(from=self.at, to=j, soc, "move");
        self.route.push(j);
        self.at = j;
        self.soc = soc;
    }

    fn serve(&mut self, c: Loc, soc: Energy) {
        self.detour.clear();
        self.move_to(c, soc);
    }

    fn recharge_at(&mut self, f: Loc) {
        let full = self.data.params.capacity;
        self.detour.insert(f);
        self.move_to(f, full);
    }

    fn fail(self) -> ConstructionFailed {
        debug!(at=self.at, soc=self.soc, route=?self.route, "construction failed");
        ConstructionFailed { partial: self.route, at: self.at, soc: self.soc }
    }
}

/// Greedy nearest-neighbour route from `o_depot` through every customer to `d_depot`.
///
/// Detours to the closest reachable charging station slot (recharged to capacity) whenever no unvisited customer
/// is reachable.  A station may be revisited later on, but not twice between two customers.  Charging time and
/// tariffs are ignored, so the route is a starting point only and is not guaranteed to pass
/// [`evaluate`](crate::evaluate).
#[instrument(level="debug", skip(data), fields(instance=%data.id))]
pub fn construct_initial_route(data: &EvrpInstance) -> Result<Vec<Loc>, ConstructionFailed> {
    let mut b = Builder::new(data);
    let mut unvisited: Set<Loc> = data.C.iter().copied().collect();

    while !unvisited.is_empty() {
        if let Some((c, soc)) = b.nearest(unvisited.iter().copied()) {
            unvisited.remove(&c);
            b.serve(c, soc);
            continue;
        }
        match b.nearest_station() {
            Some(f) => b.recharge_at(f),
            None => return Err(b.fail()),
        }
    }

    let d = data.d_depot;
    loop {
        if let Some((_, soc)) = b.nearest(std::iter::once(d)) {
            b.move_to(d, soc);
            return Ok(b.route);
        }
        match b.nearest_station() {
            Some(f) => b.recharge_at(f),
            None => return Err(b.fail()),
        }
    }
}
