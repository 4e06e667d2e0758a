pub use instances::dataset::evrp::{
  Arc,
  ChargingOption,
  Cost,
  Energy,
  EvrpInstance,
  Loc,
  Node,
  NodeKind,
  Params,
  Site,
  Time,
};

pub trait EvrpInstanceExt {
  fn is_customer(&self, i: Loc) -> bool;
  fn is_station(&self, i: Loc) -> bool;
  fn is_depot(&self, i: Loc) -> bool;
  /// Tariff list of the site `i` belongs to, including any explicit no-charge rows.
  fn options(&self, i: Loc) -> &[ChargingOption];
  /// Options that actually deliver energy.
  fn charging_options(&self, i: Loc) -> Vec<ChargingOption>;
  fn arc(&self, i: Loc, j: Loc) -> Option<&Arc>;
}

impl EvrpInstanceExt for EvrpInstance {
    #[inline]
    fn is_customer(&self, i: Loc) -> bool {
        return self.nodes[i].kind == NodeKind::Customer;
    }

    #[inline]
    fn is_station(&self, i: Loc) -> bool {
        return self.nodes[i].kind == NodeKind::ChargingStation;
    }

    #[inline]
    fn is_depot(&self, i: Loc) -> bool {
        return self.nodes[i].kind == NodeKind::Depot;
    }

    #[inline]
    fn options(&self, i: Loc) -> &[ChargingOption] {
        return &self.tariffs[self.nodes[i].site];
    }

    fn charging_options(&self, i: Loc) -> Vec<ChargingOption> {
        return self.options(i).iter().filter(|o| !o.is_no_charge()).copied().collect();
    }

    #[inline]
    fn arc(&self, i: Loc, j: Loc) -> Option<&Arc> {
        return self.arcs.get(&(i, j));
    }
}
