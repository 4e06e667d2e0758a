use super::*;
use crate::parsers::{ParseInstance, WclFmt};
use crate::raw::evrp::{Wcl, WirelessArcRecord};
use crate::Map;
use crate::raw::{
  metrics::{Euclidean, dist_matrix_pp},
  FromRaw
};
use anyhow::{bail, ensure};
use lazy_static::lazy_static;

pub use crate::raw::evrp::NodeKind;

pub type Loc = usize;
pub type Site = usize;
pub type Time = f64;
pub type Energy = f64;
pub type Cost = f64;

pub const DEFAULT_MIN_SOC_FRAC: f64 = 0.1;
pub const DEFAULT_BIG_M: f64 = 1e6;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
  pub id: Loc,
  pub name: String,
  pub kind: NodeKind,
  pub x: f64,
  pub y: f64,
  pub service_time: Time,
  /// Physical location owning the tariff list.  Slot copies of a station share it.
  pub site: Site,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
  pub from: Loc,
  pub to: Loc,
  pub distance: f64,
  /// Nominal travel time at the reference speed.
  pub travel_time: Time,
  pub wireless: bool,
  /// Energy gained per unit time while drawing wireless power.  Zero unless `wireless`.
  pub beta: f64,
  pub speed_min: f64,
  pub speed_max: f64,
}

impl Arc {
  pub fn new(from: Loc, to: Loc, distance: f64, speed: f64) -> Arc {
    Arc {
      from,
      to,
      distance,
      travel_time: distance / speed,
      wireless: false,
      beta: 0.0,
      speed_min: speed,
      speed_max: speed,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargingOption {
  pub site: Site,
  pub index: usize,
  pub rate: f64,
  pub cost: f64,
}

impl ChargingOption {
  /// Option 0 (or a zero rate) means "visit but do not charge".
  #[inline]
  pub fn is_no_charge(&self) -> bool {
    self.index == 0 || self.rate <= 0.0
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
  /// Battery capacity `Q`
  pub capacity: Energy,
  pub min_soc_frac: f64,
  /// Energy consumed per unit distance `h`
  pub consumption: f64,
  /// Reference speed `v`
  pub speed: f64,
  pub wireless_cost: Cost,
  pub time_cost: Cost,
  pub initial_soc: Energy,
  /// Big-M constant from the data.  The schedule model derives a local bound for every product instead.
  pub big_m: f64,
}

impl Params {
  pub fn new(capacity: Energy, consumption: f64, speed: f64, wireless_cost: Cost, time_cost: Cost) -> Params {
    Params {
      capacity,
      min_soc_frac: DEFAULT_MIN_SOC_FRAC,
      consumption,
      speed,
      wireless_cost,
      time_cost,
      initial_soc: capacity,
      big_m: DEFAULT_BIG_M,
    }
  }

  #[inline]
  pub fn min_soc(&self) -> Energy {
    self.min_soc_frac * self.capacity
  }

  pub fn validate(&self) -> Result<()> {
    let values = [
      ("Q", self.capacity),
      ("h", self.consumption),
      ("v", self.speed),
      ("cw", self.wireless_cost),
      ("ct", self.time_cost),
      ("MinSOC", self.min_soc_frac),
      ("InitialSOC", self.initial_soc),
      ("M", self.big_m),
    ];
    for &(name, x) in &values {
      ensure!(x.is_finite(), "parameter {} is not a finite number: {}", name, x);
    }
    ensure!(self.capacity > 0.0, "battery capacity must be positive");
    ensure!(self.speed > 0.0, "reference speed must be positive");
    ensure!(self.consumption >= 0.0, "consumption rate must not be negative");
    ensure!(self.wireless_cost >= 0.0 && self.time_cost >= 0.0, "cost coefficients must not be negative");
    ensure!((0.0..=1.0).contains(&self.min_soc_frac), "minimum SOC fraction {} outside [0, 1]", self.min_soc_frac);
    ensure!(
      0.0 <= self.initial_soc && self.initial_soc <= self.capacity,
      "initial SOC {} outside [0, {}]", self.initial_soc, self.capacity
    );
    Ok(())
  }
}


#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq)]
pub struct EvrpInstance {
  pub id: String,
  pub nodes: Vec<Node>,
  pub arcs: Map<(Loc, Loc), Arc>,
  /// Charging options, indexed by site.
  pub tariffs: Vec<Vec<ChargingOption>>,
  pub params: Params,
  /// Customers
  pub C: Vec<Loc>,
  /// Charging station slots
  pub F: Vec<Loc>,
  pub o_depot: Loc,
  pub d_depot: Loc,
}

impl EvrpInstance {
  /// Assembles an instance over `nodes` (ids must equal their positions) with the complete Euclidean arc set
  /// at the reference speed.  The first depot node is the start depot, the last one the end depot.
  pub fn new(id: impl Into<String>, nodes: Vec<Node>, tariffs: Vec<Vec<ChargingOption>>, params: Params) -> Result<EvrpInstance> {
    for (k, n) in nodes.iter().enumerate() {
      ensure!(n.id == k, "node {} stored at position {}", n.id, k);
      ensure!(n.site < tariffs.len(), "node {} refers to unknown site {}", n.name, n.site);
      ensure!(
        n.x.is_finite() && n.y.is_finite() && n.service_time.is_finite() && n.service_time >= 0.0,
        "node {} has invalid coordinates or service time", n.name
      );
    }
    params.validate()?;

    let depots: Vec<Loc> = nodes.iter().filter(|n| n.kind == NodeKind::Depot).map(|n| n.id).collect();
    let (o_depot, d_depot) = match (depots.first(), depots.last()) {
      (Some(&o), Some(&d)) => (o, d),
      _ => bail!("instance has no depot"),
    };

    let coords: Vec<_> = nodes.iter().map(|n| (n.x, n.y)).collect();
    let speed = params.speed;
    let arcs = dist_matrix_pp(Euclidean(), &coords, |i, j, d| Arc::new(i, j, d, speed));

    let by_kind = |kind: NodeKind| nodes.iter().filter(|n| n.kind == kind).map(|n| n.id).collect::<Vec<_>>();
    let C = by_kind(NodeKind::Customer);
    let F = by_kind(NodeKind::ChargingStation);

    Ok(EvrpInstance {
      id: id.into(),
      nodes,
      arcs,
      tariffs,
      params,
      C,
      F,
      o_depot,
      d_depot,
    })
  }

  /// Marks every arc between the two sites as wireless, in both directions.
  pub fn set_wireless(&mut self, site_a: Site, site_b: Site, beta: f64, speed_min: f64, speed_max: f64) -> Result<usize> {
    ensure!(beta.is_finite() && beta >= 0.0, "invalid wireless charging rate {}", beta);
    ensure!(
      0.0 < speed_min && speed_min <= speed_max && speed_max.is_finite(),
      "invalid speed range [{}, {}]", speed_min, speed_max
    );
    let mut marked = 0;
    for arc in self.arcs.values_mut() {
      let (s, t) = (self.nodes[arc.from].site, self.nodes[arc.to].site);
      if (s, t) == (site_a, site_b) || (s, t) == (site_b, site_a) {
        arc.wireless = true;
        arc.beta = beta;
        arc.speed_min = speed_min;
        arc.speed_max = speed_max;
        marked += 1;
      }
    }
    Ok(marked)
  }

  pub fn node_by_name(&self, name: &str) -> Option<&Node> {
    self.nodes.iter().find(|n| n.name == name)
  }
}


impl FromRaw<Wcl> for EvrpInstance {
  fn from_raw(raw: Wcl, id: Cow<str>) -> Result<EvrpInstance> {
    let p = &raw.params;
    let slots = p.slots.unwrap_or(1).max(1);
    let mut params = Params::new(p.capacity, p.consumption, p.speed, p.wireless_cost, p.time_cost);
    if let Some(f) = p.min_soc_frac { params.min_soc_frac = f; }
    if let Some(y) = p.initial_soc { params.initial_soc = y; }
    if let Some(m) = p.big_m { params.big_m = m; }
    let default_speeds = (p.speed_min.unwrap_or(p.speed), p.speed_max.unwrap_or(p.speed));

    // one site per row of the node file
    let site_of: Map<&str, Site> = raw.nodes.iter().enumerate().map(|(s, n)| (n.name.as_str(), s)).collect();
    ensure!(site_of.len() == raw.nodes.len(), "duplicate StringID in node file");
    let site = |name: &str| -> Result<Site> {
      match site_of.get(name) {
        Some(&s) => Ok(s),
        None => bail!("unknown StringID: {}", name),
      }
    };

    let depot = {
      let mut depots = raw.nodes.iter().enumerate().filter(|(_, n)| n.kind == NodeKind::Depot);
      match (depots.next(), depots.next()) {
        (Some(d), None) => d,
        (None, _) => bail!("node file has no depot"),
        (Some(_), Some(_)) => bail!("node file has more than one depot"),
      }
    };

    let mut nodes = Vec::with_capacity(slots * raw.nodes.len() + 1);
    let mut push = |name: String, s: Site| {
      let r = &raw.nodes[s];
      nodes.push(Node { id: nodes.len(), name, kind: r.kind, x: r.x, y: r.y, service_time: r.service_time, site: s });
    };
    push(depot.1.name.clone(), depot.0);
    for (s, r) in raw.nodes.iter().enumerate() {
      match r.kind {
        NodeKind::Depot => {},
        NodeKind::Customer => push(r.name.clone(), s),
        NodeKind::ChargingStation if slots == 1 => push(r.name.clone(), s),
        NodeKind::ChargingStation => {
          for k in 0..slots {
            push(format!("{}#{}", r.name, k), s);
          }
        }
      }
    }
    push(format!("{}'", depot.1.name), depot.0);

    let mut tariffs = vec![Vec::new(); raw.nodes.len()];
    for o in &raw.charging_options {
      let s = site(&o.station)?;
      ensure!(
        o.rate.is_finite() && o.cost.is_finite() && o.rate >= 0.0 && o.cost >= 0.0,
        "invalid rate or cost for option {} at {}", o.index, o.station
      );
      tariffs[s].push(ChargingOption { site: s, index: o.index, rate: o.rate, cost: o.cost });
    }

    let mut instance = EvrpInstance::new(id, nodes, tariffs, params)?;
    for WirelessArcRecord { from, to, beta, speed } in &raw.wireless_arcs {
      let (speed_min, speed_max) = speed.unwrap_or(default_speeds);
      instance.set_wireless(site(from)?, site(to)?, *beta, speed_min, speed_max)
        .with_context(|| format!("wireless arc {} -> {}", from, to))?;
    }
    Ok(instance)
  }
}


pub enum EvrpWcl {}

impl Dataset for StdLayout<EvrpWcl> {
  type Instance = EvrpInstance;

  fn load_instance(&self, idx: usize) -> Result<Self::Instance> {
    let instance = self.index_to_name(idx)?;
    let path = self.instance_dir(idx)?;
    load_dir(&path).map(|mut data| { data.id = instance.into_owned(); data })
  }
}

/// Loads a single instance directory; the instance id is the directory name.
pub fn load_dir(path: impl AsRef<Path>) -> Result<EvrpInstance> {
  let path = path.as_ref();
  let id = path.file_name().map(|s| s.to_string_lossy()).unwrap_or(Cow::Borrowed("unnamed"));
  let raw = Wcl::parse(WclFmt(path)).context(format!("failed to load {:?}", path))?;
  EvrpInstance::from_raw(raw, id).context(format!("invalid instance {:?}", path))
}

lazy_static!{
    static ref DSET: Result<StdLayout<EvrpWcl>> = StdLayout::new("EVRP_WCL");
}

/// The `EVRP_WCL` dataset under `DATA_ROOT`, opened on first use.
pub fn dataset() -> Result<&'static StdLayout<EvrpWcl>> {
  match &*DSET {
    Ok(dset) => Ok(dset),
    Err(e) => Err(anyhow::anyhow!("cannot open dataset EVRP_WCL: {:#}", e)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::raw::evrp::*;

  fn raw_instance() -> Wcl {
    let node = |name: &str, kind, x, y| NodeRecord { name: name.into(), kind, x, y, service_time: 0.0 };
    Wcl {
      nodes: vec![
        node("D0", NodeKind::Depot, 0.0, 0.0),
        node("S1", NodeKind::ChargingStation, 3.0, 4.0),
        node("C1", NodeKind::Customer, 6.0, 8.0),
      ],
      wireless_arcs: vec![WirelessArcRecord { from: "D0".into(), to: "C1".into(), beta: 0.5, speed: None }],
      charging_options: vec![
        OptionRecord { station: "S1".into(), index: 0, rate: 0.0, cost: 0.0 },
        OptionRecord { station: "S1".into(), index: 1, rate: 2.0, cost: 0.3 },
      ],
      params: ParamsRecord {
        capacity: 50.0,
        consumption: 0.2,
        speed: 2.0,
        wireless_cost: 0.15,
        time_cost: 0.1,
        slots: Some(3),
        speed_min: Some(1.0),
        ..Default::default()
      },
    }
  }

  #[test]
  fn slot_expansion_and_end_depot() -> Result<()> {
    let data = EvrpInstance::from_raw(raw_instance(), "t".into())?;
    // depot, 3 station slots, customer, end depot
    assert_eq!(data.nodes.len(), 6);
    assert_eq!(data.F, vec![1, 2, 3]);
    assert_eq!(data.C, vec![4]);
    assert_eq!((data.o_depot, data.d_depot), (0, 5));
    assert_eq!(data.nodes[2].name, "S1#1");
    assert_eq!(data.nodes[5].name, "D0'");
    assert_eq!((data.nodes[5].x, data.nodes[5].y), (0.0, 0.0));
    assert!(data.F.iter().all(|&f| data.nodes[f].site == data.nodes[1].site));
    assert_eq!(data.tariffs[data.nodes[1].site].len(), 2);
    Ok(())
  }

  #[test]
  fn complete_arc_set() -> Result<()> {
    let data = EvrpInstance::from_raw(raw_instance(), "t".into())?;
    let n = data.nodes.len();
    assert_eq!(data.arcs.len(), n * (n - 1));
    assert!(!data.arcs.contains_key(&(2, 2)));
    let a = data.arcs[&(0, 1)];
    assert_eq!(a.distance, 5.0);
    assert_eq!(a.travel_time, 2.5);
    assert!(!a.wireless);
    assert_eq!((a.speed_min, a.speed_max), (2.0, 2.0));
    // slot copies sit on the same spot
    assert_eq!(data.arcs[&(1, 2)].distance, 0.0);
    Ok(())
  }

  #[test]
  fn wireless_marked_both_ways() -> Result<()> {
    let data = EvrpInstance::from_raw(raw_instance(), "t".into())?;
    for &(i, j) in &[(0, 4), (4, 0), (5, 4), (4, 5)] {
      let a = data.arcs[&(i, j)];
      assert!(a.wireless, "{} -> {}", i, j);
      assert_eq!(a.beta, 0.5);
      assert_eq!((a.speed_min, a.speed_max), (1.0, 2.0));
    }
    assert!(!data.arcs[&(0, 1)].wireless);
    Ok(())
  }

  #[test]
  fn params_defaults() -> Result<()> {
    let data = EvrpInstance::from_raw(raw_instance(), "t".into())?;
    assert_eq!(data.params.initial_soc, 50.0);
    assert!((data.params.min_soc() - 5.0).abs() < 1e-12);
    assert_eq!(data.params.big_m, DEFAULT_BIG_M);
    Ok(())
  }

  #[test]
  fn unknown_station_id() {
    let mut raw = raw_instance();
    raw.charging_options.push(OptionRecord { station: "S9".into(), index: 1, rate: 1.0, cost: 1.0 });
    assert!(EvrpInstance::from_raw(raw, "t".into()).is_err());
  }

  #[test]
  fn unknown_wireless_endpoint() {
    let mut raw = raw_instance();
    raw.wireless_arcs[0].to = "C7".into();
    assert!(EvrpInstance::from_raw(raw, "t".into()).is_err());
  }

  #[test]
  fn bad_speed_range() {
    let mut raw = raw_instance();
    raw.wireless_arcs[0].speed = Some((3.0, 1.0));
    assert!(EvrpInstance::from_raw(raw, "t".into()).is_err());
  }

  #[test]
  fn rejects_bad_numbers() {
    let check = |f: fn(&mut Wcl)| {
      let mut raw = raw_instance();
      f(&mut raw);
      assert!(EvrpInstance::from_raw(raw, "t".into()).is_err());
    };
    check(|r| r.wireless_arcs[0].beta = -0.5);
    check(|r| r.wireless_arcs[0].beta = f64::NAN);
    check(|r| r.params.min_soc_frac = Some(1.5));
    check(|r| r.params.initial_soc = Some(60.0));
    check(|r| r.params.consumption = f64::NAN);
    check(|r| r.params.big_m = Some(f64::INFINITY));
    check(|r| r.params.capacity = 0.0);
    check(|r| r.nodes[2].x = f64::NAN);
    check(|r| r.charging_options[1].rate = f64::INFINITY);
  }

  #[test]
  fn needs_exactly_one_depot() {
    let mut raw = raw_instance();
    raw.nodes[2].kind = NodeKind::Depot;
    assert!(EvrpInstance::from_raw(raw.clone(), "t".into()).is_err());
    raw.nodes.remove(2);
    raw.nodes.remove(0);
    raw.wireless_arcs.clear();
    assert!(EvrpInstance::from_raw(raw, "t".into()).is_err());
  }

  #[test]
  fn missing_dataset_is_an_error() {
    assert!(StdLayout::<EvrpWcl>::new("not-a-dataset").is_err());
    if std::env::var_os("DATA_ROOT").is_none() {
      assert!(dataset().is_err());
    }
  }

  #[test]
  fn load_fixture() -> Result<()> {
    let dset: StdLayout<EvrpWcl> = StdLayout::at(fixture_dir())?;
    let data = dset.load_instance_by_name("c5-s2")?;
    assert_eq!(data.id, "c5-s2");
    assert_eq!(data.C.len(), 5);
    assert_eq!(data.F.len(), 4);
    assert_eq!(data.nodes.len(), 11);
    assert!(data.arcs.values().any(|a| a.wireless));
    Ok(())
  }
}
