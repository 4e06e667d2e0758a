use std::fmt;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeKind {
  Depot,
  Customer,
  ChargingStation,
}

impl FromStr for NodeKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "d" | "depot" => Ok(NodeKind::Depot),
      "c" | "customer" => Ok(NodeKind::Customer),
      "f" | "s" | "station" | "charging_station" => Ok(NodeKind::ChargingStation),
      other => Err(format!("unknown node type: {}", other)),
    }
  }
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      NodeKind::Depot => "d",
      NodeKind::Customer => "c",
      NodeKind::ChargingStation => "f",
    };
    f.write_str(s)
  }
}

/// One row of `nodes.csv`: `StringID,Type,x,y,ServiceTime`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
  pub name: String,
  pub kind: NodeKind,
  pub x: f64,
  pub y: f64,
  pub service_time: f64,
}

/// One row of `wireless_arcs.csv`: `From,To,Beta[,UMin,UMax]`
#[derive(Debug, Clone, PartialEq)]
pub struct WirelessArcRecord {
  pub from: String,
  pub to: String,
  pub beta: f64,
  pub speed: Option<(f64, f64)>,
}

/// One row of `charging_options.csv`: `StationID,Option,Rate,Cost`
#[derive(Debug, Clone, PartialEq)]
pub struct OptionRecord {
  pub station: String,
  pub index: usize,
  pub rate: f64,
  pub cost: f64,
}

/// The data row of `params.csv`: `Q,h,v,cw,ct[,MinSOC,InitialSOC,M,Slots,UMin,UMax]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamsRecord {
  pub capacity: f64,
  pub consumption: f64,
  pub speed: f64,
  pub wireless_cost: f64,
  pub time_cost: f64,
  pub min_soc_frac: Option<f64>,
  pub initial_soc: Option<f64>,
  pub big_m: Option<f64>,
  pub slots: Option<usize>,
  pub speed_min: Option<f64>,
  pub speed_max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wcl {
  pub nodes: Vec<NodeRecord>,
  pub wireless_arcs: Vec<WirelessArcRecord>,
  pub charging_options: Vec<OptionRecord>,
  pub params: ParamsRecord,
}
