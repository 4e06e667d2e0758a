use std::path::Path;
use anyhow::Context;
use crate::Result;
use crate::raw::evrp::*;
use super::{
  ParseInstance,
  nom_prelude::*,
};

pub const NODES_FILE: &str = "nodes.csv";
pub const WIRELESS_ARCS_FILE: &str = "wireless_arcs.csv";
pub const CHARGING_OPTIONS_FILE: &str = "charging_options.csv";
pub const PARAMS_FILE: &str = "params.csv";

/// An instance directory holding the four headered, comma-separated files.
#[derive(Debug, Copy, Clone)]
pub struct WclFmt<P>(pub P);

fn parse_file<'a, O>(
  path: &Path,
  data: &'a str,
  mut parser: impl FnMut(&'a str) -> IResult<&'a str, O, VerboseError<&'a str>>,
) -> Result<O> {
  match parser(data).finish() {
    Ok((_, value)) => Ok(value),
    Err(e) => Err(
      anyhow::Error::msg(error::convert_error(data, e))
        .context(format!("failed to parse {:?}", path))
    ),
  }
}

impl<P: AsRef<Path>> ParseInstance<WclFmt<P>> for Wcl {
  fn parse(input: WclFmt<P>) -> Result<Wcl> {
    let dir = input.0.as_ref();
    let read = |name: &str| {
      let path = dir.join(name);
      std::fs::read_to_string(&path)
        .with_context(|| format!("could not open file: {:?}", path))
        .map(|contents| (path, contents))
    };

    let (path, contents) = read(NODES_FILE)?;
    let nodes = parse_file(&path, &contents, parsers::nodes)?;

    let (path, contents) = read(WIRELESS_ARCS_FILE)?;
    let wireless_arcs = parse_file(&path, &contents, parsers::wireless_arcs)?;

    let (path, contents) = read(CHARGING_OPTIONS_FILE)?;
    let charging_options = parse_file(&path, &contents, parsers::charging_options)?;

    let (path, contents) = read(PARAMS_FILE)?;
    let params = parse_file(&path, &contents, parsers::params)?;

    Ok(Wcl { nodes, wireless_arcs, charging_options, params })
  }
}


pub(crate) mod parsers {
  use super::*;
  use crate::parsers::common::*;

  type Res<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

  fn next_number(i: &str) -> Res<f64> {
    preceded(sep, number)(i)
  }

  fn node(i: &str) -> Res<NodeRecord> {
    let (i, name) = context("StringID", cell)(i)?;
    let (i, kind) = context("Type", preceded(sep, map_res(cell, NodeKind::from_str)))(i)?;
    let (i, (x, y, service_time)) = context("x,y,ServiceTime", tuple((next_number, next_number, next_number)))(i)?;
    Ok((i, NodeRecord { name: name.to_string(), kind, x, y, service_time }))
  }

  pub fn nodes(i: &str) -> Res<Vec<NodeRecord>> {
    table(node)(i)
  }

  fn wireless_arc(i: &str) -> Res<WirelessArcRecord> {
    let (i, from) = context("From", cell)(i)?;
    let (i, to) = context("To", preceded(sep, cell))(i)?;
    let (i, beta) = context("Beta", next_number)(i)?;
    let (i, speed) = context("UMin,UMax", opt(pair(next_number, next_number)))(i)?;
    Ok((i, WirelessArcRecord { from: from.to_string(), to: to.to_string(), beta, speed }))
  }

  pub fn wireless_arcs(i: &str) -> Res<Vec<WirelessArcRecord>> {
    table(wireless_arc)(i)
  }

  fn charging_option(i: &str) -> Res<OptionRecord> {
    let (i, station) = context("StationID", cell)(i)?;
    let (i, index) = context("Option", preceded(sep, usize_))(i)?;
    let (i, (rate, cost)) = context("Rate,Cost", pair(next_number, next_number))(i)?;
    Ok((i, OptionRecord { station: station.to_string(), index, rate, cost }))
  }

  pub fn charging_options(i: &str) -> Res<Vec<OptionRecord>> {
    table(charging_option)(i)
  }

  fn params_row(i: &str) -> Res<ParamsRecord> {
    let (i, (capacity, consumption, speed, wireless_cost, time_cost)) = context(
      "Q,h,v,cw,ct",
      tuple((number, next_number, next_number, next_number, next_number)),
    )(i)?;
    let (i, (min_soc_frac, initial_soc, big_m)) = tuple((opt(next_number), opt(next_number), opt(next_number)))(i)?;
    let (i, slots) = opt(preceded(sep, usize_))(i)?;
    let (i, (speed_min, speed_max)) = tuple((opt(next_number), opt(next_number)))(i)?;
    Ok((i, ParamsRecord {
      capacity,
      consumption,
      speed,
      wireless_cost,
      time_cost,
      min_soc_frac,
      initial_soc,
      big_m,
      slots,
      speed_min,
      speed_max,
    }))
  }

  pub fn params(i: &str) -> Res<ParamsRecord> {
    context("exactly one params row", map(
      verify(table(params_row), |rows: &Vec<ParamsRecord>| rows.len() == 1),
      |mut rows| rows.remove(0),
    ))(i)
  }
}
