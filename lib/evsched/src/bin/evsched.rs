use json::{self, JsonValue};
use rayon::ThreadPoolBuilder;
use std::io::Write;
use itertools::Itertools;
use anyhow::{Context, Result};
use tracing::*;

use evsched::*;
use evsched::data::evrp::*;
use evsched::schedule::{Visit, Traversal};

mod common;
use common::*;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
enum Command {
    /// Print the instance: nodes, tariffs, wireless arcs and parameters
    Info,
    /// Build the greedy initial route and schedule it
    Init,
    /// Schedule one or more routes, each a comma-separated list of node ids or names
    Eval {
        #[structopt(required = true, min_values = 1)]
        routes: Vec<RouteArg>,
    },
}

#[derive(Debug, StructOpt)]
struct ClArgs {
    /// Instance directory, or index or name in the EVRP_WCL dataset under $DATA_ROOT
    #[structopt(parse(try_from_str))]
    instance: InstanceArg,
    #[structopt(long, short="c", default_value="1", validator=clap_range_validator(Some(1), None))]
    cpus: usize,
    /// Override the minimum SOC, as a fraction of battery capacity
    #[structopt(long="min-soc", validator=clap_range_validator(Some(0.0), Some(1.0)))]
    min_soc: Option<f64>,
    #[structopt(flatten)]
    output: OutputOptions,
    #[structopt(subcommand)]
    command: Command,
}

struct InstanceInfo<'a>(&'a EvrpInstance);

fn params_record(p: &Params) -> JsonValue {
    json::object! {
        capacity: p.capacity,
        min_soc_frac: p.min_soc_frac,
        min_soc: p.min_soc(),
        consumption: p.consumption,
        speed: p.speed,
        wireless_cost: p.wireless_cost,
        time_cost: p.time_cost,
        initial_soc: p.initial_soc,
        big_m: p.big_m,
    }
}

impl<'a> Report for InstanceInfo<'a> {
    fn write_json(&self, mut buf: impl Write) -> Result<()> {
        let data = self.0;
        let nodes: JsonValue = data.nodes.iter()
            .map(|n| {
                let options: JsonValue = data.options(n.id).iter()
                    .map(|o| json::object! { index: o.index, rate: o.rate, cost: o.cost })
                    .collect_vec()
                    .into();
                json::object! {
                    id: n.id,
                    name: n.name.as_str(),
                    kind: n.kind.to_string(),
                    x: n.x,
                    y: n.y,
                    service_time: n.service_time,
                    options: options,
                }
            })
            .collect_vec()
            .into();
        let wireless: JsonValue = data.arcs.values()
            .filter(|a| a.wireless)
            .sorted_by_key(|a| (a.from, a.to))
            .map(|a| json::object! {
                from: a.from,
                to: a.to,
                distance: a.distance,
                beta: a.beta,
                speed_min: a.speed_min,
                speed_max: a.speed_max,
            })
            .collect_vec()
            .into();

        let root = json::object! {
            id: data.id.as_str(),
            o_depot: data.o_depot,
            d_depot: data.d_depot,
            nodes: nodes,
            wireless_arcs: wireless,
            params: params_record(&data.params),
        };
        root.write_pretty(&mut buf, 2)?;
        return Ok(())
    }

    fn write_json_summary(&self, mut buf: impl Write) -> Result<()> {
        let data = self.0;
        let root = json::object! {
            id: data.id.as_str(),
            customers: data.C.len(),
            station_slots: data.F.len(),
            nodes: data.nodes.len(),
            wireless_arcs: data.arcs.values().filter(|a| a.wireless).count(),
            params: params_record(&data.params),
        };
        root.write_pretty(&mut buf, 2)?;
        return Ok(())
    }
}

struct EvalReport {
    routes: Vec<Vec<Loc>>,
    evals: Vec<Evaluation>,
}

fn visit_record(v: &Visit) -> JsonValue {
    let option = match v.option {
        Some(o) => JsonValue::from(o.index),
        None => JsonValue::Null,
    };
    json::object! {
        loc: v.loc,
        arrival: v.arrival,
        departure: v.departure,
        soc_arrival: v.soc_arrival,
        soc_departure: v.soc_departure,
        charge_time: v.charge_time,
        option: option,
    }
}

fn traversal_record(t: &Traversal) -> JsonValue {
    json::object! {
        from: t.from,
        to: t.to,
        time: t.time,
        wireless: t.wireless,
        wireless_time: t.wireless_time,
        energy_credit: t.energy_credit,
    }
}

fn summary_record(route: &[Loc], eval: &Evaluation) -> JsonValue {
    let mut rec = json::object! {
        route: JsonValue::from(route.to_vec()),
        feasible: eval.is_feasible(),
    };
    match eval {
        Evaluation::Feasible(s) => {
            rec["cost"] = s.cost.into();
            rec["duration"] = s.duration().into();
        }
        Evaluation::Infeasible(reason) => {
            rec["reason"] = reason.to_string().into();
        }
    }
    rec
}

impl Report for EvalReport {
    fn write_json(&self, mut buf: impl Write) -> Result<()> {
        let root: JsonValue = self.routes.iter().zip(&self.evals)
            .map(|(route, eval)| {
                let mut rec = summary_record(route, eval);
                if let Some(s) = eval.schedule() {
                    rec["visits"] = s.visits.iter().map(visit_record).collect_vec().into();
                    rec["legs"] = s.legs.iter().map(traversal_record).collect_vec().into();
                }
                rec
            })
            .collect_vec()
            .into();
        root.write_pretty(&mut buf, 2)?;
        return Ok(())
    }

    fn write_json_summary(&self, mut buf: impl Write) -> Result<()> {
        let root: JsonValue = self.routes.iter().zip(&self.evals)
            .map(|(route, eval)| summary_record(route, eval))
            .collect_vec()
            .into();
        root.write_pretty(&mut buf, 2)?;
        return Ok(())
    }
}


fn main() -> Result<()> {
    let args : ClArgs = StructOpt::from_args();
    let _g = init_logging(args.output.log.clone())?;
    debug!(?args);
    ThreadPoolBuilder::new().num_threads(args.cpus).build_global().context("failed to construct thread pool")?;
    let mut data = args.instance.load()?;
    if let Some(frac) = args.min_soc {
        info!(old=data.params.min_soc_frac, new=frac, "min SOC override");
        data.params.min_soc_frac = frac;
    }
    let data = data;

    match &args.command {
        Command::Info => {
            output_report(&args.output, InstanceInfo(&data))?;
        },
        Command::Init => {
            let route = construct_initial_route(&data).context("initial route construction failed")?;
            info!(?route, "initial route");
            let eval = evaluate(&route, &data);
            output_report(&args.output, EvalReport { routes: vec![route], evals: vec![eval] })?;
        },
        Command::Eval { routes } => {
            let routes: Vec<Vec<Loc>> = routes.iter().map(|r| r.resolve(&data)).collect::<Result<_>>()?;
            let evals = evaluate_many(&routes, &data);
            info!(
                n = evals.len(),
                feasible = evals.iter().filter(|e| e.is_feasible()).count(),
                "evaluated"
            );
            output_report(&args.output, EvalReport { routes, evals })?;
        },
    }
    Ok(())
}
