use std::fmt::Display;
use std::str::FromStr;
use std::path::{Path, PathBuf};
use std::io;
use anyhow::{Context, Result};
use structopt::StructOpt;

use evsched::data::{get_instance_by_index, get_instance_by_name, load_instance_dir};
use evsched::data::evrp::{EvrpInstance, Loc};

#[derive(Clone, Debug, StructOpt)]
pub struct OutputOptions {
  #[structopt(long="format", short="f", parse(try_from_str), default_value="json-summ", possible_values=&OUTPUT_FORMAT_STRINGS)]
  pub fmt: OutputFormat,
  #[structopt(long="output", short="o")]
  pub file: Option<PathBuf>,
  #[structopt(long)]
  pub log: Option<PathBuf>,
}

pub fn clap_range_validator<T>(minval: Option<T>, maxval: Option<T>) -> impl Fn(String) -> Result<(), String>
    where
        T: FromStr + PartialOrd + Display + Copy,
        T::Err: Display
{
    return move |val| {
        let x: T = val.parse().map_err(|e: T::Err| e.to_string())?;
        if let Some(y) = minval {
            if x < y { return Err(format!("must be at least {}", y)); }
        }
        if let Some(y) = maxval {
            if x > y { return Err(format!("must be at most {}", y)); }
        }
        return Ok(());
    };
}

pub const OUTPUT_FORMAT_STRINGS: [&str; 2] = ["json", "json-summ"];

#[derive(Debug, Copy, Clone)]
pub enum OutputFormat {
    Json,
    JsonSummary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return match s {
            "json" => Ok(Self::Json),
            "json-summ" => Ok(Self::JsonSummary),
            _ => Err(format!("invalid string: {}", s))
        };
    }
}


impl Default for OutputFormat {
  fn default() -> Self { OutputFormat::JsonSummary }
}

/// An instance given on the command line: a directory path, a dataset index or a dataset name.
#[derive(Debug, Clone)]
pub enum InstanceArg {
    Dir(PathBuf),
    Index(usize),
    Name(String),
}

impl FromStr for InstanceArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty instance".to_string());
        }
        let path = Path::new(s);
        if path.is_dir() {
            return Ok(InstanceArg::Dir(path.to_path_buf()));
        }
        return Ok(s.parse().map(InstanceArg::Index).unwrap_or_else(|_| InstanceArg::Name(s.to_string())));
    }
}

impl InstanceArg {
    pub fn load(&self) -> Result<EvrpInstance> {
        match self {
            InstanceArg::Dir(p) => load_instance_dir(p),
            InstanceArg::Index(i) => get_instance_by_index(*i),
            InstanceArg::Name(n) => get_instance_by_name(n),
        }.with_context(|| format!("failed to load instance {:?}", self))
    }
}

/// Comma-separated node ids or node names, resolved against an instance.
#[derive(Debug, Clone)]
pub struct RouteArg(Vec<String>);

impl FromStr for RouteArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stops: Vec<String> = s.split(',').map(|t| t.trim().to_string()).collect();
        if stops.iter().any(|t| t.is_empty()) {
            return Err(format!("empty stop in route {:?}", s));
        }
        Ok(RouteArg(stops))
    }
}

impl RouteArg {
    pub fn resolve(&self, data: &EvrpInstance) -> Result<Vec<Loc>> {
        self.0.iter().map(|t| {
            match t.parse::<Loc>() {
                Ok(i) => Ok(i),
                Err(_) => data.node_by_name(t)
                    .map(|n| n.id)
                    .with_context(|| format!("no node named {}", t)),
            }
        }).collect()
    }
}

pub trait Report {
    fn write_json(&self, buf : impl io::Write) -> Result<()>;
    fn write_json_summary(&self, buf : impl io::Write) -> Result<()>;

    fn write(&self, buf : impl io::Write, output : OutputFormat) -> Result<()> {
        match output {
            OutputFormat::JsonSummary => self.write_json_summary(buf)?,
            OutputFormat::Json => self.write_json(buf)?,
        };
        Ok(())
    }
}

pub fn output_report(options: &OutputOptions, report: impl Report) -> Result<()> {
  match options.file.as_ref() {
      Some(path) => {
        let file = std::fs::File::create(path).with_context(|| format!("cannot create {:?}", path))?;
        report.write(std::io::BufWriter::new(file), options.fmt)?;
      }
      None => {
        report.write(std::io::stdout(), options.fmt)?;
      }
    }
  Ok(())
}
