use std::path::Path;
use anyhow::Result;
use instances::dataset::{evrp as dset, Dataset, IdxNameMap};

pub mod evrp;

pub fn get_instance_by_name(name : &str) -> Result<evrp::EvrpInstance> {
  get_instance_by_index(dset::dataset()?.name_to_index(name)?)
}


pub fn get_instance_by_index(idx : usize) -> Result<evrp::EvrpInstance> {
    dset::dataset()?.load_instance(idx)
}

/// Loads an instance directory directly, without going through `DATA_ROOT`.
pub fn load_instance_dir(path: impl AsRef<Path>) -> Result<evrp::EvrpInstance> {
    dset::load_dir(path)
}
