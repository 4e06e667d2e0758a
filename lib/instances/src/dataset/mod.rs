use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use crate::Error;
use std::borrow::Cow;


pub trait IdxNameMap {
  fn index_to_name(&self, idx: usize) -> Result<Cow<str>>;

  fn name_to_index(&self, name: &str) -> Result<usize>;

  fn len(&self) -> usize;

  fn check_idx(&self, idx: usize) -> Result<()> {
    if self.len() <= idx {
      Err(Error::IndexOutOfRange.into())
    } else {
      Ok(())
    }
  }
}


impl<'a, D: IdxNameMap> IdxNameMap for &'a D {
  fn index_to_name(&self, idx: usize) -> Result<Cow<str>> {
    D::index_to_name(self, idx)
  }

  fn name_to_index(&self, name: &str) -> Result<usize> {
    D::name_to_index(self, name)
  }

  fn len(&self) -> usize {
    D::len(self)
  }
}

pub trait Dataset: IdxNameMap + Sync {
  type Instance;
  fn load_instance(&self, idx: usize) -> Result<Self::Instance>;

  fn load_instance_by_name(&self, name: &str) -> Result<Self::Instance> {
    self.load_instance(self.name_to_index(name)?)
  }
}


impl<'a, D: Dataset> Dataset for &'a D {
  type Instance = D::Instance;

  fn load_instance(&self, idx: usize) -> Result<Self::Instance> {
    D::load_instance(self, idx)
  }
}


/// A Standard Layout Dataset: a directory containing one sub-directory per instance and an `INDEX.txt` index file.
/// The index file contains a new-line separated list of instance names, which acts as a map from index -> name.
pub struct StdLayout<D> {
  _marker: PhantomData<D>,
  name_order: Vec<String>,
  name_to_idx_map: HashMap<String, usize>,
  dir: PathBuf,
}


impl<D> StdLayout<D> {
  /// Dataset directory `dir`, relative to the `DATA_ROOT` environment variable.
  pub fn new(dir: impl AsRef<Path>) -> Result<StdLayout<D>> {
    let root = std::env::var("DATA_ROOT").context("environment variable DATA_ROOT must be defined")?;
    Self::at(Path::new(&root).join(dir))
  }

  /// Dataset directory given by an explicit path.
  pub fn at(dir: impl AsRef<Path>) -> Result<StdLayout<D>> {
    let dir = dir.as_ref();
    let ctx = format!("try read directory {:?}", dir);
    let dir = dir.canonicalize().context(ctx)?;

    let contents = std::fs::read_to_string(dir.join("INDEX.txt"))
      .with_context(|| format!("missing INDEX.txt in {:?}", &dir))?;
    let name_order: Vec<String> = contents.split_whitespace().map(|s| s.trim().to_string()).collect();
    let name_to_idx_map: HashMap<_, _> = name_order.iter().enumerate().map(|(i, s)| (s.clone(), i)).collect();

    Ok(StdLayout {
      _marker: PhantomData {},
      name_order,
      name_to_idx_map,
      dir,
    })
  }

  pub fn instance_dir(&self, idx: usize) -> Result<PathBuf> {
    let name = self.index_to_name(idx)?;
    Ok(self.dir.join(&*name))
  }
}

impl<D> IdxNameMap for StdLayout<D> {
  fn index_to_name(&self, idx: usize) -> Result<Cow<str>> {
    self.check_idx(idx)?;
    Ok(Cow::Borrowed(&self.name_order[idx]))
  }

  fn name_to_index(&self, name: &str) -> Result<usize> {
    self.name_to_idx_map.get(name).ok_or(Error::UnknownInstanceName.into()).map(|i| *i)
  }

  fn len(&self) -> usize { self.name_order.len() }
}


pub mod evrp;

#[cfg(test)]
pub(crate) fn fixture_dir() -> PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/EVRP_WCL")
}
