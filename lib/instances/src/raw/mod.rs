pub mod evrp;
use std::borrow::Cow;

pub trait FromRaw<T> where Self: Sized {
  fn from_raw(raw: T, id: Cow<str>) -> crate::Result<Self>;
}


pub(crate) mod metrics {
  use num_traits::{AsPrimitive, Num};
  use fnv::FnvHashMap;

  /// A symmetric distance function.
  pub trait Metric {
    fn compute<T: Num + AsPrimitive<f64>>(p1: (T, T), p2: (T, T)) -> f64;
  }


  pub struct Euclidean();

  impl Metric for Euclidean {
    fn compute<T: Num + AsPrimitive<f64>>(p1: (T, T), p2: (T, T)) -> f64 {
      let a = p1.0.as_() - p2.0.as_();
      let b = p1.1.as_() - p2.1.as_();
      (a*a + b*b).sqrt()
    }
  }

  /// Distances between every ordered pair of distinct points, passed through `func`.
  /// The diagonal is left out since the road network has no self loops.
  pub fn dist_matrix_pp<M, T, S>(_metric: M, coords: &[(T, T)], func: impl Fn(usize, usize, f64) -> S) -> FnvHashMap<(usize, usize), S>
    where
      M: Metric,
      T: Num + AsPrimitive<f64>,
      S: Clone
  {
    let n = coords.len();
    let mut matrix = FnvHashMap::with_capacity_and_hasher(n * n.saturating_sub(1), Default::default());
    for i in 0..n {
      for j in (i+1)..n {
        let d = M::compute(coords[i], coords[j]);
        matrix.insert((i,j), func(i, j, d));
        matrix.insert((j,i), func(j, i, d));
      }
    }

    matrix
  }

  #[cfg(test)]
  mod tests {
    use super::*;

    #[test]
    fn no_diagonal() {
      let m = dist_matrix_pp(Euclidean(), &[(0.0, 0.0), (3.0, 4.0), (0.0, 0.0)], |_, _, d| d);
      assert_eq!(m.len(), 6);
      assert_eq!(m[&(0, 1)], 5.0);
      assert_eq!(m[&(1, 0)], 5.0);
      assert_eq!(m[&(0, 2)], 0.0);
      assert!(!m.contains_key(&(1, 1)));
    }
  }
}
