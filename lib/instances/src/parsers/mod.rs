mod wcl;
pub use wcl::WclFmt;


mod nom_prelude {
  pub use nom::{
    IResult, Parser,
    error::{
      self,
      ParseError,
      FromExternalError,
      VerboseError,
      context,
    },
    sequence::*,
    multi::*,
    combinator::*,
    character::complete::*,
    bytes::complete::take_till1,
    number::complete::double,
    Finish,
  };
  pub use std::str::FromStr;
  pub use std::num::ParseIntError;
}

mod common;

pub trait ParseInstance<Fmt>: Sized {
  fn parse(inputs: Fmt) -> crate::Result<Self>;
}
