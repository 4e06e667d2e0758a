use super::nom_prelude::*;

/// Comma separator, tolerating spaces either side.
pub fn sep<'a, E>(input: &'a str) -> IResult<&'a str, char, E>
  where
    E: ParseError<&'a str>
{
  delimited(space0, char(','), space0)(input)
}

/// A free-text cell, trimmed.  Stops at the next separator or line ending.
pub fn cell<'a, E>(input: &'a str) -> IResult<&'a str, &'a str, E>
  where
    E: ParseError<&'a str>
{
  map(take_till1(|c| c == ',' || c == '\n' || c == '\r'), str::trim)(input)
}

pub fn number<'a, E>(input: &'a str) -> IResult<&'a str, f64, E>
  where
    E: ParseError<&'a str>
{
  preceded(space0, double)(input)
}

pub fn usize_<'a, E>(input: &'a str) -> IResult<&'a str, usize, E>
  where
    E: ParseError<&'a str> + FromExternalError<&'a str, ParseIntError>
{
  preceded(space0, map_res(digit1, usize::from_str))(input)
}

/// Skips the header line.
pub fn header<'a, E>(input: &'a str) -> IResult<&'a str, &'a str, E>
  where
    E: ParseError<&'a str>
{
  terminated(not_line_ending, line_ending)(input)
}

/// A header line followed by newline-separated records.  Trailing blank lines are allowed, anything else
/// after the last record is an error.
pub fn table<'a, O, E, F>(record: F) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>, E>
  where
    F: Parser<&'a str, O, E>,
    E: ParseError<&'a str>
{
  let mut rows = separated_list0(line_ending, terminated(record, space0));
  move |input| {
    let (input, _) = header(input)?;
    let (input, rows) = rows.parse(input)?;
    let (input, _) = many0(preceded(space0, line_ending))(input)?;
    let (input, _) = eof(input)?;
    Ok((input, rows))
  }
}
