use winnow::ascii::dec_uint;
use winnow::combinator::{alt, cut_err, delimited, preceded, repeat};
use winnow::error::{ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

use super::parser::{PathSegment, TemplateToken};

// -- Identifiers ------------------------------------------------------------

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

// -- Segments ---------------------------------------------------------------

fn quoted_key<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    alt((
        delimited('\'', take_till(0.., '\''), '\''),
        delimited('"', take_till(0.., '"'), '"'),
    ))
    .parse_next(input)
}

fn index(input: &mut &str) -> ModalResult<usize> {
    dec_uint::<_, u64, _>
        .try_map(usize::try_from)
        .parse_next(input)
}

fn bracket_segment(input: &mut &str) -> ModalResult<PathSegment> {
    delimited(
        '[',
        cut_err(alt((
            index.map(PathSegment::Index),
            quoted_key.map(|k: &str| PathSegment::Key(k.to_owned())),
        )))
        .context(StrContext::Expected(StrContextValue::Description(
            "index or quoted key",
        ))),
        cut_err(']'),
    )
    .parse_next(input)
}

fn property_segment(input: &mut &str) -> ModalResult<PathSegment> {
    preceded(
        '.',
        cut_err(ident).context(StrContext::Expected(StrContextValue::Description(
            "property name",
        ))),
    )
    .map(|name: &str| PathSegment::Property(name.to_owned()))
    .parse_next(input)
}

// -- Top-level parser -------------------------------------------------------

pub fn path(input: &mut &str) -> ModalResult<Vec<PathSegment>> {
    let first = ident
        .context(StrContext::Expected(StrContextValue::Description(
            "property name",
        )))
        .parse_next(input)?;
    let rest: Vec<PathSegment> =
        repeat(0.., alt((property_segment, bracket_segment))).parse_next(input)?;

    let mut segments = Vec::with_capacity(rest.len() + 1);
    segments.push(PathSegment::Property(first.to_owned()));
    segments.extend(rest);
    Ok(segments)
}

// -- Message templates ------------------------------------------------------

fn placeholder<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    preceded(
        "${",
        cut_err((take_till(1.., '}'), '}').map(|(path, _): (&str, char)| path.trim()))
            .context(StrContext::Expected(StrContextValue::Description(
                "placeholder closed by '}'",
            ))),
    )
    .parse_next(input)
}

fn template_token<'i>(input: &mut &'i str) -> ModalResult<TemplateToken<'i>> {
    alt((
        placeholder.map(TemplateToken::Placeholder),
        take_till(1.., '$').map(TemplateToken::Text),
        "$".map(TemplateToken::Text),
    ))
    .parse_next(input)
}

/// Literal text interleaved with `${path}` placeholders.
pub fn template<'i>(input: &mut &'i str) -> ModalResult<Vec<TemplateToken<'i>>> {
    repeat(0.., template_token).parse_next(input)
}
