//! PDF lexer (tokenizer).
//!
//! Low-level tokenization of PDF byte streams with nom. Recognizes numbers,
//! literal and hex strings, names, keywords and delimiters. Whitespace
//! (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, recognize, value},
    sequence::{pair, preceded},
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -.5)
    Real(f64),
    /// Raw literal string bytes; escapes are decoded by the parser
    LiteralString(&'a [u8]),
    /// Raw hex string digits; decoded by the parser
    HexString(&'a [u8]),
    /// Name with #XX escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` in `10 0 R`
    R,
}

/// PDF whitespace characters.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        let (rest, _) = take_while(is_whitespace)(remaining)?;
        remaining = rest;
        match comment(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) => return Ok((remaining, ())),
        }
    }
}

fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(pair(
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
            recognize(pair(char('.'), digit1)),
        )),
    ))(input)?;

    // Only ASCII digits, sign and '.' were recognized above
    let text = std::str::from_utf8(text).unwrap_or("0");
    let fail = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit));

    if text.contains('.') {
        let normalized = if text.ends_with('.') {
            format!("{}0", text)
        } else {
            text.to_string()
        };
        let real: f64 = normalized.parse().map_err(|_| fail())?;
        Ok((rest, Token::Real(real)))
    } else {
        let int: i64 = text.parse().map_err(|_| fail())?;
        Ok((rest, Token::Integer(int)))
    }
}

/// Literal string in balanced parentheses; returns the raw content.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    let (rest, _) = char('<')(input)?;
    let (rest, digits) = take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c))(rest)?;
    let (rest, _) = char('>')(rest)?;
    Ok((rest, Token::HexString(digits)))
}

/// Decode #XX escape sequences in PDF names.
///
/// ```
/// # use pdf_seal::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B"), "A B");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| b as char).collect())
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(is_regular), |raw: &[u8]| Token::Name(decode_name_escapes(raw))),
    )(input)
}

fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// Bare keywords, matched as whole words so `nullable` is not `null`.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, word) = take_while1(is_regular)(input)?;
    let tok = match word {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        },
    };
    Ok((rest, tok))
}

/// Parse a single PDF token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_delimiter,
        parse_name,
        parse_number,
        parse_keyword,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123 "), Ok((&b" "[..], Token::Integer(-123))));
        assert_eq!(token(b"+7"), Ok((&b""[..], Token::Integer(7))));
    }

    #[test]
    fn test_parse_reals() {
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"4."), Ok((&b""[..], Token::Real(4.0))));
    }

    #[test]
    fn test_parse_name_with_escape() {
        assert_eq!(
            token(b"/Adobe.PPKLite"),
            Ok((&b""[..], Token::Name("Adobe.PPKLite".to_string())))
        );
        assert_eq!(token(b"/A#20B/C"), Ok((&b"/C"[..], Token::Name("A B".to_string()))));
    }

    #[test]
    fn test_parse_literal_string_nested() {
        assert_eq!(
            token(b"(a (b) \\) c) rest"),
            Ok((&b" rest"[..], Token::LiteralString(&b"a (b) \\) c"[..])))
        );
    }

    #[test]
    fn test_parse_hex_string() {
        assert_eq!(
            token(b"<48 65>"),
            Ok((&b""[..], Token::HexString(&b"48 65"[..])))
        );
    }

    #[test]
    fn test_dict_delimiters_win_over_hex() {
        assert_eq!(token(b"<</Type"), Ok((&b"/Type"[..], Token::DictStart)));
        assert_eq!(token(b">>"), Ok((&b""[..], Token::DictEnd)));
    }

    #[test]
    fn test_keywords_are_whole_words() {
        assert_eq!(token(b"endstream\n"), Ok((&b"\n"[..], Token::StreamEnd)));
        assert_eq!(token(b"R>>"), Ok((&b">>"[..], Token::R)));
        assert!(token(b"nullable").is_err());
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(token(b"% comment\n  true"), Ok((&b""[..], Token::True)));
    }
}
