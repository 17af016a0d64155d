//! PDF object parser.
//!
//! Recursive descent over lexer tokens: composite types (arrays,
//! dictionaries, streams) recurse into [`parse_object`]; `N G R` triples
//! become references by lookahead.

use crate::decoders::decode_hex_digits;
use crate::error::{Error, Result};
use crate::lexer::{is_whitespace, skip_ws, token, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use nom::IResult;

/// Decode escape sequences in PDF literal strings.
///
/// ```
/// # use pdf_seal::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"a\\(b\\)\\101"), b"a(b)A");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let byte = raw[i];
        if byte == b'\r' {
            // EOL inside a literal string reads as a single LF
            result.push(b'\n');
            i += if raw.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            continue;
        }
        if byte != b'\\' || i + 1 >= raw.len() {
            result.push(byte);
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'\n' => {},
            b'0'..=b'7' => {
                let mut code = (next - b'0') as u32;
                let mut digits = 1;
                while digits < 3 && i < raw.len() && (b'0'..=b'7').contains(&raw[i]) {
                    code = code * 8 + (raw[i] - b'0') as u32;
                    i += 1;
                    digits += 1;
                }
                result.push((code & 0xFF) as u8);
            },
            other => result.push(other),
        }
    }

    result
}

fn nom_error(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Parse one PDF object.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Integer(i) => {
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if (0..=u32::MAX as i64).contains(&i) && (0..=u16::MAX as i64).contains(&gen) {
                        return Ok((
                            after_r,
                            Object::Reference(ObjectRef::new(i as u32, gen as u16)),
                        ));
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        },
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(digits) => match decode_hex_digits(digits) {
            Ok(bytes) => Ok((rest, Object::String(bytes))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                rest,
                nom::error::ErrorKind::HexDigit,
            ))),
        },
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::ArrayStart => parse_array(rest),
        Token::DictStart => {
            let (after_dict, dict) = parse_dictionary(rest)?;
            match token(after_dict) {
                Ok((stream_input, Token::StreamStart)) => {
                    let (after_stream, data) = parse_stream_data(stream_input, &dict)?;
                    Ok((
                        after_stream,
                        Object::Stream {
                            dict,
                            data: bytes::Bytes::from(data),
                        },
                    ))
                },
                _ => Ok((after_dict, Object::Dictionary(dict))),
            }
        },
        _ => Err(nom_error(input, nom::error::ErrorKind::Tag)),
    }
}

/// Parse `N G obj <object> endobj`, returning the object's reference.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id) = token(input)?;
    let (rest, gen) = token(rest)?;
    let (rest, kw) = token(rest)?;
    let obj_ref = match (id, gen, kw) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart)
            if id >= 0 && (0..=u16::MAX as i64).contains(&gen) =>
        {
            ObjectRef::new(id as u32, gen as u16)
        },
        _ => return Err(nom_error(input, nom::error::ErrorKind::Tag)),
    };

    let (rest, obj) = parse_object(rest)?;
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => {
            log::debug!("Object {} is missing 'endobj'", obj_ref);
            rest
        },
    };
    Ok((rest, (obj_ref, obj)))
}

/// Parse stream data after the `stream` keyword.
///
/// Uses a direct /Length when it lands on `endstream`; otherwise scans for
/// the keyword (indirect or wrong /Length values).
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dictionary) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(|o| o.as_integer()) {
        let length = length.max(0) as usize;
        if length <= input.len() {
            let (after, _) = skip_ws(&input[length..])?;
            if let Ok((after, Token::StreamEnd)) = token(after) {
                return Ok((after, input[..length].to_vec()));
            }
        }
        log::debug!("Stream /Length {} does not reach 'endstream', scanning", length);
    }

    let pos = find_endstream(input).ok_or_else(|| nom_error(input, nom::error::ErrorKind::Eof))?;
    let mut end = pos;
    // The EOL before endstream belongs to the syntax, not the data
    if end > 0 && input[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && input[end - 1] == b'\r' {
        end -= 1;
    }
    let (after, _) = token(&input[pos..])?;
    Ok((after, input[..end].to_vec()))
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input
        .windows(keyword.len())
        .position(|window| window == keyword)
}

fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        if let Ok((after, Token::ArrayEnd)) = token(remaining) {
            return Ok((after, Object::Array(objects)));
        }
        let (after, obj) = parse_object(remaining)?;
        objects.push(obj);
        remaining = after;
    }
}

fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Dictionary> {
    let mut dict = Dictionary::new();
    let mut remaining = input;

    loop {
        let (after, tok) = token(remaining)?;
        match tok {
            Token::DictEnd => return Ok((after, dict)),
            Token::Name(key) => {
                let (after, value) = parse_object(after)?;
                // A null value is equivalent to the key being absent
                if !value.is_null() {
                    dict.insert(key, value);
                }
                remaining = after;
            },
            _ => return Err(nom_error(remaining, nom::error::ErrorKind::Tag)),
        }
    }
}

/// Parse a complete object, mapping nom failures to [`Error::ParseError`].
pub fn parse_object_at(data: &[u8], offset: usize) -> Result<Object> {
    let slice = data.get(offset..).ok_or_else(|| Error::ParseError {
        offset,
        reason: "offset beyond end of file".to_string(),
    })?;
    parse_object(slice)
        .map(|(_, obj)| obj)
        .map_err(|e| Error::ParseError {
            offset,
            reason: describe_nom_error(&e),
        })
}

/// Short description of a nom failure without dumping the input.
pub(crate) fn describe_nom_error(e: &nom::Err<nom::error::Error<&[u8]>>) -> String {
    match e {
        nom::Err::Incomplete(_) => "incomplete input".to_string(),
        nom::Err::Error(inner) | nom::Err::Failure(inner) => {
            format!("{:?} with {} bytes remaining", inner.code, inner.input.len())
        },
    }
}

/// Skip leading PDF whitespace.
pub(crate) fn trim_start(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|&c| !is_whitespace(c)).unwrap_or(data.len());
    &data[start..]
}
