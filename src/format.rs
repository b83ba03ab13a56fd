//! The stanza format used for every message exchanged over the plugin pipe.

use std::io::BufRead;

use crate::error::Error;

/// Number of base64 characters per full body line.
pub(crate) const COLUMNS_PER_LINE: usize = 64;

/// Number of decoded bytes per full body line.
pub(crate) const BYTES_PER_LINE: usize = COLUMNS_PER_LINE / 4 * 3;

const STANZA_PREFIX: &str = "->";
const FOOTER_PREFIX: &str = "---";

/// One framed protocol message: a tag, its arguments, and a binary body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stanza {
    pub tag: String,
    pub args: Vec<String>,
    pub body: Vec<u8>,
}

/// Strict unpadded base64 decoding of a single token.
///
/// CR and LF are rejected outright, so a transport cannot smuggle extra
/// framing into a token.
pub(crate) fn decode_string(s: &str) -> Result<Vec<u8>, Error> {
    if s.contains('\n') || s.contains('\r') {
        return Err(Error::Framing("unexpected newline character".to_owned()));
    }
    base64::decode_config(s, base64::STANDARD_NO_PAD)
        .map_err(|e| Error::Framing(format!("invalid base64: {}", e)))
}

fn is_arg_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| (33..=126).contains(&b))
}

fn parse_opening(line: &str) -> Result<Stanza, Error> {
    let mut tokens = line.split(' ');
    if tokens.next() != Some(STANZA_PREFIX) {
        return Err(Error::Framing(format!(
            "malformed stanza opening line: {:?}",
            line
        )));
    }
    let args: Vec<&str> = tokens.collect();
    if args.is_empty() || args.iter().any(|arg| !is_arg_token(arg)) {
        return Err(Error::Framing(format!("malformed stanza: {:?}", line)));
    }
    Ok(Stanza {
        tag: args[0].to_owned(),
        args: args[1..].iter().map(|arg| (*arg).to_owned()).collect(),
        body: vec![],
    })
}

/// One entry of an identity-v1 header.
pub(crate) enum HeaderEntry {
    Stanza(Stanza),
    /// The arguments of the `---` closing line.
    Footer(Vec<String>),
}

/// Reads stanzas from the plugin pipe.
///
/// Read errors are unrecoverable: after the first failure the reader stops
/// touching the stream and re-raises the error on every subsequent call.
pub struct StanzaReader<R: BufRead> {
    input: R,
    poisoned: Option<String>,
}

impl<R: BufRead> StanzaReader<R> {
    pub fn new(input: R) -> Self {
        StanzaReader {
            input,
            poisoned: None,
        }
    }

    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        if let Some(msg) = &self.poisoned {
            return Err(Error::Framing(msg.clone()));
        }
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.poisoned = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn read_line(&mut self) -> Result<String, Error> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::Framing(
                "failed to read line: unexpected end of input".to_owned(),
            ));
        }
        if !line.ends_with('\n') {
            return Err(Error::Framing(
                "failed to read line: missing newline".to_owned(),
            ));
        }
        line.truncate(line.len() - 1);
        Ok(line)
    }

    /// Reads one complete stanza.
    pub fn read_stanza(&mut self) -> Result<Stanza, Error> {
        self.guarded(|reader| {
            let line = reader.read_line()?;
            let mut stanza = parse_opening(&line)?;
            reader.read_body(&mut stanza)?;
            Ok(stanza)
        })
    }

    /// Reads one identity-v1 header entry: either a stanza, or the `---`
    /// MAC footer that closes the header.
    pub(crate) fn read_header_entry(&mut self) -> Result<HeaderEntry, Error> {
        self.guarded(|reader| {
            let line = reader.read_line()?;
            if line.starts_with(FOOTER_PREFIX) {
                let mut tokens = line.split(' ');
                if tokens.next() != Some(FOOTER_PREFIX) {
                    return Err(Error::Framing(format!(
                        "malformed closing line: {:?}",
                        line
                    )));
                }
                return Ok(HeaderEntry::Footer(tokens.map(str::to_owned).collect()));
            }
            let mut stanza = parse_opening(&line)?;
            reader.read_body(&mut stanza)?;
            Ok(HeaderEntry::Stanza(stanza))
        })
    }

    fn read_body(&mut self, stanza: &mut Stanza) -> Result<(), Error> {
        loop {
            let line = self.read_line()?;
            let chunk = match decode_string(&line) {
                Ok(chunk) => chunk,
                Err(_) if line.starts_with(STANZA_PREFIX) || line.starts_with(FOOTER_PREFIX) => {
                    return Err(Error::Framing(format!(
                        "malformed body line {:?}: stanza ended without a short line",
                        line
                    )));
                }
                Err(e) => {
                    return Err(Error::Framing(format!(
                        "malformed body line {:?}: {}",
                        line, e
                    )));
                }
            };
            if chunk.len() > BYTES_PER_LINE {
                return Err(Error::Framing(format!(
                    "malformed body line {:?}: too long",
                    line
                )));
            }
            let last = chunk.len() < BYTES_PER_LINE;
            stanza.body.extend_from_slice(&chunk);
            if last {
                // A stanza body always ends with a short line.
                return Ok(());
            }
        }
    }
}

pub(crate) mod write {
    use cookie_factory::{combinator::string, sequence::tuple, SerializeFn, WriteContext};
    use std::io::{self, Write};
    use std::iter;

    use super::{Stanza, COLUMNS_PER_LINE};

    /// Body encoding: unpadded base64 hard-wrapped at 64 columns. The final
    /// line is always strictly shorter than 64 columns (possibly empty);
    /// that short line is the sole terminator of a body.
    pub(crate) fn wrapped_encoded_data<'a, W: 'a + Write>(
        data: &'a [u8],
    ) -> impl SerializeFn<W> + 'a {
        move |w: WriteContext<W>| {
            let encoded = base64::encode_config(data, base64::STANDARD_NO_PAD);
            let mut wrapped =
                String::with_capacity(encoded.len() + encoded.len() / COLUMNS_PER_LINE + 2);
            for chunk in encoded.as_bytes().chunks(COLUMNS_PER_LINE) {
                wrapped.push_str(std::str::from_utf8(chunk).expect("base64 is ASCII"));
                wrapped.push('\n');
            }
            if encoded.len() % COLUMNS_PER_LINE == 0 {
                wrapped.push('\n');
            }
            string(wrapped)(w)
        }
    }

    pub(crate) fn stanza<'a, W: 'a + Write>(s: &'a Stanza) -> impl SerializeFn<W> + 'a {
        move |w: WriteContext<W>| {
            let mut opening = String::new();
            for arg in iter::once(&s.tag).chain(s.args.iter()) {
                opening.push_str(if opening.is_empty() { "-> " } else { " " });
                opening.push_str(arg);
            }
            opening.push('\n');
            let writer = tuple((string(opening), wrapped_encoded_data(&s.body)));
            writer(w)
        }
    }

    /// Serializes one stanza to `w`.
    pub(crate) fn write_stanza<W: Write>(s: &Stanza, w: W) -> io::Result<W> {
        cookie_factory::gen_simple(stanza(s), w).map_err(|e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("failed to write stanza: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;
    use rand::Rng;
    use std::io::Cursor;

    use super::{write, Stanza, StanzaReader, COLUMNS_PER_LINE};

    fn encode(stanza: &Stanza) -> Vec<u8> {
        let mut buf = vec![];
        write::write_stanza(stanza, &mut buf).unwrap();
        buf
    }

    fn decode(buf: &[u8]) -> Result<Stanza, crate::Error> {
        StanzaReader::new(Cursor::new(buf)).read_stanza()
    }

    #[derive(Clone, Debug)]
    struct Printable(String);

    impl Arbitrary for Printable {
        fn arbitrary<G: Gen>(g: &mut G) -> Self {
            let len = g.gen_range(1, 9);
            Printable((0..len).map(|_| g.gen_range(33u8, 127) as char).collect())
        }
    }

    #[quickcheck]
    fn stanza_roundtrip(tag: Printable, args: Vec<Printable>, body: Vec<u8>) -> bool {
        let stanza = Stanza {
            tag: tag.0,
            args: args.into_iter().map(|arg| arg.0).collect(),
            body,
        };
        decode(&encode(&stanza)).unwrap() == stanza
    }

    #[quickcheck]
    fn body_lines_stay_under_the_column_limit(body: Vec<u8>) -> bool {
        let stanza = Stanza {
            tag: "test".to_owned(),
            args: vec![],
            body,
        };
        let encoded = encode(&stanza);
        let text = std::str::from_utf8(&encoded).unwrap();
        let mut lines: Vec<_> = text.lines().skip(1).collect();
        let last = lines.pop().unwrap();
        last.len() < COLUMNS_PER_LINE && lines.iter().all(|line| line.len() == COLUMNS_PER_LINE)
    }

    #[test]
    fn ten_kilobyte_body_roundtrips() {
        let stanza = Stanza {
            tag: "big".to_owned(),
            args: vec!["arg".to_owned()],
            body: (0..10_000u32).map(|i| i as u8).collect(),
        };
        assert_eq!(decode(&encode(&stanza)).unwrap(), stanza);
    }

    #[test]
    fn full_final_chunk_gets_an_empty_terminator_line() {
        // 48 bytes fill one line exactly; the empty line closes the body.
        let stanza = Stanza {
            tag: "x".to_owned(),
            args: vec![],
            body: vec![7; 48],
        };
        let encoded = encode(&stanza);
        assert!(encoded.ends_with(b"\n\n"));
        assert_eq!(decode(&encoded).unwrap(), stanza);
    }

    #[test]
    fn empty_body_is_a_single_empty_line() {
        let stanza = Stanza {
            tag: "done".to_owned(),
            args: vec![],
            body: vec![],
        };
        assert_eq!(encode(&stanza), b"-> done\n\n");
    }

    #[test]
    fn carriage_return_in_body_is_rejected() {
        assert!(decode(b"-> x\nQUJD\r\n").is_err());
    }

    #[test]
    fn overlong_body_line_is_rejected() {
        let mut buf = b"-> x\n".to_vec();
        buf.extend_from_slice(&[b'A'; 68]);
        buf.push(b'\n');
        assert!(decode(&buf).is_err());
    }

    #[test]
    fn disallowed_bytes_in_args_are_rejected() {
        assert!(decode(b"-> x \x7fy\n\n").is_err());
        assert!(decode(b"-> x  y\n\n").is_err());
        assert!(decode(b"no-prefix x\n\n").is_err());
        assert!(decode(b"-> \n\n").is_err());
    }

    #[test]
    fn next_stanza_opening_inside_a_body_is_rejected() {
        assert!(decode(b"-> x\n-> y\n\n").is_err());
    }

    #[test]
    fn read_failures_are_permanent() {
        let mut reader = StanzaReader::new(Cursor::new(&b"garbage\n-> ok\n\n"[..]));
        assert!(reader.read_stanza().is_err());
        // The stream now holds a valid stanza, but the reader is poisoned.
        assert!(reader.read_stanza().is_err());
    }
}
