/// Non-allocating CSV tokenizer for simulator logs.
///
/// The simulator's exporters write a simple dialect, and that is what we accept:
///
///  - UTF-8 / ASCII text without a BOM, one record per line
///  - lines end with LF, optionally preceded by CR which is dropped, and the last line may lack
///    its terminator
///  - a blank line is an empty record
///  - no line is longer than MAXLINE bytes
///  - fields are separated by commas and may be empty, and records may differ in field count
///  - a field may be double-quoted, in which case it may contain commas and doubled quotes (which
///    stand for one quote) but not line breaks
///
/// Whether the first line is a header is for the client to decide.
///
/// `get()` yields `Token::Field(start, lim)`, `Token::EOL`, or `Token::EOF`.  The indices of a field
/// refer to the tokenizer's own buffer, stay valid until the next `get()`, and are resolved with
/// `get_str()`.  Log files of a large run have millions of lines, which is why there is no
/// allocation per record.
use anyhow::{bail, Result};
use std::io;

pub enum Token {
    Field(usize, usize),
    EOL,
    EOF,
}

const BUFSIZ: usize = 65536;
const MAXLINE: usize = 1024;

pub struct Tokenizer<'a> {
    reader: &'a mut dyn io::Read,
    // Unconsumed input is buf[pos..end], and buf[end] is always b'\n' as a sentinel.
    buf: [u8; BUFSIZ],
    pos: usize,
    end: usize,
    line: usize,
    after_eol: bool,
    in_record: bool,
}

impl<'a> Tokenizer<'a> {
    // Boxed for the size of the buffer.
    pub fn new(reader: &'a mut dyn io::Read) -> Box<Tokenizer<'a>> {
        let mut t = Box::new(Tokenizer {
            reader,
            buf: [0u8; BUFSIZ],
            pos: 0,
            end: 0,
            line: 1,
            after_eol: false,
            in_record: false,
        });
        t.buf[0] = b'\n';
        t
    }

    /// The text of a field returned by the last `get()`.  Invalid UTF-8 yields "", which no
    /// numeric parser accepts.
    pub fn get_str(&self, start: usize, lim: usize) -> &str {
        std::str::from_utf8(&self.buf[start..lim]).unwrap_or("")
    }

    /// The 1-based line number of the last token.  An EOL belongs to the line it ends.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn get(&mut self) -> Result<Token> {
        self.fill()?;
        if self.after_eol {
            self.line += 1;
            self.after_eol = false;
        }

        if self.buf[self.pos] == b'\n' {
            if self.pos == self.end {
                return Ok(Token::EOF);
            }
            self.pos += 1;
            self.after_eol = true;
            self.in_record = false;
            return Ok(Token::EOL);
        }

        if self.in_record {
            // A field that is not at the start of the line was ended by a comma.
            if self.buf[self.pos] != b',' {
                bail!("Expected comma")
            }
            self.pos += 1;
        }
        self.in_record = true;

        match self.buf[self.pos] {
            b'"' => self.quoted_field(),
            _ => self.plain_field(),
        }
    }

    // The field runs to the next comma or line end, with CR before LF excluded.  The terminator is
    // not consumed.
    fn plain_field(&mut self) -> Result<Token> {
        let start = self.pos;
        loop {
            match self.buf[self.pos] {
                b',' => return Ok(Token::Field(start, self.pos)),
                b'\n' => {
                    let lim = if self.pos > start && self.buf[self.pos - 1] == b'\r' {
                        self.pos - 1
                    } else {
                        self.pos
                    };
                    return Ok(Token::Field(start, lim));
                }
                b'"' => bail!("Unexpected '\"' in unquoted field"),
                _ => self.pos += 1,
            }
        }
    }

    // Doubled quotes are collapsed in place, so the field's text ends up in buf[start..dest].
    fn quoted_field(&mut self) -> Result<Token> {
        self.pos += 1;
        let start = self.pos;
        let mut dest = start;
        loop {
            match self.buf[self.pos] {
                b'\n' => bail!("Unexpected end of line or end of file in quoted field"),
                b'"' if self.buf[self.pos + 1] == b'"' => {
                    self.buf[dest] = b'"';
                    dest += 1;
                    self.pos += 2;
                }
                b'"' => {
                    self.pos += 1;
                    if self.buf[self.pos] == b'\r' && self.buf[self.pos + 1] == b'\n' {
                        self.pos += 1;
                    }
                    if self.buf[self.pos] != b',' && self.buf[self.pos] != b'\n' {
                        bail!("Expected comma or end of line after quoted field")
                    }
                    return Ok(Token::Field(start, dest));
                }
                c => {
                    self.buf[dest] = c;
                    dest += 1;
                    self.pos += 1;
                }
            }
        }
    }

    // Ensure at least MAXLINE bytes are buffered unless the input is exhausted.
    fn fill(&mut self) -> Result<()> {
        while self.end - self.pos < MAXLINE {
            if self.pos > 0 {
                self.buf.copy_within(self.pos..=self.end, 0);
                self.end -= self.pos;
                self.pos = 0;
            }
            let n = self.reader.read(&mut self.buf[self.end..BUFSIZ - 1])?;
            self.end += n;
            self.buf[self.end] = b'\n';
            if n == 0 {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
fn expect_field(tokenizer: &mut Tokenizer, expected: &str) {
    match tokenizer.get().unwrap() {
        Token::Field(a, b) => assert!(tokenizer.get_str(a, b) == expected),
        _ => panic!("Expected field '{expected}'"),
    }
}

#[cfg(test)]
fn expect_eol(tokenizer: &mut Tokenizer) {
    assert!(matches!(tokenizer.get().unwrap(), Token::EOL));
}

// This tests:
//  - a quoted header line as written by the simulator's exporter
//  - empty fields, also at the end of a line
//  - quoted fields with commas and quotes in them
//  - a blank line, and a last line without a terminator
//  - line counting

#[test]
fn test_csv_tokenizer_basic() {
    let text = r#""Point in Time [s]","State [n]"
0.0,1
12.5,,
"a,""b""",x

17,0"#;
    let mut bs = text.as_bytes();
    let mut t = Tokenizer::new(&mut bs);
    expect_field(&mut t, "Point in Time [s]");
    assert!(t.line() == 1);
    expect_field(&mut t, "State [n]");
    expect_eol(&mut t);
    assert!(t.line() == 1);
    expect_field(&mut t, "0.0");
    assert!(t.line() == 2);
    expect_field(&mut t, "1");
    expect_eol(&mut t);
    expect_field(&mut t, "12.5");
    expect_field(&mut t, "");
    expect_field(&mut t, "");
    expect_eol(&mut t);
    expect_field(&mut t, "a,\"b\"");
    expect_field(&mut t, "x");
    expect_eol(&mut t);
    expect_eol(&mut t);
    expect_field(&mut t, "17");
    assert!(t.line() == 6);
    expect_field(&mut t, "0");
    assert!(matches!(t.get().unwrap(), Token::EOF));
}

#[test]
fn test_csv_tokenizer_crlf() {
    let text = "\"t\",\"s\"\r\n1.5,2\r\n3,\r\n";
    let mut bs = text.as_bytes();
    let mut t = Tokenizer::new(&mut bs);
    expect_field(&mut t, "t");
    expect_field(&mut t, "s");
    expect_eol(&mut t);
    expect_field(&mut t, "1.5");
    expect_field(&mut t, "2");
    expect_eol(&mut t);
    expect_field(&mut t, "3");
    expect_field(&mut t, "");
    expect_eol(&mut t);
    assert!(matches!(t.get().unwrap(), Token::EOF));
}

#[test]
fn test_csv_tokenizer_errors() {
    for text in ["a,\"hi\nho", "a,\"hi", "a,\"hi\"x,y", "a,hi\"x,y"] {
        let mut bs = text.as_bytes();
        let mut t = Tokenizer::new(&mut bs);
        expect_field(&mut t, "a");
        assert!(t.get().is_err(), "{text}");
    }
}

// This tests:
//  - records that straddle the buffer boundary, so that a field is split across two reads
//
// Every record is the 20 bytes "86399.5,4294967295\r\n", which does not divide BUFSIZ.

#[test]
fn test_csv_tokenizer_refill() {
    let record = "86399.5,4294967295\r\n";
    assert!(BUFSIZ % record.len() != 0);
    let count = BUFSIZ * 3 / record.len();
    let text = record.repeat(count);
    let mut bs = text.as_bytes();
    let mut t = Tokenizer::new(&mut bs);
    let mut records = 0;
    loop {
        match t.get().unwrap() {
            Token::Field(a, b) => {
                assert!(t.get_str(a, b) == "86399.5");
                expect_field(&mut t, "4294967295");
                expect_eol(&mut t);
                records += 1;
            }
            Token::EOL => panic!("Blank line"),
            Token::EOF => break,
        }
    }
    assert!(records == count);
    assert!(t.line() == count + 1);
}

// A reader that delivers its input and then fails.

#[cfg(test)]
struct FailingReader<'a> {
    input: &'a [u8],
}

#[cfg(test)]
impl<'a> io::Read for FailingReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.input.is_empty() {
            return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        }
        let n = buf.len().min(self.input.len());
        buf[..n].copy_from_slice(&self.input[..n]);
        self.input = &self.input[n..];
        Ok(n)
    }
}

#[test]
fn test_csv_tokenizer_io_error() {
    let mut r = FailingReader {
        input: b"1,0\n2,1\n",
    };
    let mut t = Tokenizer::new(&mut r);
    assert!(t.get().is_err());
}
