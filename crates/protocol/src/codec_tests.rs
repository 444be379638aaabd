use super::*;
use crate::Record;
use std::io::{self, BufReader, Cursor, Read};

fn ids(input: &str) -> (Vec<String>, usize) {
    ids_from_bytes(input.as_bytes())
}

fn ids_from_bytes(input: &[u8]) -> (Vec<String>, usize) {
    let mut records = NdjsonRecords::new(Cursor::new(input.to_vec()));
    let ids = records.by_ref().map(|d| d.id().to_owned()).collect();
    (ids, records.skipped())
}

#[test]
fn yields_documents_in_input_order() {
    let input = "{\"id\":\"a\",\"text\":\"x\"}\n{\"id\":\"b\"}\n{\"id\":\"c\"}";
    let (got, skipped) = ids(input);
    assert_eq!(got, vec!["a", "b", "c"]);
    assert_eq!(skipped, 0);
}

#[test]
fn skips_unusable_lines_cases() {
    let cases: &[(&str, &[&str], usize)] = &[
        ("", &[], 0),
        ("\n\n   \n", &[], 0),
        ("{\"id\":\"a\"}\nnot json\n{\"id\":\"b\"}\n", &["a", "b"], 1),
        ("[1,2,3]\n{\"id\":7}\n", &["7"], 1),
        ("{\"text\":\"no id\"}\n{\"id\":\"\"}\n{\"id\":1.5}\n", &[], 3),
        ("{\"id\":\"a\"}\r\n{\"id\":\"b\"}\r\n", &["a", "b"], 0),
    ];

    for (input, expected, expected_skipped) in cases {
        let (got, skipped) = ids(input);
        assert_eq!(got, *expected, "input {input:?}");
        assert_eq!(skipped, *expected_skipped, "skipped count for {input:?}");
    }
}

#[test]
fn invalid_utf8_lines_are_skipped_not_fatal() {
    let cases: &[(&[u8], &[&str], usize)] = &[
        (
            b"{\"id\":\"a\"}\n\xff\xfe\n{\"id\":\"b\"}\n{\"id\":\"c\"}\n",
            &["a", "b", "c"],
            1,
        ),
        (b"{\"id\":\"a\",\"text\":\"caf\xe9\"}\n{\"id\":\"b\"}\n", &["b"], 1),
        (b"\xc3\n\xc3\x28\n{\"id\":\"z\"}", &["z"], 2),
    ];

    for (input, expected, expected_skipped) in cases {
        let (got, skipped) = ids_from_bytes(input);
        let shown = String::from_utf8_lossy(input);
        assert_eq!(got, *expected, "input {shown:?}");
        assert_eq!(skipped, *expected_skipped, "skipped count for {shown:?}");
    }
}

struct FailAfter {
    inner: Cursor<Vec<u8>>,
}

impl Read for FailAfter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream reset")),
            n => Ok(n),
        }
    }
}

#[test]
fn read_error_ends_the_stream() {
    let reader = BufReader::new(FailAfter {
        inner: Cursor::new(b"{\"id\":\"a\"}\n{\"id\":\"b\"}\n".to_vec()),
    });

    let mut records = NdjsonRecords::new(reader);
    let got: Vec<String> = records.by_ref().map(|d| d.id().to_owned()).collect();

    assert_eq!(got, vec!["a", "b"]);
    assert!(records.next().is_none(), "stream stays finished after an error");
}
