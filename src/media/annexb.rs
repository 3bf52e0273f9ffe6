//! Annex-B byte stream scanning.
//!
//! NAL units are delimited by `00 00 01` or `00 00 00 01` start codes. Zero
//! bytes directly before a start code (or at end of file) are trailing
//! padding and are not part of the preceding unit.

use std::io::BufRead;
use std::mem;

use crate::error::{Result, SessionError};

/// Start-code state carried across buffer refills.
#[derive(Debug, Default)]
struct ScanState {
    nal: Vec<u8>,
    zeros: usize,
    prefix_seen: bool,
}

impl ScanState {
    fn push(&mut self, b: u8) -> Result<Option<Vec<u8>>> {
        if b == 0 {
            self.zeros += 1;
            return Ok(None);
        }

        if b == 1 && self.zeros >= 2 {
            self.zeros = 0;
            if !self.prefix_seen {
                self.prefix_seen = true;
                return Ok(None);
            }
            if self.nal.is_empty() {
                return Ok(None);
            }
            return Ok(Some(mem::take(&mut self.nal)));
        }

        if !self.prefix_seen {
            return Err(SessionError::parse("Annex-B stream does not begin with a start code"));
        }

        self.nal.resize(self.nal.len() + self.zeros, 0);
        self.zeros = 0;
        self.nal.push(b);
        Ok(None)
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        self.zeros = 0;
        if self.nal.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.nal))
        }
    }
}

/// Yields NAL units (without start codes) from an Annex-B stream.
pub struct AnnexBReader<R> {
    reader: R,
    state: ScanState,
}

impl<R: BufRead> AnnexBReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ScanState::default(),
        }
    }

    /// Next NAL unit, or `None` once the stream is exhausted.
    pub fn next_nal(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(self.state.finish());
            }

            let mut consumed = buf.len();
            let mut found = None;
            for (i, &b) in buf.iter().enumerate() {
                if let Some(nal) = self.state.push(b)? {
                    consumed = i + 1;
                    found = Some(nal);
                    break;
                }
            }
            self.reader.consume(consumed);

            if found.is_some() {
                return Ok(found);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    fn collect(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut reader = AnnexBReader::new(Cursor::new(bytes.to_vec()));
        let mut out = Vec::new();
        while let Some(nal) = reader.next_nal()? {
            out.push(nal);
        }
        Ok(out)
    }

    #[test]
    fn test_three_and_four_byte_start_codes() {
        let stream = [
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f, // SPS with an inner zero
            0, 0, 1, 0x68, 0xce, // PPS
            0, 0, 0, 1, 0x65, 0x88, 0x84, // IDR
        ];
        let nals = collect(&stream).unwrap();
        assert_eq!(
            nals,
            vec![
                vec![0x67, 0x42, 0x00, 0x1f],
                vec![0x68, 0xce],
                vec![0x65, 0x88, 0x84],
            ]
        );
    }

    #[test]
    fn test_trailing_zeros_and_empty_units() {
        let stream = [0, 0, 0, 0, 1, 0x09, 0x10, 0, 0, 0, 0, 1, 0, 0, 1, 0x41, 0x9a, 0, 0];
        let nals = collect(&stream).unwrap();
        assert_eq!(nals, vec![vec![0x09, 0x10], vec![0x41, 0x9a]]);
    }

    #[test]
    fn test_missing_leading_start_code() {
        assert!(matches!(collect(&[0x67, 0, 0, 1, 0x68]), Err(SessionError::Parse(_))));
        assert!(matches!(collect(&[0, 1, 0x67]), Err(SessionError::Parse(_))));
    }

    #[test]
    fn test_empty_stream() {
        assert!(collect(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_start_code_across_buffer_boundary() {
        let stream = vec![0, 0, 1, 0xAA, 0xBB, 0, 0, 1, 0xCC, 0, 0, 0, 1, 0xDD];
        // A one-byte buffer forces every start code to straddle refills
        let mut reader = AnnexBReader::new(BufReader::with_capacity(1, Cursor::new(stream)));
        let mut nals = Vec::new();
        while let Some(nal) = reader.next_nal().unwrap() {
            nals.push(nal);
        }
        assert_eq!(nals, vec![vec![0xAA, 0xBB], vec![0xCC], vec![0xDD]]);
    }

    #[test]
    fn test_exhausted_reader_stays_exhausted() {
        let mut reader = AnnexBReader::new(Cursor::new(vec![0, 0, 1, 0x65]));
        assert_eq!(reader.next_nal().unwrap(), Some(vec![0x65]));
        assert_eq!(reader.next_nal().unwrap(), None);
        assert_eq!(reader.next_nal().unwrap(), None);
    }
}
