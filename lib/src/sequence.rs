use std::fs::File;
use std::io::Read;

use needletail::errors::ParseErrorKind;
use needletail::parse_fastx_reader;

use crate::errors::{KmerError, KmerResult};

/// The residues of one sequence file, one entry per record, with header
/// lines and line breaks removed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Residues {
    pub records: Vec<Vec<u8>>,
}

impl Residues {
    pub fn total_bases(&self) -> u64 {
        self.records.iter().map(|r| r.len() as u64).sum()
    }

    /// All records joined end to end, in file order.
    pub fn concatenated(&self) -> Vec<u8> {
        self.records.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.records.iter().all(|r| r.is_empty())
    }
}

pub fn read_residues(filename: &str) -> KmerResult<Residues> {
    let file = File::open(filename).map_err(|e| KmerError::io(filename, e))?;
    read_residue_stream(file)
}

pub fn read_residue_stream<'a, R: Read + Send + 'a>(reader: R) -> KmerResult<Residues> {
    let mut fastx_reader = match parse_fastx_reader(reader) {
        Ok(r) => r,
        // an empty file is a valid (if boring) genome
        Err(e) if matches!(e.kind, ParseErrorKind::EmptyFile) => return Ok(Residues::default()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    while let Some(record) = fastx_reader.next() {
        let seqrec = record?;
        records.push(seqrec.seq().into_owned());
    }
    Ok(Residues { records })
}
