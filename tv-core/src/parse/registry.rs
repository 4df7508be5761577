use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::{EngineError, Result};

use super::{
    BracketPlcParser, CsvParser, LogParser, McsAmhsParser, TabPlcParser, SNIFF_HEAD_BYTES,
};

/// Dispatches a file to the first registered [`LogParser`] whose `can_parse` predicate matches a
/// sniffed head of the file (spec.md §4.3 "Sniffing"). Registration order is the tie-break.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn LogParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self { parsers: Vec::new() }
    }

    pub fn register(&mut self, parser: Arc<dyn LogParser>) -> &mut Self {
        self.parsers.push(parser);
        self
    }

    /// Reads up to [`SNIFF_HEAD_BYTES`] of `path` and returns the first matching parser, or
    /// `Ok(None)` if no registered dialect recognizes it.
    pub fn find_parser(&self, path: &Path) -> Result<Option<Arc<dyn LogParser>>> {
        let head = read_head(path)?;
        Ok(self.parsers.iter().find(|p| p.can_parse(&head)).cloned())
    }

    pub fn find_parser_or_err(&self, path: &Path) -> Result<Arc<dyn LogParser>> {
        self.find_parser(path)?.ok_or_else(|| {
            EngineError::ParseFatal(format!(
                "no registered parser recognizes {}",
                path.display()
            ))
        })
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry used throughout the ingestion engine: bracket-PLC first (it is the dominant,
/// highest-volume format), then tab-delimited PLC, then MCS/AMHS, then generic CSV as the
/// catch-all.
pub fn default_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    registry
        .register(Arc::new(BracketPlcParser))
        .register(Arc::new(TabPlcParser))
        .register(Arc::new(McsAmhsParser))
        .register(Arc::new(CsvParser));
    registry
}

fn read_head(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; SNIFF_HEAD_BYTES];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn dispatches_bracket_plc_files_to_the_bracket_parser() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "2024-01-01 00:00:00.000 [INFO] [SYS/DEV-1] [key:Running] (Boolean) : true"
        )
        .unwrap();

        let registry = default_registry();
        let parser = registry.find_parser_or_err(&path).unwrap();
        assert_eq!(parser.name(), "bracket-plc");
    }

    #[test]
    fn unrecognized_content_yields_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, [0xFFu8, 0x00, 0x01, 0x02]).unwrap();

        let registry = default_registry();
        assert!(registry.find_parser(&path).unwrap().is_none());
    }
}
