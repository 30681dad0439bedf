//! Stimulus files: the bus cycles a scripted processor should
//! perform, as a JSON array.
//!
//! ```json
//! [
//!   { "kind": "MemWrite", "address": 4096, "data": 4660, "bhe": true },
//!   { "kind": "IoRead", "address": 760 }
//! ]
//! ```
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bus::sim::ScriptedCycle;

#[derive(Debug)]
pub enum StimulusError {
    Read { path: PathBuf, error: io::Error },
    Parse(serde_json::Error),
}

impl Display for StimulusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            StimulusError::Read { path, error } => {
                write!(f, "failed to read stimulus file {}: {error}", path.display())
            }
            StimulusError::Parse(e) => write!(f, "invalid stimulus: {e}"),
        }
    }
}

impl Error for StimulusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StimulusError::Read { error, .. } => Some(error),
            StimulusError::Parse(e) => Some(e),
        }
    }
}

pub fn parse_stimulus(text: &str) -> Result<Vec<ScriptedCycle>, StimulusError> {
    serde_json::from_str(text).map_err(StimulusError::Parse)
}

pub fn load_stimulus(path: &Path) -> Result<Vec<ScriptedCycle>, StimulusError> {
    let text = fs::read_to_string(path).map_err(|error| StimulusError::Read {
        path: path.to_path_buf(),
        error,
    })?;
    parse_stimulus(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::prelude::*;
    use bus::sim::CycleKind;

    #[test]
    fn test_parse() {
        let script = parse_stimulus(
            r#"[{"kind": "IoWrite", "address": 760, "data": 65},
                {"kind": "AddressOnly", "address": 16}]"#,
        )
        .expect("stimulus is valid");
        assert_eq!(script[0], ScriptedCycle::io_write(COM_PORT, 0x41));
        assert_eq!(script[1].kind, CycleKind::AddressOnly);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_stimulus(r#"[{"kind": "Halt", "address": 0}]"#),
            Err(StimulusError::Parse(_))
        ));
        assert!(matches!(
            parse_stimulus(r#"[{"kind": "IoRead"}]"#),
            Err(StimulusError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/nonexistent/stimulus.json");
        match load_stimulus(path) {
            Err(StimulusError::Read { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected a read error, got {other:?}"),
        }
    }
}
