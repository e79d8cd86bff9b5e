use crate::pathid::LineId;
use std::{convert::From, fmt};

/// Simple custom Error for the assembler. Every fatal diagnostic flows up to `main` as one of these.
pub struct Error {
    pub kind: ErrorKind,
    pub line: Option<LineId>,
    pub msg: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    /// malformed or inconsistent ISA configuration
    Config,
    /// error in syntax of assembly code
    Syntax,
    /// duplicate, misplaced or unresolved label
    Label,
    /// no configured instruction variant accepts the operands
    Operand,
    /// a value falls outside of its allowed range
    Range,
    /// include file missing, ambiguous or included twice
    Include,
    /// two emitted objects claim the same address
    Overlap,
    /// malformed or failing preprocessor directive
    Preprocessor,
    /// underlying io error
    IO,
    /// a warning promoted to an error
    Warning,
    /// catch-all for other errors
    General,
}

impl Error {
    pub fn new(kind: ErrorKind, line: Option<&LineId>, message: &str) -> Error {
        Error {
            kind,
            line: line.cloned(),
            msg: String::from(message),
        }
    }
    /// Attach a line identifier if the error doesn't already carry one.
    pub fn at(mut self, line: &LineId) -> Error {
        if self.line.is_none() {
            self.line = Some(line.clone());
        }
        self
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self { Error::new(ErrorKind::IO, None, e.to_string().as_str()) }
}
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Error::new(ErrorKind::Config, None, e.to_string().as_str()) }
}
impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self { Error::new(ErrorKind::Config, None, e.to_string().as_str()) }
}
impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self { Error::new(ErrorKind::Config, None, e.to_string().as_str()) }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({:?}): {}", red!("bespokeasm::Error"), self.kind, self)
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(line) = self.line.as_ref() {
            write!(f, "{} {} - {}", red!("ERROR:"), line, self.msg)
        } else {
            write!(f, "{} {}", red!("ERROR:"), self.msg)
        }
    }
}
impl std::error::Error for Error {}
