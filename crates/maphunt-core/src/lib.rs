pub mod proc_maps;
pub mod report;
pub mod watch;

pub use report::{MappingRecord, MappingReport, ParseError, parse_report};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    ProcMaps(#[from] proc_maps::ProcMapsError),
    #[error("Failed to read the memory maps: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse address field {0:?} as a hexadecimal number")]
    InvalidAddressField(String),
    #[error("Watch expressions must not be empty")]
    EmptyExpression,
}

pub type Result<T> = std::result::Result<T, Error>;
