use thiserror::Error;

/// Local input rejected before anything is sent to the loom.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("liftplan name cannot be empty")]
    EmptyName,
    #[error("liftplan file name '{name}' is {len} bytes, limit is {max}")]
    NameTooLong { name: String, len: usize, max: usize },
    #[error("invalid hex byte '{value}'")]
    InvalidHexByte { value: String },
    #[error("row {row}: invalid hex byte '{value}'")]
    InvalidPlanRow { row: usize, value: String },
    #[error("invalid row pattern '{value}': expected 8 cells of 0/1 or ./#")]
    InvalidRowPattern { value: String },
    #[error("shaft {shaft} out of range (1..={max})")]
    ShaftOutOfRange { shaft: usize, max: usize },
    #[error("row {row} out of range (plan has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },
    #[error("no liftplan selected")]
    NoSelection,
    #[error("start position {position} out of range (plan has {len} rows)")]
    StartPositionOutOfRange { position: u32, len: usize },
    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },
    #[error("invalid base64 password: {0}")]
    InvalidPassword(String),
}
