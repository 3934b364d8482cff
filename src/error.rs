use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Insufficient overlap between the input images: {0}")]
    InsufficientOverlap(String),
    #[error("Input projections are not equal ({reference} / {target}). Different projections are currently not supported.")]
    UnequalProjections { reference: String, target: String },
    #[error("The window position {x}/{y} is outside of the overlap area of the two input images. Check the coordinates.")]
    WindowOutsideOverlap { x: f64, y: f64 },
    #[error(
        "According to the provided bad data mask for the {image} image the window position {x}/{y} is within a bad data area. Provide a better window position."
    )]
    WindowInBadData { image: String, x: f64, y: f64 },
    #[error("The matching window became too small for calculating a reliable match: {0}")]
    WindowTooSmall(String),
    #[error("Unable to shrink the matching window to fit into the overlap area: {0}")]
    ShrinkageDeadlock(String),
    #[error("No match found in the given window after {0} iterations.")]
    NoMatchFound(usize),
    #[error(
        "The calculated shift (X: {x} px / Y: {y} px) is recognized as too large to be valid (max: {max_shift} px). Consider using a different window size or position for matching."
    )]
    ShiftTooLarge { x: f64, y: f64, max_shift: f64 },
    #[error("Matching window shapes at position {x}/{y} do not match: {match_size} <-> {other_size}")]
    WindowMismatch {
        x: f64,
        y: f64,
        match_size: String,
        other_size: String,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}
