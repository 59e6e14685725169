#[derive(Debug)]
pub enum Error {
    /// Disk read/write failure, including short reads on block I/O.
    Io(String),
    /// Every buffer frame is pinned; nothing can be evicted.
    NoFreeFrame,
    SchemaMismatch(String),
    TypeMismatch(String, String),
    /// Value and the unique column/index it collided in.
    DuplicateKey(String, String),
    NotFound(String),
    OptimizerDiverged,
    Config(String),
    Aborted,
    /// Originating component and diagnostic.
    Internal(String, String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(context) => write!(f, "I/O error: {context}."),
            Error::NoFreeFrame => write!(f, "No free frames: all buffer frames are pinned."),
            Error::SchemaMismatch(context) => write!(f, "Schema mismatch: {context}."),
            Error::TypeMismatch(left, right) => {
                write!(f, "Type mismatch: {left} is not comparable with {right}.")
            }
            Error::DuplicateKey(value, target) => {
                write!(f, "Duplicate value {value} for {target}.")
            }
            Error::NotFound(object) => write!(f, "{object} not found."),
            Error::OptimizerDiverged => {
                write!(f, "Optimizer did not reach a fixpoint within the pass limit.")
            }
            Error::Config(context) => write!(f, "Invalid configuration: {context}."),
            Error::Aborted => write!(f, "Transaction aborted."),
            Error::Internal(component, context) => {
                write!(f, "Internal error ({component}): {context}.")
            }
        }
    }
}
