use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The obfuscation level is outside the supported 1..=5 range.
    #[error("invalid obfuscation level {0} (expected 1..=5)")]
    InvalidLevel(u32),
    /// An option was present in the configuration file but is not recognized.
    #[error("unknown configuration option: {0}")]
    UnknownOption(String),
    /// The ledger RPC endpoint could not be parsed as a URL.
    #[error("malformed RPC endpoint: {0}")]
    MalformedEndpoint(String),
    /// A numeric option is outside its valid range.
    #[error("option {option} out of range: {message}")]
    OutOfRange { option: String, message: String },
    /// Reading or parsing the configuration file failed.
    #[error("could not read configuration '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON.
    #[error("configuration parse error: {0}")]
    Parse(String),
}

/// Error type for structural violations of the IR invariants.
#[derive(Debug, Error)]
pub enum IrError {
    /// A non-declaration function has no basic blocks.
    #[error("function '{0}' has a body but no basic blocks")]
    EmptyFunction(String),
    /// The entry block of a function has predecessors.
    #[error("entry block of '{0}' has predecessors")]
    EntryHasPredecessors(String),
    /// A terminator names a block that does not exist in the function.
    #[error("function '{func}': block '{block}' targets an unknown block")]
    UnknownSuccessor { func: String, block: String },
    /// A phi node's incoming blocks do not match the block's predecessors.
    #[error("function '{func}': phi in block '{block}' disagrees with its predecessor set")]
    PhiPredecessorMismatch { func: String, block: String },
    /// An operand references an instruction that is not placed in any block.
    #[error("function '{func}': use of undefined value in block '{block}'")]
    UndefinedValue { func: String, block: String },
    /// An operand references a parameter index past the function arity.
    #[error("function '{func}': parameter index {index} out of range")]
    ParamOutOfRange { func: String, index: u32 },
    /// An operand references a global that has been removed from the module.
    #[error("function '{func}': use of removed global")]
    DanglingGlobal { func: String },
    /// Two blocks in the same function share a label.
    #[error("function '{func}': duplicate block label '{label}'")]
    DuplicateLabel { func: String, label: String },
    /// An instruction is listed in more than one block.
    #[error("function '{func}': instruction placed in multiple blocks")]
    DuplicatePlacement { func: String },
    /// A phi node appears outside the phi section of a block.
    #[error("function '{func}': phi outside block head in '{block}'")]
    MisplacedPhi { func: String, block: String },
}

/// Error type for the source-to-IR frontend contract.
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("could not read source '{path}': {source}")]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("lowering failed: {0}")]
    Lowering(String),
}

/// Error type for the IR-to-native backend contract.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not write artifact '{path}': {source}")]
    ArtifactWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("code generation failed: {0}")]
    Codegen(String),
}

/// Error type for obfuscation transforms.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A transform left the module in an invariant-violating state.
    #[error("IR invariant violated: {0}")]
    Invariant(#[from] IrError),
    /// A transform was asked to run against a module it cannot handle.
    #[error("unsupported module shape: {0}")]
    Unsupported(String),
    /// Generic transform failure.
    #[error("transform failed: {0}")]
    Generic(String),
}

/// Error type for the evolutionary optimizer.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Population or generation parameters do not permit a search.
    #[error("invalid search parameters: {0}")]
    InvalidParams(String),
    /// A fitness trial failed; the genome is assigned fitness zero.
    #[error("fitness evaluation failed: {0}")]
    Evaluation(String),
    /// A transform failed while being applied to a fitness clone.
    #[error("transform failed during fitness trial: {0}")]
    Transform(#[from] TransformError),
}
