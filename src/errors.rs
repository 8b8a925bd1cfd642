use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LexerError {
    #[error("Unexpected character: {0:?}")]
    UnexpectedCharacter(String),

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Unterminated comment")]
    UnterminatedComment,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("{0} without matching $IF/$IFDEF")]
    Unbalanced(String),

    #[error("Unterminated conditional block opened by {0}")]
    Unterminated(String),

    #[error("Invalid $IF expression: {0}")]
    InvalidExpression(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParserError {
    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Unexpected end of file, expected {0}")]
    UnexpectedEof(String),

    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),
}

/// Invalid rule configuration. Disables the offending rule only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown rule '{0}'")]
    UnknownRule(String),

    #[error("Unknown rule template '{0}'")]
    UnknownTemplate(String),

    #[error("Missing required property '{0}'")]
    MissingProperty(String),

    #[error("Invalid regular expression in '{property}': {message}")]
    InvalidRegex { property: String, message: String },

    #[error("Invalid glob in '{property}': {message}")]
    InvalidGlob { property: String, message: String },

    #[error("Invalid integer in '{property}': {value}")]
    InvalidInteger { property: String, value: String },

    #[error("Invalid boolean in '{property}': {value}")]
    InvalidBoolean { property: String, value: String },

    #[error("Invalid query in '{property}': {source}")]
    InvalidQuery {
        property: String,
        #[source]
        source: QueryError,
    },

    #[error("Invalid configuration document: {0}")]
    InvalidDocument(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unexpected character {0:?} at offset {1}")]
    UnexpectedCharacter(char, usize),

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Unexpected token {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Unknown axis '{0}'")]
    UnknownAxis(String),

    #[error("Function '{name}' expects {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Function '{0}' requires a typed node")]
    UntypedNode(String),

    #[error("Argument {index} of '{name}' must be {expected}")]
    ArgumentKind {
        name: String,
        index: usize,
        expected: &'static str,
    },
}

/// Abnormal end of a single file's analysis.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Analysis exceeded the per-file time limit of {0} ms")]
    TimedOut(u64),

    #[error("Internal error while analysing file: {0}")]
    Internal(String),
}
