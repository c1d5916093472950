//! Rich diagnostic error types for topograph.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so users know exactly what went wrong and
//! how to fix it. `GraphError::Aborted` is the one deliberate exception: it is a
//! control-flow signal for no-op mutations, caught inside the state manager and
//! never shown to a user.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the topograph engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source chains) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum TopoError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Paths(#[from] crate::paths::PathError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("no node matches id prefix \"{prefix}\"")]
    #[diagnostic(
        code(topograph::graph::not_found),
        help(
            "The prefix did not resolve to any node id. \
             List nodes with `topograph list` to see their short ids."
        )
    )]
    NotFound { prefix: String },

    #[error("id prefix \"{prefix}\" is ambiguous: {matches} nodes match")]
    #[diagnostic(
        code(topograph::graph::ambiguous_prefix),
        help("Provide more characters of the id until exactly one node matches.")
    )]
    AmbiguousPrefix { prefix: String, matches: usize },

    #[error("invalid status \"{given}\"")]
    #[diagnostic(
        code(topograph::graph::invalid_status),
        help("Expected \"active\", \"done\", or \"unset\".")
    )]
    InvalidStatus { given: String },

    #[error("invalid node type \"{given}\"")]
    #[diagnostic(
        code(topograph::graph::invalid_type),
        help("Expected \"task\", \"goal\", \"project\", or \"problem\".")
    )]
    InvalidKind { given: String },

    #[error("invalid priority \"{given}\"")]
    #[diagnostic(
        code(topograph::graph::invalid_priority),
        help("Priority is a small integer, 0 (most urgent) through 4.")
    )]
    InvalidPriority { given: String },

    #[error("invalid edge id \"{given}\"")]
    #[diagnostic(
        code(topograph::graph::invalid_edge_id),
        help("Edge ids have the form \"{{fromId}}--{{toId}}\".")
    )]
    InvalidEdgeId { given: String },

    /// Control-flow signal: the mutation would not change anything, so the
    /// caller should skip persistence and downstream notification. Not an
    /// error path; the state manager catches this and resolves normally.
    #[error("mutation aborted: no-op")]
    #[diagnostic(code(topograph::graph::aborted))]
    Aborted,
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(topograph::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(topograph::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption — try running with a fresh data directory."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(topograph::store::serde),
        help(
            "Failed to serialize or deserialize a stored document. \
             The stored data format may have changed between versions; \
             restore from a backup key if one exists."
        )
    )]
    Serialization { message: String },

    #[error("key not found: {key}")]
    #[diagnostic(
        code(topograph::store::not_found),
        help("The requested key does not exist in the store. Verify the key is correct.")
    )]
    NotFound { key: String },
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CommandError {
    #[error("unknown command \"{name}\"")]
    #[diagnostic(
        code(topograph::command::unknown),
        help(
            "Known commands: add, delete, child, status, done, active, unset, \
             p0..p4, pin, unpin, type, layout, focus, unfocus, hide, show, backup."
        )
    )]
    Unknown { name: String },

    #[error("command \"{command}\" is missing its {arg} argument")]
    #[diagnostic(
        code(topograph::command::missing_argument),
        help("Select a node first, or pass the argument explicitly.")
    )]
    MissingArgument {
        command: &'static str,
        arg: &'static str,
    },

    #[error("too many arguments for command \"{command}\"")]
    #[diagnostic(
        code(topograph::command::extra_arguments),
        help("This command takes at most {max} positional argument(s).")
    )]
    ExtraArguments { command: &'static str, max: usize },

    #[error("expected \"parent\" or \"child\", got \"{given}\"")]
    #[diagnostic(
        code(topograph::command::invalid_keyword),
        help("The connection keyword selects which side of the new edge the anchor is on.")
    )]
    InvalidConnection { given: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(topograph::config::read),
        help("Check that the file exists and is readable, or delete it to use defaults.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file: {path}")]
    #[diagnostic(
        code(topograph::config::parse),
        help("The file must be valid TOML. {message}")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config file: {path}")]
    #[diagnostic(
        code(topograph::config::write),
        help("Check that the directory exists and you have write permissions.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for functions returning topograph results.
pub type TopoResult<T> = std::result::Result<T, TopoError>;
