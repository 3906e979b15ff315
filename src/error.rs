use thiserror::Error;

use crate::oracle::OracleError;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Parse`] - The script (or a re-printed intermediate script) could not be parsed
///
/// ## Internal Errors
/// - [`Error::Malformed`] - A rule met a node shape it did not expect
/// - [`Error::RecursionLimit`] - Maximum nesting depth exceeded while walking a tree
///
/// ## Evaluation Errors
/// - [`Error::Oracle`] - Sandboxed evaluation failed where the failure has to be surfaced
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust
/// use unravel::{Deobfuscator, Error};
///
/// let mut deob = Deobfuscator::new("var a = ;", true);
/// match deob.deobfuscate(false) {
///     Ok(changed) => println!("changed: {changed}"),
///     Err(Error::Parse { message, offset }) => eprintln!("parse error at {offset}: {message}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The source text could not be parsed as a script.
    ///
    /// Raised for the initial input and for re-parsing the printed output of a commit.
    /// The offset is a byte offset into the text handed to the parser.
    #[error("Parse error at offset {offset}: {message}")]
    Parse {
        /// Parser diagnostic
        message: String,
        /// Byte offset of the offending token
        offset: usize,
    },

    /// A node did not have the shape a transformation expected.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Recursion limit reached.
    ///
    /// Deeply nested input (or evaluation results) is rejected rather than
    /// risking a stack overflow. The associated value is the limit.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The evaluation oracle failed.
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
