//! Error codes and condition macros
//!
//! Two classes of failure exist in this crate:
//!
//! - **Recoverable**: a bad argument to a mutating operation, a null input or
//!   an allocation failure. The operation reports a [`Diagnostic`] and returns
//!   `Err(ErrorCode)`, leaving the container as it was before the call.
//! - **Fatal**: out-of-bounds element access and broken invariants. There is no
//!   sensible value to hand back for an arbitrary element type, so the
//!   diagnostic is reported and the process panics or aborts (see
//!   [`FatalAction`](crate::config::FatalAction)).
//!
//! The macros below attach file, line and module provenance to every report.
//!
//! [`Diagnostic`]: crate::diagnostics::Diagnostic

use std::fmt;

/// Result codes shared by the engine layers.
///
/// Each code has a fixed human-readable message, see [`ErrorCode::message`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok = 0,
    Failed,
    Unavailable,
    InvalidParameter,
    OutOfMemory,
    Null,
    CantFind,
    CantCreate,
    FileNotFound,
    FileCantAccess,
    Help,
}

const ERROR_MESSAGES: [&str; ErrorCode::COUNT] = [
    "OK",
    "Failed",
    "Unavailable",
    "Invalid parameter",
    "Out of memory",
    "Item was null",
    "Can't find",
    "Can't create",
    "File not found",
    "File can't be accessed",
    "Help",
];

impl ErrorCode {
    pub const COUNT: usize = 11;

    pub const ALL: [ErrorCode; ErrorCode::COUNT] = [
        ErrorCode::Ok,
        ErrorCode::Failed,
        ErrorCode::Unavailable,
        ErrorCode::InvalidParameter,
        ErrorCode::OutOfMemory,
        ErrorCode::Null,
        ErrorCode::CantFind,
        ErrorCode::CantCreate,
        ErrorCode::FileNotFound,
        ErrorCode::FileCantAccess,
        ErrorCode::Help,
    ];

    /// Human-readable message for this code.
    pub fn message(self) -> &'static str {
        ERROR_MESSAGES[self as usize]
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(code: u32) -> Option<ErrorCode> {
        Self::ALL.get(code as usize).copied()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ErrorCode {}

/// Report a failed condition and return `Err(code)` from the enclosing function.
///
/// ```ignore
/// ensure!(index <= self.len(), ErrorCode::InvalidParameter, "insert index out of range");
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $code:expr, $($msg:tt)+) => {
        if !($cond) {
            let code = $code;
            $crate::diagnostics::report($crate::diagnostics::Diagnostic::new(
                $crate::diagnostics::Severity::Error,
                concat!("Condition \"", stringify!($cond), "\" was false."),
                format!($($msg)+),
                code,
                file!(),
                line!(),
                module_path!(),
            ));
            return Err(code);
        }
    };
}

/// Report an unconditional failure and return `Err(code)`.
#[macro_export]
macro_rules! fail {
    ($code:expr, $($msg:tt)+) => {{
        let code = $code;
        $crate::diagnostics::report($crate::diagnostics::Diagnostic::new(
            $crate::diagnostics::Severity::Error,
            "Operation failed.",
            format!($($msg)+),
            code,
            file!(),
            line!(),
            module_path!(),
        ));
        return Err(code);
    }};
}

/// Report a recoverable index error and return `Err(code)` when
/// `index >= len`.
#[macro_export]
macro_rules! ensure_index {
    ($index:expr, $len:expr, $code:expr) => {{
        let (index, len) = ($index, $len);
        if index >= len {
            let code = $code;
            $crate::diagnostics::report(
                $crate::diagnostics::Diagnostic::new(
                    $crate::diagnostics::Severity::Error,
                    "Index given was out of bounds.",
                    String::new(),
                    code,
                    file!(),
                    line!(),
                    module_path!(),
                )
                .with_index(index, len),
            );
            return Err(code);
        }
    }};
}

/// Abort the current operation with a fatal diagnostic. Never returns.
#[macro_export]
macro_rules! fatal {
    ($($msg:tt)+) => {
        $crate::diagnostics::fatal($crate::diagnostics::Diagnostic::new(
            $crate::diagnostics::Severity::Fatal,
            "A fatal error has occurred.",
            format!($($msg)+),
            $crate::error::ErrorCode::Failed,
            file!(),
            line!(),
            module_path!(),
        ))
    };
}

/// Fatal bounds check for direct element access.
#[macro_export]
macro_rules! index_or_fatal {
    ($index:expr, $len:expr) => {{
        let (index, len) = ($index, $len);
        if index >= len {
            $crate::diagnostics::fatal(
                $crate::diagnostics::Diagnostic::new(
                    $crate::diagnostics::Severity::Fatal,
                    "Index given was out of bounds.",
                    String::new(),
                    $crate::error::ErrorCode::InvalidParameter,
                    file!(),
                    line!(),
                    module_path!(),
                )
                .with_index(index, len),
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{clear_last_diagnostic, take_last_diagnostic};

    fn checked_half(n: i64) -> Result<i64, ErrorCode> {
        ensure!(n % 2 == 0, ErrorCode::InvalidParameter, "{} is odd", n);
        Ok(n / 2)
    }

    fn lookup(index: usize) -> Result<u8, ErrorCode> {
        let table = [1u8, 2, 3];
        ensure_index!(index, table.len(), ErrorCode::CantFind);
        Ok(table[index])
    }

    #[test]
    fn test_messages_are_parallel_to_codes() {
        assert_eq!(ErrorCode::Ok.message(), "OK");
        assert_eq!(ErrorCode::OutOfMemory.message(), "Out of memory");
        assert_eq!(ErrorCode::Null.message(), "Item was null");
        assert_eq!(ErrorCode::FileCantAccess.message(), "File can't be accessed");
        assert_eq!(ErrorCode::Help.message(), "Help");
        for (i, code) in ErrorCode::ALL.iter().enumerate() {
            assert_eq!(code.as_u32() as usize, i);
            assert_eq!(ErrorCode::from_u32(i as u32), Some(*code));
        }
        assert_eq!(ErrorCode::from_u32(ErrorCode::COUNT as u32), None);
    }

    #[test]
    fn test_display_uses_message() {
        assert_eq!(ErrorCode::CantFind.to_string(), "Can't find");
        assert!(ErrorCode::Ok.is_ok());
        assert!(!ErrorCode::Failed.is_ok());
    }

    #[test]
    fn test_ensure_reports_and_returns_code() {
        clear_last_diagnostic();
        assert_eq!(checked_half(4), Ok(2));
        assert!(take_last_diagnostic().is_none());

        assert_eq!(checked_half(3), Err(ErrorCode::InvalidParameter));
        let diag = take_last_diagnostic().expect("diagnostic recorded");
        assert_eq!(diag.code, ErrorCode::InvalidParameter);
        assert!(diag.condition.contains("n % 2 == 0"));
        assert_eq!(diag.message, "3 is odd");
        assert!(diag.file.ends_with("error.rs"));
    }

    #[test]
    fn test_ensure_index_records_index_and_len() {
        clear_last_diagnostic();
        assert_eq!(lookup(1), Ok(2));
        assert_eq!(lookup(7), Err(ErrorCode::CantFind));
        let diag = take_last_diagnostic().expect("diagnostic recorded");
        assert_eq!(diag.index, Some((7, 3)));
    }
}
