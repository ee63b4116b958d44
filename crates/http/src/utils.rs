//! Utility macros for the HTTP crate.

/// Early-returns `Err($error)` unless `$predicate` holds.
///
/// ```text
/// ensure!(head_size <= MAX_HEADER_BYTES, ParseError::too_large_header(head_size, MAX_HEADER_BYTES));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
