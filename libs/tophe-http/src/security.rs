//! Limits applied to data kept around for diagnostics.

/// Maximum number of bytes of parser input kept in a [`ParserError`](crate::ParserError).
///
/// A failing transform stage records a prefix of the data it received so the
/// error can be inspected without holding on to arbitrarily large bodies.
pub const SOURCE_DATA_LIMIT: usize = 8 * 1024;

/// Maximum decoded size of a non-2xx body inspected by the error classifier.
pub const ERROR_BODY_DECODE_LIMIT: usize = 64 * 1024;
