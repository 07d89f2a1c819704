//! Petrel is a best-effort decoder for Portable Executable images.
//!
//! The input is assumed to be adversarial: fuzzed, truncated, or hand-crafted
//! malicious binaries are the primary use case. Decoding therefore never
//! dereferences memory outside the bounds-checked [`cursor::Cursor`], and a
//! malformed region of the file never aborts decoding of the rest. The
//! caller always receives a [`pe::Binary`] object model, together with the
//! list of failures that were absorbed along the way.
//!
//! ```no_run
//! let data = std::fs::read("sample.exe").unwrap();
//! let binary = petrel::Binary::decode(&data);
//! for import in binary.imports() {
//!     println!("{} ({} entries)", import.name, import.entries.len());
//! }
//! ```

/// Bounds-checked byte cursor over the raw image
pub mod cursor;
/// Error types shared by all decode stages
pub mod error;
/// Tracing subscriber setup
pub mod logging;
/// PE object model and decode pipeline
pub mod pe;

pub use cursor::Cursor;
pub use error::{DecodeError, Result};
pub use pe::Binary;
