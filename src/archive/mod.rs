//! The `.fqc` container: on-disk layout, writer session, reader session.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{BlockHeader, Footer, GlobalHeader, IndexEntry};
pub use reader::ReaderSession;
pub use writer::WriterSession;
