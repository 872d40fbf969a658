//! Service layer separating byte-level image I/O from the pipeline

pub mod io;

pub use io::ImageIOService;
