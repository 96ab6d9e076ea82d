//! # xdrz - Drizzle Registration Data for Rust
//!
//! `xdrz` reads and writes XDRZ drizzle registration data files: the
//! XML-based metadata records that carry one source image's alignment
//! transform and integration statistics between astronomical image
//! registration and integration tools.
//!
//! ## Key Features
//!
//! - **Complete XDRZ v1.0 support**: projective alignment matrices,
//!   surface spline pairs, per-channel integration statistics, and
//!   compressed per-pixel rejection maps.
//!
//! - **Legacy format compatibility**: transparently reads the pre-XDRZ
//!   plain-text block format still found in older datasets; the format is
//!   sniffed from the file content, not the extension.
//!
//! - **Self-contained XML engine**: a streaming parser and serializer with
//!   selective parsing, so a multi-megabyte rejection map can be skipped
//!   entirely when only the registration metadata is needed.
//!
//! - **Strict validation**: structural invariants (geometry, transform
//!   exclusivity, channel congruence, spline coefficient counts) are
//!   enforced on both read and write; a parsed record is either fully
//!   consistent or an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xdrz::drizzle::DrizzleData;
//!
//! // Read a drizzle data file (XDRZ XML or legacy plain text).
//! let data = DrizzleData::parse("light_0001.xdrz")?;
//! println!("source: {}", data.source_file_path);
//! println!("geometry: {}x{}", data.reference_width, data.reference_height);
//!
//! // Build and write a record.
//! let mut out = DrizzleData::new();
//! out.source_file_path = "/data/light_0002.fit".to_string();
//! out.reference_width = 4096;
//! out.reference_height = 4096;
//! out.alignment_matrix = Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
//! out.serialize_to_file("light_0002.xdrz")?;
//! # Ok::<(), xdrz::drizzle::DrizzleError>(())
//! ```
//!
//! ## Skipping integration data
//!
//! ```rust,no_run
//! use xdrz::drizzle::{DrizzleData, DrizzleParserOptions};
//!
//! let options = DrizzleParserOptions {
//!     ignore_integration_data: true,
//!     ..Default::default()
//! };
//! let data = DrizzleData::parse_with_options("light_0001.xdrz", options)?;
//! assert!(data.rejection_map.is_none());
//! # Ok::<(), xdrz::drizzle::DrizzleError>(())
//! ```
//!
//! ## Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`xml`]: the XML document model, streaming parser and serializer
//! - [`drizzle`]: the [`DrizzleData`](drizzle::DrizzleData) record with its
//!   two format codecs
//! - [`compression`]: subblock compression for rejection map channel data

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod compression;
pub mod drizzle;
pub mod xml;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::compression::{CompressionCodec, CompressionError, Subblock};
    pub use crate::drizzle::{
        DrizzleData, DrizzleError, DrizzleParserOptions, RejectionMap, SurfaceSpline,
        REJECT_HIGH, REJECT_LOW, XDRZ_VERSION,
    };
    pub use crate::xml::{
        XmlAttributeList, XmlDocument, XmlElement, XmlElementFilter, XmlError, XmlFormatOptions,
        XmlNode, XmlParserOptions,
    };
}
