//! # Drizzle registration data records
//!
//! A [`DrizzleData`] record holds one source image's registration and
//! integration metadata: file paths, reference geometry, an alignment
//! transform (a 3x3 projective matrix or a pair of surface splines),
//! per-channel statistics and an optional compressed per-pixel rejection
//! bitmap.
//!
//! Records round-trip through two wire formats:
//!
//! - **XDRZ v1.0**: an XML document with root element `xdrz`; the current
//!   format, produced by [`DrizzleData::serialize`].
//! - **Legacy plain text**: a whitespace-insensitive sequence of `Id{...}`
//!   blocks; read-only, kept for backward compatibility with files written
//!   by older tools.
//!
//! [`DrizzleData::parse`] sniffs the format from the first non-whitespace
//! character and dispatches accordingly.

mod legacy;
mod reader;
mod rejection;
mod spline;
mod vectors;
mod writer;

pub use rejection::{RejectionMap, REJECT_HIGH, REJECT_LOW};
pub use spline::SurfaceSpline;
pub use writer::XDRZ_VERSION;

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::compression::CompressionError;
use crate::xml::{XmlAttributeList, XmlDocument, XmlElementFilter, XmlError, XmlParserOptions};

/// Errors raised by the drizzle data layer.
#[derive(Debug, thiserror::Error)]
pub enum DrizzleError {
    /// The underlying XML document is malformed.
    #[error("XML parsing error: {0}")]
    Xml(#[from] XmlError),

    /// File read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed Base64 payload.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Subblock decompression failure.
    #[error("Decompression error: {0}")]
    Compression(#[from] CompressionError),

    /// The file contains no data at all.
    #[error("Empty drizzle data file")]
    EmptyFile,

    /// A structural or semantic violation.
    #[error("{0}")]
    InvalidData(String),

    /// A failure while parsing one recognized element, annotated with the
    /// element name.
    #[error("Parsing {element} element: {source}")]
    Element {
        /// Name of the element being parsed.
        element: String,
        /// Underlying failure.
        source: Box<DrizzleError>,
    },

    /// A failure in the legacy plain-text decoder, annotated with the byte
    /// offset of the item being decoded.
    #[error("Parsing plain text drizzle data (offset {offset}): {message}")]
    PlainText {
        /// Description of the problem.
        message: String,
        /// Byte offset of the offending item.
        offset: usize,
    },
}

/// Parse-time behavior switches for [`DrizzleData::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrizzleParserOptions {
    /// Propagate the first failure inside a recognized element. When
    /// disabled, such failures are logged and the element is skipped; the
    /// aggregate structural checks after the walk still apply. Unknown
    /// elements are skipped with a warning in both modes.
    pub strict: bool,
    /// Skip integration statistics and the rejection map entirely. The
    /// corresponding subtrees are pruned at XML parse time via an element
    /// filter, so a large rejection map is never materialized.
    pub ignore_integration_data: bool,
}

impl Default for DrizzleParserOptions {
    fn default() -> Self {
        Self {
            strict: true,
            ignore_integration_data: false,
        }
    }
}

/// Elements carrying integration data, prunable via
/// [`DrizzleParserOptions::ignore_integration_data`].
const INTEGRATION_ELEMENTS: &[&str] = &[
    "LocationEstimates",
    "ReferenceLocation",
    "ScaleFactors",
    "Weights",
    "RejectionMap",
];

struct IntegrationDataFilter;

impl XmlElementFilter for IntegrationDataFilter {
    fn accept_name(&mut self, name: &str) -> bool {
        !INTEGRATION_ELEMENTS.contains(&name)
    }

    fn accept(&mut self, _name: &str, _attributes: &XmlAttributeList) -> bool {
        true
    }
}

/// One source image's drizzle registration and integration metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrizzleData {
    /// Path of the source (registered) image. Required.
    pub source_file_path: String,
    /// Path of the mosaiced/CFA source image, when drizzle works from raw
    /// frames.
    pub cfa_source_file_path: Option<String>,
    /// CFA mosaic pattern, e.g. "RGGB".
    pub cfa_source_pattern: Option<String>,
    /// Path of the registration target image, when recorded.
    pub align_target_file_path: Option<String>,
    /// Width of the registration reference image in pixels, >= 1.
    pub reference_width: i32,
    /// Height of the registration reference image in pixels, >= 1.
    pub reference_height: i32,
    /// 3x3 projective alignment matrix, row-major. Mutually exclusive with
    /// the spline pair.
    pub alignment_matrix: Option<[f64; 9]>,
    /// X-axis alignment surface spline.
    pub alignment_spline_x: Option<SurfaceSpline>,
    /// Y-axis alignment surface spline.
    pub alignment_spline_y: Option<SurfaceSpline>,
    /// Per-channel location estimates of the source image.
    pub location: Vec<f64>,
    /// Per-channel location estimates of the integration reference.
    pub reference_location: Vec<f64>,
    /// Per-channel scale factors.
    pub scale: Vec<f64>,
    /// Per-channel image weights.
    pub weight: Vec<f64>,
    /// Per-channel count of low-rejected pixels, recomputed from the map.
    pub rejection_low_count: Vec<u64>,
    /// Per-channel count of high-rejected pixels, recomputed from the map.
    pub rejection_high_count: Vec<u64>,
    /// Per-pixel rejection bitmap.
    pub rejection_map: Option<RejectionMap>,
    /// Timestamp of serialization, when known.
    pub creation_time: Option<DateTime<Utc>>,
    /// Compress rejection map channel data on serialization.
    pub compression_enabled: bool,

    // Decode-only staging for the legacy format: per-channel rejected pixel
    // coordinates, folded into the rejection map and cleared.
    pub(crate) reject_low_data: Vec<Vec<(i32, i32)>>,
    pub(crate) reject_high_data: Vec<Vec<(i32, i32)>>,
}

impl DrizzleData {
    /// An empty record with compression enabled.
    pub fn new() -> Self {
        Self {
            compression_enabled: true,
            ..Self::default()
        }
    }

    /// True when an alignment matrix is present.
    pub fn has_matrix(&self) -> bool {
        self.alignment_matrix.is_some()
    }

    /// True when a valid spline pair is present.
    pub fn has_splines(&self) -> bool {
        matches!(
            (&self.alignment_spline_x, &self.alignment_spline_y),
            (Some(x), Some(y)) if x.is_valid() && y.is_valid()
        )
    }

    /// Number of channels covered by the integration statistics.
    pub fn channels(&self) -> usize {
        self.location.len()
    }

    /// Read and parse a drizzle data file with default options.
    ///
    /// The format is sniffed from the first non-whitespace character: `<`
    /// dispatches to the XML parser, anything else to the legacy plain-text
    /// decoder, and an all-whitespace file is an error.
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, DrizzleError> {
        Self::parse_with_options(path, DrizzleParserOptions::default())
    }

    /// Read and parse a drizzle data file.
    pub fn parse_with_options<P: AsRef<Path>>(
        path: P,
        options: DrizzleParserOptions,
    ) -> Result<Self, DrizzleError> {
        let text = fs::read_to_string(path)?;
        Self::parse_text(&text, options)
    }

    /// Parse drizzle data from in-memory text (either format).
    pub fn parse_text(text: &str, options: DrizzleParserOptions) -> Result<Self, DrizzleError> {
        // A UTF-8 BOM is not whitespace and would defeat the sniff below.
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        match text.trim_start().chars().next() {
            None => Err(DrizzleError::EmptyFile),
            Some('<') => {
                let xml_options = XmlParserOptions {
                    ignore_comments: true,
                    ignore_unknown_elements: true,
                    ..Default::default()
                };
                let document = if options.ignore_integration_data {
                    let mut filter = IntegrationDataFilter;
                    XmlDocument::parse_with_filter(text, xml_options, &mut filter)?
                } else {
                    XmlDocument::parse_with_options(text, xml_options)?
                };
                Self::parse_xml_document(&document, options)
            }
            Some(_) => legacy::parse_plain_text(text),
        }
    }

    /// Populate a record from an already parsed XDRZ document.
    pub fn parse_xml_document(
        document: &XmlDocument,
        options: DrizzleParserOptions,
    ) -> Result<Self, DrizzleError> {
        reader::parse_document(document, options)
    }

    /// Build the XDRZ XML document for this record.
    ///
    /// Validates the record first; an invalid record fails without
    /// producing output.
    pub fn serialize(&self) -> Result<XmlDocument, DrizzleError> {
        writer::serialize(self)
    }

    /// Serialize and write an XDRZ file.
    pub fn serialize_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DrizzleError> {
        let document = self.serialize()?;
        document.serialize_to_file(path)?;
        Ok(())
    }

    /// Reset the record to a newly constructed state.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Drop the integration statistics and rejection data, keeping the
    /// registration metadata.
    pub fn clear_integration_data(&mut self) {
        self.location.clear();
        self.reference_location.clear();
        self.scale.clear();
        self.weight.clear();
        self.rejection_low_count.clear();
        self.rejection_high_count.clear();
        self.rejection_map = None;
        self.reject_low_data.clear();
        self.reject_high_data.clear();
    }

    /// True when any integration statistics are present.
    pub fn has_integration_data(&self) -> bool {
        !self.location.is_empty()
            || !self.reference_location.is_empty()
            || !self.scale.is_empty()
            || !self.weight.is_empty()
            || self.rejection_map.is_some()
    }

    /// Shared structural validation applied on both serialization and the
    /// tail of a parse.
    pub(crate) fn validate(&self, ignore_integration_data: bool) -> Result<(), DrizzleError> {
        if self.source_file_path.is_empty() {
            return Err(DrizzleError::InvalidData(
                "No source image file path has been specified".to_string(),
            ));
        }
        if self.reference_width < 1 || self.reference_height < 1 {
            return Err(DrizzleError::InvalidData(
                "Invalid reference image geometry".to_string(),
            ));
        }
        let spline_x_valid = self.alignment_spline_x.as_ref().is_some_and(|s| s.is_valid());
        let spline_y_valid = self.alignment_spline_y.as_ref().is_some_and(|s| s.is_valid());
        match self.alignment_matrix {
            Some(_) => {
                if self.alignment_spline_x.is_some() || self.alignment_spline_y.is_some() {
                    return Err(DrizzleError::InvalidData(
                        "Mutually exclusive alignment matrix and surface splines".to_string(),
                    ));
                }
            }
            None => {
                if !spline_x_valid && !spline_y_valid {
                    return Err(DrizzleError::InvalidData(
                        "No alignment transform has been defined".to_string(),
                    ));
                }
                if spline_x_valid != spline_y_valid {
                    return Err(DrizzleError::InvalidData(
                        "Incomplete surface spline definition".to_string(),
                    ));
                }
            }
        }
        if ignore_integration_data || !self.has_integration_data() {
            return Ok(());
        }
        let n = self.location.len();
        let congruent = n > 0
            && self.reference_location.len() == n
            && (self.scale.is_empty() || self.scale.len() == n)
            && (self.weight.is_empty() || self.weight.len() == n)
            && self
                .rejection_map
                .as_ref()
                .map_or(true, |m| m.channels() as usize == n);
        if !congruent {
            return Err(DrizzleError::InvalidData(
                "Invalid or insufficient image integration data.".to_string(),
            ));
        }
        Ok(())
    }

    /// Recompute the per-channel rejection counts from the bitmap's two low
    /// bits.
    pub(crate) fn update_rejection_counts(&mut self) {
        self.rejection_low_count.clear();
        self.rejection_high_count.clear();
        if let Some(map) = &self.rejection_map {
            for c in 0..map.channels() {
                let (low, high) = map.count_rejected(c);
                self.rejection_low_count.push(low);
                self.rejection_high_count.push(high);
            }
        }
    }

    /// Fold the legacy per-channel rejected-coordinate lists into the
    /// rejection bitmap, then clear the staging lists.
    pub(crate) fn fold_rejection_data(&mut self) -> Result<(), DrizzleError> {
        if self.reject_low_data.is_empty() && self.reject_high_data.is_empty() {
            return Ok(());
        }
        let channels = self.reject_low_data.len().max(self.reject_high_data.len());
        let mut map = RejectionMap::new(self.reference_width, self.reference_height, channels as i32);
        for (flag, staged) in [
            (REJECT_LOW, &self.reject_low_data),
            (REJECT_HIGH, &self.reject_high_data),
        ] {
            for (c, coordinates) in staged.iter().enumerate() {
                for &(x, y) in coordinates {
                    if x < 0 || x >= self.reference_width || y < 0 || y >= self.reference_height {
                        return Err(DrizzleError::InvalidData(format!(
                            "Rejected pixel coordinates ({},{}) out of range",
                            x, y
                        )));
                    }
                    map.set_flags(x, y, c as i32, flag);
                }
            }
        }
        self.rejection_map = Some(map);
        self.reject_low_data.clear();
        self.reject_high_data.clear();
        self.update_rejection_counts();
        Ok(())
    }
}
