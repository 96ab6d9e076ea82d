//! XDRZ XML serialization

use chrono::{SecondsFormat, Utc};

use super::vectors::{to_base64_f32, to_base64_f64, to_comma_separated};
use super::{DrizzleData, DrizzleError, RejectionMap, SurfaceSpline};
use crate::compression::{compress, CompressionCodec};
use crate::xml::{XmlDeclaration, XmlDocument, XmlElement};

/// XDRZ format version emitted by this writer.
pub const XDRZ_VERSION: &str = "1.0";

const XDRZ_NAMESPACE: &str = "http://www.pixinsight.com/xdrz";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XDRZ_SCHEMA_LOCATION: &str =
    "http://www.pixinsight.com/xdrz http://pixinsight.com/xdrz/xdrz-1.0.xsd";

/// Build the XDRZ document for a validated record.
pub(crate) fn serialize(data: &DrizzleData) -> Result<XmlDocument, DrizzleError> {
    data.validate(false)?;

    let mut root = XmlElement::new("xdrz");
    root.set_attribute("version", XDRZ_VERSION);
    root.set_attribute("xmlns", XDRZ_NAMESPACE);
    root.set_attribute("xmlns:xsi", XSI_NAMESPACE);
    root.set_attribute("xsi:schemaLocation", XDRZ_SCHEMA_LOCATION);

    let creation_time = data.creation_time.unwrap_or_else(Utc::now);
    root.add_child(
        text_element(
            "CreationTime",
            creation_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
        .into(),
    );
    root.add_child(text_element("SourceImage", &data.source_file_path).into());

    if let Some(path) = &data.cfa_source_file_path {
        let mut e = text_element("CFASourceImage", path);
        if let Some(pattern) = &data.cfa_source_pattern {
            e.set_attribute("pattern", pattern);
        }
        root.add_child(e.into());
    }
    if let Some(path) = &data.align_target_file_path {
        root.add_child(text_element("AlignmentTargetImage", path).into());
    }

    let mut geometry = XmlElement::new("ReferenceGeometry");
    geometry.set_attribute("width", data.reference_width.to_string());
    geometry.set_attribute("height", data.reference_height.to_string());
    if data.channels() > 0 {
        geometry.set_attribute("numberOfChannels", data.channels().to_string());
    }
    root.add_child(geometry.into());

    match &data.alignment_matrix {
        Some(matrix) => {
            root.add_child(text_element("AlignmentMatrix", to_comma_separated(matrix)).into());
        }
        None => {
            // validate() has established that both splines are valid here.
            if let (Some(sx), Some(sy)) = (&data.alignment_spline_x, &data.alignment_spline_y) {
                root.add_child(serialize_spline("AlignmentSplineX", sx).into());
                root.add_child(serialize_spline("AlignmentSplineY", sy).into());
            }
        }
    }

    if !data.location.is_empty() {
        root.add_child(
            text_element("LocationEstimates", to_comma_separated(&data.location)).into(),
        );
        root.add_child(
            text_element("ReferenceLocation", to_comma_separated(&data.reference_location))
                .into(),
        );
        if !data.scale.is_empty() {
            root.add_child(text_element("ScaleFactors", to_comma_separated(&data.scale)).into());
        }
        if !data.weight.is_empty() {
            root.add_child(text_element("Weights", to_comma_separated(&data.weight)).into());
        }
        if let Some(map) = &data.rejection_map {
            root.add_child(serialize_rejection_map(map, data.compression_enabled).into());
        }
    }

    let mut document = XmlDocument::new();
    document.set_declaration(XmlDeclaration::default());
    document.set_root_element(root)?;
    Ok(document)
}

fn text_element(name: &str, text: impl Into<String>) -> XmlElement {
    let mut e = XmlElement::new(name);
    e.add_text(text);
    e
}

fn serialize_spline(name: &str, spline: &SurfaceSpline) -> XmlElement {
    let mut e = XmlElement::new(name);
    e.set_attribute("scalingFactor", spline.scaling_factor.to_string());
    e.set_attribute("zeroOffsetX", spline.zero_offset_x.to_string());
    e.set_attribute("zeroOffsetY", spline.zero_offset_y.to_string());
    e.set_attribute("order", spline.order.to_string());
    if spline.smoothing > 0.0 {
        e.set_attribute("smoothing", spline.smoothing.to_string());
    }
    e.add_child(text_element("NodeXCoordinates", to_base64_f64(&spline.x)).into());
    e.add_child(text_element("NodeYCoordinates", to_base64_f64(&spline.y)).into());
    e.add_child(text_element("Coefficients", to_base64_f64(&spline.coefficients)).into());
    if !spline.weights.is_empty() {
        e.add_child(text_element("NodeWeights", to_base64_f32(&spline.weights)).into());
    }
    e
}

fn serialize_rejection_map(map: &RejectionMap, compression_enabled: bool) -> XmlElement {
    let mut e = XmlElement::new("RejectionMap");
    e.set_attribute("width", map.width().to_string());
    e.set_attribute("height", map.height().to_string());
    e.set_attribute("numberOfChannels", map.channels().to_string());
    for c in 0..map.channels() {
        let plane = map.channel_data(c);
        let mut channel = XmlElement::new("ChannelData");
        // LZ4 first; the flat Base64 form is the fallback for channels the
        // compressor cannot shrink.
        let compressed = if compression_enabled {
            compress(CompressionCodec::Lz4, plane)
        } else {
            None
        };
        match compressed {
            Some(subblocks) => {
                channel.set_attribute("compression", CompressionCodec::Lz4.attribute_name());
                for subblock in subblocks {
                    let mut b = XmlElement::new("Subblock");
                    b.set_attribute("uncompressedSize", subblock.uncompressed_size.to_string());
                    b.add_text(base64_encode(&subblock.data));
                    channel.add_child(b.into());
                }
            }
            None => channel.add_text(base64_encode(plane)),
        }
        e.add_child(channel.into());
    }
    e
}

fn base64_encode(data: &[u8]) -> String {
    use base64::prelude::*;
    BASE64_STANDARD.encode(data)
}
