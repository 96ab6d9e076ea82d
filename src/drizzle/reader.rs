//! XDRZ XML parsing
//!
//! Walks the direct children of the `xdrz` root element. Unknown elements
//! are skipped with a warning; failures inside recognized elements follow
//! the strictness policy of [`DrizzleParserOptions`]: propagated when
//! strict (the default), logged and skipped otherwise. Aggregate structural
//! validation runs after the walk either way, so a skipped required element
//! still fails the parse.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;

use super::vectors::{from_base64, parse_base64_f32, parse_base64_f64, parse_comma_separated};
use super::{DrizzleData, DrizzleError, DrizzleParserOptions, RejectionMap, SurfaceSpline};
use crate::compression::{uncompress, CompressionCodec, Subblock};
use crate::xml::{XmlDocument, XmlElement, XmlNode};

use super::writer::XDRZ_VERSION;

pub(crate) fn parse_document(
    document: &XmlDocument,
    options: DrizzleParserOptions,
) -> Result<DrizzleData, DrizzleError> {
    let root = document
        .root_element()
        .ok_or_else(|| DrizzleError::InvalidData("No root element".to_string()))?;
    if root.name != "xdrz" {
        return Err(DrizzleError::InvalidData(format!(
            "Not a valid XDRZ document: unexpected root element '{}'",
            root.name
        )));
    }
    if let Some(version) = root.attribute_value("version") {
        if version != XDRZ_VERSION {
            warn!("Unexpected XDRZ version '{}'; attempting to parse anyway", version);
        }
    }

    let mut data = DrizzleData::new();
    for node in &root.children {
        let element = match node {
            XmlNode::Element(e) => e,
            other => {
                warn!(
                    "Skipping unexpected child node of type {:?} (at {})",
                    other.node_type(),
                    other.location()
                );
                continue;
            }
        };
        if let Err(e) = parse_element(&mut data, element, options) {
            let wrapped = DrizzleError::Element {
                element: element.name.clone(),
                source: Box::new(e),
            };
            if options.strict {
                return Err(wrapped);
            }
            warn!("{}", wrapped);
        }
    }

    data.validate(options.ignore_integration_data)?;
    if !options.ignore_integration_data {
        if data.location.is_empty() || data.reference_location.is_empty() {
            return Err(DrizzleError::InvalidData(
                "Missing image integration data".to_string(),
            ));
        }
        data.update_rejection_counts();
    }
    Ok(data)
}

fn parse_element(
    data: &mut DrizzleData,
    element: &XmlElement,
    options: DrizzleParserOptions,
) -> Result<(), DrizzleError> {
    match element.name.as_str() {
        "CreationTime" => data.creation_time = Some(parse_time(&element.text())?),
        "SourceImage" => data.source_file_path = non_empty_text(element)?,
        "CFASourceImage" => {
            data.cfa_source_file_path = Some(non_empty_text(element)?);
            data.cfa_source_pattern = element.attribute_value("pattern").map(str::to_string);
        }
        "AlignmentTargetImage" => data.align_target_file_path = Some(non_empty_text(element)?),
        "ReferenceGeometry" => {
            data.reference_width = required_attr(element, "width")?;
            data.reference_height = required_attr(element, "height")?;
            if data.reference_width < 1 || data.reference_height < 1 {
                return Err(DrizzleError::InvalidData(
                    "Invalid reference image geometry".to_string(),
                ));
            }
            if let Some(n) = optional_attr::<i32>(element, "numberOfChannels")? {
                if n < 1 {
                    return Err(DrizzleError::InvalidData(
                        "Invalid number of channels".to_string(),
                    ));
                }
            }
        }
        "AlignmentMatrix" => {
            let items = parse_comma_separated(&element.text(), 9)?;
            if items.len() != 9 {
                return Err(DrizzleError::InvalidData(
                    "Invalid alignment matrix definition".to_string(),
                ));
            }
            let mut matrix = [0f64; 9];
            matrix.copy_from_slice(&items);
            data.alignment_matrix = Some(matrix);
        }
        "AlignmentSplineX" => data.alignment_spline_x = Some(parse_spline(element)?),
        "AlignmentSplineY" => data.alignment_spline_y = Some(parse_spline(element)?),
        "LocationEstimates" if !options.ignore_integration_data => {
            data.location = parse_comma_separated(&element.text(), 1)?;
        }
        "ReferenceLocation" if !options.ignore_integration_data => {
            data.reference_location = parse_comma_separated(&element.text(), 1)?;
        }
        "ScaleFactors" if !options.ignore_integration_data => {
            data.scale = parse_comma_separated(&element.text(), 1)?;
        }
        "Weights" if !options.ignore_integration_data => {
            data.weight = parse_comma_separated(&element.text(), 1)?;
        }
        "RejectionMap" if !options.ignore_integration_data => {
            data.rejection_map = Some(parse_rejection_map(element)?);
        }
        "LocationEstimates" | "ReferenceLocation" | "ScaleFactors" | "Weights"
        | "RejectionMap" => {} // integration data ignored on request
        other => {
            warn!("Skipping unknown element '{}' (at {})", other, element.location);
        }
    }
    Ok(())
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, DrizzleError> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    // Older writers omit the timezone designator.
    if let Ok(t) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(t.and_utc());
    }
    Err(DrizzleError::InvalidData(format!(
        "Invalid creation time '{}'",
        text
    )))
}

fn non_empty_text(element: &XmlElement) -> Result<String, DrizzleError> {
    let text = element.text().trim().to_string();
    if text.is_empty() {
        return Err(DrizzleError::InvalidData(format!(
            "Empty {} element",
            element.name
        )));
    }
    Ok(text)
}

fn required_attr<T: FromStr>(element: &XmlElement, name: &str) -> Result<T, DrizzleError> {
    match element.attribute_value(name) {
        Some(value) => value.trim().parse().map_err(|_| {
            DrizzleError::InvalidData(format!("Invalid {} attribute value '{}'", name, value))
        }),
        None => Err(DrizzleError::InvalidData(format!(
            "Missing required {} attribute",
            name
        ))),
    }
}

fn optional_attr<T: FromStr>(element: &XmlElement, name: &str) -> Result<Option<T>, DrizzleError> {
    match element.attribute_value(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| {
                DrizzleError::InvalidData(format!("Invalid {} attribute value '{}'", name, value))
            }),
        None => Ok(None),
    }
}

fn child_vector_f64(
    element: &XmlElement,
    name: &str,
    min_count: usize,
) -> Result<Vec<f64>, DrizzleError> {
    let child = element.find_child_element(name).ok_or_else(|| {
        DrizzleError::InvalidData(format!("Missing required {} element", name))
    })?;
    let values = parse_base64_f64(&child.text())?;
    if values.len() < min_count {
        return Err(DrizzleError::InvalidData(format!(
            "At least {} items are required in {} (got {})",
            min_count,
            name,
            values.len()
        )));
    }
    Ok(values)
}

fn parse_spline(element: &XmlElement) -> Result<SurfaceSpline, DrizzleError> {
    let scaling_factor: f64 = required_attr(element, "scalingFactor")?;
    if scaling_factor <= 0.0 {
        return Err(DrizzleError::InvalidData(
            "Invalid scalingFactor attribute value".to_string(),
        ));
    }
    let zero_offset_x: f64 = required_attr(element, "zeroOffsetX")?;
    let zero_offset_y: f64 = required_attr(element, "zeroOffsetY")?;
    let order: i32 = required_attr(element, "order")?;
    if order < 1 {
        return Err(DrizzleError::InvalidData(
            "Invalid order attribute value".to_string(),
        ));
    }
    let smoothing: f64 = optional_attr(element, "smoothing")?.unwrap_or(0.0);
    if smoothing < 0.0 {
        return Err(DrizzleError::InvalidData(
            "Invalid smoothing attribute value".to_string(),
        ));
    }

    let x = child_vector_f64(element, "NodeXCoordinates", 3)?;
    let y = child_vector_f64(element, "NodeYCoordinates", 3)?;
    let coefficients = child_vector_f64(element, "Coefficients", 3)?;
    let weights = match element.find_child_element("NodeWeights") {
        Some(child) => parse_base64_f32(&child.text())?,
        None => Vec::new(),
    };

    let spline = SurfaceSpline {
        scaling_factor,
        zero_offset_x,
        zero_offset_y,
        order,
        smoothing,
        x,
        y,
        weights,
        coefficients,
    };
    if !spline.is_valid() {
        return Err(DrizzleError::InvalidData(
            "Invalid surface spline definition.".to_string(),
        ));
    }
    Ok(spline)
}

fn parse_rejection_map(element: &XmlElement) -> Result<RejectionMap, DrizzleError> {
    let width: i32 = required_attr(element, "width")?;
    let height: i32 = required_attr(element, "height")?;
    let channels: i32 = required_attr(element, "numberOfChannels")?;
    if width < 1 || height < 1 || channels < 1 {
        return Err(DrizzleError::InvalidData(
            "Invalid rejection map geometry".to_string(),
        ));
    }
    let mut map = RejectionMap::new(width, height, channels);
    let mut channel = 0i32;
    for child in element.child_elements() {
        if child.name != "ChannelData" {
            warn!(
                "Skipping unknown element '{}' (at {})",
                child.name, child.location
            );
            continue;
        }
        if channel >= channels {
            return Err(DrizzleError::InvalidData(
                "Too many rejection map channel data blocks".to_string(),
            ));
        }
        let plane = parse_channel_data(child)?;
        if plane.len() != map.channel_size() {
            return Err(DrizzleError::InvalidData(format!(
                "Invalid rejection map channel data: expected {} bytes, got {}",
                map.channel_size(),
                plane.len()
            )));
        }
        map.set_channel_data(channel, &plane);
        channel += 1;
    }
    if channel < channels {
        return Err(DrizzleError::InvalidData(
            "Missing rejection map channel data".to_string(),
        ));
    }
    Ok(map)
}

fn parse_channel_data(element: &XmlElement) -> Result<Vec<u8>, DrizzleError> {
    match element.attribute_value("compression") {
        Some(name) => {
            let codec = CompressionCodec::from_attribute(name).ok_or_else(|| {
                DrizzleError::InvalidData(format!("Unknown compression codec '{}'", name))
            })?;
            let mut subblocks = Vec::new();
            for child in element.child_elements() {
                if child.name != "Subblock" {
                    warn!(
                        "Skipping unknown element '{}' (at {})",
                        child.name, child.location
                    );
                    continue;
                }
                subblocks.push(Subblock {
                    uncompressed_size: required_attr(child, "uncompressedSize")?,
                    data: from_base64(&child.text())?,
                });
            }
            if subblocks.is_empty() {
                return Err(DrizzleError::InvalidData(
                    "Missing rejection map subblock data".to_string(),
                ));
            }
            Ok(uncompress(codec, &subblocks)?)
        }
        None => from_base64(&element.text()),
    }
}
