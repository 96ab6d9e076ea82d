//! Integration tests for xdrz
//!
//! These tests verify full serialize/parse cycles through both wire
//! formats, format dispatch, and the structural validation boundaries.

use std::fs;

use tempfile::tempdir;

use xdrz::drizzle::{
    DrizzleData, DrizzleParserOptions, RejectionMap, SurfaceSpline, REJECT_HIGH, REJECT_LOW,
};
use xdrz::xml::XmlDocument;

fn matrix_record() -> DrizzleData {
    let mut data = DrizzleData::new();
    data.source_file_path = "/tmp/light_0001.fit".to_string();
    data.reference_width = 4096;
    data.reference_height = 4096;
    data.alignment_matrix = Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    data.location = vec![0.5, 0.5, 0.5];
    data.reference_location = vec![0.5, 0.5, 0.5];
    data
}

fn test_spline(seed: f64) -> SurfaceSpline {
    let n = 12usize;
    let x: Vec<f64> = (0..n).map(|k| (k as f64) * 31.5 + seed).collect();
    let y: Vec<f64> = (0..n).map(|k| ((k * 7) % n) as f64 * 29.25).collect();
    let coefficients: Vec<f64> = (0..n + 3).map(|k| (k as f64) * 0.125 - seed).collect();
    SurfaceSpline {
        scaling_factor: 1.0 / 4096.0,
        zero_offset_x: -0.5,
        zero_offset_y: -0.5,
        order: 2,
        smoothing: 0.0,
        x,
        y,
        weights: Vec::new(),
        coefficients,
    }
}

fn spline_record() -> DrizzleData {
    let mut data = DrizzleData::new();
    data.source_file_path = "/tmp/light_0002.fit".to_string();
    data.reference_width = 4096;
    data.reference_height = 2048;
    data.alignment_spline_x = Some(test_spline(0.25));
    data.alignment_spline_y = Some(test_spline(-1.75));
    data.location = vec![0.01];
    data.reference_location = vec![0.011];
    data
}

/// Serialize-then-parse reproduces a matrix record.
#[test]
fn test_matrix_round_trip() {
    let data = matrix_record();
    let document = data.serialize().unwrap();
    let restored =
        DrizzleData::parse_xml_document(&document, DrizzleParserOptions::default()).unwrap();

    assert_eq!(restored.source_file_path, data.source_file_path);
    assert_eq!(restored.reference_width, 4096);
    assert_eq!(restored.reference_height, 4096);
    assert_eq!(restored.alignment_matrix, data.alignment_matrix);
    assert_eq!(restored.location, data.location);
    assert_eq!(restored.reference_location, data.reference_location);
    assert!(restored.creation_time.is_some());
}

/// Serialize-then-parse through an actual file on disk.
#[test]
fn test_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("light_0001.xdrz");

    let data = matrix_record();
    data.serialize_to_file(&path).unwrap();
    let restored = DrizzleData::parse(&path).unwrap();

    assert_eq!(restored.source_file_path, data.source_file_path);
    assert_eq!(restored.alignment_matrix, data.alignment_matrix);
    assert_eq!(restored.location, data.location);
}

/// Spline records round-trip bit-exactly through the Base64 vectors.
#[test]
fn test_spline_round_trip() {
    let mut data = spline_record();
    data.alignment_spline_x.as_mut().unwrap().weights = vec![1.0f32; 12];
    data.alignment_spline_x.as_mut().unwrap().smoothing = 0.05;

    let document = data.serialize().unwrap();
    let restored =
        DrizzleData::parse_xml_document(&document, DrizzleParserOptions::default()).unwrap();

    assert_eq!(restored.alignment_spline_x, data.alignment_spline_x);
    assert_eq!(restored.alignment_spline_y, data.alignment_spline_y);
    assert!(restored.alignment_matrix.is_none());
}

/// The concrete identity-matrix scenario: the serialized AlignmentMatrix
/// text parses back to the identity, and re-parsing reproduces the
/// geometry.
#[test]
fn test_identity_matrix_scenario() {
    let data = matrix_record();
    let document = data.serialize().unwrap();

    let root = document.root_element().unwrap();
    assert_eq!(root.name, "xdrz");
    let matrix_text = root.find_child_element("AlignmentMatrix").unwrap().text();
    let items: Vec<f64> = matrix_text
        .split(',')
        .map(|s| s.trim().parse().unwrap())
        .collect();
    assert_eq!(items, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    let text = document.serialize();
    let restored = DrizzleData::parse_text(&text, DrizzleParserOptions::default()).unwrap();
    assert_eq!(restored.reference_width, 4096);
}

/// A stored creation time survives re-serialization; only a record without
/// one gets stamped with the current time.
#[test]
fn test_creation_time_preserved_on_rewrite() {
    use chrono::{TimeZone, Utc};

    let mut data = matrix_record();
    let original = Utc.with_ymd_and_hms(2023, 4, 1, 12, 30, 45).unwrap();
    data.creation_time = Some(original);

    let text = data.serialize().unwrap().serialize();
    let restored = DrizzleData::parse_text(&text, DrizzleParserOptions::default()).unwrap();
    assert_eq!(restored.creation_time, Some(original));

    let rewritten = restored.serialize().unwrap().serialize();
    let restored2 = DrizzleData::parse_text(&rewritten, DrizzleParserOptions::default()).unwrap();
    assert_eq!(restored2.creation_time, Some(original));

    let mut fresh = matrix_record();
    fresh.creation_time = None;
    let stamped =
        DrizzleData::parse_text(&fresh.serialize().unwrap().serialize(), Default::default())
            .unwrap();
    assert!(stamped.creation_time.is_some());
}

fn checkered_map() -> RejectionMap {
    let mut map = RejectionMap::new(64, 64, 3);
    for y in 0..64 {
        for x in 0..64 {
            if (x + y) % 5 == 0 {
                map.set_flags(x, y, 0, REJECT_LOW);
            }
            if (x * y) % 7 == 1 {
                map.set_flags(x, y, 1, REJECT_HIGH);
            }
            if x == y {
                map.set_flags(x, y, 2, REJECT_LOW | REJECT_HIGH);
            }
        }
    }
    map
}

/// A rejection map with mixed flags decodes byte-identically whether or
/// not the channel data was compressed.
#[test]
fn test_rejection_map_round_trip() {
    for compression_enabled in [true, false] {
        let mut data = matrix_record();
        data.compression_enabled = compression_enabled;
        data.rejection_map = Some(checkered_map());

        let document = data.serialize().unwrap();
        let restored =
            DrizzleData::parse_xml_document(&document, DrizzleParserOptions::default()).unwrap();

        assert_eq!(
            restored.rejection_map.as_ref(),
            Some(&checkered_map()),
            "compression_enabled={}",
            compression_enabled
        );
        assert_eq!(restored.rejection_low_count.len(), 3);
        let (low, high) = checkered_map().count_rejected(2);
        assert_eq!(restored.rejection_low_count[2], low);
        assert_eq!(restored.rejection_high_count[2], high);
    }
}

/// Compressed channel data actually produces Subblock children.
#[test]
fn test_rejection_map_uses_subblocks_when_profitable() {
    let mut data = matrix_record();
    data.rejection_map = Some(checkered_map());
    let document = data.serialize().unwrap();

    let map = document
        .root_element()
        .unwrap()
        .find_child_element("RejectionMap")
        .unwrap();
    let channel = map.find_child_element("ChannelData").unwrap();
    assert_eq!(channel.attribute_value("compression"), Some("lz4"));
    let subblock = channel.find_child_element("Subblock").unwrap();
    assert_eq!(subblock.attribute_value("uncompressedSize"), Some("4096"));
}

/// Dispatch: `<` means XML, other content means legacy blocks, whitespace
/// only is an error.
#[test]
fn test_format_dispatch() {
    let options = DrizzleParserOptions::default();

    let xml = matrix_record().serialize().unwrap().serialize();
    assert!(DrizzleData::parse_text(&format!("\n  {}", xml), options).is_ok());

    let legacy = "P{/a.fit} D{32,32} H{1,0,0,0,1,0,0,0,1} m{0.5} m0{0.5}";
    let data = DrizzleData::parse_text(legacy, options).unwrap();
    assert_eq!(data.reference_width, 32);

    let err = DrizzleData::parse_text("  \n\t ", options).unwrap_err();
    assert_eq!(err.to_string(), "Empty drizzle data file");
}

/// A leading UTF-8 BOM does not break the format sniff.
#[test]
fn test_dispatch_skips_byte_order_mark() {
    let options = DrizzleParserOptions::default();

    let xml = matrix_record().serialize().unwrap().serialize();
    let restored = DrizzleData::parse_text(&format!("\u{FEFF}{}", xml), options).unwrap();
    assert_eq!(restored.source_file_path, "/tmp/light_0001.fit");

    let err = DrizzleData::parse_text("\u{FEFF} \n", options).unwrap_err();
    assert_eq!(err.to_string(), "Empty drizzle data file");
}

/// A legacy record converted to XML parses back with equal content.
#[test]
fn test_legacy_to_xml_conversion() {
    let dir = tempdir().unwrap();
    let legacy_path = dir.path().join("old.drz");
    let xdrz_path = dir.path().join("new.xdrz");

    fs::write(
        &legacy_path,
        "P{/data/light_7.fit} T{/data/ref.fit} D{128,64} H{1,0,3.5,0,1,-2.25,0,0,1} \
         m{0.2,0.3} m0{0.21,0.29} s{1.01,0.99} w{0.9,0.8} Rl{{1,1 2,2}{}} Rh{{}{10,10}}",
    )
    .unwrap();

    let data = DrizzleData::parse(&legacy_path).unwrap();
    data.serialize_to_file(&xdrz_path).unwrap();
    let restored = DrizzleData::parse(&xdrz_path).unwrap();

    assert_eq!(restored.source_file_path, data.source_file_path);
    assert_eq!(restored.align_target_file_path, data.align_target_file_path);
    assert_eq!(restored.alignment_matrix, data.alignment_matrix);
    assert_eq!(restored.location, data.location);
    assert_eq!(restored.scale, data.scale);
    assert_eq!(restored.weight, data.weight);
    assert_eq!(restored.rejection_map, data.rejection_map);
    assert_eq!(restored.rejection_low_count, vec![2, 0]);
    assert_eq!(restored.rejection_high_count, vec![0, 1]);
}

/// ignore_integration_data prunes the statistics and the rejection map
/// without touching the registration metadata.
#[test]
fn test_ignore_integration_data() {
    let mut data = matrix_record();
    data.rejection_map = Some(checkered_map());
    let text = data.serialize().unwrap().serialize();

    let options = DrizzleParserOptions {
        ignore_integration_data: true,
        ..Default::default()
    };
    let restored = DrizzleData::parse_text(&text, options).unwrap();
    assert_eq!(restored.alignment_matrix, data.alignment_matrix);
    assert!(restored.location.is_empty());
    assert!(restored.rejection_map.is_none());
}

/// Congruence violation: location and scale lengths disagree.
#[test]
fn test_integration_congruence_failure() {
    let mut data = matrix_record();
    data.scale = vec![1.0, 1.0];
    let err = data.serialize().unwrap_err();
    assert!(
        err.to_string().contains("Invalid or insufficient image integration data."),
        "{}",
        err
    );
}

/// Matrix and splines are mutually exclusive.
#[test]
fn test_transform_exclusivity() {
    let mut data = matrix_record();
    data.alignment_spline_x = Some(test_spline(0.0));
    data.alignment_spline_y = Some(test_spline(1.0));
    assert!(data.serialize().is_err());
}

/// A single spline is an incomplete transform.
#[test]
fn test_incomplete_spline_pair() {
    let mut data = spline_record();
    data.alignment_spline_y = None;
    let err = data.serialize().unwrap_err();
    assert!(err.to_string().contains("Incomplete surface spline"), "{}", err);
}

/// A malformed known element fails a strict parse and is skipped (but
/// still caught by the aggregate checks) in lenient mode.
#[test]
fn test_strictness_policy() {
    let mut document = matrix_record().serialize().unwrap().serialize();
    // Corrupt the matrix text.
    document = document.replace("1,0,0,0,1,0,0,0,1", "1,0,garbage");

    let strict_err =
        DrizzleData::parse_text(&document, DrizzleParserOptions::default()).unwrap_err();
    assert!(
        strict_err.to_string().contains("Parsing AlignmentMatrix element"),
        "{}",
        strict_err
    );

    let lenient = DrizzleParserOptions {
        strict: false,
        ..Default::default()
    };
    // The element is skipped, so the record ends up with no transform.
    let lenient_err = DrizzleData::parse_text(&document, lenient).unwrap_err();
    assert!(
        lenient_err.to_string().contains("No alignment transform"),
        "{}",
        lenient_err
    );
}

/// Unknown elements warn and are skipped in both modes.
#[test]
fn test_unknown_elements_are_skipped() {
    let text = matrix_record()
        .serialize()
        .unwrap()
        .serialize()
        .replace("<SourceImage>", "<FutureThing a=\"1\">stuff</FutureThing><SourceImage>");
    let restored = DrizzleData::parse_text(&text, DrizzleParserOptions::default()).unwrap();
    assert_eq!(restored.source_file_path, "/tmp/light_0001.fit");
}

/// A truncated rejection map (fewer ChannelData blocks than declared) is a
/// hard error.
#[test]
fn test_missing_rejection_channel_data() {
    let mut data = matrix_record();
    data.compression_enabled = false;
    data.rejection_map = Some(checkered_map());
    let text = data.serialize().unwrap().serialize();

    // Remove the last ChannelData element.
    let start = text.rfind("<ChannelData>").unwrap();
    let end = text[start..].find("</ChannelData>").unwrap() + start + "</ChannelData>".len();
    let truncated = format!("{}{}", &text[..start], &text[end..]);

    let err = DrizzleData::parse_text(&truncated, DrizzleParserOptions::default()).unwrap_err();
    assert!(
        err.to_string().contains("Missing rejection map channel data"),
        "{}",
        err
    );
}

/// A spline with a wrong coefficient count is rejected on parse.
#[test]
fn test_spline_coefficient_invariant() {
    let data = spline_record();
    let text = data.serialize().unwrap().serialize();
    let document = XmlDocument::parse(&text).unwrap();

    // Rebuild with one coefficient dropped from AlignmentSplineX.
    let sx = data.alignment_spline_x.clone().unwrap();
    let mut bad = data.clone();
    let mut short = sx.clone();
    short.coefficients.pop();
    bad.alignment_spline_x = Some(short);
    assert!(bad.serialize().is_err());

    // And the reader-side check: a valid document still parses.
    assert!(DrizzleData::parse_xml_document(&document, DrizzleParserOptions::default()).is_ok());
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod property_tests {
    use proptest::prelude::*;
    use xdrz::xml::{decoded_text, encoded_text, XmlDocument};

    proptest! {
        /// Entity encoding followed by decoding reproduces any input text.
        #[test]
        fn test_entity_codec_round_trip(s in "[ -~]{0,64}") {
            prop_assert_eq!(decoded_text(&encoded_text(&s, true)), s.clone());
            prop_assert_eq!(decoded_text(&encoded_text(&s, false)), s);
        }

        /// Attribute values survive a document round trip.
        #[test]
        fn test_attribute_round_trip(v in "[!-~]{1,32}") {
            let mut root = xdrz::xml::XmlElement::new("r");
            root.set_attribute("v", v.clone());
            let mut document = XmlDocument::new();
            document.set_root_element(root).unwrap();
            let text = document.serialize();
            let reparsed = XmlDocument::parse(&text).unwrap();
            prop_assert_eq!(
                reparsed.root_element().unwrap().attribute_value("v"),
                Some(v.as_str())
            );
        }

        /// Finite real vectors survive the comma-separated matrix encoding.
        #[test]
        fn test_matrix_text_round_trip(values in prop::collection::vec(-1.0e12f64..1.0e12, 9)) {
            let mut data = xdrz::drizzle::DrizzleData::new();
            data.source_file_path = "/p.fit".to_string();
            data.reference_width = 16;
            data.reference_height = 16;
            let mut matrix = [0f64; 9];
            matrix.copy_from_slice(&values);
            data.alignment_matrix = Some(matrix);
            data.location = vec![0.5];
            data.reference_location = vec![0.5];

            let text = data.serialize().unwrap().serialize();
            let restored = xdrz::drizzle::DrizzleData::parse_text(
                &text,
                xdrz::drizzle::DrizzleParserOptions::default(),
            ).unwrap();
            prop_assert_eq!(restored.alignment_matrix, Some(matrix));
        }
    }
}
