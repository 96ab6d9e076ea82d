//! Legacy plain-text drizzle data decoder
//!
//! The pre-XDRZ format is a whitespace-insensitive sequence of `Id{...}`
//! blocks. Braces nest: the scanner counts `{`/`}` pairs so only the
//! outermost pair delimits an item, and nested blocks are handed verbatim
//! to item-specific sub-decoders (surface splines, per-channel rejection
//! coordinate lists). Unknown identifiers are hard errors. This decoder is
//! read-only; re-serializing always produces the XML format.
//!
//! Item identifiers:
//!
//! | Id   | Content                                              |
//! |------|------------------------------------------------------|
//! | `P`  | source image path                                    |
//! | `T`  | alignment target path                                |
//! | `D`  | reference width,height (2 integers)                  |
//! | `H`  | alignment matrix (9 reals, row-major)                |
//! | `Sx` | X surface spline (nested blocks, see below)          |
//! | `Sy` | Y surface spline                                     |
//! | `m`  | per-channel location estimates (>= 1 real)           |
//! | `m0` | per-channel reference location (>= 1 real)           |
//! | `s`  | per-channel scale factors                            |
//! | `w`  | per-channel weights                                  |
//! | `Rl` | low-rejected pixels, one `{x,y x,y ...}` per channel |
//! | `Rh` | high-rejected pixels, same shape                     |
//!
//! Spline sub-blocks: `x`/`y` node coordinates, `s` coefficients, `w` node
//! weights, `r0` scaling factor, `x0`/`y0` zero offsets, `m` order, `r`
//! smoothing.

use super::vectors::{parse_comma_separated, parse_comma_separated_ints};
use super::{DrizzleData, DrizzleError, SurfaceSpline};

pub(crate) fn parse_plain_text(text: &str) -> Result<DrizzleData, DrizzleError> {
    let mut data = DrizzleData::new();
    let mut scanner = BlockScanner::new(text, 0);
    while let Some(item) = scanner.next_item()? {
        parse_item(&mut data, &item).map_err(|e| match e {
            DrizzleError::PlainText { .. } => e,
            other => item.error(other.to_string()),
        })?;
    }
    // Congruence checks need the whole record, so they run after the scan;
    // folding the staged rejection coordinates needs a validated geometry,
    // and the folded map is re-checked against the channel count.
    data.validate(false)?;
    data.fold_rejection_data()?;
    data.validate(false)?;
    Ok(data)
}

/// One `Id{content}` item with its byte offset in the source text.
struct Item<'a> {
    id: &'a str,
    content: &'a str,
    offset: usize,
    content_offset: usize,
}

impl Item<'_> {
    fn error(&self, message: impl Into<String>) -> DrizzleError {
        DrizzleError::PlainText {
            message: message.into(),
            offset: self.offset,
        }
    }
}

/// Left-to-right scanner over `Id{...}` blocks with brace counting.
struct BlockScanner<'a> {
    text: &'a str,
    pos: usize,
    base: usize,
}

impl<'a> BlockScanner<'a> {
    fn new(text: &'a str, base: usize) -> Self {
        Self { text, pos: 0, base }
    }

    fn next_item(&mut self) -> Result<Option<Item<'a>>, DrizzleError> {
        let bytes = self.text.as_bytes();
        let j = self.text.len();
        while self.pos < j && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= j {
            return Ok(None);
        }
        let offset = self.base + self.pos;
        let id_start = self.pos;
        while self.pos < j && bytes[self.pos] != b'{' && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let id = &self.text[id_start..self.pos];
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DrizzleError::PlainText {
                message: format!("Invalid item identifier '{}'", id),
                offset,
            });
        }
        while self.pos < j && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= j || bytes[self.pos] != b'{' {
            return Err(DrizzleError::PlainText {
                message: format!("Expected '{{' after item identifier '{}'", id),
                offset,
            });
        }
        let open = self.pos;
        let close = find_closing_brace(self.text, open);
        if close >= j {
            return Err(DrizzleError::PlainText {
                message: format!("Unmatched '{{' in item '{}'", id),
                offset,
            });
        }
        self.pos = close + 1;
        Ok(Some(Item {
            id,
            content: &self.text[open + 1..close],
            offset,
            content_offset: self.base + open + 1,
        }))
    }
}

/// Offset of the `}` matching the `{` at `open`, or `text.len()` if
/// unbalanced.
fn find_closing_brace(text: &str, open: usize) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for k in open..bytes.len() {
        match bytes[k] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return k;
                }
            }
            _ => {}
        }
    }
    text.len()
}

fn parse_item(data: &mut DrizzleData, item: &Item<'_>) -> Result<(), DrizzleError> {
    match item.id {
        "P" => {
            let path = item.content.trim();
            if path.is_empty() {
                return Err(item.error("Empty source image path"));
            }
            data.source_file_path = path.to_string();
        }
        "T" => {
            let path = item.content.trim();
            if path.is_empty() {
                return Err(item.error("Empty alignment target path"));
            }
            data.align_target_file_path = Some(path.to_string());
        }
        "D" => {
            let dims = parse_comma_separated_ints(item.content, 2)?;
            if dims.len() != 2 {
                return Err(item.error("Invalid reference image geometry"));
            }
            let width = checked_i32(dims[0], item, "Invalid reference image geometry")?;
            let height = checked_i32(dims[1], item, "Invalid reference image geometry")?;
            if width < 1 || height < 1 {
                return Err(item.error("Invalid reference image geometry"));
            }
            data.reference_width = width;
            data.reference_height = height;
        }
        "H" => {
            let items = parse_comma_separated(item.content, 9)?;
            if items.len() != 9 {
                return Err(item.error("Invalid alignment matrix definition"));
            }
            let mut matrix = [0f64; 9];
            matrix.copy_from_slice(&items);
            data.alignment_matrix = Some(matrix);
        }
        "Sx" => data.alignment_spline_x = Some(parse_spline(item)?),
        "Sy" => data.alignment_spline_y = Some(parse_spline(item)?),
        "m" => data.location = parse_comma_separated(item.content, 1)?,
        "m0" => data.reference_location = parse_comma_separated(item.content, 1)?,
        "s" => data.scale = parse_comma_separated(item.content, 1)?,
        "w" => data.weight = parse_comma_separated(item.content, 1)?,
        "Rl" => data.reject_low_data = parse_rejection_coordinates(item)?,
        "Rh" => data.reject_high_data = parse_rejection_coordinates(item)?,
        other => {
            return Err(item.error(format!("Unknown item identifier '{}'", other)));
        }
    }
    Ok(())
}

fn parse_spline(item: &Item<'_>) -> Result<SurfaceSpline, DrizzleError> {
    let mut spline = SurfaceSpline::default();
    let mut scanner = BlockScanner::new(item.content, item.content_offset);
    while let Some(sub) = scanner.next_item()? {
        match sub.id {
            "x" => spline.x = parse_comma_separated(sub.content, 3)?,
            "y" => spline.y = parse_comma_separated(sub.content, 3)?,
            "s" => spline.coefficients = parse_comma_separated(sub.content, 3)?,
            "w" => {
                spline.weights = parse_comma_separated(sub.content, 1)?
                    .into_iter()
                    .map(|v| v as f32)
                    .collect();
            }
            "r0" => spline.scaling_factor = single_real(&sub)?,
            "x0" => spline.zero_offset_x = single_real(&sub)?,
            "y0" => spline.zero_offset_y = single_real(&sub)?,
            "m" => {
                let order = parse_comma_separated_ints(sub.content, 1)?;
                spline.order = checked_i32(order[0], &sub, "Invalid spline derivative order")?;
            }
            "r" => spline.smoothing = single_real(&sub)?,
            other => {
                return Err(sub.error(format!("Unknown spline item identifier '{}'", other)));
            }
        }
    }
    if !spline.is_valid() {
        return Err(item.error("Invalid surface spline definition."));
    }
    Ok(spline)
}

/// Narrow a decoded integer to `i32`. Values outside the `i32` range are
/// rejected rather than truncated.
fn checked_i32(value: i64, item: &Item<'_>, message: &str) -> Result<i32, DrizzleError> {
    i32::try_from(value).map_err(|_| item.error(message))
}

fn single_real(item: &Item<'_>) -> Result<f64, DrizzleError> {
    let values = parse_comma_separated(item.content, 1)?;
    if values.len() != 1 {
        return Err(item.error("Expected a single numeric value"));
    }
    Ok(values[0])
}

/// Decode per-channel rejected pixel coordinates: one nested `{...}` block
/// per channel, each holding whitespace-separated `x,y` integer pairs.
fn parse_rejection_coordinates(item: &Item<'_>) -> Result<Vec<Vec<(i32, i32)>>, DrizzleError> {
    let mut channels = Vec::new();
    let text = item.content;
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < text.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if bytes[i] != b'{' {
            return Err(item.error("Expected '{' starting a rejection channel block"));
        }
        let close = find_closing_brace(text, i);
        if close >= text.len() {
            return Err(item.error("Unmatched '{' in rejection channel block"));
        }
        let mut coordinates = Vec::new();
        for pair in text[i + 1..close].split_ascii_whitespace() {
            let ints = parse_comma_separated_ints(pair, 2)?;
            if ints.len() != 2 {
                return Err(item.error(format!("Invalid pixel coordinates '{}'", pair)));
            }
            let message = format!("Invalid pixel coordinates '{}'", pair);
            let x = checked_i32(ints[0], item, &message)?;
            let y = checked_i32(ints[1], item, &message)?;
            coordinates.push((x, y));
        }
        channels.push(coordinates);
        i = close + 1;
    }
    Ok(channels)
}
