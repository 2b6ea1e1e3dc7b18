use crate::error::LogbookError;
use crate::types::Pt;
use lopdf::{Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId, Stream as LoStream, dictionary};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

// Helvetica advance widths (1000 units per em) for WinAnsi codes 32..=255. Undefined codes use
// the width of a space.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 224] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 278,
    556, 278, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 278, 611, 278,
    278, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 278, 500, 667,
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

// cp1252 code points 0x80..=0x9F; `None` marks the five undefined slots.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// WinAnsi byte for a character, `None` when the encoding cannot express it.
pub(crate) fn winansi_byte(ch: char) -> Option<u8> {
    match ch {
        '\u{0020}'..='\u{007E}' | '\u{00A0}'..='\u{00FF}' => Some(ch as u32 as u8),
        '\t' | '\n' | '\r' => Some(b' '),
        _ => CP1252_HIGH
            .iter()
            .position(|c| *c == Some(ch))
            .map(|idx| 0x80 + idx as u8),
    }
}

fn winansi_char(byte: u8) -> Option<char> {
    match byte {
        0x20..=0x7E | 0xA0..=0xFF => Some(byte as char),
        0x80..=0x9F => CP1252_HIGH[(byte - 0x80) as usize],
        _ => None,
    }
}

pub(crate) struct WinAnsiEncoded {
    /// Body of a PDF literal string, without the enclosing parentheses.
    pub text: String,
    pub replaced: usize,
}

pub(crate) fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match winansi_byte(ch) {
            Some(b) => b,
            None => {
                replaced += 1;
                b'?'
            }
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded { text: out, replaced }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Pt>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<Pt> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Pt) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

#[derive(Debug)]
struct FontProgram {
    data: Vec<u8>,
    kind: FontProgramKind,
}

#[derive(Debug)]
struct FontMetrics {
    widths: Vec<u16>,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    italic_angle: i16,
    stem_v: i16,
    bbox: (i16, i16, i16, i16),
    missing_width: u16,
    is_fixed_pitch: bool,
}

impl FontMetrics {
    fn helvetica() -> Self {
        Self {
            widths: HELVETICA_WIDTHS.to_vec(),
            ascent: 718,
            descent: -207,
            cap_height: 718,
            italic_angle: 0,
            stem_v: 88,
            bbox: (-166, -225, 1000, 931),
            missing_width: 278,
            is_fixed_pitch: false,
        }
    }

    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let widths = build_widths(face, scale);
        let missing_width = widths
            .get((b' ' - FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(0);
        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        Self {
            widths,
            ascent,
            descent,
            cap_height,
            italic_angle,
            stem_v: 80,
            bbox,
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
        }
    }

    fn advance_for_byte(&self, byte: u8) -> u16 {
        if byte < FIRST_CHAR {
            return self.missing_width;
        }
        self.widths
            .get((byte - FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(self.missing_width)
    }
}

/// The single face used for every overlay glyph: base-14 Helvetica, or an embedded TrueType /
/// OpenType program restricted to the WinAnsi range.
#[derive(Debug)]
pub struct FontFace {
    name: String,
    metrics: FontMetrics,
    program: Option<FontProgram>,
    text_width_cache: Mutex<TextWidthCache>,
}

impl FontFace {
    pub fn helvetica() -> Self {
        Self {
            name: "Helvetica".to_string(),
            metrics: FontMetrics::helvetica(),
            program: None,
            text_width_cache: Mutex::new(TextWidthCache::new(4096)),
        }
    }

    pub fn from_bytes(data: Vec<u8>, source_name: Option<&str>) -> Result<Self, LogbookError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let (name, metrics, kind) = {
            let face = ttf_parser::Face::parse(&data, 0)
                .map_err(|err| LogbookError::Font(format!("invalid font data for {source}: {err}")))?;
            let kind = if face.tables().cff.is_some() {
                FontProgramKind::OpenTypeCff
            } else {
                FontProgramKind::TrueType
            };
            (font_name(&face, source), FontMetrics::from_face(&face), kind)
        };
        Ok(Self {
            name,
            metrics,
            program: Some(FontProgram { data, kind }),
            text_width_cache: Mutex::new(TextWidthCache::new(4096)),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LogbookError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|err| LogbookError::Font(format!("{}: {err}", path.display())))?;
        let stem = path.file_stem().and_then(|v| v.to_str());
        Self::from_bytes(data, stem)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_builtin(&self) -> bool {
        self.program.is_none()
    }

    pub fn measure_text_width(&self, font_size: Pt, text: &str) -> Pt {
        let key = TextWidthKey {
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit;
            }
        }
        let mut total_units: i32 = 0;
        for ch in text.chars() {
            let byte = winansi_byte(ch).unwrap_or(b'?');
            total_units = total_units.saturating_add(self.metrics.advance_for_byte(byte) as i32);
        }
        let width = if total_units <= 0 {
            Pt::ZERO
        } else {
            font_size.mul_ratio(total_units, 1000)
        };
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(key, width);
        }
        width
    }

    /// Writes the font dictionary (and, for embedded faces, descriptor and program) into `doc`.
    pub(crate) fn add_to_document(&self, doc: &mut LoDocument) -> ObjectId {
        let Some(program) = &self.program else {
            return doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            });
        };
        let metrics = &self.metrics;
        let (file_key, subtype) = match program.kind {
            FontProgramKind::TrueType => ("FontFile2", "TrueType"),
            FontProgramKind::OpenTypeCff => ("FontFile3", "Type1"),
        };
        let mut file_dict = LoDictionary::new();
        match program.kind {
            FontProgramKind::TrueType => {
                file_dict.set("Length1", LoObject::Integer(program.data.len() as i64));
            }
            FontProgramKind::OpenTypeCff => {
                file_dict.set("Subtype", LoObject::Name(b"OpenType".to_vec()));
            }
        }
        let mut file_stream = LoStream::new(file_dict, program.data.clone());
        let _ = file_stream.compress();
        let file_id = doc.add_object(file_stream);

        let mut flags: i64 = 32;
        if metrics.is_fixed_pitch {
            flags |= 1;
        }
        let base = sanitize_font_name(&self.name);
        let mut descriptor = dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => LoObject::Name(base.clone().into_bytes()),
            "Flags" => flags,
            "FontBBox" => vec![
                LoObject::Integer(metrics.bbox.0 as i64),
                LoObject::Integer(metrics.bbox.1 as i64),
                LoObject::Integer(metrics.bbox.2 as i64),
                LoObject::Integer(metrics.bbox.3 as i64),
            ],
            "ItalicAngle" => metrics.italic_angle as i64,
            "Ascent" => metrics.ascent as i64,
            "Descent" => metrics.descent as i64,
            "CapHeight" => metrics.cap_height as i64,
            "StemV" => metrics.stem_v as i64,
            "MissingWidth" => metrics.missing_width as i64,
        };
        descriptor.set(file_key, LoObject::Reference(file_id));
        let descriptor_id = doc.add_object(descriptor);

        let widths: Vec<LoObject> = metrics
            .widths
            .iter()
            .map(|w| LoObject::Integer(*w as i64))
            .collect();
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => LoObject::Name(subtype.as_bytes().to_vec()),
            "BaseFont" => LoObject::Name(base.into_bytes()),
            "FirstChar" => FIRST_CHAR as i64,
            "LastChar" => LAST_CHAR as i64,
            "Widths" => widths,
            "FontDescriptor" => LoObject::Reference(descriptor_id),
            "Encoding" => "WinAnsiEncoding",
        })
    }
}

fn build_widths(face: &ttf_parser::Face<'_>, scale: f32) -> Vec<u16> {
    let mut widths = Vec::with_capacity((LAST_CHAR - FIRST_CHAR) as usize + 1);
    for code in FIRST_CHAR..=LAST_CHAR {
        let width = winansi_char(code)
            .and_then(|ch| face.glyph_index(ch))
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(0);
        let scaled = (width as f32 * scale).round() as i32;
        widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
    }
    widths
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_name(face: &ttf_parser::Face<'_>, source: &str) -> String {
    use ttf_parser::name::name_id;

    let mut post = None;
    let mut full = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME if post.is_none() => post = Some(name),
            name_id::FULL_NAME if full.is_none() => full = Some(name),
            _ => {}
        }
    }
    post.or(full).unwrap_or_else(|| source.to_string())
}

fn sanitize_font_name(name: &str) -> String {
    let out: String = name
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
        .collect();
    if out.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_measures_digits_and_colon() {
        let font = FontFace::helvetica();
        // 2 + 1 + 0 + 0 digits at 556, colon at 278.
        let width = font.measure_text_width(Pt::from_i32(10), "21:00");
        assert_eq!(width.to_milli_i64(), 25020);
        let cached = font.measure_text_width(Pt::from_i32(10), "21:00");
        assert_eq!(cached, width);
        assert_eq!(font.measure_text_width(Pt::from_i32(6), "...").to_milli_i64(), 5004);
        assert_eq!(font.measure_text_width(Pt::from_i32(10), ""), Pt::ZERO);
    }

    #[test]
    fn accented_letters_use_winansi_widths() {
        let font = FontFace::helvetica();
        let plain = font.measure_text_width(Pt::from_i32(10), "Sesion");
        let accented = font.measure_text_width(Pt::from_i32(10), "Sesión");
        assert_eq!(plain, accented);
        assert_eq!(font.measure_text_width(Pt::from_i32(10), "í").to_milli_i64(), 2780);
        // Unmappable characters measure as '?'.
        assert_eq!(
            font.measure_text_width(Pt::from_i32(10), "\u{4E2D}"),
            font.measure_text_width(Pt::from_i32(10), "?")
        );
    }

    #[test]
    fn winansi_encoding_escapes_and_counts_replacements() {
        let encoded = encode_winansi_pdf_string("a(b)\\ñ€");
        assert_eq!(encoded.text, "a\\(b\\)\\\\\\361\\200");
        assert_eq!(encoded.replaced, 0);
        let lossy = encode_winansi_pdf_string("x\u{2265}y");
        assert_eq!(lossy.text, "x?y");
        assert_eq!(lossy.replaced, 1);
    }

    #[test]
    fn cp1252_table_round_trips() {
        for byte in 0x20u8..=0xFF {
            if let Some(ch) = winansi_char(byte) {
                assert_eq!(winansi_byte(ch), Some(byte));
            }
        }
        assert_eq!(winansi_char(0x81), None);
        assert_eq!(winansi_byte('\u{2026}'), Some(0x85));
    }

    #[test]
    fn invalid_font_bytes_are_font_errors() {
        let err = FontFace::from_bytes(vec![0, 1, 2, 3], Some("broken")).expect_err("bad font");
        assert!(matches!(err, LogbookError::Font(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn builtin_face_adds_type1_dictionary() {
        let mut doc = LoDocument::with_version("1.7");
        let id = FontFace::helvetica().add_to_document(&mut doc);
        let dict = doc
            .get_object(id)
            .and_then(|o| o.as_dict())
            .expect("font dict");
        assert_eq!(dict.get(b"BaseFont").and_then(|o| o.as_name()).ok(), Some(&b"Helvetica"[..]));
        assert_eq!(
            dict.get(b"Encoding").and_then(|o| o.as_name()).ok(),
            Some(&b"WinAnsiEncoding"[..])
        );
    }
}
