use crate::font::FontFace;
use crate::types::Pt;

pub const ELLIPSIS: &str = "...";

/// Inclusive range of integer font sizes tried for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontSizeRange {
    pub max: u16,
    pub min: u16,
}

impl FontSizeRange {
    pub const fn new(max: u16, min: u16) -> Self {
        Self { max, min }
    }

    fn ordered(self) -> (u16, u16) {
        if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        }
    }
}

impl Default for FontSizeRange {
    fn default() -> Self {
        Self { max: 10, min: 6 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FittedText {
    pub text: String,
    pub font_size: u16,
    /// Set when the text did not fit at the smallest size and was cut (or dropped).
    pub truncated: bool,
}

impl FittedText {
    fn blank(font_size: u16, truncated: bool) -> Self {
        Self {
            text: String::new(),
            font_size,
            truncated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

fn width_at(font: &FontFace, size: u16, text: &str) -> Pt {
    font.measure_text_width(Pt::from_i32(size as i32), text)
}

/// Largest size in `range` at which `text` fits `max_width`; past the minimum, trims from the end
/// and appends an ellipsis.
pub fn fit_text(text: &str, max_width: Pt, font: &FontFace, range: FontSizeRange) -> FittedText {
    let (min, max) = range.ordered();
    let text = text.trim();
    if text.is_empty() || max_width <= Pt::ZERO {
        return FittedText::blank(max, false);
    }

    if width_at(font, min, text) <= max_width {
        // Width grows with size, so the fitting sizes form a prefix of min..=max.
        let (mut lo, mut hi) = (min, max);
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if width_at(font, mid, text) <= max_width {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        return FittedText {
            text: text.to_string(),
            font_size: lo,
            truncated: false,
        };
    }

    if width_at(font, min, ELLIPSIS) > max_width {
        return FittedText::blank(min, true);
    }

    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        if chars.is_empty() {
            break;
        }
        let mut candidate: String = chars.iter().collect();
        candidate.push_str(ELLIPSIS);
        if width_at(font, min, &candidate) <= max_width {
            return FittedText {
                text: candidate,
                font_size: min,
                truncated: true,
            };
        }
    }
    FittedText::blank(min, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helvetica() -> FontFace {
        FontFace::helvetica()
    }

    #[test]
    fn blank_input_or_no_room_yields_empty_at_max() {
        let font = helvetica();
        let range = FontSizeRange::new(10, 6);
        assert_eq!(fit_text("   ", Pt::from_i32(50), &font, range), FittedText::blank(10, false));
        assert_eq!(fit_text("EC-ABC", Pt::ZERO, &font, range), FittedText::blank(10, false));
        assert_eq!(fit_text("EC-ABC", Pt::from_i32(-3), &font, range), FittedText::blank(10, false));
    }

    #[test]
    fn picks_largest_size_that_fits() {
        let font = helvetica();
        let range = FontSizeRange::new(10, 6);
        // "21:00" is 2.502 units per point: 7pt = 17.514, 8pt = 20.016.
        let fitted = fit_text("21:00", Pt::from_f32(19.16), &font, range);
        assert_eq!(fitted.text, "21:00");
        assert_eq!(fitted.font_size, 7);
        assert!(!fitted.truncated);
        let roomy = fit_text("21:00", Pt::from_i32(100), &font, range);
        assert_eq!(roomy.font_size, 10);
    }

    #[test]
    fn overflow_at_minimum_truncates_with_ellipsis() {
        let font = helvetica();
        let range = FontSizeRange::new(10, 6);
        let max_width = Pt::from_i32(30);
        let fitted = fit_text("Vuelo de instrucción nocturno", max_width, &font, range);
        assert!(fitted.truncated);
        assert_eq!(fitted.font_size, 6);
        assert!(fitted.text.ends_with(ELLIPSIS));
        assert!(fitted.text.len() > ELLIPSIS.len());
        assert!(font.measure_text_width(Pt::from_i32(6), &fitted.text) <= max_width);
    }

    #[test]
    fn ellipsis_that_does_not_fit_drops_the_cell() {
        let font = helvetica();
        // "..." at 6pt is 5.004pt wide.
        let fitted = fit_text("ABCDEFGHIJ", Pt::from_f32(5.0), &font, FontSizeRange::new(10, 6));
        assert_eq!(fitted, FittedText::blank(6, true));
    }

    #[test]
    fn fitted_width_never_exceeds_box() {
        let font = helvetica();
        let samples = ["1", "12:30", "Matrícula EC-KJZ", "WWWWWWWWWWWWWWWW", "Observación larga del vuelo"];
        for width in [4.0f32, 8.0, 19.16, 30.44, 66.2, 109.4] {
            let max_width = Pt::from_f32(width);
            for sample in samples {
                let fitted = fit_text(sample, max_width, &font, FontSizeRange::default());
                let measured = font.measure_text_width(Pt::from_i32(fitted.font_size as i32), &fitted.text);
                assert!(measured <= max_width, "{sample} at {width}");
            }
        }
    }

    #[test]
    fn inverted_range_is_normalized() {
        let font = helvetica();
        let fitted = fit_text("21:00", Pt::from_i32(100), &font, FontSizeRange::new(6, 10));
        assert_eq!(fitted.font_size, 10);
    }
}
