use fixed::types::I32F32;

/// Page-space length in points, stored as fixed point so that layout comparisons are exact and
/// reproducible across platforms.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn from_i32(value: i32) -> Pt {
        Pt::from_milli_i64((value as i64) * 1000)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        Pt::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Pt) -> Pt {
        if self <= other { self } else { other }
    }

    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let milli = self.to_milli_i64() as i128;
        let value = div_round_i128(milli.saturating_mul(num as i128), denom as i128);
        Pt::from_milli_i128(value)
    }

    pub fn half(self) -> Pt {
        self / 2
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        let milli = self.to_milli_i64() as i128;
        Pt::from_milli_i128(milli.saturating_mul(rhs as i128))
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        if rhs == 0 {
            Pt::ZERO
        } else {
            let milli = self.to_milli_i64() as i128;
            Pt::from_milli_i128(div_round_i128(milli, rhs as i128))
        }
    }
}

fn div_round_i128(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let den_abs = den.abs();
    if num >= 0 {
        (num + (den_abs / 2)) / den
    } else {
        -(((-num) + (den_abs / 2)) / den)
    }
}

/// Closed-open vertical interval `[top, bottom)` in top-left page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub top: Pt,
    pub bottom: Pt,
}

impl Band {
    pub fn new(top: f32, bottom: f32) -> Self {
        Self {
            top: Pt::from_f32(top),
            bottom: Pt::from_f32(bottom),
        }
    }

    pub fn height(&self) -> Pt {
        self.bottom - self.top
    }

    pub fn center(&self) -> Pt {
        self.top + self.height().half()
    }
}

/// MediaBox/CropBox of a template page, PDF user space (bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl PageBox {
    pub fn width(&self) -> f32 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f32 {
        self.ury - self.lly
    }

    pub fn x_to_pdf(&self, x: Pt) -> Pt {
        Pt::from_f32(self.llx) + x
    }

    // Layout coordinates grow downwards from the top edge of the page.
    pub fn y_to_pdf(&self, y_from_top: Pt) -> Pt {
        Pt::from_f32(self.ury) - y_from_top
    }
}

impl Default for PageBox {
    fn default() -> Self {
        // A4 landscape, the paper logbook format.
        Self {
            llx: 0.0,
            lly: 0.0,
            urx: 841.89,
            ury: 595.28,
        }
    }
}

pub(crate) fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.unsigned_abs();
    let int_part = abs / 1000;
    let frac = abs % 1000;
    if frac == 0 {
        return format!("{sign}{int_part}");
    }
    let mut frac_str = format!("{:03}", frac);
    while frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{sign}{int_part}.{frac_str}")
}

pub(crate) fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}
