use crate::font::encode_winansi_pdf_string;
use crate::types::{Pt, fmt_pt};

/// Resource name of the overlay font inside each overlay form.
pub const FONT_RESOURCE: &str = "F1";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetFontSize(u16),
    /// `x`/`y` are the left end of the baseline in PDF user space.
    DrawString { x: Pt, y: Pt, text: String },
}

/// Text drawn over one template page, in draw order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOverlay {
    commands: Vec<Command>,
    font_size: Option<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct OverlayContent {
    pub bytes: Vec<u8>,
    /// Characters written as `?` because WinAnsi cannot encode them.
    pub replaced: usize,
}

impl PageOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_font_size(&mut self, size: u16) {
        if self.font_size != Some(size) {
            self.font_size = Some(size);
            self.commands.push(Command::SetFontSize(size));
        }
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn text_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawString { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.text_count() == 0
    }

    /// Serializes the overlay as a content stream: black fill, one text object per string.
    pub fn to_content(&self) -> OverlayContent {
        if self.is_empty() {
            return OverlayContent::default();
        }
        let mut out = String::from("q\n0 g\n");
        let mut replaced = 0usize;
        let mut size = 10u16;
        for command in &self.commands {
            match command {
                Command::SetFontSize(s) => size = *s,
                Command::DrawString { x, y, text } => {
                    let encoded = encode_winansi_pdf_string(text);
                    replaced += encoded.replaced;
                    out.push_str(&format!(
                        "BT /{} {} Tf {} {} Td ({}) Tj ET\n",
                        FONT_RESOURCE,
                        size,
                        fmt_pt(*x),
                        fmt_pt(*y),
                        encoded.text
                    ));
                }
            }
        }
        out.push_str("Q\n");
        OverlayContent {
            bytes: out.into_bytes(),
            replaced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_size_changes_are_deduplicated() {
        let mut overlay = PageOverlay::new();
        overlay.set_font_size(10);
        overlay.draw_string(Pt::from_i32(1), Pt::from_i32(2), "A");
        overlay.set_font_size(10);
        overlay.draw_string(Pt::from_i32(3), Pt::from_i32(4), "B");
        overlay.set_font_size(7);
        assert_eq!(overlay.commands().len(), 4);
        assert_eq!(overlay.text_count(), 2);
    }

    #[test]
    fn content_stream_draws_escaped_text() {
        let mut overlay = PageOverlay::new();
        overlay.set_font_size(7);
        overlay.draw_string(Pt::from_f32(278.6), Pt::from_f32(474.91), "21:00");
        overlay.set_font_size(10);
        overlay.draw_string(Pt::from_i32(40), Pt::from_i32(500), "Vuelo (local)");
        let content = overlay.to_content();
        let text = String::from_utf8(content.bytes).expect("ascii content");
        assert_eq!(
            text,
            "q\n0 g\nBT /F1 7 Tf 278.6 474.91 Td (21:00) Tj ET\nBT /F1 10 Tf 40 500 Td (Vuelo \\(local\\)) Tj ET\nQ\n"
        );
        assert_eq!(content.replaced, 0);
    }

    #[test]
    fn empty_overlay_has_no_content() {
        let mut overlay = PageOverlay::new();
        overlay.set_font_size(10);
        assert!(overlay.is_empty());
        assert!(overlay.to_content().bytes.is_empty());
    }

    #[test]
    fn unencodable_characters_are_counted() {
        let mut overlay = PageOverlay::new();
        overlay.draw_string(Pt::ZERO, Pt::ZERO, "Ωmega");
        let content = overlay.to_content();
        assert_eq!(content.replaced, 1);
        assert!(String::from_utf8_lossy(&content.bytes).contains("(?mega) Tj"));
    }
}
