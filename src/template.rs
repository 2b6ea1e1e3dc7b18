use lopdf::{Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId};
use std::path::Path;
use std::sync::Arc;

use crate::error::LogbookError;
use crate::types::PageBox;

/// A blank logbook template, parsed and checked once before any rendering starts.
#[derive(Debug, Clone)]
pub struct TemplatePdf {
    bytes: Arc<[u8]>,
    document: LoDocument,
    first_page_id: LoObjectId,
    page_box: PageBox,
    page_count: usize,
    sha256: String,
}

impl TemplatePdf {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LogbookError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|err| LogbookError::TemplateUnreadable(format!("{}: {err}", path.display())))?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, LogbookError> {
        let bytes: Vec<u8> = bytes.into();
        let document = LoDocument::load_mem(&bytes)
            .map_err(|err| LogbookError::TemplateUnreadable(err.to_string()))?;
        Self::from_document(document, bytes)
    }

    fn from_document(document: LoDocument, bytes: Vec<u8>) -> Result<Self, LogbookError> {
        if document.is_encrypted() {
            return Err(LogbookError::TemplateEncrypted);
        }
        let pages = document.get_pages();
        let Some(first_page_id) = pages.values().next().copied() else {
            return Err(LogbookError::TemplateHasNoPages);
        };
        let page_box = resolve_page_box(&document, first_page_id);
        let sha256 = logbook_contract::hex_sha256(&bytes);
        Ok(Self {
            bytes: Arc::from(bytes),
            document,
            first_page_id,
            page_box,
            page_count: pages.len(),
            sha256,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_box(&self) -> PageBox {
        self.page_box
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn pdf_version(&self) -> &str {
        &self.document.version
    }

    pub(crate) fn document(&self) -> &LoDocument {
        &self.document
    }

    pub(crate) fn first_page_id(&self) -> LoObjectId {
        self.first_page_id
    }
}

pub(crate) fn resolve_dict<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> Option<&'a LoDictionary> {
    match obj {
        LoObject::Dictionary(d) => Some(d),
        LoObject::Reference(id) => doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()),
        _ => None,
    }
}

pub(crate) fn resolve_array<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> Option<&'a Vec<LoObject>> {
    match obj {
        LoObject::Array(items) => Some(items),
        LoObject::Reference(id) => doc.get_object(*id).ok().and_then(|o| o.as_array().ok()),
        _ => None,
    }
}

pub(crate) fn object_number(doc: &LoDocument, obj: &LoObject) -> Option<f32> {
    match obj {
        LoObject::Integer(v) => Some(*v as f32),
        LoObject::Real(v) => Some(*v),
        LoObject::Reference(id) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| object_number(doc, o)),
        _ => None,
    }
}

/// Reads a `[x1 y1 x2 y2]` rectangle, normalizing corner order.
pub(crate) fn rect_from_object(doc: &LoDocument, obj: &LoObject) -> Option<[f32; 4]> {
    let items = resolve_array(doc, obj)?;
    if items.len() != 4 {
        return None;
    }
    let mut nums = [0.0f32; 4];
    for (slot, item) in nums.iter_mut().zip(items) {
        *slot = object_number(doc, item)?;
    }
    Some([
        nums[0].min(nums[2]),
        nums[1].min(nums[3]),
        nums[0].max(nums[2]),
        nums[1].max(nums[3]),
    ])
}

// CropBox wins over MediaBox; both may be inherited from the page tree.
fn resolve_page_box(doc: &LoDocument, page_id: LoObjectId) -> PageBox {
    let mut current = doc.get_object(page_id).ok().and_then(|o| o.as_dict().ok());
    let mut media: Option<[f32; 4]> = None;
    let mut crop: Option<[f32; 4]> = None;
    let mut depth = 0;
    while let Some(dict) = current {
        if crop.is_none() {
            crop = dict.get(b"CropBox").ok().and_then(|o| rect_from_object(doc, o));
        }
        if media.is_none() {
            media = dict.get(b"MediaBox").ok().and_then(|o| rect_from_object(doc, o));
        }
        depth += 1;
        if depth > 32 || (crop.is_some() && media.is_some()) {
            break;
        }
        current = dict.get(b"Parent").ok().and_then(|o| resolve_dict(doc, o));
    }
    match crop.or(media) {
        Some([llx, lly, urx, ury]) if urx > llx && ury > lly => PageBox { llx, lly, urx, ury },
        _ => PageBox {
            llx: 0.0,
            lly: 0.0,
            urx: 612.0,
            ury: 792.0,
        },
    }
}
