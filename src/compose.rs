//! Assembles the output document: every page draws its own Form XObject copy of the first
//! template page and, on top of it, that page's overlay form.

use lopdf::{
    Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId,
    Stream as LoStream, dictionary,
};

use crate::error::LogbookError;
use crate::font::FontFace;
use crate::overlay::FONT_RESOURCE;
use crate::template::{TemplatePdf, resolve_array, resolve_dict};
use crate::types::PageBox;

pub(crate) fn template_form_name(page_number: usize) -> String {
    format!("LB_TPL_{page_number}")
}

pub(crate) fn overlay_form_name(page_number: usize) -> String {
    format!("LB_OVL_{page_number}")
}

fn lopdf_err(err: lopdf::Error) -> LogbookError {
    LogbookError::Pdf(format!("compose: {err}"))
}

fn box_array(page_box: PageBox) -> Vec<LoObject> {
    vec![
        LoObject::Real(page_box.llx),
        LoObject::Real(page_box.lly),
        LoObject::Real(page_box.urx),
        LoObject::Real(page_box.ury),
    ]
}

// Resources and Rotate are inheritable page attributes.
fn inherited_attribute(doc: &LoDocument, page: &LoDictionary, key: &[u8]) -> Option<LoObject> {
    let mut current = Some(page);
    let mut depth = 0;
    while let Some(dict) = current {
        if let Ok(value) = dict.get(key) {
            return Some(match value {
                LoObject::Reference(id) => doc.get_object(*id).ok()?.clone(),
                other => other.clone(),
            });
        }
        depth += 1;
        if depth > 32 {
            break;
        }
        current = dict.get(b"Parent").ok().and_then(|o| resolve_dict(doc, o));
    }
    None
}

// Widgets belong to the template's form and popups to their parent annotation; everything else
// (links, stamps, text notes) is copied onto each output page.
fn carried_annotations(doc: &LoDocument, page: &LoDictionary) -> Vec<LoDictionary> {
    let Some(annots) = page.get(b"Annots").ok().and_then(|o| resolve_array(doc, o)) else {
        return Vec::new();
    };
    annots
        .iter()
        .filter_map(|annot| resolve_dict(doc, annot))
        .filter(|dict| {
            !dict
                .get(b"Subtype")
                .and_then(LoObject::as_name)
                .map(|n| n == b"Widget" || n == b"Popup")
                .unwrap_or(false)
        })
        .map(|dict| {
            let mut dict = dict.clone();
            dict.remove(b"Popup");
            dict.remove(b"Parent");
            dict
        })
        .collect()
}

fn import_template(dst: &mut LoDocument, template: &TemplatePdf) -> Result<LoObjectId, LogbookError> {
    let mut src = template.document().clone();
    if src.is_encrypted() {
        return Err(LogbookError::TemplateEncrypted);
    }
    let start_id = dst.max_id + 1;
    src.renumber_objects_with(start_id);
    let Some(first_page) = src.get_pages().values().next().copied() else {
        return Err(LogbookError::TemplateHasNoPages);
    };
    if src.max_id > dst.max_id {
        dst.max_id = src.max_id;
    }
    dst.objects.extend(src.objects);
    Ok(first_page)
}

/// Builds the final PDF. `overlays[i]` is the content stream drawn over output page `i + 1`;
/// an empty stream leaves that page as a plain template copy. No overlays yields a single
/// template page.
pub(crate) fn compose_document(
    template: &TemplatePdf,
    font: &FontFace,
    overlays: &[Vec<u8>],
) -> Result<Vec<u8>, LogbookError> {
    let mut composed = LoDocument::with_version("1.7");
    let template_page_id = import_template(&mut composed, template)?;
    let page_box = template.page_box();

    let template_page = composed
        .get_object(template_page_id)
        .and_then(LoObject::as_dict)
        .map_err(lopdf_err)?
        .clone();
    let template_content = composed.get_page_content(template_page_id).map_err(lopdf_err)?;
    let template_resources = inherited_attribute(&composed, &template_page, b"Resources")
        .unwrap_or_else(|| LoObject::Dictionary(LoDictionary::new()));
    let rotate = inherited_attribute(&composed, &template_page, b"Rotate");
    let annotations = carried_annotations(&composed, &template_page);

    let font_id = if overlays.iter().any(|o| !o.is_empty()) {
        Some(font.add_to_document(&mut composed))
    } else {
        None
    };

    let pages_id = composed.new_object_id();
    let page_total = overlays.len().max(1);
    let mut kids: Vec<LoObject> = Vec::with_capacity(page_total);

    for idx in 0..page_total {
        let page_number = idx + 1;
        let overlay = overlays.get(idx).filter(|o| !o.is_empty());
        let template_form_id = composed.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "FormType" => 1,
                "BBox" => box_array(page_box),
                "Resources" => template_resources.clone(),
            },
            template_content.clone(),
        ));
        let template_name = template_form_name(page_number);
        let mut page_content = format!("q 1 0 0 1 0 0 cm /{template_name} Do Q\n");
        let mut xobjects = LoDictionary::new();
        xobjects.set(template_name, template_form_id);

        if let (Some(overlay), Some(font_id)) = (overlay, font_id) {
            let overlay_form_id = composed.add_object(LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "FormType" => 1,
                    "BBox" => box_array(page_box),
                    "Resources" => dictionary! {
                        "Font" => dictionary! { FONT_RESOURCE => font_id },
                    },
                },
                overlay.clone(),
            ));
            let name = overlay_form_name(page_number);
            page_content.push_str(&format!("q 1 0 0 1 0 0 cm /{name} Do Q\n"));
            xobjects.set(name, overlay_form_id);
        }

        let page_content_id = composed.add_object(LoStream::new(dictionary! {}, page_content.into_bytes()));
        let page_id = composed.new_object_id();
        let annots: Vec<LoObject> = annotations
            .iter()
            .map(|annot| {
                let mut annot = annot.clone();
                annot.set("P", page_id);
                LoObject::Reference(composed.add_object(annot))
            })
            .collect();
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => page_content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
            "MediaBox" => box_array(page_box),
        };
        if let Some(rotate) = &rotate {
            page.set("Rotate", rotate.clone());
        }
        if !annots.is_empty() {
            page.set("Annots", annots);
        }
        composed.objects.insert(page_id, LoObject::Dictionary(page));
        kids.push(LoObject::Reference(page_id));
    }

    composed.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_total as i64,
        }),
    );

    let catalog_id = composed.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = composed.add_object(dictionary! {
        "Producer" => LoObject::string_literal(format!("logbook-pdf {}", env!("CARGO_PKG_VERSION"))),
    });
    composed.trailer.set("Root", catalog_id);
    composed.trailer.set("Info", info_id);
    composed.prune_objects();
    composed.renumber_objects();
    composed.compress();

    let mut out = Vec::new();
    composed.save_to(&mut out).map_err(|err| LogbookError::Pdf(format!("save: {err}")))?;
    Ok(out)
}

/// Test helper: the decoded overlay content stream of a 1-based output page, if any.
#[cfg(test)]
pub(crate) fn overlay_content(pdf: &[u8], page_number: usize) -> Option<String> {
    let doc = LoDocument::load_mem(pdf).ok()?;
    let page_id = *doc.get_pages().get(&(page_number as u32))?;
    let page = doc.get_object(page_id).ok()?.as_dict().ok()?;
    let resources = resolve_dict(&doc, page.get(b"Resources").ok()?)?;
    let xobjects = resolve_dict(&doc, resources.get(b"XObject").ok()?)?;
    let form_id = xobjects
        .get(overlay_form_name(page_number).as_bytes())
        .ok()?
        .as_reference()
        .ok()?;
    let stream = doc.get_object(form_id).ok()?.as_stream().ok()?;
    let bytes = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::fixtures::{blank_template_bytes, template_pdf_bytes};

    fn template() -> TemplatePdf {
        TemplatePdf::from_bytes(blank_template_bytes()).expect("template")
    }

    fn page_dict(doc: &LoDocument, page_number: u32) -> LoDictionary {
        let page_id = doc.get_pages()[&page_number];
        doc.get_object(page_id)
            .and_then(LoObject::as_dict)
            .expect("page")
            .clone()
    }

    #[test]
    fn one_page_per_overlay_with_template_underneath() {
        let overlays = vec![
            b"q\n0 g\nBT /F1 10 Tf 10 10 Td (A) Tj ET\nQ\n".to_vec(),
            b"q\n0 g\nBT /F1 10 Tf 10 10 Td (B) Tj ET\nQ\n".to_vec(),
        ];
        let pdf = compose_document(&template(), &FontFace::helvetica(), &overlays).expect("compose");
        let doc = LoDocument::load_mem(&pdf).expect("load");
        assert_eq!(doc.get_pages().len(), 2);

        let first = page_dict(&doc, 1);
        let media = first.get(b"MediaBox").and_then(LoObject::as_array).expect("media box");
        assert_eq!(media.len(), 4);

        let content = doc.get_page_content(doc.get_pages()[&2]).expect("content");
        let content = String::from_utf8(content).expect("ascii");
        assert!(content.contains("/LB_TPL_2 Do"));
        assert!(content.contains("/LB_OVL_2 Do"));

        assert!(overlay_content(&pdf, 1).expect("overlay 1").contains("(A) Tj"));
        assert!(overlay_content(&pdf, 2).expect("overlay 2").contains("(B) Tj"));
    }

    #[test]
    fn no_overlays_yield_a_single_template_page() {
        let pdf = compose_document(&template(), &FontFace::helvetica(), &[]).expect("compose");
        let doc = LoDocument::load_mem(&pdf).expect("load");
        assert_eq!(doc.get_pages().len(), 1);
        assert!(overlay_content(&pdf, 1).is_none());
        let content = doc.get_page_content(doc.get_pages()[&1]).expect("content");
        assert!(String::from_utf8_lossy(&content).contains("/LB_TPL_1 Do"));
    }

    #[test]
    fn empty_overlay_pages_keep_the_template_only() {
        let overlays = vec![Vec::new(), b"BT /F1 8 Tf 1 1 Td (x) Tj ET\n".to_vec()];
        let pdf = compose_document(&template(), &FontFace::helvetica(), &overlays).expect("compose");
        assert!(overlay_content(&pdf, 1).is_none());
        assert!(overlay_content(&pdf, 2).is_some());
    }

    #[test]
    fn every_page_gets_its_own_template_copy() {
        let overlays = vec![b"BT ET\n".to_vec(), b"BT ET\n".to_vec()];
        let pdf = compose_document(&template(), &FontFace::helvetica(), &overlays).expect("compose");
        let doc = LoDocument::load_mem(&pdf).expect("load");
        let mut form_ids = Vec::new();
        for page_number in 1..=2u32 {
            let page = page_dict(&doc, page_number);
            let resources = resolve_dict(&doc, page.get(b"Resources").expect("resources")).expect("dict");
            let xobjects = resolve_dict(&doc, resources.get(b"XObject").expect("xobject")).expect("dict");
            let form_id = xobjects
                .get(template_form_name(page_number as usize).as_bytes())
                .and_then(LoObject::as_reference)
                .expect("template form");
            let stream = doc.get_object(form_id).and_then(LoObject::as_stream).expect("stream");
            let bytes = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            assert!(String::from_utf8_lossy(&bytes).contains("(BLANK LOGBOOK) Tj"));
            form_ids.push(form_id);
        }
        assert_ne!(form_ids[0], form_ids[1]);
    }

    fn template_with_link() -> TemplatePdf {
        let bytes = template_pdf_bytes(800.0, 600.0, &[("Fecha_0", [10.0, 480.0, 60.0, 500.0])]);
        let mut doc = LoDocument::load_mem(&bytes).expect("load");
        let page_id = doc.get_pages()[&1];
        let link_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![10.into(), 10.into(), 100.into(), 30.into()],
            "P" => page_id,
            "A" => dictionary! {
                "S" => "URI",
                "URI" => LoObject::string_literal("https://example.org/logbook"),
            },
        });
        doc.get_object_mut(page_id)
            .and_then(LoObject::as_dict_mut)
            .and_then(|page| page.get_mut(b"Annots"))
            .and_then(LoObject::as_array_mut)
            .expect("annots")
            .push(LoObject::Reference(link_id));
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save");
        TemplatePdf::from_bytes(out).expect("template")
    }

    fn page_annotations(doc: &LoDocument, page_number: u32) -> Vec<LoObjectId> {
        page_dict(doc, page_number)
            .get(b"Annots")
            .and_then(LoObject::as_array)
            .map(|annots| annots.iter().filter_map(|a| a.as_reference().ok()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn non_widget_annotations_are_copied_onto_every_page() {
        let overlays = vec![b"BT ET\n".to_vec(), b"BT ET\n".to_vec()];
        let pdf = compose_document(&template_with_link(), &FontFace::helvetica(), &overlays).expect("compose");
        let doc = LoDocument::load_mem(&pdf).expect("load");
        let mut seen = Vec::new();
        for page_number in 1..=2u32 {
            let annots = page_annotations(&doc, page_number);
            assert_eq!(annots.len(), 1, "page {page_number}");
            let annot = doc.get_object(annots[0]).and_then(LoObject::as_dict).expect("annot");
            assert_eq!(annot.get(b"Subtype").and_then(LoObject::as_name).expect("subtype"), b"Link");
            let owner = annot.get(b"P").and_then(LoObject::as_reference).expect("owner");
            assert_eq!(owner, doc.get_pages()[&page_number]);
            seen.push(annots[0]);
        }
        assert_ne!(seen[0], seen[1]);
    }

    #[test]
    fn zero_records_keep_template_links_but_not_form_fields() {
        let pdf = compose_document(&template_with_link(), &FontFace::helvetica(), &[]).expect("compose");
        let doc = LoDocument::load_mem(&pdf).expect("load");
        assert_eq!(page_annotations(&doc, 1).len(), 1);
        let catalog = doc.catalog().expect("catalog");
        assert!(catalog.get(b"AcroForm").is_err());
    }

    #[test]
    fn output_is_deterministic() {
        let overlays = vec![b"BT /F1 8 Tf 1 1 Td (x) Tj ET\n".to_vec()];
        let a = compose_document(&template(), &FontFace::helvetica(), &overlays).expect("a");
        let b = compose_document(&template(), &FontFace::helvetica(), &overlays).expect("b");
        assert_eq!(a, b);
    }
}
