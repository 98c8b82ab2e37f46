//! `lopdf`-backed [`DocumentLibrary`].
//!
//! Copying works at the object level: the first time a source contributes a
//! page its whole object graph is renumbered past the output's highest id and
//! moved in, then each requested page gets a fresh page dictionary whose
//! inheritable attributes are flattened and whose parent is the output's page
//! tree root.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use uuid::Uuid;

use crate::application::assembly::{DocumentLibrary, LibraryError};

const OUTPUT_VERSION: &str = "1.7";
/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfLibrary;

impl LopdfLibrary {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug)]
pub struct LoadedPdf {
    key: Uuid,
    document: Document,
    page_count: u32,
}

#[derive(Debug)]
pub struct PdfBuilder {
    document: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    imported: HashMap<Uuid, Vec<ObjectId>>,
}

impl PdfBuilder {
    /// Move the source's objects in once and return its renumbered page ids.
    fn import(&mut self, source: &LoadedPdf) -> &[ObjectId] {
        let document = &mut self.document;
        self.imported.entry(source.key).or_insert_with(|| {
            let mut copy = source.document.clone();
            copy.renumber_objects_with(document.max_id + 1);
            let page_ids: Vec<ObjectId> = copy.get_pages().values().copied().collect();
            if copy.max_id > document.max_id {
                document.max_id = copy.max_id;
            }
            document.objects.extend(copy.objects);
            page_ids
        })
    }
}

fn lopdf_err(err: lopdf::Error) -> LibraryError {
    LibraryError::Parse(err.to_string())
}

/// Look `key` up on the page, then on each ancestor.
fn inherited(document: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

impl DocumentLibrary for LopdfLibrary {
    type Source = LoadedPdf;
    type Output = PdfBuilder;

    fn load(&self, bytes: &[u8]) -> Result<LoadedPdf, LibraryError> {
        let document = Document::load_mem(bytes).map_err(lopdf_err)?;
        if document.is_encrypted() {
            return Err(LibraryError::Encrypted);
        }
        let page_count = u32::try_from(document.get_pages().len())
            .map_err(|_| LibraryError::Parse("too many pages".to_string()))?;
        Ok(LoadedPdf {
            key: Uuid::new_v4(),
            document,
            page_count,
        })
    }

    fn page_count(&self, source: &LoadedPdf) -> u32 {
        source.page_count
    }

    fn create(&self) -> PdfBuilder {
        let mut document = Document::with_version(OUTPUT_VERSION);
        let pages_id = document.new_object_id();
        PdfBuilder {
            document,
            pages_id,
            kids: Vec::new(),
            imported: HashMap::new(),
        }
    }

    fn copy_page(
        &self,
        output: &mut PdfBuilder,
        source: &LoadedPdf,
        page_index: u32,
    ) -> Result<(), LibraryError> {
        let page_id = output
            .import(source)
            .get(page_index as usize)
            .copied()
            .ok_or(LibraryError::PageOutOfRange {
                index: page_index,
                count: source.page_count,
            })?;

        let original = output
            .document
            .get_dictionary(page_id)
            .map_err(|err| LibraryError::Copy(err.to_string()))?;
        let mut page = original.clone();
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited(&output.document, original, key) {
                    page.set(key, value);
                }
            }
        }
        page.set("Parent", output.pages_id);

        let new_id = output.document.add_object(page);
        output.kids.push(Object::Reference(new_id));
        Ok(())
    }

    fn save(&self, output: PdfBuilder) -> Result<Vec<u8>, LibraryError> {
        let PdfBuilder {
            mut document,
            pages_id,
            kids,
            ..
        } = output;

        let count = kids.len() as i64;
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);
        document.prune_objects();
        document.renumber_objects();

        let mut bytes = Vec::new();
        document
            .save_to(&mut bytes)
            .map_err(|err| LibraryError::Save(err.to_string()))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use lopdf::Stream;

    use super::*;

    /// Uncompressed PDF with one page per label. Resources and MediaBox sit on
    /// the page tree root so pages rely on inheritance.
    fn pdf_with_pages(labels: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids = Vec::new();
        for label in labels {
            let content = format!("BT /F1 18 Tf 72 720 Td ({label}) Tj ET").into_bytes();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => labels.len() as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save");
        bytes
    }

    fn page_texts(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).expect("load output");
        doc.get_pages()
            .values()
            .map(|page_id| {
                let content = doc.get_page_content(*page_id).expect("page content");
                String::from_utf8_lossy(&content).to_string()
            })
            .collect()
    }

    #[test]
    fn load_reports_page_count() {
        let library = LopdfLibrary::new();
        let source = library
            .load(&pdf_with_pages(&["one", "two", "three"]))
            .expect("load");
        assert_eq!(library.page_count(&source), 3);
    }

    #[test]
    fn copies_pages_across_sources_in_call_order() {
        let library = LopdfLibrary::new();
        let a = library.load(&pdf_with_pages(&["A0", "A1", "A2"])).expect("load a");
        let b = library.load(&pdf_with_pages(&["B0", "B1"])).expect("load b");

        let mut output = library.create();
        library.copy_page(&mut output, &a, 2).expect("copy");
        library.copy_page(&mut output, &b, 0).expect("copy");
        library.copy_page(&mut output, &a, 0).expect("copy");
        let bytes = library.save(output).expect("save");

        let texts = page_texts(&bytes);
        assert_eq!(texts.len(), 3);
        assert!(texts[0].contains("(A2)"));
        assert!(texts[1].contains("(B0)"));
        assert!(texts[2].contains("(A0)"));
    }

    #[test]
    fn same_page_can_appear_twice() {
        let library = LopdfLibrary::new();
        let a = library.load(&pdf_with_pages(&["only"])).expect("load");
        let mut output = library.create();
        library.copy_page(&mut output, &a, 0).expect("copy");
        library.copy_page(&mut output, &a, 0).expect("copy");
        let bytes = library.save(output).expect("save");
        assert_eq!(page_texts(&bytes).len(), 2);
    }

    #[test]
    fn inherited_attributes_survive_the_copy() {
        let library = LopdfLibrary::new();
        let a = library.load(&pdf_with_pages(&["x"])).expect("load");
        let mut output = library.create();
        library.copy_page(&mut output, &a, 0).expect("copy");
        let bytes = library.save(output).expect("save");

        let doc = Document::load_mem(&bytes).expect("load output");
        let page_id = *doc.get_pages().values().next().expect("one page");
        let page = doc.get_dictionary(page_id).expect("page dict");
        let media_box = page
            .get(b"MediaBox")
            .and_then(Object::as_array)
            .expect("media box");
        assert_eq!(media_box.len(), 4);
        assert!(page.has(b"Resources"));
    }

    #[test]
    fn out_of_range_page_is_reported() {
        let library = LopdfLibrary::new();
        let a = library.load(&pdf_with_pages(&["x"])).expect("load");
        let mut output = library.create();
        let err = library.copy_page(&mut output, &a, 1).unwrap_err();
        assert_eq!(err, LibraryError::PageOutOfRange { index: 1, count: 1 });
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let library = LopdfLibrary::new();
        assert!(matches!(
            library.load(b"definitely not a pdf"),
            Err(LibraryError::Parse(_))
        ));
    }
}
