use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use serde_json::Value;
use tracing::debug;

use super::traits::{Converter, PdfEngine};
use crate::error::{Error, Result};
use crate::request::{ConversionOptions, Metadata, PdfFormats};

/// PDF engine built on lopdf.
///
/// Merging and metadata are done in-process. PDF/A and PDF/UA conversion
/// needs a real renderer, so it is delegated to an optional converter that
/// can re-export a PDF (LibreOffice does).
#[derive(Default)]
pub struct LopdfEngine {
    normalizer: Option<Arc<dyn Converter>>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `converter` for PDF format conversion.
    pub fn with_normalizer(converter: Arc<dyn Converter>) -> Self {
        Self {
            normalizer: Some(converter),
        }
    }
}

#[async_trait]
impl PdfEngine for LopdfEngine {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || merge_files(&inputs, &output))
            .await
            .map_err(|e| Error::Merge(format!("merge task failed: {e}")))?
    }

    async fn convert(&self, formats: &PdfFormats, input: &Path, output: &Path) -> Result<()> {
        let Some(normalizer) = &self.normalizer else {
            return Err(Error::Unsupported {
                engine: self.name(),
                operation: "PDF format conversion",
            });
        };

        let options = ConversionOptions {
            pdf_formats: Some(formats.clone()),
            ..Default::default()
        };

        debug!(
            "Converting {} to {} with {}",
            input.display(),
            formats,
            normalizer.name()
        );

        normalizer
            .pdf(input, output, &options)
            .await
            .map_err(|e| Error::Normalize(e.to_string()))
    }

    async fn write_metadata(&self, metadata: &Metadata, path: &Path) -> Result<()> {
        let metadata = metadata.clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || write_info(&metadata, &path))
            .await
            .map_err(|e| Error::Metadata(format!("metadata task failed: {e}")))?
    }
}

/// Concatenate the pages of `inputs`, in order, into `output`.
fn merge_files(inputs: &[PathBuf], output: &Path) -> Result<()> {
    if inputs.len() < 2 {
        return Err(Error::Merge(format!(
            "need at least two PDFs to merge, got {}",
            inputs.len()
        )));
    }

    let mut max_id: u32 = 1;
    let mut ordered_pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut document = Document::with_version("1.7");

    for input in inputs {
        let mut doc = Document::load(input)
            .map_err(|e| Error::Lopdf(format!("failed to load {}: {e}", input.display())))?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        // get_pages is keyed by page number, so this keeps reading order
        for page_id in doc.get_pages().into_values() {
            let page = flatten_page(&doc, page_id)
                .map_err(|e| Error::Lopdf(format!("{}: {e}", input.display())))?;
            ordered_pages.push((page_id, Object::Dictionary(page)));
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    objects.insert(object_id, object);
                }
            }
        }
    }

    document.objects.extend(objects);
    document.max_id = max_id;

    let pages_id = document.new_object_id();

    let mut kids = Vec::with_capacity(ordered_pages.len());
    for (page_id, page) in ordered_pages {
        if let Object::Dictionary(mut dict) = page {
            dict.set("Parent", Object::Reference(pages_id));
            document.objects.insert(page_id, Object::Dictionary(dict));
            kids.push(Object::Reference(page_id));
        }
    }

    let count = i64::try_from(kids.len())
        .map_err(|_| Error::Merge("too many pages".to_string()))?;

    document.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );

    let catalog_id = document.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    document.trailer.set("Root", Object::Reference(catalog_id));

    document.renumber_objects();
    document.compress();

    document
        .save(output)
        .map_err(|e| Error::Merge(format!("failed to save {}: {e}", output.display())))?;

    debug!("Merged {} PDFs into {}", inputs.len(), output.display());
    Ok(())
}

/// Page attributes a page may take from its `Pages` ancestors.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copy of the page dictionary with inherited attributes made explicit.
///
/// The merged document gets a fresh page tree, so anything a page only had
/// through its old ancestors would otherwise be lost.
fn flatten_page(doc: &Document, page_id: ObjectId) -> lopdf::Result<Dictionary> {
    let mut page = doc.get_dictionary(page_id)?.clone();
    let mut visited = vec![page_id];
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    while let Some(node_id) = parent {
        // Malformed trees can loop
        if visited.contains(&node_id) {
            break;
        }
        visited.push(node_id);

        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key.to_vec(), value.clone());
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Ok(page)
}

/// Update the document information dictionary of `path` in place.
fn write_info(metadata: &Metadata, path: &Path) -> Result<()> {
    let mut doc = Document::load(path)
        .map_err(|e| Error::Lopdf(format!("failed to load {}: {e}", path.display())))?;

    let info_id = if let Ok(id) = doc.trailer.get(b"Info").and_then(Object::as_reference) {
        id
    } else {
        let id = doc.add_object(Dictionary::new());
        doc.trailer.set("Info", Object::Reference(id));
        id
    };

    let info = doc
        .get_dictionary_mut(info_id)
        .map_err(|e| Error::Metadata(format!("bad Info dictionary: {e}")))?;

    for (key, value) in metadata.iter() {
        match info_value(value) {
            Some(object) => info.set(key.as_str(), object),
            None => {
                info.remove(key.as_bytes());
            }
        }
    }

    doc.save(path)
        .map_err(|e| Error::Metadata(format!("failed to save {}: {e}", path.display())))?;

    debug!("Wrote {} metadata entries to {}", metadata.len(), path.display());
    Ok(())
}

/// Render a JSON value as an Info entry. `null` means "remove the key".
fn info_value(value: &Value) -> Option<Object> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => value.to_string(),
    };
    Some(text_string(&text))
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lopdf::Stream;
    use lopdf::content::{Content, Operation};
    use serde_json::json;

    fn create_test_pdf(path: &Path, page_texts: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let page_tree_id = doc.new_object_id();

        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));

        let resources_id = doc.add_object(Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]));

        let mut kids = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

            let page_id = doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(page_tree_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
                (
                    "MediaBox",
                    Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
                ),
            ]));
            kids.push(Object::Reference(page_id));
        }

        let count = i64::try_from(kids.len()).unwrap();
        doc.objects.insert(
            page_tree_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(kids)),
                ("Count", Object::Integer(count)),
            ])),
        );

        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(page_tree_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).unwrap();
    }

    /// Move `Resources` and `MediaBox` from every page onto the `Pages` node.
    fn hoist_to_page_tree(path: &Path) {
        let mut doc = Document::load(path).unwrap();
        let root_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
        let pages_id = doc
            .get_dictionary(root_id)
            .unwrap()
            .get(b"Pages")
            .unwrap()
            .as_reference()
            .unwrap();

        let mut hoisted = Vec::new();
        for page_id in doc.get_pages().into_values() {
            let page = doc.get_dictionary_mut(page_id).unwrap();
            for key in [b"Resources".as_slice(), b"MediaBox"] {
                if let Some(value) = page.remove(key) {
                    hoisted.push((key.to_vec(), value));
                }
            }
        }

        let pages = doc.get_dictionary_mut(pages_id).unwrap();
        for (key, value) in hoisted {
            pages.set(key, value);
        }
        doc.save(path).unwrap();
    }

    fn page_texts(path: &Path) -> Vec<String> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .values()
            .map(|&page_id| {
                let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
                content
                    .operations
                    .iter()
                    .filter(|op| op.operator == "Tj")
                    .map(|op| String::from_utf8_lossy(op.operands[0].as_str().unwrap()).into_owned())
                    .collect::<String>()
            })
            .collect()
    }

    fn info_entry(path: &Path, key: &str) -> Option<Object> {
        let doc = Document::load(path).unwrap();
        let info_id = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
        doc.get_dictionary(info_id).unwrap().get(key.as_bytes()).ok().cloned()
    }

    #[tokio::test]
    async fn test_merge_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        let out = dir.path().join("merged.pdf");
        create_test_pdf(&a, &["A1", "A2"]);
        create_test_pdf(&b, &["B1"]);

        let engine = LopdfEngine::new();
        engine.merge(&[b.clone(), a.clone()], &out).await.unwrap();

        assert_eq!(page_texts(&out), vec!["B1", "A1", "A2"]);
    }

    #[tokio::test]
    async fn test_merge_keeps_inherited_page_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        let out = dir.path().join("merged.pdf");
        create_test_pdf(&a, &["A1"]);
        create_test_pdf(&b, &["B1"]);
        hoist_to_page_tree(&a);
        hoist_to_page_tree(&b);

        LopdfEngine::new().merge(&[a, b], &out).await.unwrap();

        let merged = Document::load(&out).unwrap();
        let pages = merged.get_pages();
        assert_eq!(pages.len(), 2);
        for page_id in pages.into_values() {
            let page = merged.get_dictionary(page_id).unwrap();
            assert!(page.has(b"MediaBox"), "page {page_id:?} lost its MediaBox");

            let resources = match page.get(b"Resources").unwrap() {
                Object::Reference(id) => merged.get_dictionary(*id).unwrap(),
                Object::Dictionary(dict) => dict,
                other => panic!("unexpected Resources {other:?}"),
            };
            assert!(resources.has(b"Font"));
        }
        assert_eq!(page_texts(&out), vec!["A1", "B1"]);
    }

    #[tokio::test]
    async fn test_merge_needs_two_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        create_test_pdf(&a, &["A1"]);

        let result = LopdfEngine::new()
            .merge(&[a], &dir.path().join("out.pdf"))
            .await;
        assert!(matches!(result, Err(Error::Merge(_))));
    }

    #[tokio::test]
    async fn test_merge_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let junk = dir.path().join("junk.pdf");
        create_test_pdf(&a, &["A1"]);
        std::fs::write(&junk, b"not a pdf").unwrap();

        let result = LopdfEngine::new()
            .merge(&[a, junk], &dir.path().join("out.pdf"))
            .await;
        assert!(matches!(result, Err(Error::Lopdf(_))));
    }

    #[tokio::test]
    async fn test_write_metadata_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        create_test_pdf(&path, &["Hello"]);

        let mut metadata = Metadata::default();
        metadata.insert("Author", "Jane Doe");
        metadata.insert("Keywords", json!(["first", "second"]));
        metadata.insert("Trapped", json!(true));
        metadata.insert("Title", "Résumé");

        LopdfEngine::new().write_metadata(&metadata, &path).await.unwrap();

        assert_eq!(
            info_entry(&path, "Author").unwrap().as_str().unwrap(),
            b"Jane Doe"
        );
        assert_eq!(
            info_entry(&path, "Keywords").unwrap().as_str().unwrap(),
            b"first, second"
        );
        assert_eq!(info_entry(&path, "Trapped").unwrap().as_str().unwrap(), b"true");

        let title = info_entry(&path, "Title").unwrap();
        assert!(title.as_str().unwrap().starts_with(&[0xFE, 0xFF]));
        assert_eq!(page_texts(&path), vec!["Hello"]);
    }

    #[tokio::test]
    async fn test_write_metadata_overwrites_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        create_test_pdf(&path, &["Hello"]);
        let engine = LopdfEngine::new();

        let mut first = Metadata::default();
        first.insert("Author", "First");
        first.insert("Subject", "Drafts");
        engine.write_metadata(&first, &path).await.unwrap();

        let mut second = Metadata::default();
        second.insert("Author", "Second");
        second.insert("Subject", Value::Null);
        engine.write_metadata(&second, &path).await.unwrap();

        assert_eq!(info_entry(&path, "Author").unwrap().as_str().unwrap(), b"Second");
        assert!(info_entry(&path, "Subject").is_none());
    }

    #[tokio::test]
    async fn test_convert_without_normalizer_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let formats = PdfFormats::new(Some("PDF/A-2b".into()), false);

        let result = LopdfEngine::new()
            .convert(&formats, &dir.path().join("a.pdf"), &dir.path().join("b.pdf"))
            .await;

        assert!(matches!(result, Err(Error::Unsupported { .. })));
    }

    #[test]
    fn test_info_value_rendering() {
        assert!(info_value(&Value::Null).is_none());
        let nested = info_value(&json!({"a": 1})).unwrap();
        assert_eq!(nested.as_str().unwrap(), br#"{"a":1}"#);
        let number = info_value(&json!(4.5)).unwrap();
        assert_eq!(number.as_str().unwrap(), b"4.5");
    }
}
