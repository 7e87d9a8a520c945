//! PDF structure operations on top of `lopdf`.
//!
//! Everything here works on a parsed [`Document`] in memory and never
//! touches the store; callers decide where bytes go. Rasterisation lives in
//! [`super::render`] because it needs pdfium.

use crate::error::DocConvError;
use lopdf::{
    dictionary, Dictionary, Document, EncryptionState, EncryptionVersion, Object, ObjectId,
    Permissions, SaveOptions, StringFormat,
};
use std::collections::{BTreeSet, HashMap};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Keys pointing up or across the document; never followed when copying
/// one page out.
const BACK_REFERENCES: [&[u8]; 2] = [b"Parent", b"P"];

/// Key length for RC4 encryption (security handler revision 3).
const KEY_LENGTH_BITS: usize = 128;

/// Parse a PDF from disk.
///
/// A file that needs a password to open is rejected with
/// [`DocConvError::EncryptedInput`]. Files protected only by an owner
/// password (empty user password) open transparently.
pub fn load(path: &Path) -> Result<Document, DocConvError> {
    let doc = Document::load(path).map_err(|e| match e {
        lopdf::Error::IO(io) if io.kind() != std::io::ErrorKind::InvalidData => {
            DocConvError::storage(path, io)
        }
        other => DocConvError::CorruptInput {
            path: path.to_path_buf(),
            detail: other.to_string(),
        },
    })?;

    if doc.is_encrypted() {
        return Err(DocConvError::EncryptedInput {
            path: path.to_path_buf(),
        });
    }
    if doc.was_encrypted() {
        debug!("{} opened with an empty user password", path.display());
    }
    if doc.get_pages().is_empty() {
        return Err(DocConvError::CorruptInput {
            path: path.to_path_buf(),
            detail: "document has no pages".into(),
        });
    }
    Ok(doc)
}

/// Extracted text of every page, in page order. Pages whose text cannot be
/// extracted yield an empty string.
pub fn page_texts(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .keys()
        .map(|&n| match doc.extract_text(&[n]) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("No text extracted from page {}: {}", n, e);
                String::new()
            }
        })
        .collect()
}

/// Concatenate documents into one, preserving input order and page order.
pub fn merge(docs: Vec<Document>) -> lopdf::Result<Document> {
    let mut out = Document::with_version("1.7");
    let pages_id = out.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    let mut next_id = out.max_id + 1;

    for mut doc in docs {
        doc.renumber_objects_with(next_id);
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &id in &page_ids {
            flatten_inherited(&mut doc, id)?;
        }
        next_id = doc.objects.keys().map(|id| id.0).max().unwrap_or(next_id) + 1;

        for (id, object) in doc.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Outlines" => {}
                _ => {
                    out.objects.insert(id, object);
                }
            }
        }
        for id in page_ids {
            out.get_dictionary_mut(id)?.set("Parent", pages_id);
            kids.push(Object::Reference(id));
        }
    }

    let count = kids.len() as i64;
    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    out.max_id = next_id - 1;
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);

    out.prune_objects();
    out.renumber_objects();
    Ok(out)
}

/// A new document holding only page `page_number` (1-based).
///
/// Built from the objects the page itself reaches (content, resources,
/// annotations), never from the catalog, so document-wide structures such
/// as the structure tree, name trees, outlines and form fields stay behind.
/// Links that jump to another page are dropped with them.
pub fn extract_page(doc: &Document, page_number: u32) -> lopdf::Result<Document> {
    let page_id = *doc
        .get_pages()
        .get(&page_number)
        .ok_or(lopdf::Error::PageNumberNotFound(page_number))?;

    let mut page = doc.get_dictionary(page_id)?.clone();
    for (key, value) in inherited_attributes(doc, page_id)? {
        page.set(key, value);
    }
    page.remove(b"Parent");
    page.remove(b"StructParents");
    // Article beads chain into other pages.
    page.remove(b"B");
    if let Some(annots) = page.get(b"Annots").ok().cloned() {
        let kept = page_local_annotations(doc, &annots);
        if kept.is_empty() {
            page.remove(b"Annots");
        } else {
            page.set("Annots", kept);
        }
    }

    let mut out = Document::with_version(doc.version.clone());
    let mut seen = BTreeSet::from([page_id]);
    let mut pending = Vec::new();
    collect_references(&Object::Dictionary(page.clone()), &mut pending);
    while let Some(id) = pending.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Ok(object) = doc.get_object(id) {
            collect_references(object, &mut pending);
            out.objects.insert(id, object.clone());
        }
    }

    // Back-pointers that were not followed must not dangle.
    let kept: BTreeSet<ObjectId> = out.objects.keys().copied().chain([page_id]).collect();
    for object in out.objects.values_mut() {
        let dict = match object {
            Object::Dictionary(dict) => dict,
            Object::Stream(stream) => &mut stream.dict,
            _ => continue,
        };
        for key in BACK_REFERENCES {
            let dangling = matches!(dict.get(key), Ok(Object::Reference(id)) if !kept.contains(id));
            if dangling {
                dict.remove(key);
            }
        }
    }

    out.max_id = kept.iter().map(|id| id.0).max().unwrap_or(0);
    let pages_id = out.new_object_id();
    page.set("Parent", pages_id);
    out.objects.insert(page_id, Object::Dictionary(page));
    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);
    out.renumber_objects();
    Ok(out)
}

/// Every indirect reference under `object`, except those stored under
/// [`BACK_REFERENCES`] keys.
fn collect_references(object: &Object, found: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => found.push(*id),
        Object::Array(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        Object::Dictionary(dict) => collect_dictionary_references(dict, found),
        Object::Stream(stream) => collect_dictionary_references(&stream.dict, found),
        _ => {}
    }
}

fn collect_dictionary_references(dict: &Dictionary, found: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if !BACK_REFERENCES.contains(&key.as_slice()) {
            collect_references(value, found);
        }
    }
}

/// Annotations of a page minus those that navigate elsewhere in the
/// document (`/Dest`, or a `/GoTo` action).
fn page_local_annotations(doc: &Document, annots: &Object) -> Vec<Object> {
    let items = match annots {
        Object::Array(items) => items.clone(),
        Object::Reference(id) => doc
            .get_object(*id)
            .and_then(Object::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter(|annotation| !navigates_elsewhere(doc, annotation))
        .collect()
}

fn navigates_elsewhere(doc: &Document, annotation: &Object) -> bool {
    let dict = match annotation {
        Object::Reference(id) => doc.get_dictionary(*id),
        Object::Dictionary(dict) => Ok(dict),
        _ => return false,
    };
    let Ok(dict) = dict else {
        return false;
    };
    if dict.has(b"Dest") {
        return true;
    }
    let action = match dict.get(b"A") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(action)) => Some(action),
        _ => None,
    };
    action.is_some_and(|a| matches!(a.get(b"S"), Ok(Object::Name(name)) if name == b"GoTo"))
}

/// Copy inheritable attributes from the page tree onto the page itself so
/// the page can be re-parented.
fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> lopdf::Result<()> {
    let inherited = inherited_attributes(doc, page_id)?;
    let page = doc.get_dictionary_mut(page_id)?;
    for (key, value) in inherited {
        page.set(key, value);
    }
    Ok(())
}

/// Inheritable attributes the page lacks, taken from its nearest ancestor
/// that defines them.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> lopdf::Result<Vec<(Vec<u8>, Object)>> {
    let mut inherited: Vec<(Vec<u8>, Object)> = Vec::new();
    let page = doc.get_dictionary(page_id)?;
    let mut missing: Vec<&[u8]> = INHERITABLE
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(id) = parent {
        if missing.is_empty() || depth > 64 {
            break;
        }
        depth += 1;
        let Ok(node) = doc.get_dictionary(id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                inherited.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Ok(inherited)
}

/// Encrypt in place with RC4-128, using `password` as both the user and
/// owner password and granting every permission once opened.
pub fn encrypt(doc: &mut Document, password: &str) -> lopdf::Result<()> {
    if doc.trailer.get(b"ID").is_err() {
        let id = Object::String(
            uuid::Uuid::new_v4().as_bytes().to_vec(),
            StringFormat::Hexadecimal,
        );
        doc.trailer.set("ID", Object::Array(vec![id.clone(), id]));
    }
    let state = EncryptionState::try_from(EncryptionVersion::V2 {
        document: doc,
        owner_password: password,
        user_password: password,
        key_length: KEY_LENGTH_BITS,
        permissions: Permissions::all(),
    })?;
    doc.encrypt(&state)
}

/// What [`optimize`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    pub empty_streams: usize,
    pub duplicates: usize,
    pub unreferenced: usize,
}

/// Lossless structural optimisation: drop empty streams, merge identical
/// streams, prune unreachable objects, deflate every stream that allows
/// it and renumber densely. Pair with [`save_compact`].
pub fn optimize(doc: &mut Document) -> OptimizeReport {
    let empty_streams = doc.delete_zero_length_streams().len();
    let duplicates = dedupe_streams(doc);
    let unreferenced = doc.prune_objects().len();
    doc.compress();
    doc.renumber_objects();
    OptimizeReport {
        empty_streams,
        duplicates,
        unreferenced,
    }
}

/// Point every reference to a duplicated stream at one canonical copy.
/// Returns the number of duplicates made unreachable.
fn dedupe_streams(doc: &mut Document) -> usize {
    let mut buckets: HashMap<u64, Vec<ObjectId>> = HashMap::new();
    let mut remap: HashMap<ObjectId, ObjectId> = HashMap::new();

    for (&id, object) in &doc.objects {
        let Object::Stream(stream) = object else {
            continue;
        };
        let mut hasher = DefaultHasher::new();
        stream.content.hash(&mut hasher);
        let bucket = buckets.entry(hasher.finish()).or_default();

        let canonical = bucket.iter().copied().find(|other| {
            matches!(
                doc.objects.get(other),
                Some(Object::Stream(s)) if s.dict == stream.dict && s.content == stream.content
            )
        });
        match canonical {
            Some(keep) => {
                remap.insert(id, keep);
            }
            None => bucket.push(id),
        }
    }

    if remap.is_empty() {
        return 0;
    }
    doc.traverse_objects(|object| {
        if let Object::Reference(id) = object {
            if let Some(keep) = remap.get(id) {
                *id = *keep;
            }
        }
    });
    remap.len()
}

/// Save with object streams and cross-reference streams.
///
/// lopdf accepts the linearisation flag but writes a regular file layout;
/// the flag is set so output gains fast web view as soon as the writer
/// supports it.
pub fn save_compact<W: Write>(doc: &mut Document, target: &mut W) -> lopdf::Result<()> {
    let options = SaveOptions::builder()
        .use_object_streams(true)
        .use_xref_streams(true)
        .linearize(true)
        .compression_level(9)
        .build();
    Ok(doc.save_with_options(target, options)?)
}

/// Serialise to an in-memory buffer with the plain writer.
pub fn to_bytes(doc: &mut Document) -> lopdf::Result<Vec<u8>> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// One page per label, each page showing its label in Helvetica.
    pub fn labelled(labels: &[&str]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        // Resources live on the page tree node and are inherited.
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids = Vec::new();
        for label in labels {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*label)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }
}
