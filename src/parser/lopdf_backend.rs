//! `DocumentBackend` backed by lopdf.
//!
//! lopdf tokenizes the file and resolves the cross-reference table. The
//! resulting graph is converted once into an [`ObjectTable`]; everything
//! after that works on the crate's own model.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace};
use lopdf::{Document as LopdfDocument, Object};

use crate::error::{Error, Result};
use crate::model::{Dictionary, ObjectEntry, ObjectId, ObjectRef, ObjectTable, StreamObject, Value};
use crate::parser::backend::{
    DocumentBackend, FontKind, FontProgram, ImagePayload, RenderedImage,
};
use crate::parser::{filters, render};

/// Keys under `/PieceInfo /Illustrator /Private` that hold Illustrator data streams.
const PRIVATE_STREAM_PREFIX: &str = "AIPrivateData";
const PRIVATE_METADATA_KEY: &str = "AIMetaData";

/// Concrete [`DocumentBackend`] over a converted lopdf graph.
pub struct LopdfBackend {
    table: ObjectTable,
    fonts: Vec<ObjectId>,
    cache: Mutex<HashMap<ObjectId, Arc<[u8]>>>,
    resident: AtomicU64,
}

impl LopdfBackend {
    /// Read a document from memory.
    pub fn load(data: &[u8]) -> Result<Self> {
        let doc = LopdfDocument::load_mem(data)?;
        if doc.is_encrypted() {
            return Err(Error::Encrypted);
        }
        Ok(Self::from_document(&doc))
    }

    /// Read a document from a file path.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::load(&data)
    }

    fn from_document(doc: &LopdfDocument) -> Self {
        let mut table = ObjectTable::new(doc.version.clone());
        table.trailer = convert_dict(&doc.trailer);

        // BTreeMap order puts the highest generation of a number last
        for (&(number, _generation), object) in &doc.objects {
            let entry = match object {
                Object::Stream(stream) => ObjectEntry::Stream(Arc::new(StreamObject::new(
                    convert_dict(&stream.dict),
                    stream.content.clone(),
                ))),
                other => ObjectEntry::Node(convert(other)),
            };
            table.insert(number, entry);
        }
        debug!("converted {} objects (PDF {})", table.len(), table.version);

        Self::from_table(table)
    }

    /// Wrap an already built object table.
    pub fn from_table(table: ObjectTable) -> Self {
        Self {
            table,
            fonts: Vec::new(),
            cache: Mutex::new(HashMap::new()),
            resident: AtomicU64::new(0),
        }
    }

    fn strip_private_region(&mut self) -> usize {
        let pages: Vec<ObjectId> = self.table.pages().into_iter().map(|(id, _)| id).collect();
        let mut freed = Vec::new();

        for page in pages {
            let Some(illustrator) = dict_at_mut(&mut self.table, page, &["PieceInfo", "Illustrator"])
            else {
                continue;
            };
            let Some(private) = illustrator.remove("Private") else {
                continue;
            };
            let private = match private {
                Value::Reference(r) => {
                    freed.push(r.object_number);
                    self.table.dict(r.object_number).cloned()
                }
                Value::Dictionary(d) => Some(d),
                _ => None,
            };
            for (key, value) in private.iter().flat_map(Dictionary::iter) {
                if key.starts_with(PRIVATE_STREAM_PREFIX) || key == PRIVATE_METADATA_KEY {
                    if let Some(r) = value.as_reference() {
                        freed.push(r.object_number);
                    }
                }
            }
        }

        for id in &freed {
            self.table.insert(*id, ObjectEntry::Free);
        }
        freed.len()
    }

    fn index_fonts(&mut self) {
        // one entry per embedded program, keyed by the font file stream
        let mut by_file: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();
        for (id, entry) in self.table.iter() {
            let Some(dict) = entry.dict() else { continue };
            if dict.name("Type") != Some("Font") {
                continue;
            }
            if let Some((file_id, _)) = self.font_file(dict) {
                by_file
                    .entry(file_id)
                    .and_modify(|owner| *owner = (*owner).min(id))
                    .or_insert(id);
            }
        }
        let mut fonts: Vec<ObjectId> = by_file.into_values().collect();
        fonts.sort_unstable();
        self.fonts = fonts;
    }

    /// Font descriptor of a font dictionary, descending into Type0 fonts.
    fn descriptor<'a>(&'a self, font: &'a Dictionary) -> Option<&'a Dictionary> {
        if font.name("Subtype") == Some("Type0") {
            let descendant = font
                .get("DescendantFonts")
                .and_then(|d| self.table.resolve(d))
                .and_then(Value::as_array)
                .and_then(<[Value]>::first)
                .and_then(|d| self.table.resolve_dict(d))?;
            return self.descriptor(descendant);
        }
        font.get("FontDescriptor")
            .and_then(|d| self.table.resolve_dict(d))
    }

    /// Embedded program of a font dictionary: (file stream id, kind).
    fn font_file(&self, font: &Dictionary) -> Option<(ObjectId, FontKind)> {
        let descriptor = self.descriptor(font)?;
        for key in ["FontFile2", "FontFile3", "FontFile"] {
            let Some((file_id, stream)) = descriptor
                .get(key)
                .and_then(|v| self.table.resolve_stream(v))
            else {
                continue;
            };
            let kind = match key {
                "FontFile2" => FontKind::TrueType,
                "FontFile" => FontKind::Type1,
                _ => match stream.dict.name("Subtype") {
                    Some("OpenType") => FontKind::OpenType,
                    _ => FontKind::Cff,
                },
            };
            return Some((file_id, kind));
        }
        None
    }
}

impl DocumentBackend for LopdfBackend {
    fn objects(&self) -> &ObjectTable {
        &self.table
    }

    fn validate(&self) -> Result<()> {
        let invalid = |object: Option<ObjectId>, message: String| Error::Validation {
            object,
            message,
            strict: true,
        };

        let root = self
            .table
            .trailer
            .get("Root")
            .ok_or_else(|| invalid(None, "missing /Root in trailer".to_string()))?;
        let root_id = root.as_reference().map(|r| r.object_number);
        let catalog = self
            .table
            .resolve_dict(root)
            .ok_or_else(|| invalid(root_id, "document catalog is not a dictionary".to_string()))?;
        if !catalog.contains_key("Pages") {
            return Err(invalid(root_id, "missing /Pages".to_string()));
        }

        for (id, entry) in self.table.iter() {
            let target = match entry {
                ObjectEntry::Free => continue,
                ObjectEntry::Stream(stream) => {
                    if stream.is_image() {
                        for key in ["Width", "Height"] {
                            let size = stream.dict.get(key).and_then(|v| self.table.resolve(v));
                            if size.and_then(Value::as_i64).is_none() {
                                return Err(invalid(Some(id), format!("image without /{key}")));
                            }
                        }
                    }
                    find_dangling(&self.table, stream.dict.iter().map(|(_, v)| v))
                }
                ObjectEntry::Node(value) => find_dangling(&self.table, std::iter::once(value)),
            };
            if let Some(target) = target {
                return Err(invalid(
                    Some(id),
                    format!("dangling reference to obj#:{}", target.object_number),
                ));
            }
        }
        Ok(())
    }

    fn optimize(&mut self) -> Result<()> {
        let freed = self.strip_private_region();
        self.index_fonts();
        debug!(
            "optimize: freed {} private objects, indexed {} fonts",
            freed,
            self.fonts.len()
        );
        Ok(())
    }

    fn font_objects(&self) -> Vec<ObjectId> {
        self.fonts.clone()
    }

    fn extract_font(&self, id: ObjectId) -> Result<Option<FontProgram>> {
        let font = self
            .table
            .dict(id)
            .filter(|d| d.name("Type") == Some("Font"))
            .ok_or_else(|| Error::Font(format!("obj#:{id} is not a font dictionary")))?;

        let Some((file_id, kind)) = self.font_file(font) else {
            trace!("font {id} has no embedded program");
            return Ok(None);
        };
        let file = self
            .table
            .get(file_id)
            .and_then(ObjectEntry::as_stream)
            .cloned()
            .ok_or_else(|| Error::Font(format!("font file obj#:{file_id} is not a stream")))?;
        let name = font.name("BaseFont").unwrap_or("unknown").to_string();

        Ok(Some(FontProgram {
            name,
            kind,
            file_id,
            file,
        }))
    }

    fn decode_stream(&self, id: ObjectId, stream: &StreamObject) -> Result<Arc<[u8]>> {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Ok(Arc::clone(hit));
        }

        let decoded: Arc<[u8]> = filters::decode(&self.table, &stream.dict, stream.raw())?
            .data
            .into();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.insert(id, Arc::clone(&decoded)).is_none() {
            self.resident
                .fetch_add(decoded.len() as u64, Ordering::Relaxed);
        }
        Ok(decoded)
    }

    fn decode_image(&self, _id: ObjectId, stream: &StreamObject) -> Result<ImagePayload> {
        let decoded = filters::decode(&self.table, &stream.dict, stream.raw())?;
        Ok(ImagePayload {
            data: decoded.data,
            codec: decoded.codec,
        })
    }

    fn render_image(
        &self,
        _id: ObjectId,
        stream: &StreamObject,
        payload: ImagePayload,
    ) -> Result<RenderedImage> {
        render::render(&self.table, &stream.dict, payload)
    }

    fn reclaim(&self) -> u64 {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
        cache.shrink_to_fit();
        self.resident.swap(0, Ordering::Relaxed)
    }

    fn resident_bytes(&self) -> u64 {
        self.resident.load(Ordering::Relaxed)
    }
}

/// Mutable node dictionary reached from `owner` through `path`, following
/// references between hops.
fn dict_at_mut<'a>(
    table: &'a mut ObjectTable,
    owner: ObjectId,
    path: &[&str],
) -> Option<&'a mut Dictionary> {
    let mut owner = owner;
    let mut rest = path;

    // find the last indirect hop without holding a mutable borrow
    for _ in 0..32 {
        let mut current = table.dict(owner)?;
        let mut hop = None;
        let mut consumed = 0;
        for key in rest {
            consumed += 1;
            match current.get(key)? {
                Value::Reference(r) => {
                    hop = Some(r.object_number);
                    break;
                }
                Value::Dictionary(d) => current = d,
                _ => return None,
            }
        }
        match hop {
            Some(next) => {
                owner = next;
                rest = &rest[consumed..];
            }
            None => {
                let mut current = table.dict_mut(owner)?;
                for key in rest {
                    current = match current.get_mut(key)? {
                        Value::Dictionary(d) => d,
                        _ => return None,
                    };
                }
                return Some(current);
            }
        }
    }
    None
}

fn find_dangling<'a>(
    table: &ObjectTable,
    values: impl IntoIterator<Item = &'a Value>,
) -> Option<ObjectRef> {
    let mut stack: Vec<&Value> = values.into_iter().collect();
    while let Some(value) = stack.pop() {
        match value {
            Value::Reference(r) if table.get(r.object_number).is_none() => return Some(*r),
            Value::Array(items) => stack.extend(items),
            Value::Dictionary(d) => stack.extend(d.iter().map(|(_, v)| v)),
            _ => {}
        }
    }
    None
}

fn convert(object: &Object) -> Value {
    match object {
        Object::Null => Value::Null,
        Object::Boolean(b) => Value::Boolean(*b),
        Object::Integer(i) => Value::Integer(*i),
        Object::Real(r) => Value::Real(*r),
        Object::Name(n) => Value::Name(String::from_utf8_lossy(n).into_owned()),
        Object::String(bytes, _) => Value::String(bytes.clone()),
        Object::Array(items) => Value::Array(items.iter().map(convert).collect()),
        Object::Dictionary(dict) => Value::Dictionary(convert_dict(dict)),
        // streams are only legal as indirect objects; keep the dictionary
        Object::Stream(stream) => Value::Dictionary(convert_dict(&stream.dict)),
        Object::Reference((number, generation)) => Value::Reference(ObjectRef {
            object_number: *number,
            generation_number: *generation,
        }),
    }
}

fn convert_dict(dict: &lopdf::Dictionary) -> Dictionary {
    dict.iter()
        .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), convert(v)))
        .collect()
}
