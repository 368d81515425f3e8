//! Object graph types shared by the backend, the classifier, and the manifest.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Stable object number within one parse.
pub type ObjectId = u32;

/// Indirect reference to another object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectRef {
    /// Object number.
    pub object_number: ObjectId,
    /// Generation number.
    pub generation_number: u16,
}

impl ObjectRef {
    /// Create a reference with generation 0.
    pub fn new(object_number: ObjectId) -> Self {
        Self {
            object_number,
            generation_number: 0,
        }
    }
}

/// A direct object value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f32),
    Name(String),
    String(Vec<u8>),
    Array(Vec<Value>),
    Dictionary(Dictionary),
    Reference(ObjectRef),
}

impl Value {
    /// Name content, if this is a name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Integer content, accepting integral reals.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            _ => None,
        }
    }

    /// Boolean content.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Array content.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionary content.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Reference target, if this is a reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Value::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Byte content of a string object.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f32(*r),
            Value::Name(n) => serializer.serialize_str(n),
            Value::String(s) => serializer.serialize_str(&decode_text(s)),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dictionary(dict) => dict.serialize(serializer),
            Value::Reference(r) => r.serialize(serializer),
        }
    }
}

/// Decode a string object for display: UTF-16BE with BOM, UTF-8, then Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    bytes.iter().map(|&b| b as char).collect()
}

/// Dictionary keyed by name, kept sorted so serialized output is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(BTreeMap<String, Value>);

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Name stored under `key`.
    pub fn name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Classification of a stream, fixed when the stream is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `/Subtype /Image`
    Image,
    /// Anything else, including a missing subtype.
    Content,
}

impl StreamKind {
    fn of(dict: &Dictionary) -> Self {
        if dict.name("Subtype") == Some("Image") {
            StreamKind::Image
        } else {
            StreamKind::Content
        }
    }
}

/// A stream object: dictionary plus still-filtered payload.
#[derive(Debug, Clone)]
pub struct StreamObject {
    pub dict: Dictionary,
    raw: Arc<[u8]>,
    kind: StreamKind,
}

impl StreamObject {
    pub fn new(dict: Dictionary, raw: Vec<u8>) -> Self {
        let kind = StreamKind::of(&dict);
        Self {
            dict,
            raw: raw.into(),
            kind,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn is_image(&self) -> bool {
        self.kind == StreamKind::Image
    }

    /// Payload as stored in the file, before any filter is applied.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }
}

/// One slot of the object table.
#[derive(Debug, Clone)]
pub enum ObjectEntry {
    /// Deleted or free entry.
    Free,
    Stream(Arc<StreamObject>),
    /// Any other graph node.
    Node(Value),
}

impl ObjectEntry {
    pub fn as_stream(&self) -> Option<&Arc<StreamObject>> {
        match self {
            ObjectEntry::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Dictionary of a node or stream entry.
    pub fn dict(&self) -> Option<&Dictionary> {
        match self {
            ObjectEntry::Stream(s) => Some(&s.dict),
            ObjectEntry::Node(v) => v.as_dict(),
            ObjectEntry::Free => None,
        }
    }
}

/// Object classes materialized by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Bitmaps,
    Fonts,
    Streams,
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectClass::Bitmaps => write!(f, "bitmaps"),
            ObjectClass::Fonts => write!(f, "fonts"),
            ObjectClass::Streams => write!(f, "stream dicts"),
        }
    }
}

/// Resolved object graph of one document.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    entries: BTreeMap<ObjectId, ObjectEntry>,
    pub trailer: Dictionary,
    /// Header version, e.g. "1.6".
    pub version: String,
}

impl ObjectTable {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            entries: BTreeMap::new(),
            trailer: Dictionary::new(),
            version: version.into(),
        }
    }

    pub fn insert(&mut self, id: ObjectId, entry: ObjectEntry) {
        self.entries.insert(id, entry);
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<ObjectEntry> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectEntry> {
        self.entries.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &ObjectEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dictionary of the object `id`, for nodes and streams alike.
    pub fn dict(&self, id: ObjectId) -> Option<&Dictionary> {
        self.get(id).and_then(ObjectEntry::dict)
    }

    /// Mutable dictionary of the object `id`.
    ///
    /// Streams are shared with readers, so only node dictionaries are reachable.
    pub fn dict_mut(&mut self, id: ObjectId) -> Option<&mut Dictionary> {
        match self.entries.get_mut(&id)? {
            ObjectEntry::Node(Value::Dictionary(d)) => Some(d),
            _ => None,
        }
    }

    /// Follow a reference to its direct value. Non-references are returned as-is.
    ///
    /// Stream targets are not values; they resolve to `None`.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        // bounded to break reference cycles
        for _ in 0..32 {
            match current {
                Value::Reference(r) => match self.get(r.object_number)? {
                    ObjectEntry::Node(v) => current = v,
                    _ => return None,
                },
                other => return Some(other),
            }
        }
        None
    }

    /// Dictionary behind a value that is either a direct dictionary, a
    /// reference to one, or a reference to a stream.
    pub fn resolve_dict<'a>(&'a self, value: &'a Value) -> Option<&'a Dictionary> {
        if let Value::Reference(r) = value {
            return self.dict(r.object_number);
        }
        value.as_dict()
    }

    /// Stream behind a reference value.
    pub fn resolve_stream(&self, value: &Value) -> Option<(ObjectId, &Arc<StreamObject>)> {
        let r = value.as_reference()?;
        self.get(r.object_number)?
            .as_stream()
            .map(|s| (r.object_number, s))
    }

    /// The document catalog.
    pub fn catalog(&self) -> Option<&Dictionary> {
        self.trailer
            .get("Root")
            .and_then(|root| self.resolve_dict(root))
    }

    /// Page dictionaries in document order, with their object numbers.
    ///
    /// Each node of the page tree is visited once, so shared or cyclic
    /// `/Kids` entries contribute their pages a single time.
    pub fn pages(&self) -> Vec<(ObjectId, &Dictionary)> {
        let mut pages = Vec::new();
        let mut seen = HashSet::new();
        if let Some(root) = self.catalog().and_then(|c| c.get("Pages")) {
            self.collect_pages(root, &mut pages, &mut seen, 0);
        }
        pages
    }

    fn collect_pages<'a>(
        &'a self,
        node: &'a Value,
        out: &mut Vec<(ObjectId, &'a Dictionary)>,
        seen: &mut HashSet<ObjectId>,
        depth: usize,
    ) {
        if depth > 64 {
            return;
        }
        let Some(r) = node.as_reference() else {
            return;
        };
        if !seen.insert(r.object_number) {
            return;
        }
        let Some(dict) = self.dict(r.object_number) else {
            return;
        };
        match dict.name("Type") {
            Some("Pages") => {
                if let Some(kids) = dict.get("Kids").and_then(|k| self.resolve(k)) {
                    for kid in kids.as_array().unwrap_or_default() {
                        self.collect_pages(kid, out, seen, depth + 1);
                    }
                }
            }
            _ => out.push((r.object_number, dict)),
        }
    }
}
