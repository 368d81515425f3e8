//! The `source.json` manifest and the metadata snapshot it embeds.

use std::collections::BTreeMap;

use serde::Serialize;

use super::object::{Dictionary, ObjectEntry, ObjectId, ObjectRef, ObjectTable, Value};

/// Version tag written into every manifest.
pub const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Deep copy of the object table without raw stream payloads.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentSnapshot {
    pub table: BTreeMap<ObjectId, SnapshotEntry>,
    pub root: Option<ObjectRef>,
    pub info: Option<ObjectRef>,
    pub header_version: String,
    pub page_count: u32,
}

/// One object of the snapshot, wrapped the way the consumer expects it.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    #[serde(rename = "Object")]
    pub object: SnapshotObject,
}

/// Snapshot payload of one object.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SnapshotObject {
    Stream {
        #[serde(rename = "Dict")]
        dict: Dictionary,
        #[serde(rename = "StreamLength")]
        stream_length: usize,
    },
    Node(Value),
}

impl DocumentSnapshot {
    /// Copy `table`. Later mutation of the table does not reach the snapshot.
    pub fn capture(table: &ObjectTable) -> Self {
        let mut entries = BTreeMap::new();
        for (id, entry) in table.iter() {
            let object = match entry {
                ObjectEntry::Free => continue,
                ObjectEntry::Stream(s) => SnapshotObject::Stream {
                    dict: s.dict.clone(),
                    stream_length: s.raw_len(),
                },
                ObjectEntry::Node(v) => SnapshotObject::Node(v.clone()),
            };
            entries.insert(id, SnapshotEntry { object });
        }

        let page_count = table.pages().len() as u32;
        Self {
            table: entries,
            root: table.trailer.get("Root").and_then(Value::as_reference),
            info: table.trailer.get("Info").and_then(Value::as_reference),
            header_version: table.version.clone(),
            page_count,
        }
    }
}

/// The record persisted as `source.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    #[serde(rename = "XRefTable")]
    pub xref_table: DocumentSnapshot,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "StreamDicts")]
    pub stream_dicts: BTreeMap<ObjectId, String>,
    #[serde(rename = "Bitmaps")]
    pub bitmaps: BTreeMap<ObjectId, String>,
    #[serde(rename = "Fonts")]
    pub fonts: BTreeMap<ObjectId, String>,
    /// Relative path of the private data sidecar, empty when none was written.
    #[serde(rename = "PrivateData")]
    pub private_data: String,
}

impl Manifest {
    /// Serialize to JSON.
    pub fn to_json(&self, pretty: bool) -> crate::Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

/// Accumulates sidecar paths for one run.
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    snapshot: DocumentSnapshot,
    stream_dicts: BTreeMap<ObjectId, String>,
    bitmaps: BTreeMap<ObjectId, String>,
    fonts: BTreeMap<ObjectId, String>,
    private_data: String,
}

impl ManifestBuilder {
    pub fn new(snapshot: DocumentSnapshot) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    pub fn stream(&mut self, id: ObjectId, path: impl Into<String>) {
        self.stream_dicts.insert(id, path.into());
    }

    pub fn bitmap(&mut self, id: ObjectId, path: impl Into<String>) {
        self.bitmaps.insert(id, path.into());
    }

    pub fn font(&mut self, id: ObjectId, path: impl Into<String>) {
        self.fonts.insert(id, path.into());
    }

    pub fn private_data(&mut self, path: impl Into<String>) {
        self.private_data = path.into();
    }

    pub fn bitmaps(&self) -> &BTreeMap<ObjectId, String> {
        &self.bitmaps
    }

    pub fn fonts(&self) -> &BTreeMap<ObjectId, String> {
        &self.fonts
    }

    pub fn streams(&self) -> &BTreeMap<ObjectId, String> {
        &self.stream_dicts
    }

    pub fn build(self) -> Manifest {
        Manifest {
            xref_table: self.snapshot,
            version: FORMAT_VERSION.to_string(),
            stream_dicts: self.stream_dicts,
            bitmaps: self.bitmaps,
            fonts: self.fonts,
            private_data: self.private_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::object::StreamObject;
    use std::sync::Arc;

    fn sample_table() -> ObjectTable {
        let mut table = ObjectTable::new("1.6");
        table.trailer.set("Root", Value::Reference(ObjectRef::new(1)));
        let mut catalog = Dictionary::new();
        catalog.set("Type", Value::Name("Catalog".into()));
        table.insert(1, ObjectEntry::Node(Value::Dictionary(catalog)));

        let mut dict = Dictionary::new();
        dict.set("Length", Value::Integer(4));
        table.insert(
            5,
            ObjectEntry::Stream(Arc::new(StreamObject::new(dict, b"q Q\n".to_vec()))),
        );
        table.insert(6, ObjectEntry::Free);
        table
    }

    #[test]
    fn test_snapshot_excludes_raw_bytes() {
        let snapshot = DocumentSnapshot::capture(&sample_table());
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["Table"]["5"]["Object"]["StreamLength"], 4);
        assert_eq!(json["Table"]["5"]["Object"]["Dict"]["Length"], 4);
        assert!(!json.to_string().contains("q Q"));
        // free entries are dropped
        assert!(json["Table"].get("6").is_none());
        assert_eq!(json["Root"]["ObjectNumber"], 1);
    }

    #[test]
    fn test_snapshot_is_independent_of_table() {
        let mut table = sample_table();
        let snapshot = DocumentSnapshot::capture(&table);

        match table.get_mut(1) {
            Some(ObjectEntry::Node(Value::Dictionary(d))) => {
                d.set("Mutated", Value::Boolean(true));
                d.remove("Type");
            }
            other => panic!("expected catalog node, got {other:?}"),
        }
        table.insert(5, ObjectEntry::Free);

        match &snapshot.table[&1].object {
            SnapshotObject::Node(Value::Dictionary(d)) => {
                assert!(!d.contains_key("Mutated"));
                assert_eq!(d.name("Type"), Some("Catalog"));
            }
            other => panic!("expected catalog node, got {other:?}"),
        }
        assert!(matches!(
            snapshot.table[&5].object,
            SnapshotObject::Stream { stream_length: 4, .. }
        ));
    }

    #[test]
    fn test_builder_is_keyed_by_object() {
        let mut builder = ManifestBuilder::new(DocumentSnapshot::default());
        builder.bitmap(36, "bitmaps/36.png");
        builder.bitmap(36, "bitmaps/36.png");
        builder.font(12, "fonts/12.ttf");
        builder.stream(9, "_contents/9");

        let manifest = builder.build();
        assert_eq!(manifest.bitmaps.len(), 1);
        assert_eq!(manifest.version, FORMAT_VERSION);
        assert_eq!(manifest.private_data, "");

        let json: serde_json::Value = serde_json::from_str(&manifest.to_json(false).unwrap()).unwrap();
        assert_eq!(json["Bitmaps"]["36"], "bitmaps/36.png");
        assert_eq!(json["Fonts"]["12"], "fonts/12.ttf");
        assert_eq!(json["StreamDicts"]["9"], "_contents/9");
        assert_eq!(json["PrivateData"], "");
        assert!(json["XRefTable"].is_object());
    }
}
