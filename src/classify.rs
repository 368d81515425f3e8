//! Object classification.
//!
//! Every stream object lands in exactly one set: image streams become
//! bitmaps, everything else is a content stream. Fonts are harvested from
//! the backend's font index after the optimize pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace};

use crate::error::Result;
use crate::model::{ObjectEntry, ObjectId, ObjectTable, StreamKind, StreamObject};
use crate::parser::{DocumentBackend, FontProgram};

/// Disjoint partition of the stream objects of a table.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub images: BTreeMap<ObjectId, Arc<StreamObject>>,
    pub streams: BTreeMap<ObjectId, Arc<StreamObject>>,
}

/// Partition stream objects by kind. Non-stream entries are ignored.
pub fn classify(table: &ObjectTable) -> Classification {
    let mut result = Classification::default();
    for (id, entry) in table.iter() {
        let ObjectEntry::Stream(stream) = entry else {
            continue;
        };
        let target = match stream.kind() {
            StreamKind::Image => &mut result.images,
            StreamKind::Content => &mut result.streams,
        };
        target.insert(id, Arc::clone(stream));
    }
    debug!(
        "classified {} images and {} streams",
        result.images.len(),
        result.streams.len()
    );
    result
}

/// Embedded font programs keyed by font dictionary.
///
/// Fonts without an embedded program are skipped; any other failure aborts.
pub fn harvest_fonts(backend: &dyn DocumentBackend) -> Result<BTreeMap<ObjectId, FontProgram>> {
    let mut fonts = BTreeMap::new();
    for id in backend.font_objects() {
        match backend
            .extract_font(id)
            .map_err(|e| e.for_object(id, "failed extracting font"))?
        {
            Some(program) => {
                fonts.insert(id, program);
            }
            None => trace!("font {id} skipped: no embedded program"),
        }
    }
    Ok(fonts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dictionary, Value};

    fn stream(subtype: Option<&str>) -> ObjectEntry {
        let mut dict = Dictionary::new();
        if let Some(s) = subtype {
            dict.set("Subtype", Value::Name(s.to_string()));
        }
        ObjectEntry::Stream(Arc::new(StreamObject::new(dict, vec![0; 4])))
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let mut table = ObjectTable::new("1.6");
        table.insert(1, stream(Some("Image")));
        table.insert(2, stream(Some("Form")));
        table.insert(3, stream(None));
        table.insert(4, ObjectEntry::Node(Value::Integer(7)));
        table.insert(5, ObjectEntry::Free);
        table.insert(6, stream(Some("Image")));

        let c = classify(&table);
        assert_eq!(c.images.keys().copied().collect::<Vec<_>>(), vec![1, 6]);
        assert_eq!(c.streams.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
        assert!(c.images.keys().all(|k| !c.streams.contains_key(k)));
    }

    #[test]
    fn test_classify_shares_payloads() {
        let mut table = ObjectTable::new("1.6");
        table.insert(1, stream(Some("Image")));

        let c = classify(&table);
        let original = table.get(1).and_then(ObjectEntry::as_stream).unwrap();
        assert!(Arc::ptr_eq(original, &c.images[&1]));
    }

    #[test]
    fn test_empty_table() {
        let c = classify(&ObjectTable::new("1.6"));
        assert!(c.images.is_empty());
        assert!(c.streams.is_empty());
    }
}
