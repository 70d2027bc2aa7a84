//! Note tags scoping which traffic the sync driver requests.

use std::collections::BTreeSet;

use rusqlite::{named_params, Connection};

use crate::backend::{Backend, NO_PARAMS};
use crate::error::StoreError;
use crate::model::sync::{NoteTagRecord, NoteTagSource};
use crate::model::NoteTag;

/// Returns false if the tag was already being tracked.
pub(crate) fn add_note_tag(conn: &Connection, record: &NoteTagRecord) -> Result<bool, StoreError> {
    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO tags (tag, source) VALUES (:tag, :source)")?;
    let inserted = stmt.execute(named_params![
        ":tag": record.tag,
        ":source": record.source.to_bytes(),
    ])?;
    Ok(inserted > 0)
}

/// Returns the number of tag rows removed.
pub(crate) fn remove_note_tag(
    conn: &Connection,
    record: &NoteTagRecord,
) -> Result<usize, StoreError> {
    let mut stmt =
        conn.prepare_cached("DELETE FROM tags WHERE tag = :tag AND source = :source")?;
    Ok(stmt.execute(named_params![
        ":tag": record.tag,
        ":source": record.source.to_bytes(),
    ])?)
}

pub(crate) fn get_note_tags<B: Backend>(backend: &B) -> Result<Vec<NoteTagRecord>, StoreError> {
    let raw = backend.all(
        "SELECT tag, source FROM tags ORDER BY tag",
        NO_PARAMS,
        |row| Ok((row.get::<_, NoteTag>(0)?, row.get::<_, Vec<u8>>(1)?)),
    )?;
    raw.into_iter()
        .map(|(tag, source)| {
            Ok(NoteTagRecord {
                tag,
                source: NoteTagSource::from_bytes(&source)?,
            })
        })
        .collect()
}

pub(crate) fn get_unique_note_tags<B: Backend>(backend: &B) -> Result<BTreeSet<NoteTag>, StoreError> {
    let tags = backend.all("SELECT DISTINCT tag FROM tags", NO_PARAMS, |row| row.get(0))?;
    Ok(tags.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use crate::model::sync::NoteTagRecord;
    use crate::model::NoteTag;
    use crate::testing::{account_id, memory_store, note_id};

    #[test]
    fn duplicate_tags_are_reported() {
        let mut store = memory_store();
        let record = NoteTagRecord::with_account_source(NoteTag::from_u32(7), account_id(1));
        assert!(store.add_note_tag(&record).unwrap());
        assert!(!store.add_note_tag(&record).unwrap());

        // Same tag value under a different source is a distinct row.
        let other = NoteTagRecord::with_note_source(NoteTag::from_u32(7), note_id(2));
        assert!(store.add_note_tag(&other).unwrap());

        assert_eq!(store.get_note_tags().unwrap().len(), 2);
        assert_eq!(store.get_unique_note_tags().unwrap().len(), 1);
    }

    #[test]
    fn removal_targets_one_source() {
        let mut store = memory_store();
        let kept = NoteTagRecord::with_account_source(NoteTag::from_u32(9), account_id(1));
        let dropped = NoteTagRecord::with_note_source(NoteTag::from_u32(9), note_id(2));
        store.add_note_tag(&kept).unwrap();
        store.add_note_tag(&dropped).unwrap();

        assert_eq!(store.remove_note_tag(&dropped).unwrap(), 1);
        assert_eq!(store.get_note_tags().unwrap(), vec![kept]);
    }
}
