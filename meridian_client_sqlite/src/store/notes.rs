//! Input and output note records and their deduplicated scripts.

use rusqlite::{named_params, Connection};

use crate::backend::{Backend, NO_PARAMS};
use crate::error::StoreError;
use crate::model::note::{
    InputNoteRecord, InputNoteState, NoteScript, OutputNoteRecord, OutputNoteState,
};
use crate::model::{BlockNumber, Digest, NoteId, Nullifier, Word};

/// Filters for narrowing the set of notes returned by the store.
#[derive(Debug, Clone)]
pub enum NoteFilter {
    /// Return all notes.
    All,
    /// Notes included in a block.
    Committed,
    /// Notes whose nullifier has been observed on chain.
    Consumed,
    /// Notes known to the client but not yet seen in a block.
    Expected,
    /// Notes being consumed by an in-flight local transaction. Does not
    /// apply to output notes.
    Processing,
    /// Notes with an unchecked inclusion claim. Does not apply to output
    /// notes.
    Unverified,
    /// Notes whose nullifier has not been observed on chain.
    Unspent,
    /// Notes matching the provided ids; unknown ids are skipped.
    List(Vec<NoteId>),
    /// Notes matching the provided nullifiers.
    Nullifiers(Vec<Nullifier>),
    /// Exactly the note with the provided id; an error if it is absent.
    Unique(NoteId),
}

// INPUT NOTES
// ================================================================================================

const SELECT_INPUT_NOTE: &str = "SELECT n.note_id, n.assets, n.serial_number, n.inputs, n.script_root, s.serialized_note_script,
            n.nullifier, n.state_discriminant, n.state, n.created_at
     FROM input_notes n
     JOIN notes_scripts s ON s.script_root = n.script_root";

type RawInputNote = (
    NoteId,
    Vec<u8>,
    Word,
    Vec<u8>,
    Digest,
    Vec<u8>,
    Nullifier,
    u8,
    Vec<u8>,
    u64,
);

fn input_note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawInputNote> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn parse_input_note(raw: RawInputNote) -> Result<InputNoteRecord, StoreError> {
    let (
        id,
        assets,
        serial_number,
        inputs,
        script_root,
        script,
        nullifier,
        state_discriminant,
        state_bytes,
        created_at,
    ) = raw;
    let state = InputNoteState::from_bytes(&state_bytes)?;
    if state.discriminant() != state_discriminant {
        return Err(StoreError::CorruptedData(format!(
            "input note {id} state discriminant column disagrees with its payload"
        )));
    }
    Ok(InputNoteRecord {
        id,
        assets,
        serial_number,
        inputs,
        script: NoteScript {
            root: script_root,
            script,
        },
        nullifier,
        state,
        created_at,
    })
}

/// Upserts input notes along with their deduplicated scripts. Notes with
/// the same id are replaced whole; no partial write is observable.
pub(crate) fn upsert_input_notes(
    conn: &Connection,
    notes: &[InputNoteRecord],
) -> Result<(), StoreError> {
    let mut stmt_script = conn.prepare_cached(
        "INSERT INTO notes_scripts (script_root, serialized_note_script)
         VALUES (:script_root, :serialized_note_script)
         ON CONFLICT (script_root) DO UPDATE
         SET serialized_note_script = :serialized_note_script",
    )?;
    let mut stmt_note = conn.prepare_cached(
        "INSERT INTO input_notes
            (note_id, assets, serial_number, inputs, script_root, nullifier,
             state_discriminant, state, created_at)
         VALUES (:note_id, :assets, :serial_number, :inputs, :script_root, :nullifier,
             :state_discriminant, :state, :created_at)
         ON CONFLICT (note_id) DO UPDATE
         SET assets = :assets,
             serial_number = :serial_number,
             inputs = :inputs,
             script_root = :script_root,
             nullifier = :nullifier,
             state_discriminant = :state_discriminant,
             state = :state,
             created_at = :created_at",
    )?;

    for note in notes {
        stmt_script.execute(named_params![
            ":script_root": note.script.root,
            ":serialized_note_script": note.script.script,
        ])?;
        stmt_note.execute(named_params![
            ":note_id": note.id,
            ":assets": note.assets,
            ":serial_number": note.serial_number,
            ":inputs": note.inputs,
            ":script_root": note.script.root,
            ":nullifier": note.nullifier,
            ":state_discriminant": note.state.discriminant(),
            ":state": note.state.to_bytes(),
            ":created_at": note.created_at,
        ])?;
    }
    Ok(())
}

fn input_discriminants(filter: &NoteFilter) -> Option<&'static [u8]> {
    match filter {
        NoteFilter::Committed => Some(&[InputNoteState::STATE_COMMITTED]),
        NoteFilter::Consumed => Some(&[
            InputNoteState::STATE_CONSUMED_AUTHENTICATED_LOCAL,
            InputNoteState::STATE_CONSUMED_UNAUTHENTICATED_LOCAL,
            InputNoteState::STATE_CONSUMED_EXTERNAL,
        ]),
        NoteFilter::Expected => Some(&[InputNoteState::STATE_EXPECTED]),
        NoteFilter::Processing => Some(&[
            InputNoteState::STATE_PROCESSING_AUTHENTICATED,
            InputNoteState::STATE_PROCESSING_UNAUTHENTICATED,
        ]),
        NoteFilter::Unverified => Some(&[InputNoteState::STATE_UNVERIFIED]),
        NoteFilter::Unspent => Some(&InputNoteState::UNSPENT_DISCRIMINANTS),
        _ => None,
    }
}

fn discriminant_clause(discriminants: &[u8]) -> String {
    let list = discriminants
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("state_discriminant IN ({list})")
}

pub(crate) fn get_input_notes<B: Backend>(
    backend: &B,
    filter: &NoteFilter,
) -> Result<Vec<InputNoteRecord>, StoreError> {
    let raw = match filter {
        NoteFilter::All => backend.all(SELECT_INPUT_NOTE, NO_PARAMS, input_note_from_row)?,
        NoteFilter::List(ids) => {
            let sql = format!("{SELECT_INPUT_NOTE} WHERE n.note_id = :note_id");
            let mut raw = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(row) =
                    backend.get(&sql, named_params![":note_id": id], input_note_from_row)?
                {
                    raw.push(row);
                }
            }
            raw
        }
        NoteFilter::Unique(id) => {
            let sql = format!("{SELECT_INPUT_NOTE} WHERE n.note_id = :note_id");
            let row = backend
                .get(&sql, named_params![":note_id": id], input_note_from_row)?
                .ok_or(StoreError::NoteNotFound(*id))?;
            vec![row]
        }
        NoteFilter::Nullifiers(nullifiers) => {
            let sql = format!("{SELECT_INPUT_NOTE} WHERE n.nullifier = :nullifier");
            let mut raw = Vec::with_capacity(nullifiers.len());
            for nullifier in nullifiers {
                if let Some(row) = backend.get(
                    &sql,
                    named_params![":nullifier": nullifier],
                    input_note_from_row,
                )? {
                    raw.push(row);
                }
            }
            raw
        }
        discriminated => {
            let discriminants = input_discriminants(discriminated)
                .expect("all remaining filters are discriminant-based");
            let sql = format!(
                "{SELECT_INPUT_NOTE} WHERE n.{}",
                discriminant_clause(discriminants)
            );
            backend.all(&sql, NO_PARAMS, input_note_from_row)?
        }
    };
    raw.into_iter().map(parse_input_note).collect()
}

/// Nullifiers of all notes whose spend has not been observed, restricted
/// to the fixed allow-list of active state discriminants.
pub(crate) fn get_unspent_nullifiers<B: Backend>(backend: &B) -> Result<Vec<Nullifier>, StoreError> {
    let sql = format!(
        "SELECT nullifier FROM input_notes WHERE {}",
        discriminant_clause(&InputNoteState::UNSPENT_DISCRIMINANTS)
    );
    backend.all(&sql, NO_PARAMS, |row| row.get(0))
}

// OUTPUT NOTES
// ================================================================================================

const SELECT_OUTPUT_NOTE: &str = "SELECT note_id, recipient_digest, assets, metadata, nullifier, expected_height,
            state_discriminant, state
     FROM output_notes";

type RawOutputNote = (
    NoteId,
    Digest,
    Vec<u8>,
    Vec<u8>,
    Option<Nullifier>,
    BlockNumber,
    u8,
    Vec<u8>,
);

fn output_note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawOutputNote> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parse_output_note(raw: RawOutputNote) -> Result<OutputNoteRecord, StoreError> {
    let (id, recipient_digest, assets, metadata, nullifier, expected_height, disc, state_bytes) =
        raw;
    let state = OutputNoteState::from_bytes(&state_bytes)?;
    if state.discriminant() != disc {
        return Err(StoreError::CorruptedData(format!(
            "output note {id} state discriminant column disagrees with its payload"
        )));
    }
    Ok(OutputNoteRecord {
        id,
        recipient_digest,
        assets,
        metadata,
        nullifier,
        expected_height,
        state,
    })
}

pub(crate) fn upsert_output_notes(
    conn: &Connection,
    notes: &[OutputNoteRecord],
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO output_notes
            (note_id, recipient_digest, assets, metadata, nullifier, expected_height,
             state_discriminant, state)
         VALUES (:note_id, :recipient_digest, :assets, :metadata, :nullifier, :expected_height,
             :state_discriminant, :state)
         ON CONFLICT (note_id) DO UPDATE
         SET recipient_digest = :recipient_digest,
             assets = :assets,
             metadata = :metadata,
             nullifier = :nullifier,
             expected_height = :expected_height,
             state_discriminant = :state_discriminant,
             state = :state",
    )?;
    for note in notes {
        stmt.execute(named_params![
            ":note_id": note.id,
            ":recipient_digest": note.recipient_digest,
            ":assets": note.assets,
            ":metadata": note.metadata,
            ":nullifier": note.nullifier,
            ":expected_height": note.expected_height,
            ":state_discriminant": note.state.discriminant(),
            ":state": note.state.to_bytes(),
        ])?;
    }
    Ok(())
}

fn output_discriminants(filter: &NoteFilter) -> Option<&'static [u8]> {
    match filter {
        NoteFilter::Committed => Some(&[OutputNoteState::STATE_COMMITTED]),
        NoteFilter::Consumed => Some(&[OutputNoteState::STATE_CONSUMED]),
        NoteFilter::Expected => Some(&[OutputNoteState::STATE_EXPECTED]),
        NoteFilter::Unspent => Some(&[
            OutputNoteState::STATE_EXPECTED,
            OutputNoteState::STATE_COMMITTED,
        ]),
        // Processing and unverified states exist only for input notes.
        NoteFilter::Processing | NoteFilter::Unverified => Some(&[]),
        _ => None,
    }
}

pub(crate) fn get_output_notes<B: Backend>(
    backend: &B,
    filter: &NoteFilter,
) -> Result<Vec<OutputNoteRecord>, StoreError> {
    let raw = match filter {
        NoteFilter::All => backend.all(SELECT_OUTPUT_NOTE, NO_PARAMS, output_note_from_row)?,
        NoteFilter::List(ids) => {
            let sql = format!("{SELECT_OUTPUT_NOTE} WHERE note_id = :note_id");
            let mut raw = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(row) =
                    backend.get(&sql, named_params![":note_id": id], output_note_from_row)?
                {
                    raw.push(row);
                }
            }
            raw
        }
        NoteFilter::Unique(id) => {
            let sql = format!("{SELECT_OUTPUT_NOTE} WHERE note_id = :note_id");
            let row = backend
                .get(&sql, named_params![":note_id": id], output_note_from_row)?
                .ok_or(StoreError::NoteNotFound(*id))?;
            vec![row]
        }
        NoteFilter::Nullifiers(nullifiers) => {
            let sql = format!("{SELECT_OUTPUT_NOTE} WHERE nullifier = :nullifier");
            let mut raw = Vec::with_capacity(nullifiers.len());
            for nullifier in nullifiers {
                if let Some(row) = backend.get(
                    &sql,
                    named_params![":nullifier": nullifier],
                    output_note_from_row,
                )? {
                    raw.push(row);
                }
            }
            raw
        }
        discriminated => {
            let discriminants = output_discriminants(discriminated)
                .expect("all remaining filters are discriminant-based");
            if discriminants.is_empty() {
                return Ok(Vec::new());
            }
            let sql = format!(
                "{SELECT_OUTPUT_NOTE} WHERE {}",
                discriminant_clause(discriminants)
            );
            backend.all(&sql, NO_PARAMS, output_note_from_row)?
        }
    };
    raw.into_iter().map(parse_output_note).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::error::StoreError;
    use crate::model::note::{InputNoteState, OutputNoteState};
    use crate::model::BlockNumber;
    use crate::store::notes::NoteFilter;
    use crate::testing::{input_note, memory_store, note_id, output_note, transaction_id};

    #[test]
    fn state_filters_partition_input_notes() {
        let mut store = memory_store();
        let expected = input_note(1, InputNoteState::Expected);
        let committed = input_note(
            2,
            InputNoteState::Committed {
                block_num: BlockNumber::from_u32(7),
            },
        );
        let consumed = input_note(
            3,
            InputNoteState::ConsumedExternal {
                nullifier_block_num: BlockNumber::from_u32(9),
            },
        );
        store
            .upsert_input_notes(&[expected.clone(), committed.clone(), consumed.clone()])
            .unwrap();

        let found = store.get_input_notes(&NoteFilter::Committed).unwrap();
        assert_eq!(found, vec![committed]);

        let found = store.get_input_notes(&NoteFilter::Consumed).unwrap();
        assert_eq!(found, vec![consumed]);

        let unspent = store.get_input_notes(&NoteFilter::Unspent).unwrap();
        assert_eq!(unspent.len(), 2);
    }

    #[test]
    fn unspent_nullifiers_exclude_consumed_notes() {
        let mut store = memory_store();
        let live = input_note(1, InputNoteState::Expected);
        let spent = input_note(
            2,
            InputNoteState::ConsumedAuthenticatedLocal {
                nullifier_block_num: BlockNumber::from_u32(3),
                consumer_transaction: transaction_id(9),
            },
        );
        store.upsert_input_notes(&[live.clone(), spent]).unwrap();

        assert_eq!(store.get_unspent_nullifiers().unwrap(), vec![live.nullifier]);
    }

    #[test]
    fn unique_filter_errors_on_missing_note() {
        let store = memory_store();
        assert_matches!(
            store.get_input_notes(&NoteFilter::Unique(note_id(9))),
            Err(StoreError::NoteNotFound(_))
        );
    }

    #[test]
    fn nullifier_filter_finds_the_note() {
        let mut store = memory_store();
        let note = input_note(4, InputNoteState::Expected);
        store.upsert_input_notes(std::slice::from_ref(&note)).unwrap();

        let found = store
            .get_input_notes(&NoteFilter::Nullifiers(vec![note.nullifier]))
            .unwrap();
        assert_eq!(found, vec![note]);
    }

    #[test]
    fn upsert_replaces_the_whole_note() {
        let mut store = memory_store();
        let mut note = input_note(5, InputNoteState::Expected);
        store.upsert_input_notes(std::slice::from_ref(&note)).unwrap();

        note.state = InputNoteState::Committed {
            block_num: BlockNumber::from_u32(11),
        };
        note.assets = vec![0xEE; 8];
        store.upsert_input_notes(std::slice::from_ref(&note)).unwrap();

        let found = store
            .get_input_notes(&NoteFilter::Unique(note.id))
            .unwrap();
        assert_eq!(found, vec![note]);
    }

    #[test]
    fn processing_filter_does_not_apply_to_output_notes() {
        let mut store = memory_store();
        let note = output_note(6, OutputNoteState::Expected);
        store.upsert_output_notes(std::slice::from_ref(&note)).unwrap();

        assert!(store
            .get_output_notes(&NoteFilter::Processing)
            .unwrap()
            .is_empty());
        let found = store.get_output_notes(&NoteFilter::Expected).unwrap();
        assert_eq!(found, vec![note]);
    }
}
