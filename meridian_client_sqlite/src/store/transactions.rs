//! Transaction records and their deduplicated scripts.

use rusqlite::{named_params, Connection};

use crate::backend::{Backend, NO_PARAMS};
use crate::error::StoreError;
use crate::model::transaction::{TransactionRecord, TransactionScript, TransactionStatus};
use crate::model::{BlockNumber, Digest, TransactionId};

/// Filters for narrowing the set of transactions returned by the store.
#[derive(Debug, Clone)]
pub enum TransactionFilter {
    /// Return all transactions.
    All,
    /// Transactions not yet committed or discarded as of the last sync.
    Uncommitted,
    /// Transactions matching the provided ids.
    Ids(Vec<TransactionId>),
    /// Uncommitted transactions executed against a block strictly below
    /// the provided number.
    ExpiredBefore(BlockNumber),
}

const SELECT_TRANSACTION: &str = "SELECT t.id, t.details, t.script_root, s.script, t.block_num, t.status_variant, t.status
     FROM transactions t
     LEFT JOIN transaction_scripts s ON s.script_root = t.script_root";

type RawTransaction = (
    TransactionId,
    Vec<u8>,
    Option<Digest>,
    Option<Vec<u8>>,
    BlockNumber,
    u8,
    Vec<u8>,
);

fn transaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTransaction> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn parse_transaction(raw: RawTransaction) -> Result<TransactionRecord, StoreError> {
    let (id, details, script_root, script_bytes, block_num, status_variant, status_bytes) = raw;
    let script = match (script_root, script_bytes) {
        (None, _) => None,
        (Some(root), Some(script)) => Some(TransactionScript { root, script }),
        (Some(root), None) => {
            return Err(StoreError::CorruptedData(format!(
                "transaction script {root} is referenced but not stored"
            )))
        }
    };
    let status = TransactionStatus::from_bytes(&status_bytes)?;
    if status.variant() != status_variant {
        return Err(StoreError::CorruptedData(format!(
            "transaction {id} status variant column disagrees with its payload"
        )));
    }
    Ok(TransactionRecord {
        id,
        details,
        script,
        block_num,
        status,
    })
}

/// Upserts a transaction row and, when present, its deduplicated script.
pub(crate) fn upsert_transaction_record(
    conn: &Connection,
    record: &TransactionRecord,
) -> Result<(), StoreError> {
    if let Some(script) = &record.script {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO transaction_scripts (script_root, script) VALUES (:script_root, :script)
             ON CONFLICT (script_root) DO UPDATE SET script = :script",
        )?;
        stmt.execute(named_params![
            ":script_root": script.root,
            ":script": script.script,
        ])?;
    }

    let mut stmt = conn.prepare_cached(
        "INSERT INTO transactions (id, details, script_root, block_num, status_variant, status)
         VALUES (:id, :details, :script_root, :block_num, :status_variant, :status)
         ON CONFLICT (id) DO UPDATE
         SET details = :details,
             script_root = :script_root,
             block_num = :block_num,
             status_variant = :status_variant,
             status = :status",
    )?;
    stmt.execute(named_params![
        ":id": record.id,
        ":details": record.details,
        ":script_root": record.script.as_ref().map(|s| s.root),
        ":block_num": record.block_num,
        ":status_variant": record.status.variant(),
        ":status": record.status.to_bytes(),
    ])?;
    Ok(())
}

pub(crate) fn get_transactions<B: Backend>(
    backend: &B,
    filter: &TransactionFilter,
) -> Result<Vec<TransactionRecord>, StoreError> {
    let raw = match filter {
        TransactionFilter::All => backend.all(SELECT_TRANSACTION, NO_PARAMS, transaction_from_row)?,
        TransactionFilter::Uncommitted => {
            let sql = format!(
                "{SELECT_TRANSACTION} WHERE t.status_variant = {}",
                TransactionStatus::VARIANT_PENDING
            );
            backend.all(&sql, NO_PARAMS, transaction_from_row)?
        }
        TransactionFilter::ExpiredBefore(block_num) => {
            let sql = format!(
                "{SELECT_TRANSACTION} WHERE t.status_variant = {} AND t.block_num < :block_num",
                TransactionStatus::VARIANT_PENDING
            );
            backend.all(&sql, named_params![":block_num": block_num], transaction_from_row)?
        }
        TransactionFilter::Ids(ids) => {
            let sql = format!("{SELECT_TRANSACTION} WHERE t.id = :id");
            let mut raw = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(row) =
                    backend.get(&sql, named_params![":id": id], transaction_from_row)?
                {
                    raw.push(row);
                }
            }
            raw
        }
    };
    raw.into_iter().map(parse_transaction).collect()
}

#[cfg(test)]
mod tests {
    use crate::model::transaction::{DiscardCause, TransactionStatus};
    use crate::model::BlockNumber;
    use crate::store::transactions::TransactionFilter;
    use crate::testing::{memory_store, transaction_record};

    #[test]
    fn upserts_replace_and_scripts_deduplicate() {
        let mut store = memory_store();
        let mut record = transaction_record(1, 10, TransactionStatus::Pending);
        store.upsert_transactions(std::slice::from_ref(&record)).unwrap();

        record.status = TransactionStatus::Committed {
            block_num: BlockNumber::from_u32(15),
        };
        store.upsert_transactions(std::slice::from_ref(&record)).unwrap();

        let fetched = store.get_transactions(&TransactionFilter::All).unwrap();
        assert_eq!(fetched, vec![record]);
    }

    #[test]
    fn expired_filter_excludes_terminal_and_recent() {
        let mut store = memory_store();
        let expired = transaction_record(1, 10, TransactionStatus::Pending);
        let recent = transaction_record(2, 90, TransactionStatus::Pending);
        let committed = transaction_record(
            3,
            5,
            TransactionStatus::Committed {
                block_num: BlockNumber::from_u32(6),
            },
        );
        let discarded = transaction_record(
            4,
            5,
            TransactionStatus::Discarded {
                cause: DiscardCause::Expired,
            },
        );
        store
            .upsert_transactions(&[expired.clone(), recent, committed, discarded])
            .unwrap();

        let found = store
            .get_transactions(&TransactionFilter::ExpiredBefore(BlockNumber::from_u32(50)))
            .unwrap();
        assert_eq!(found, vec![expired]);
    }

    #[test]
    fn id_filter_skips_unknown_ids() {
        let mut store = memory_store();
        let known = transaction_record(1, 10, TransactionStatus::Pending);
        store.upsert_transactions(std::slice::from_ref(&known)).unwrap();

        let missing = transaction_record(9, 10, TransactionStatus::Pending);
        let found = store
            .get_transactions(&TransactionFilter::Ids(vec![known.id, missing.id]))
            .unwrap();
        assert_eq!(found, vec![known]);
    }
}
