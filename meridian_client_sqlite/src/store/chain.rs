//! Block headers, MMR authentication nodes, and the sync height.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{named_params, Connection};
use tracing::debug;

use crate::backend::{Backend, NO_PARAMS};
use crate::error::StoreError;
use crate::model::{BlockHeaderRecord, BlockNumber, Digest, InOrderIndex};

/// Filters for reading MMR authentication nodes.
#[derive(Debug, Clone)]
pub enum PartialBlockchainFilter {
    /// Return all stored nodes.
    All,
    /// Return nodes at the given in-order positions.
    List(Vec<InOrderIndex>),
}

const SELECT_HEADER: &str = "SELECT block_num, header, partial_blockchain_peaks, has_client_notes
     FROM block_headers WHERE block_num = :block_num";

fn header_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockHeaderRecord> {
    Ok(BlockHeaderRecord {
        block_num: row.get(0)?,
        header: row.get(1)?,
        partial_blockchain_peaks: row.get(2)?,
        has_client_notes: row.get(3)?,
    })
}

/// Inserts a block header if absent. An existing row keeps its header and
/// peaks bytes; only the relevance flag may be promoted, and only from
/// false to true.
pub(crate) fn insert_block_header(
    conn: &Connection,
    record: &BlockHeaderRecord,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO block_headers (block_num, header, partial_blockchain_peaks, has_client_notes)
         VALUES (:block_num, :header, :partial_blockchain_peaks, :has_client_notes)
         ON CONFLICT (block_num) DO UPDATE
         SET has_client_notes = block_headers.has_client_notes OR excluded.has_client_notes",
    )?;
    stmt.execute(named_params![
        ":block_num": record.block_num,
        ":header": record.header,
        ":partial_blockchain_peaks": record.partial_blockchain_peaks,
        ":has_client_notes": record.has_client_notes,
    ])?;
    Ok(())
}

/// Inserts MMR authentication nodes; positions already present are left
/// untouched.
pub(crate) fn insert_partial_blockchain_nodes(
    conn: &Connection,
    nodes: &[(InOrderIndex, Digest)],
) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare_cached("INSERT OR IGNORE INTO partial_blockchain_nodes (id, node) VALUES (:id, :node)")?;
    for (index, node) in nodes {
        stmt.execute(named_params![":id": index, ":node": node])?;
    }
    Ok(())
}

pub(crate) fn get_block_header<B: Backend>(
    backend: &B,
    block_num: BlockNumber,
) -> Result<Option<BlockHeaderRecord>, StoreError> {
    backend.get(
        SELECT_HEADER,
        named_params![":block_num": block_num],
        header_from_row,
    )
}

/// Returns the stored headers among the requested block numbers. Missing
/// blocks are simply absent from the result.
pub(crate) fn get_block_headers<B: Backend>(
    backend: &B,
    block_numbers: &BTreeSet<BlockNumber>,
) -> Result<Vec<BlockHeaderRecord>, StoreError> {
    let mut headers = Vec::with_capacity(block_numbers.len());
    for block_num in block_numbers {
        if let Some(header) = get_block_header(backend, *block_num)? {
            headers.push(header);
        }
    }
    Ok(headers)
}

/// Headers of blocks carrying notes relevant to this client.
pub(crate) fn get_tracked_block_headers<B: Backend>(
    backend: &B,
) -> Result<Vec<BlockHeaderRecord>, StoreError> {
    backend.all(
        "SELECT block_num, header, partial_blockchain_peaks, has_client_notes
         FROM block_headers WHERE has_client_notes = 1 ORDER BY block_num",
        NO_PARAMS,
        header_from_row,
    )
}

pub(crate) fn get_partial_blockchain_nodes<B: Backend>(
    backend: &B,
    filter: &PartialBlockchainFilter,
) -> Result<BTreeMap<InOrderIndex, Digest>, StoreError> {
    match filter {
        PartialBlockchainFilter::All => {
            let nodes = backend.all(
                "SELECT id, node FROM partial_blockchain_nodes",
                NO_PARAMS,
                |row| Ok((row.get::<_, InOrderIndex>(0)?, row.get::<_, Digest>(1)?)),
            )?;
            Ok(nodes.into_iter().collect())
        }
        PartialBlockchainFilter::List(indices) => {
            let mut nodes = BTreeMap::new();
            for index in indices {
                let node = backend.get(
                    "SELECT node FROM partial_blockchain_nodes WHERE id = :id",
                    named_params![":id": index],
                    |row| row.get::<_, Digest>(0),
                )?;
                if let Some(node) = node {
                    nodes.insert(*index, node);
                }
            }
            Ok(nodes)
        }
    }
}

/// MMR peaks stored alongside the header at the given height.
pub(crate) fn get_partial_blockchain_peaks<B: Backend>(
    backend: &B,
    block_num: BlockNumber,
) -> Result<Option<Vec<u8>>, StoreError> {
    backend.get(
        "SELECT partial_blockchain_peaks FROM block_headers WHERE block_num = :block_num",
        named_params![":block_num": block_num],
        |row| row.get(0),
    )
}

pub(crate) fn get_sync_height<B: Backend>(backend: &B) -> Result<BlockNumber, StoreError> {
    backend
        .get("SELECT block_num FROM state_sync", NO_PARAMS, |row| {
            row.get(0)
        })?
        .ok_or_else(|| StoreError::CorruptedData("state_sync row is missing".into()))
}

/// Advances the stored sync height. Heights at or below the stored value
/// leave it unchanged; this is a no-op, not an error.
pub(crate) fn set_sync_height(conn: &Connection, block_num: BlockNumber) -> Result<(), StoreError> {
    let mut stmt =
        conn.prepare_cached("UPDATE state_sync SET block_num = :block_num WHERE block_num < :block_num")?;
    stmt.execute(named_params![":block_num": block_num])?;
    Ok(())
}

/// Deletes headers that carry no client notes, keeping the genesis block
/// and the block at the current sync height regardless of their flag.
/// Returns the number of headers removed.
pub(crate) fn prune_irrelevant_blocks(conn: &Connection) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached(
        "DELETE FROM block_headers
         WHERE has_client_notes = 0
           AND block_num <> 0
           AND block_num <> (SELECT block_num FROM state_sync)",
    )?;
    let removed = stmt.execute([])?;
    debug!(removed, "pruned irrelevant block headers");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::model::{BlockNumber, InOrderIndex};
    use crate::store::chain::PartialBlockchainFilter;
    use crate::testing::{block_header, digest, memory_store};

    #[test]
    fn relevance_flag_is_monotonic() {
        let mut store = memory_store();
        let mut header = block_header(10, false);
        store.insert_block_header(&header).unwrap();

        // Promotion to true sticks, and the stored bytes stay the original
        // ones even when the second insert carries different payloads.
        header.has_client_notes = true;
        header.header = vec![0xFF; 4];
        store.insert_block_header(&header).unwrap();
        let stored = store
            .get_block_header_by_num(BlockNumber::from_u32(10))
            .unwrap()
            .unwrap();
        assert!(stored.has_client_notes);
        assert_eq!(stored.header, block_header(10, false).header);

        // The reverse transition is ignored.
        header.has_client_notes = false;
        store.insert_block_header(&header).unwrap();
        let stored = store
            .get_block_header_by_num(BlockNumber::from_u32(10))
            .unwrap()
            .unwrap();
        assert!(stored.has_client_notes);
    }

    #[test]
    fn auth_nodes_are_never_overwritten() {
        let mut store = memory_store();
        let index = InOrderIndex::from_u64(5);
        store
            .insert_partial_blockchain_nodes(&[(index, digest(1))])
            .unwrap();
        store
            .insert_partial_blockchain_nodes(&[(index, digest(2))])
            .unwrap();

        let nodes = store
            .get_partial_blockchain_nodes(&PartialBlockchainFilter::All)
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[&index], digest(1));
    }

    #[test]
    fn missing_headers_are_skipped_in_batch_reads() {
        let mut store = memory_store();
        store.insert_block_header(&block_header(3, true)).unwrap();

        let requested: BTreeSet<_> = [3u32, 4].into_iter().map(BlockNumber::from_u32).collect();
        let found = store.get_block_headers(&requested).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].block_num, BlockNumber::from_u32(3));
    }

    #[test]
    fn pruning_keeps_genesis_and_sync_tip() {
        let mut store = memory_store();
        store.insert_block_header(&block_header(0, false)).unwrap();
        store.insert_block_header(&block_header(50, false)).unwrap();
        store.insert_block_header(&block_header(100, false)).unwrap();
        store
            .apply_state_sync(&crate::model::sync::StateSyncUpdate::new(
                BlockNumber::from_u32(100),
            ))
            .unwrap();

        assert_eq!(store.prune_irrelevant_blocks().unwrap(), 1);
        let remaining: Vec<u32> = [0u32, 50, 100]
            .into_iter()
            .filter(|n| {
                store
                    .get_block_header_by_num(BlockNumber::from_u32(*n))
                    .unwrap()
                    .is_some()
            })
            .collect();
        assert_eq!(remaining, vec![0, 100]);
    }

    #[test]
    fn tracked_headers_are_relevance_filtered() {
        let mut store = memory_store();
        store.insert_block_header(&block_header(1, false)).unwrap();
        store.insert_block_header(&block_header(2, true)).unwrap();

        let tracked = store.get_tracked_block_headers().unwrap();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].block_num, BlockNumber::from_u32(2));
    }
}
