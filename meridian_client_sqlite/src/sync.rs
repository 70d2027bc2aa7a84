//! The synchronization applier: absorbs one sync delta as a single
//! ordered transaction.

use rusqlite::Transaction;
use tracing::debug;

use crate::error::StoreError;
use crate::model::sync::StateSyncUpdate;
use crate::store::{accounts, chain, notes, tags, transactions};

/// Applies one sync delta inside the given transaction.
///
/// The step order is load-bearing: rows referenced by later steps (note
/// and transaction scripts, account code) are written before their
/// referents, and stale account states are removed before new snapshots
/// land under the same id so a superseded row cannot resurface as the
/// maximum-nonce header.
///
/// Any error aborts the enclosing transaction; the caller retries the
/// whole delta and must never assume partial progress.
pub(crate) fn apply_state_sync(
    conn: &Transaction<'_>,
    update: &StateSyncUpdate,
) -> Result<(), StoreError> {
    chain::set_sync_height(conn, update.block_num)?;

    for header in &update.block_headers {
        chain::insert_block_header(conn, header)?;
    }
    chain::insert_partial_blockchain_nodes(conn, &update.partial_blockchain_nodes)?;

    notes::upsert_input_notes(conn, &update.updated_input_notes)?;
    notes::upsert_output_notes(conn, &update.updated_output_notes)?;

    for transaction in &update.updated_transactions {
        transactions::upsert_transaction_record(conn, transaction)?;
    }

    accounts::undo_account_states(conn, &update.account_states_to_rollback)?;
    for snapshot in &update.updated_accounts {
        accounts::put_account_snapshot(conn, snapshot)?;
    }

    for tag in &update.tags_to_remove {
        tags::remove_note_tag(conn, tag)?;
    }
    for account_id in &update.accounts_to_lock {
        accounts::lock_account(conn, *account_id)?;
    }

    debug!(
        block_num = update.block_num.as_u32(),
        headers = update.block_headers.len(),
        nodes = update.partial_blockchain_nodes.len(),
        input_notes = update.updated_input_notes.len(),
        output_notes = update.updated_output_notes.len(),
        transactions = update.updated_transactions.len(),
        accounts = update.updated_accounts.len(),
        "applied state sync delta"
    );
    Ok(())
}
