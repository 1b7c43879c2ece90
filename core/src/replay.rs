//! Backdated-transaction reverse-replay
//!
//! When a transaction arrives dated earlier than the loan's latest live
//! transaction, the ledger cannot simply append it: every later transaction
//! was applied against balances that are now wrong. The replay engine
//! reverses the affected suffix and reapplies it in correct chronological
//! order.
//!
//! # Algorithm
//!
//! 1. Find the insertion point in (date, tie-break) order
//! 2. Reverse every live transaction at or after the insertion point
//! 3. Append the new transaction, then a regenerated copy of each reversed
//!    transaction
//! 4. Record a Replayed relation from each copy to its original
//!    (ReplayedAndReversed when the original was itself a replay copy)
//! 5. Rebuild the schedule projection from the live set; disbursements in
//!    the set re-derive the amortization as they apply
//!
//! The whole replay is atomic: it runs on a detached clone of the account
//! and is swapped in only on success. The loop is an explicit list walk,
//! never recursion, so rollback is a single discarded clone.

use crate::models::account::{AccountError, LoanAccount};
use crate::models::transaction::{LoanTransaction, RelationType, SameDayOrder, TransactionRelation};
use thiserror::Error;

/// Errors that abort a replay
///
/// On error the account is untouched: no partial replay state survives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error("replay aborted, original state preserved: {0}")]
    Aborted(#[from] AccountError),
}

/// Summary of a completed replay
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// Id of the backdated transaction that triggered the replay
    pub trigger_tx_id: String,
    /// Ids of the originals that were reversed, in chronological order
    pub reversed: Vec<String>,
    /// Ids of the regenerated copies, matching `reversed` pairwise
    pub regenerated: Vec<String>,
}

/// Whether inserting `tx` requires a replay
///
/// True when any live transaction sorts strictly after the new one under
/// the configured tie-break.
pub fn needs_replay(account: &LoanAccount, tx: &LoanTransaction, order: SameDayOrder) -> bool {
    let key = tx.order_key(order);
    account.live_transactions().any(|t| t.order_key(order) > key)
}

/// Insert a backdated transaction, reversing and replaying the suffix
///
/// Also correct (and a plain append plus apply) when no replay is needed,
/// but the engine only routes backdated insertions here.
pub fn insert_with_replay(
    account: &mut LoanAccount,
    tx: LoanTransaction,
    order: SameDayOrder,
) -> Result<ReplayReport, ReplayError> {
    let mut draft = account.clone();
    let key = tx.order_key(order);

    // Collect the suffix: live transactions sorting after the insertion
    // point, in chronological order
    let mut suffix: Vec<(usize, LoanTransaction)> = draft
        .transactions()
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_reversed() && t.order_key(order) > key)
        .map(|(i, t)| (i, t.clone()))
        .collect();
    suffix.sort_by_key(|(_, t)| t.order_key(order));

    for (index, _) in &suffix {
        draft.reverse_transaction_at(*index);
    }

    let trigger_tx_id = tx.id().to_string();
    draft.push_transaction(tx);

    let mut reversed = Vec::with_capacity(suffix.len());
    let mut regenerated = Vec::with_capacity(suffix.len());
    for (_, original) in &suffix {
        let seq = draft.next_seq();
        let copy = original.regenerate_as_replay(seq);

        // A copy of a copy marks the chain explicitly
        let relation_type = if draft
            .relations()
            .iter()
            .any(|r| r.from_id() == original.id() && r.relation_type() == RelationType::Replayed)
        {
            RelationType::ReplayedAndReversed
        } else {
            RelationType::Replayed
        };

        draft.add_relation(TransactionRelation::new(copy.id(), original.id(), relation_type));
        reversed.push(original.id().to_string());
        regenerated.push(copy.id().to_string());
        draft.push_transaction(copy);
    }

    draft.rebuild_projection(order)?;

    *account = draft;
    Ok(ReplayReport {
        trigger_tx_id,
        reversed,
        regenerated,
    })
}
