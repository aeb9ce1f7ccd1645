// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2024-2025 Sberry Cloud Pty Ltd. All rights reserved.
//  https://doc.sberry.cloud
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Subscription reconciliation state shared between the client handle and the
//! connection task.
//!
//! Two sets track every warehouse id: *pending* (requested locally, not yet
//! transmitted on an open connection) and *confirmed* (a subscribe frame
//! referencing it has been transmitted). The sets are disjoint at rest: ids
//! are queued only when not confirmed, and confirming an id removes it from
//! pending.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

#[derive(Debug, Default)]
struct SubscriptionSets {
    pending: BTreeSet<u64>,
    confirmed: BTreeSet<u64>,
}

/// Shared pending/confirmed subscription sets.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionState {
    inner: Arc<Mutex<SubscriptionSets>>,
}

impl SubscriptionState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues ids for subscription, skipping any already confirmed.
    pub fn queue(&self, warehouse_ids: &[u64]) {
        let mut sets = self.lock();
        for id in warehouse_ids {
            if !sets.confirmed.contains(id) {
                sets.pending.insert(*id);
            }
        }
    }

    /// Takes the batch to transmit: every pending id not already confirmed.
    ///
    /// Pending is cleared; ids duplicating confirmed entries are dropped
    /// without transmission. The batch is confirmed separately once the
    /// subscribe frame has actually been sent.
    #[must_use]
    pub fn take_flush_batch(&self) -> Vec<u64> {
        let mut sets = self.lock();
        let batch: Vec<u64> = sets
            .pending
            .iter()
            .filter(|id| !sets.confirmed.contains(id))
            .copied()
            .collect();
        sets.pending.clear();
        batch
    }

    /// Marks a transmitted batch as confirmed.
    pub fn confirm(&self, warehouse_ids: &[u64]) {
        let mut sets = self.lock();
        for id in warehouse_ids {
            sets.pending.remove(id);
            sets.confirmed.insert(*id);
        }
    }

    /// Puts a batch back into pending after a failed transmission.
    pub fn requeue(&self, warehouse_ids: &[u64]) {
        let mut sets = self.lock();
        for id in warehouse_ids {
            if !sets.confirmed.contains(id) {
                sets.pending.insert(*id);
            }
        }
    }

    /// Filters an unsubscribe request down to ids actually confirmed.
    #[must_use]
    pub fn filter_confirmed(&self, warehouse_ids: &[u64]) -> Vec<u64> {
        let sets = self.lock();
        warehouse_ids
            .iter()
            .filter(|id| sets.confirmed.contains(id))
            .copied()
            .collect()
    }

    /// Removes ids from confirmed after an unsubscribe frame was sent.
    pub fn remove_confirmed(&self, warehouse_ids: &[u64]) {
        let mut sets = self.lock();
        for id in warehouse_ids {
            sets.confirmed.remove(id);
        }
    }

    /// Moves the entire confirmed set back into pending.
    ///
    /// Run on every transition into OPEN: the server lost its subscription
    /// state with the old connection, so everything confirmed must be
    /// re-transmitted.
    pub fn requeue_confirmed(&self) {
        let mut sets = self.lock();
        let confirmed = std::mem::take(&mut sets.confirmed);
        sets.pending.extend(confirmed);
    }

    /// Clears both sets (terminal disconnect).
    pub fn clear(&self) {
        let mut sets = self.lock();
        sets.pending.clear();
        sets.confirmed.clear();
    }

    /// Returns the confirmed ids in ascending order.
    #[must_use]
    pub fn confirmed_ids(&self) -> Vec<u64> {
        self.lock().confirmed.iter().copied().collect()
    }

    /// Returns the pending ids in ascending order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<u64> {
        self.lock().pending.iter().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SubscriptionSets> {
        self.inner.lock().expect("subscription state lock poisoned")
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_queue_skips_confirmed() {
        let state = SubscriptionState::new();
        state.queue(&[10, 20]);
        state.confirm(&[10, 20]);

        state.queue(&[10, 30]);
        assert_eq!(state.pending_ids(), vec![30]);
        assert_eq!(state.confirmed_ids(), vec![10, 20]);
    }

    #[rstest]
    fn test_flush_batch_moves_pending_once() {
        let state = SubscriptionState::new();
        state.queue(&[10, 20]);

        let batch = state.take_flush_batch();
        assert_eq!(batch, vec![10, 20]);
        assert!(state.pending_ids().is_empty());

        state.confirm(&batch);
        assert_eq!(state.confirmed_ids(), vec![10, 20]);

        // A second flush has nothing to transmit.
        assert!(state.take_flush_batch().is_empty());
    }

    #[rstest]
    fn test_sets_disjoint_after_confirm() {
        let state = SubscriptionState::new();
        state.queue(&[1, 2, 3]);
        state.confirm(&[2]);
        assert_eq!(state.pending_ids(), vec![1, 3]);
        assert_eq!(state.confirmed_ids(), vec![2]);
    }

    #[rstest]
    fn test_unsubscribe_filter_and_remove() {
        let state = SubscriptionState::new();
        state.queue(&[10, 20]);
        state.confirm(&[10, 20]);

        // 99 was never subscribed; nothing to send for it.
        let filtered = state.filter_confirmed(&[10, 99]);
        assert_eq!(filtered, vec![10]);

        state.remove_confirmed(&filtered);
        assert_eq!(state.confirmed_ids(), vec![20]);
    }

    #[rstest]
    fn test_unsubscribe_unknown_ids_is_noop() {
        let state = SubscriptionState::new();
        assert!(state.filter_confirmed(&[1, 2, 3]).is_empty());
    }

    #[rstest]
    fn test_requeue_confirmed_for_reconnect() {
        let state = SubscriptionState::new();
        state.queue(&[10, 20]);
        state.confirm(&[10, 20]);

        state.requeue_confirmed();
        assert!(state.confirmed_ids().is_empty());
        assert_eq!(state.pending_ids(), vec![10, 20]);

        let batch = state.take_flush_batch();
        assert_eq!(batch, vec![10, 20]);
    }

    #[rstest]
    fn test_requeue_after_failed_send() {
        let state = SubscriptionState::new();
        state.queue(&[5]);
        let batch = state.take_flush_batch();
        state.requeue(&batch);
        assert_eq!(state.pending_ids(), vec![5]);
    }

    #[rstest]
    fn test_clear_is_terminal() {
        let state = SubscriptionState::new();
        state.queue(&[1]);
        state.confirm(&[1]);
        state.queue(&[2]);
        state.clear();
        assert!(state.pending_ids().is_empty());
        assert!(state.confirmed_ids().is_empty());
    }
}
