// Path: crates/storage/src/memory.rs

//! The in-memory store.

use alloy_primitives::B256;
use async_trait::async_trait;
use parking_lot::RwLock;
use sigil_api::storage::{
    GroupStore, KeygenCeremony, KeygenStore, NonceLeaf, NonceTreeRecord, NonceTreeStore,
    OutboxStore, SigningSessionStore, StateStore, StorageError, SubmissionEntry, SubmissionStatus,
    VerifiedDigestStore,
};
use sigil_types::chain::{FeeEstimate, RawTransaction};
use sigil_types::group::Group;
use sigil_types::ids::{CompressedPoint, GroupId, MessageDigest, ParticipantId, SignatureId};
use sigil_types::state::{MutableConsensusState, RolloverState, SigningState, StateDiff};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Default)]
struct Tables {
    rollover: Option<RolloverState>,
    signing: BTreeMap<MessageDigest, SigningState>,
    consensus: MutableConsensusState,
    cursors: HashMap<u64, u64>,
    groups: HashMap<GroupId, Group>,
    ceremonies: HashMap<GroupId, KeygenCeremony>,
    trees: HashMap<B256, NonceTreeRecord>,
    links: HashMap<(GroupId, u32), B256>,
    sessions: HashMap<SignatureId, Session>,
    digests: BTreeSet<MessageDigest>,
    outbox: BTreeMap<u64, SubmissionEntry>,
}

#[derive(Default)]
struct Session {
    signers: BTreeSet<ParticipantId>,
    sequence: u64,
    commitments: BTreeMap<ParticipantId, (CompressedPoint, CompressedPoint)>,
}

/// One validator's storage handle, entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn rollover(&self) -> Result<RolloverState, StorageError> {
        Ok(self
            .tables
            .read()
            .rollover
            .clone()
            .unwrap_or(RolloverState::WaitingForGenesis))
    }

    async fn signing_entry(
        &self,
        digest: &MessageDigest,
    ) -> Result<Option<SigningState>, StorageError> {
        Ok(self.tables.read().signing.get(digest).cloned())
    }

    async fn signing_entries(
        &self,
    ) -> Result<BTreeMap<MessageDigest, SigningState>, StorageError> {
        Ok(self.tables.read().signing.clone())
    }

    async fn consensus(&self) -> Result<MutableConsensusState, StorageError> {
        Ok(self.tables.read().consensus.clone())
    }

    async fn last_indexed_block(&self, chain_id: u64) -> Result<Option<u64>, StorageError> {
        Ok(self.tables.read().cursors.get(&chain_id).copied())
    }

    async fn commit_transition(
        &self,
        chain_id: u64,
        last_indexed_block: u64,
        diff: StateDiff,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        if let Some(rollover) = diff.rollover {
            tables.rollover = Some(rollover);
        }
        if let Some(consensus) = diff.consensus {
            tables.consensus = consensus;
        }
        for digest in diff.signing_removals {
            tables.signing.remove(&digest);
        }
        for (digest, entry) in diff.signing_upserts {
            tables.signing.insert(digest, entry);
        }
        tables.cursors.insert(chain_id, last_indexed_block);
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn group(&self, id: &GroupId) -> Result<Option<Group>, StorageError> {
        Ok(self.tables.read().groups.get(id).cloned())
    }

    async fn put_group(&self, group: &Group) -> Result<(), StorageError> {
        self.tables.write().groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn retire_group(&self, id: &GroupId) -> Result<(), StorageError> {
        self.tables.write().groups.remove(id);
        Ok(())
    }
}

#[async_trait]
impl KeygenStore for MemoryStore {
    async fn ceremony(&self, group_id: &GroupId) -> Result<Option<KeygenCeremony>, StorageError> {
        Ok(self.tables.read().ceremonies.get(group_id).cloned())
    }

    async fn put_ceremony(
        &self,
        group_id: &GroupId,
        ceremony: &KeygenCeremony,
    ) -> Result<(), StorageError> {
        self.tables.write().ceremonies.insert(*group_id, ceremony.clone());
        Ok(())
    }

    async fn remove_ceremony(&self, group_id: &GroupId) -> Result<(), StorageError> {
        self.tables.write().ceremonies.remove(group_id);
        Ok(())
    }
}

#[async_trait]
impl NonceTreeStore for MemoryStore {
    async fn put_tree(&self, record: &NonceTreeRecord) -> Result<(), StorageError> {
        self.tables.write().trees.insert(record.root, record.clone());
        Ok(())
    }

    async fn link_tree(
        &self,
        root: &B256,
        group_id: &GroupId,
        chunk: u32,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        if !tables.trees.contains_key(root) {
            return Err(StorageError::NotFound);
        }
        tables.links.insert((*group_id, chunk), *root);
        Ok(())
    }

    async fn leaf(
        &self,
        group_id: &GroupId,
        chunk: u32,
        offset: u32,
    ) -> Result<Option<NonceLeaf>, StorageError> {
        let tables = self.tables.read();
        let Some(root) = tables.links.get(&(*group_id, chunk)) else {
            return Ok(None);
        };
        Ok(tables
            .trees
            .get(root)
            .and_then(|t| t.leaves.get(offset as usize))
            .cloned())
    }

    async fn tree(
        &self,
        group_id: &GroupId,
        chunk: u32,
    ) -> Result<Option<NonceTreeRecord>, StorageError> {
        let tables = self.tables.read();
        let Some(root) = tables.links.get(&(*group_id, chunk)) else {
            return Ok(None);
        };
        Ok(tables.trees.get(root).cloned())
    }

    async fn burn_leaf(
        &self,
        group_id: &GroupId,
        chunk: u32,
        offset: u32,
    ) -> Result<bool, StorageError> {
        let mut tables = self.tables.write();
        let root = *tables
            .links
            .get(&(*group_id, chunk))
            .ok_or(StorageError::NotFound)?;
        let tree = tables.trees.get_mut(&root).ok_or(StorageError::NotFound)?;
        let leaf = tree
            .leaves
            .get_mut(offset as usize)
            .ok_or(StorageError::NotFound)?;
        if leaf.hiding_nonce.is_none() {
            return Ok(false);
        }
        leaf.hiding_nonce = None;
        leaf.binding_nonce = None;
        Ok(true)
    }

    async fn remaining_leaves(&self, group_id: &GroupId) -> Result<u64, StorageError> {
        let tables = self.tables.read();
        let mut remaining = 0u64;
        for ((group, _), root) in &tables.links {
            if group != group_id {
                continue;
            }
            if let Some(tree) = tables.trees.get(root) {
                remaining +=
                    tree.leaves.iter().filter(|l| l.hiding_nonce.is_some()).count() as u64;
            }
        }
        Ok(remaining)
    }
}

#[async_trait]
impl SigningSessionStore for MemoryStore {
    async fn open_session(
        &self,
        signature_id: &SignatureId,
        signers: &BTreeSet<ParticipantId>,
        sequence: u64,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        let session = tables.sessions.entry(*signature_id).or_default();
        session.signers = signers.clone();
        session.sequence = sequence;
        Ok(())
    }

    async fn signers(
        &self,
        signature_id: &SignatureId,
    ) -> Result<Option<BTreeSet<ParticipantId>>, StorageError> {
        Ok(self
            .tables
            .read()
            .sessions
            .get(signature_id)
            .map(|s| s.signers.clone()))
    }

    async fn sequence(&self, signature_id: &SignatureId) -> Result<Option<u64>, StorageError> {
        Ok(self.tables.read().sessions.get(signature_id).map(|s| s.sequence))
    }

    async fn put_commitment(
        &self,
        signature_id: &SignatureId,
        participant: ParticipantId,
        hiding: CompressedPoint,
        binding: CompressedPoint,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        let session = tables
            .sessions
            .get_mut(signature_id)
            .ok_or(StorageError::NotFound)?;
        session.commitments.insert(participant, (hiding, binding));
        Ok(())
    }

    async fn commitments(
        &self,
        signature_id: &SignatureId,
    ) -> Result<BTreeMap<ParticipantId, (CompressedPoint, CompressedPoint)>, StorageError> {
        Ok(self
            .tables
            .read()
            .sessions
            .get(signature_id)
            .map(|s| s.commitments.clone())
            .unwrap_or_default())
    }

    async fn remove_session(&self, signature_id: &SignatureId) -> Result<(), StorageError> {
        self.tables.write().sessions.remove(signature_id);
        Ok(())
    }
}

#[async_trait]
impl VerifiedDigestStore for MemoryStore {
    async fn insert(&self, digest: &MessageDigest) -> Result<(), StorageError> {
        self.tables.write().digests.insert(*digest);
        Ok(())
    }

    async fn contains(&self, digest: &MessageDigest) -> Result<bool, StorageError> {
        Ok(self.tables.read().digests.contains(digest))
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn append(&self, entry: &SubmissionEntry) -> Result<(), StorageError> {
        self.tables.write().outbox.insert(entry.nonce, entry.clone());
        Ok(())
    }

    async fn unexecuted(&self) -> Result<Vec<SubmissionEntry>, StorageError> {
        Ok(self
            .tables
            .read()
            .outbox
            .values()
            .filter(|e| e.status != SubmissionStatus::Executed)
            .cloned()
            .collect())
    }

    async fn mark_executed_below(&self, nonce: u64) -> Result<u64, StorageError> {
        let mut tables = self.tables.write();
        let mut changed = 0;
        for (entry_nonce, entry) in tables.outbox.iter_mut() {
            if *entry_nonce < nonce && entry.status != SubmissionStatus::Executed {
                entry.status = SubmissionStatus::Executed;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn mark_executed(&self, nonce: u64) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        let entry = tables.outbox.get_mut(&nonce).ok_or(StorageError::NotFound)?;
        entry.status = SubmissionStatus::Executed;
        Ok(())
    }

    async fn record_submission(
        &self,
        nonce: u64,
        raw_tx: &RawTransaction,
        hash: B256,
        fees: FeeEstimate,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        let entry = tables.outbox.get_mut(&nonce).ok_or(StorageError::NotFound)?;
        entry.raw_tx = raw_tx.clone();
        entry.last_hash = Some(hash);
        entry.last_fees = Some(fees);
        entry.status = SubmissionStatus::Submitted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf() -> NonceLeaf {
        NonceLeaf {
            hiding_nonce: Some(Default::default()),
            hiding_commitment: Default::default(),
            binding_nonce: Some(Default::default()),
            binding_commitment: Default::default(),
        }
    }

    #[tokio::test]
    async fn burn_is_exactly_once() {
        let store = MemoryStore::new();
        let group = GroupId([1; 32]);
        let record = NonceTreeRecord { root: B256::repeat_byte(9), leaves: vec![leaf(), leaf()] };
        store.put_tree(&record).await.unwrap();
        store.link_tree(&record.root, &group, 0).await.unwrap();

        assert!(store.burn_leaf(&group, 0, 1).await.unwrap());
        assert!(!store.burn_leaf(&group, 0, 1).await.unwrap());
        assert_eq!(store.remaining_leaves(&group).await.unwrap(), 1);

        let burned = store.leaf(&group, 0, 1).await.unwrap().unwrap();
        assert!(burned.hiding_nonce.is_none());
        assert!(burned.binding_nonce.is_none());
    }

    #[tokio::test]
    async fn commit_transition_is_atomic_snapshot() {
        let store = MemoryStore::new();
        let mut diff = StateDiff::default();
        diff.rollover = Some(RolloverState::WaitingForRollover);
        store.commit_transition(1, 42, diff).await.unwrap();

        assert_eq!(store.last_indexed_block(1).await.unwrap(), Some(42));
        assert_eq!(
            store.rollover().await.unwrap(),
            RolloverState::WaitingForRollover
        );
    }
}
