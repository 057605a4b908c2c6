// consensus/src/chain_index.rs

//! Block index: every header the core has accepted, linked to its parent
//! by hash. The index owns all nodes; parents are looked up, never owned.

use crate::{ConsensusError, ConsensusResult};
use blockchain_core::{BlockHeader, BlockHeight, VoteVersionTuple};
use blockchain_crypto::Hash;
use stake::{StakeNode, UndoTicketData};
use std::collections::HashMap;
use std::sync::Arc;

/// One indexed block
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub hash: Hash,
    /// `None` only for genesis
    pub parent: Option<Hash>,
    pub height: BlockHeight,
    /// Key blocks on the path from genesis, genesis excluded
    pub key_height: BlockHeight,
    pub is_main_chain: bool,
    pub is_key_block: bool,
    pub header: BlockHeader,
    pub votes: Vec<VoteVersionTuple>,
    pub tickets_spent: Vec<Hash>,
    pub tickets_revoked: Vec<Hash>,
    /// Tickets maturing in this block, filled on first connect
    pub new_tickets: Option<Vec<Hash>>,
    /// Ticket undo data, filled on first connect
    pub stake_undo: Option<Vec<UndoTicketData>>,
    /// Pool snapshot right after this block
    pub stake_node: Option<Arc<StakeNode>>,
}

impl BlockNode {
    pub fn is_genesis(&self) -> bool {
        self.parent.is_none()
    }
}

/// Hash-keyed arena of block nodes
#[derive(Debug)]
pub struct ChainIndex {
    nodes: HashMap<Hash, BlockNode>,
    genesis: Hash,
}

impl ChainIndex {
    /// Create an index holding only the genesis block. Genesis starts on the
    /// main chain with an empty pool snapshot.
    pub fn new(genesis: BlockHeader) -> Self {
        let hash = genesis.hash();
        let node = BlockNode {
            hash,
            parent: None,
            height: genesis.height,
            key_height: 0,
            is_main_chain: true,
            is_key_block: true,
            header: genesis,
            votes: Vec::new(),
            tickets_spent: Vec::new(),
            tickets_revoked: Vec::new(),
            new_tickets: Some(Vec::new()),
            stake_undo: Some(Vec::new()),
            stake_node: Some(Arc::new(StakeNode::genesis())),
        };

        let mut nodes = HashMap::new();
        nodes.insert(hash, node);
        Self { nodes, genesis: hash }
    }

    /// Link a header under its declared parent
    pub fn insert(
        &mut self,
        header: BlockHeader,
        tickets_spent: Vec<Hash>,
        tickets_revoked: Vec<Hash>,
        votes: Vec<VoteVersionTuple>,
    ) -> ConsensusResult<&BlockNode> {
        let hash = header.hash();
        if self.nodes.contains_key(&hash) {
            return Err(ConsensusError::DuplicateBlock(hash));
        }

        let parent = self.nodes.get(&header.prev_block).ok_or(ConsensusError::OrphanBlock {
            hash,
            parent: header.prev_block,
        })?;

        if header.height != parent.height + 1 {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {} at height {} does not extend parent at height {}",
                hash, header.height, parent.height
            )));
        }

        let is_key_block = header.is_key_block();
        let node = BlockNode {
            hash,
            parent: Some(parent.hash),
            height: header.height,
            key_height: parent.key_height + is_key_block as BlockHeight,
            is_main_chain: false,
            is_key_block,
            header,
            votes,
            tickets_spent,
            tickets_revoked,
            new_tickets: None,
            stake_undo: None,
            stake_node: None,
        };

        Ok(self.nodes.entry(hash).or_insert(node))
    }

    pub fn get(&self, hash: &Hash) -> Option<&BlockNode> {
        self.nodes.get(hash)
    }

    pub(crate) fn get_mut(&mut self, hash: &Hash) -> Option<&mut BlockNode> {
        self.nodes.get_mut(hash)
    }

    /// Like [`get`](Self::get) but unknown hashes are an error
    pub fn node(&self, hash: &Hash) -> ConsensusResult<&BlockNode> {
        self.nodes.get(hash).ok_or(ConsensusError::BlockNotFound(*hash))
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn genesis(&self) -> Hash {
        self.genesis
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, node: &BlockNode) -> Option<&BlockNode> {
        node.parent.and_then(|p| self.nodes.get(&p))
    }

    /// Ancestor of `hash` at `height`, following parent links
    pub fn ancestor_at(&self, hash: &Hash, height: BlockHeight) -> ConsensusResult<&BlockNode> {
        let mut node = self.node(hash)?;
        if height > node.height || height < 0 {
            return Err(ConsensusError::HeightOutOfRange {
                height,
                node_height: node.height,
            });
        }

        while node.height > height {
            node = match node.parent {
                Some(parent) => self.node(&parent)?,
                None => {
                    return Err(ConsensusError::assertion(format!(
                        "block {} has no parent above height {}",
                        node.hash, height
                    )))
                }
            };
        }
        Ok(node)
    }

    /// Ancestor `distance` blocks below `hash`
    pub fn relative_ancestor(
        &self,
        hash: &Hash,
        distance: BlockHeight,
    ) -> ConsensusResult<&BlockNode> {
        let node = self.node(hash)?;
        self.ancestor_at(hash, node.height - distance)
    }

    /// Drop a node that nothing was built on. Used to roll back a block
    /// whose stake data failed to connect.
    pub(crate) fn remove_leaf(&mut self, hash: &Hash) -> Option<BlockNode> {
        if *hash == self.genesis || self.nodes.values().any(|n| n.parent == Some(*hash)) {
            return None;
        }
        self.nodes.remove(hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockNode> {
        self.nodes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{child_header, genesis_header};
    use blockchain_core::pow::{TRIVIAL_TARGET_BITS, ZERO_TARGET_BITS};

    #[test]
    fn test_insert_and_walk() {
        let genesis = genesis_header();
        let mut index = ChainIndex::new(genesis.clone());
        assert_eq!(index.len(), 1);
        assert!(index.node(&index.genesis()).unwrap().is_genesis());

        let mut headers = vec![genesis];
        for i in 1..=6 {
            let bits = if i % 2 == 0 { TRIVIAL_TARGET_BITS } else { ZERO_TARGET_BITS };
            let header = child_header(headers.last().unwrap(), bits, i as u32);
            index.insert(header.clone(), vec![], vec![], vec![]).unwrap();
            headers.push(header);
        }

        let tip = headers[6].hash();
        let node = index.node(&tip).unwrap();
        assert_eq!(node.height, 6);
        assert_eq!(node.key_height, 3);
        assert!(!node.is_main_chain);
        assert!(node.stake_node.is_none());

        assert_eq!(index.ancestor_at(&tip, 2).unwrap().hash, headers[2].hash());
        assert_eq!(index.ancestor_at(&tip, 6).unwrap().hash, tip);
        assert_eq!(index.relative_ancestor(&tip, 6).unwrap().hash, index.genesis());
    }

    #[test]
    fn test_insert_errors() {
        let genesis = genesis_header();
        let mut index = ChainIndex::new(genesis.clone());

        let child = child_header(&genesis, TRIVIAL_TARGET_BITS, 1);
        index.insert(child.clone(), vec![], vec![], vec![]).unwrap();
        assert!(matches!(
            index.insert(child.clone(), vec![], vec![], vec![]),
            Err(ConsensusError::DuplicateBlock(_))
        ));

        let mut orphan = child_header(&child, TRIVIAL_TARGET_BITS, 2);
        orphan.prev_block = Hash::new([7u8; 32]);
        assert!(matches!(
            index.insert(orphan, vec![], vec![], vec![]),
            Err(ConsensusError::OrphanBlock { .. })
        ));

        let mut skipped = child_header(&child, TRIVIAL_TARGET_BITS, 3);
        skipped.height += 1;
        assert!(matches!(
            index.insert(skipped, vec![], vec![], vec![]),
            Err(ConsensusError::InvalidBlock(_))
        ));

        let hash = child.hash();
        assert!(matches!(
            index.ancestor_at(&hash, 2),
            Err(ConsensusError::HeightOutOfRange { height: 2, node_height: 1 })
        ));
        assert!(matches!(
            index.ancestor_at(&Hash::new([9u8; 32]), 0),
            Err(ConsensusError::BlockNotFound(_))
        ));
    }

    #[test]
    fn test_remove_leaf() {
        let genesis = genesis_header();
        let mut index = ChainIndex::new(genesis.clone());
        let a = child_header(&genesis, TRIVIAL_TARGET_BITS, 1);
        let b = child_header(&a, TRIVIAL_TARGET_BITS, 2);
        index.insert(a.clone(), vec![], vec![], vec![]).unwrap();
        index.insert(b.clone(), vec![], vec![], vec![]).unwrap();

        assert!(index.remove_leaf(&a.hash()).is_none());
        assert!(index.remove_leaf(&index.genesis()).is_none());
        assert!(index.remove_leaf(&b.hash()).is_some());
        assert!(index.remove_leaf(&a.hash()).is_some());
        assert_eq!(index.len(), 1);
    }
}
