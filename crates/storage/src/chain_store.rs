// storage/src/chain_store.rs

//! Typed access to the chain buckets.
//!
//! Values are bincode encoded. Heights are keyed big-endian so the main
//! chain index iterates in height order.

use crate::db::{Bucket, ReadTx, WriteTx};
use crate::{StorageError, StorageResult};
use blockchain_core::{Block, BlockHeight};
use blockchain_crypto::Hash;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use stake::UndoTicketData;

const BEST_STATE_KEY: &[u8] = b"best_state";

/// Summary of the main chain tip, written with every tip change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestState {
    pub hash: Hash,
    pub height: BlockHeight,
    pub key_height: BlockHeight,
    pub pool_size: u32,
    pub stake_version: u32,
}

fn encode<T: Serialize + ?Sized>(value: &T) -> StorageResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    bincode::deserialize(bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn get_decoded<T: DeserializeOwned>(
    tx: &dyn ReadTx,
    bucket: Bucket,
    key: &[u8],
) -> StorageResult<Option<T>> {
    match tx.get(bucket, key)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn height_key(height: BlockHeight) -> [u8; 8] {
    (height as u64).to_be_bytes()
}

pub fn put_block(tx: &mut dyn WriteTx, block: &Block) -> StorageResult<()> {
    tx.put(Bucket::Blocks, block.hash().as_bytes(), &encode(block)?)
}

pub fn get_block(tx: &dyn ReadTx, hash: &Hash) -> StorageResult<Option<Block>> {
    get_decoded(tx, Bucket::Blocks, hash.as_bytes())
}

pub fn delete_block(tx: &mut dyn WriteTx, hash: &Hash) -> StorageResult<()> {
    tx.delete(Bucket::Blocks, hash.as_bytes())
}

pub fn put_stake_undo(
    tx: &mut dyn WriteTx,
    hash: &Hash,
    undo: &[UndoTicketData],
) -> StorageResult<()> {
    tx.put(Bucket::StakeUndo, hash.as_bytes(), &encode(undo)?)
}

pub fn get_stake_undo(tx: &dyn ReadTx, hash: &Hash) -> StorageResult<Option<Vec<UndoTicketData>>> {
    get_decoded(tx, Bucket::StakeUndo, hash.as_bytes())
}

pub fn put_new_tickets(tx: &mut dyn WriteTx, hash: &Hash, tickets: &[Hash]) -> StorageResult<()> {
    tx.put(Bucket::NewTickets, hash.as_bytes(), &encode(tickets)?)
}

pub fn get_new_tickets(tx: &dyn ReadTx, hash: &Hash) -> StorageResult<Option<Vec<Hash>>> {
    get_decoded(tx, Bucket::NewTickets, hash.as_bytes())
}

pub fn put_main_chain_hash(
    tx: &mut dyn WriteTx,
    height: BlockHeight,
    hash: &Hash,
) -> StorageResult<()> {
    tx.put(Bucket::MainChain, &height_key(height), hash.as_bytes())
}

pub fn delete_main_chain_hash(tx: &mut dyn WriteTx, height: BlockHeight) -> StorageResult<()> {
    tx.delete(Bucket::MainChain, &height_key(height))
}

pub fn get_main_chain_hash(tx: &dyn ReadTx, height: BlockHeight) -> StorageResult<Option<Hash>> {
    match tx.get(Bucket::MainChain, &height_key(height))? {
        Some(bytes) => Hash::from_slice(&bytes)
            .map(Some)
            .map_err(|_| StorageError::Corruption(format!("bad main chain hash at {}", height))),
        None => Ok(None),
    }
}

pub fn put_best_state(tx: &mut dyn WriteTx, state: &BestState) -> StorageResult<()> {
    tx.put(Bucket::Meta, BEST_STATE_KEY, &encode(state)?)
}

pub fn get_best_state(tx: &dyn ReadTx) -> StorageResult<Option<BestState>> {
    get_decoded(tx, Bucket::Meta, BEST_STATE_KEY)
}
