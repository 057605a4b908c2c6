// blockchain-core/src/transaction.rs

use crate::{types::*, BlockchainError, BlockchainResult};
use blockchain_crypto::{double_sha256, Hash};
use serde::{Deserialize, Serialize};

/// Reference to a previous transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    /// Value of the spent output, carried so fees can be computed without
    /// a utxo lookup
    pub value_in: Amount,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    pub script: Vec<u8>,
}

/// Vote payload: which ticket voted, on which block, and with which
/// stake version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteData {
    pub ticket: Hash,
    pub block_hash: Hash,
    pub block_height: BlockHeight,
    pub version: u32,
    pub bits: u16,
}

/// Transaction types supported by the protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    /// Ordinary value transfer
    Regular,
    /// Buys a ticket; its id becomes the ticket hash
    TicketPurchase,
    /// Spends a live ticket to vote on a block
    Vote(VoteData),
    /// Reclaims the funds of a missed ticket
    Revocation { ticket: Hash },
}

/// Stake classification used by the pool and by template ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeTxType {
    Regular,
    Vote,
    TicketPurchase,
    Revocation,
}

/// Complete transaction structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u16,
    pub tx_type: TransactionType,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
    pub expiry: u32,
}

impl Transaction {
    pub fn new(tx_type: TransactionType, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 1,
            tx_type,
            inputs,
            outputs,
            lock_time: 0,
            expiry: 0,
        }
    }

    /// Ticket purchase paying `price` out of an input worth `price + fee`
    pub fn ticket_purchase(funding: OutPoint, price: Amount, fee: Amount) -> Self {
        Self::new(
            TransactionType::TicketPurchase,
            vec![TxInput {
                previous_output: funding,
                value_in: price + fee,
                sequence: u32::MAX,
            }],
            vec![TxOutput { value: price, script: Vec::new() }],
        )
    }

    pub fn vote(data: VoteData) -> Self {
        let ticket = data.ticket;
        Self::new(
            TransactionType::Vote(data),
            vec![TxInput {
                previous_output: OutPoint { hash: ticket, index: 0 },
                value_in: Amount::ZERO,
                sequence: u32::MAX,
            }],
            Vec::new(),
        )
    }

    pub fn revocation(ticket: Hash) -> Self {
        Self::new(
            TransactionType::Revocation { ticket },
            vec![TxInput {
                previous_output: OutPoint { hash: ticket, index: 0 },
                value_in: Amount::ZERO,
                sequence: u32::MAX,
            }],
            Vec::new(),
        )
    }

    fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    /// Transaction id
    pub fn hash(&self) -> Hash {
        double_sha256(&self.encode())
    }

    /// Encoded size in bytes
    pub fn serialize_size(&self) -> usize {
        bincode::serialized_size(self).map(|n| n as usize).unwrap_or(0)
    }

    pub fn stake_type(&self) -> StakeTxType {
        match &self.tx_type {
            TransactionType::Regular => StakeTxType::Regular,
            TransactionType::TicketPurchase => StakeTxType::TicketPurchase,
            TransactionType::Vote(_) => StakeTxType::Vote,
            TransactionType::Revocation { .. } => StakeTxType::Revocation,
        }
    }

    pub fn is_stake(&self) -> bool {
        self.stake_type() != StakeTxType::Regular
    }

    pub fn vote_data(&self) -> Option<&VoteData> {
        match &self.tx_type {
            TransactionType::Vote(data) => Some(data),
            _ => None,
        }
    }

    /// Ticket spent by a vote or revocation
    pub fn spent_ticket(&self) -> Option<Hash> {
        match &self.tx_type {
            TransactionType::Vote(data) => Some(data.ticket),
            TransactionType::Revocation { ticket } => Some(*ticket),
            _ => None,
        }
    }

    pub fn total_in(&self) -> Amount {
        self.inputs.iter().map(|i| i.value_in).sum()
    }

    pub fn total_out(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Inputs minus outputs. Votes and revocations pay no fee.
    pub fn fee(&self) -> Amount {
        self.total_in().saturating_sub(&self.total_out())
    }

    /// Structural checks for stake transactions
    pub fn validate_basic(&self) -> BlockchainResult<()> {
        match &self.tx_type {
            TransactionType::TicketPurchase => {
                if self.outputs.is_empty() || self.total_out().is_zero() {
                    return Err(BlockchainError::InvalidTransaction(
                        "ticket purchase must commit a non-zero price".into(),
                    ));
                }
            }
            TransactionType::Vote(data) => {
                if data.ticket.is_zero() || data.block_hash.is_zero() {
                    return Err(BlockchainError::InvalidTransaction(
                        "vote must reference a ticket and a block".into(),
                    ));
                }
            }
            TransactionType::Revocation { ticket } => {
                if ticket.is_zero() {
                    return Err(BlockchainError::InvalidTransaction(
                        "revocation must reference a ticket".into(),
                    ));
                }
            }
            TransactionType::Regular => {
                if self.inputs.is_empty() && self.outputs.is_empty() {
                    return Err(BlockchainError::InvalidTransaction(
                        "empty transaction".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}
