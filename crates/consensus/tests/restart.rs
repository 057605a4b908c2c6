// consensus/tests/restart.rs

mod common;

use blockchain_core::ChainParams;
use common::*;
use consensus::{ConsensusCore, ConsensusError, CoreConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use storage::{DatabaseConfig, RocksDatabase, StorageError};
use tempfile::TempDir;

fn open_rocks(dir: &TempDir, params: ChainParams, retention: u64) -> Result<ConsensusCore<RocksDatabase>, ConsensusError> {
    let db = RocksDatabase::open(DatabaseConfig {
        path: dir.path().to_string_lossy().into_owned(),
        ..DatabaseConfig::default()
    })?;
    let config = CoreConfig {
        stake_node_retention: retention,
        ..CoreConfig::default()
    };
    ConsensusCore::open(params, config, db)
}

#[test]
fn test_restart_restores_tip_snapshot() {
    let dir = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let mut ticket_seed = 0u32;

    let (tip, snapshot, stake_version) = {
        let mut core = open_rocks(&dir, small_params(), 5).unwrap();
        for _ in 0..24 {
            let best = core.best_hash();
            let block = random_block(&mut core, &best, &mut rng, &mut ticket_seed);
            core.accept_block(block).unwrap();
        }
        // leave a side branch behind; it is not restored
        let fork = core.main_chain_hash(20).unwrap();
        let side = random_block(&mut core, &fork, &mut rng, &mut ticket_seed);
        core.accept_block(side).unwrap();

        let best = core.best_hash();
        let snapshot = core.best_stake_node().unwrap();
        let version = core.calc_stake_version(&best).unwrap();
        (best, (*snapshot).clone(), version)
    };

    let mut core = open_rocks(&dir, small_params(), 5).unwrap();
    assert_eq!(core.best_hash(), tip);
    assert_eq!(core.best_height(), 24);
    assert_eq!(*core.best_stake_node().unwrap(), snapshot);
    assert_eq!(core.calc_stake_version(&tip).unwrap(), stake_version);
    assert_eq!(core.index().len(), 25);

    // deep blocks were pruned after the replay and can still be walked to
    let deep = core.main_chain_hash(4).unwrap();
    assert!(core.index().node(&deep).unwrap().stake_node.is_none());
    assert_eq!(core.fetch_stake_node(&deep).unwrap().height(), 4);

    // the restored chain keeps growing
    let block = random_block(&mut core, &tip, &mut rng, &mut ticket_seed);
    assert!(core.accept_block(block).unwrap().is_main_chain);
}

#[test]
fn test_restart_rejects_other_network() {
    let dir = TempDir::new().unwrap();
    {
        let mut core = open_rocks(&dir, small_params(), 0).unwrap();
        let tip = core.tip().header.clone();
        core.accept_block(block(&tip, true, 1, vec![])).unwrap();
    }

    let mut other = small_params();
    other.genesis_timestamp += 1;
    assert!(matches!(
        open_rocks(&dir, other, 0),
        Err(ConsensusError::Storage(StorageError::Corruption(_)))
    ));
}
