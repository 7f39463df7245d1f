//! Output records and per-address ownership sets.
//!
//! Output records are append-only. Ownership is the only thing that moves:
//! credit adds an id to its owner's set (or to the void aggregate), debit
//! takes it away.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::invariant_violation;
use crate::runtime::error::IndexError;
use crate::runtime::ownership::OwnershipSet;
use crate::runtime::store::{KvRead, WriteTxn, keys};
use crate::types::{Address, Currency, OutputId};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OutputRecord {
    pub address: Address,
    pub value: Currency,
    pub maturity_height: u64,
}

pub fn get_output(r: &impl KvRead, id: &OutputId) -> Result<Option<OutputRecord>, IndexError> {
    r.get_decoded(&keys::output(id))
}

/// Record a new output. Ids are deterministic, so an output re-created by a
/// replayed transaction arrives again with the same owner and value; that is
/// accepted and the original record kept.
pub fn create_output(
    tx: &mut WriteTxn<'_>,
    id: &OutputId,
    address: Address,
    value: Currency,
    maturity_height: u64,
) -> Result<(), IndexError> {
    let key = keys::output(id);
    if let Some(existing) = tx.get_decoded::<OutputRecord>(&key)? {
        if existing.address != address || existing.value != value {
            invariant_violation!(
                "output {id} re-created with owner {address} value {value}, recorded as owner {} value {}",
                existing.address,
                existing.value
            );
        }
        return Ok(());
    }
    tx.put(&key, &OutputRecord { address, value, maturity_height })
}

pub fn credit(
    tx: &mut WriteTxn<'_>,
    address: &Address,
    id: &OutputId,
    value: Currency,
) -> Result<(), IndexError> {
    if address.is_void() {
        let void = void_balance(&*tx)?;
        let Some(next) = void.checked_add(value) else {
            invariant_violation!("void balance overflow crediting {id}");
        };
        return tx.put(keys::VOID_BALANCE, &next);
    }
    let key = keys::address(address);
    let mut set = load_set(&*tx, &key)?;
    if !set.insert(id) {
        invariant_violation!("output {id} credited twice to {address}");
    }
    store_set(tx, &key, set);
    Ok(())
}

pub fn debit(
    tx: &mut WriteTxn<'_>,
    address: &Address,
    id: &OutputId,
    value: Currency,
) -> Result<(), IndexError> {
    if address.is_void() {
        let void = void_balance(&*tx)?;
        let Some(next) = void.checked_sub(value) else {
            invariant_violation!("void balance underflow debiting {id}");
        };
        return tx.put(keys::VOID_BALANCE, &next);
    }
    let key = keys::address(address);
    let mut set = load_set(&*tx, &key)?;
    if !set.remove(id) {
        invariant_violation!("output {id} debited from {address}, which does not own it");
    }
    store_set(tx, &key, set);
    Ok(())
}

pub fn void_balance(r: &impl KvRead) -> Result<Currency, IndexError> {
    r.must_get(keys::VOID_BALANCE)
}

/// Ids currently owned by `address`, in set order. Always empty for the
/// void address.
pub fn owned_outputs(r: &impl KvRead, address: &Address) -> Result<Vec<OutputId>, IndexError> {
    if address.is_void() {
        return Ok(Vec::new());
    }
    Ok(load_set(r, &keys::address(address))?.ids().collect())
}

/// Owned outputs joined with their records.
pub fn owned_records(
    r: &impl KvRead,
    address: &Address,
) -> Result<Vec<(OutputId, OutputRecord)>, IndexError> {
    owned_outputs(r, address)?
        .into_iter()
        .map(|id| {
            let key = keys::output(&id);
            let rec = r.get_decoded(&key)?.ok_or_else(|| IndexError::missing(&key))?;
            Ok((id, rec))
        })
        .collect()
}

pub fn balance(r: &impl KvRead, address: &Address) -> Result<Currency, IndexError> {
    if address.is_void() {
        return void_balance(r);
    }
    let records = owned_records(r, address)?;
    match Currency::sum(records.iter().map(|(_, rec)| &rec.value)) {
        Some(total) => Ok(total),
        None => invariant_violation!("balance of {address} overflows"),
    }
}

fn load_set(r: &impl KvRead, key: &[u8]) -> Result<OwnershipSet, IndexError> {
    match r.get_raw(key)? {
        Some(bytes) => OwnershipSet::decode(bytes).map_err(|e| IndexError::corrupt(key, e)),
        None => Ok(OwnershipSet::default()),
    }
}

fn store_set(tx: &mut WriteTxn<'_>, key: &[u8], set: OwnershipSet) {
    match set.into_bytes() {
        Some(bytes) => tx.put_raw(key, bytes),
        None => tx.delete(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::store::IndexStore;
    use crate::types::BlockId;
    use tempfile::TempDir;

    fn open() -> (IndexStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), BlockId::ZERO).unwrap();
        (store, dir)
    }

    fn addr(n: u8) -> Address {
        Address([n; 32])
    }

    #[test]
    fn credit_and_debit_move_ownership() {
        let (store, _dir) = open();
        let o = OutputId([1; 32]);
        let mut tx = store.begin_write().unwrap();
        create_output(&mut tx, &o, addr(1), Currency::from(10), 0).unwrap();
        credit(&mut tx, &addr(1), &o, Currency::from(10)).unwrap();
        tx.commit().unwrap();

        let view = store.read().unwrap();
        assert_eq!(balance(&view, &addr(1)).unwrap(), Currency::from(10));
        drop(view);

        let mut tx = store.begin_write().unwrap();
        debit(&mut tx, &addr(1), &o, Currency::from(10)).unwrap();
        tx.commit().unwrap();

        let view = store.read().unwrap();
        assert_eq!(balance(&view, &addr(1)).unwrap(), Currency::ZERO);
        assert!(owned_outputs(&view, &addr(1)).unwrap().is_empty());
        // records outlive ownership
        assert_eq!(get_output(&view, &o).unwrap().unwrap().value, Currency::from(10));
        drop(view);
        assert!(store.dump().unwrap().iter().all(|(k, _)| !k.starts_with(keys::ADDRESS_PREFIX)));
    }

    #[test]
    fn void_is_an_aggregate() {
        let (store, _dir) = open();
        let mut tx = store.begin_write().unwrap();
        credit(&mut tx, &Address::VOID, &OutputId([1; 32]), Currency::from(4)).unwrap();
        credit(&mut tx, &Address::VOID, &OutputId([2; 32]), Currency::from(6)).unwrap();
        debit(&mut tx, &Address::VOID, &OutputId([1; 32]), Currency::from(4)).unwrap();
        tx.commit().unwrap();
        let view = store.read().unwrap();
        assert_eq!(balance(&view, &Address::VOID).unwrap(), Currency::from(6));
        assert!(owned_outputs(&view, &Address::VOID).unwrap().is_empty());
    }

    #[test]
    fn identical_recreation_is_accepted() {
        let (store, _dir) = open();
        let o = OutputId([1; 32]);
        let mut tx = store.begin_write().unwrap();
        create_output(&mut tx, &o, addr(1), Currency::from(3), 7).unwrap();
        create_output(&mut tx, &o, addr(1), Currency::from(3), 0).unwrap();
        assert_eq!(get_output(&tx, &o).unwrap().unwrap().maturity_height, 7);
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn conflicting_recreation_aborts() {
        let (store, _dir) = open();
        let o = OutputId([1; 32]);
        let mut tx = store.begin_write().unwrap();
        create_output(&mut tx, &o, addr(1), Currency::from(3), 0).unwrap();
        let _ = create_output(&mut tx, &o, addr(1), Currency::from(4), 0);
    }

    #[test]
    #[should_panic(expected = "credited twice")]
    fn double_credit_aborts() {
        let (store, _dir) = open();
        let o = OutputId([1; 32]);
        let mut tx = store.begin_write().unwrap();
        credit(&mut tx, &addr(1), &o, Currency::from(1)).unwrap();
        let _ = credit(&mut tx, &addr(1), &o, Currency::from(1));
    }

    #[test]
    #[should_panic(expected = "does not own it")]
    fn debit_of_unowned_aborts() {
        let (store, _dir) = open();
        let mut tx = store.begin_write().unwrap();
        let _ = debit(&mut tx, &addr(1), &OutputId([1; 32]), Currency::from(1));
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn void_underflow_aborts() {
        let (store, _dir) = open();
        let mut tx = store.begin_write().unwrap();
        let _ = debit(&mut tx, &Address::VOID, &OutputId([1; 32]), Currency::from(1));
    }
}
