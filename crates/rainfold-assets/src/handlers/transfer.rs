use bigdecimal::{BigDecimal, Signed, Zero};
use primitive_types::{H160, U256};
use rainfold_common::{address_hex, u256_to_bigdecimal};

use super::load_registry;
use crate::entities::{Asset, BalanceRecord, Holder};
use crate::error::ProjectionError;
use crate::events::{AssetEventBody, TransferBatch};
use crate::ids;
use crate::policy::{self, ListField};
use crate::store::EventTx;

/// Moves `value` units of `id` from `from` to `to`.
///
/// The receiver's holder and balance record are created on first receipt. A
/// zero-address sender is a mint and has no balance to decrement.
pub(super) fn apply_transfer(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    from: H160,
    to: H160,
    id: U256,
    value: U256,
) -> Result<(), ProjectionError> {
    let amount = u256_to_bigdecimal(value)
        .map_err(|e| ProjectionError::invalid(body.event.kind(), e.to_string()))?;

    let holder_id = credit(tx, body, to, id, &amount)?;

    if !from.is_zero() {
        debit(tx, body, from, id, &amount)?;
    }

    let mut registry = load_registry(tx, body)?;
    if policy::append(&mut registry.holders, ListField::RegistryHolders, &holder_id) {
        tx.put(&registry)?;
    }
    Ok(())
}

/// Applies each `(ids[i], values[i])` pair in ascending index order.
pub(super) fn transfer_batch(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    batch: &TransferBatch,
) -> Result<(), ProjectionError> {
    if batch.ids.len() != batch.values.len() {
        return Err(ProjectionError::malformed(
            "TransferBatch",
            format!("{} ids but {} values", batch.ids.len(), batch.values.len()),
        ));
    }

    for (id, value) in batch.ids.iter().zip(&batch.values) {
        apply_transfer(tx, body, batch.from, batch.to, *id, *value)?;
    }
    Ok(())
}

fn credit(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    to: H160,
    id: U256,
    amount: &BigDecimal,
) -> Result<String, ProjectionError> {
    let holder_id = ids::holder_id(body.contract, to);
    let balance_id = ids::balance_id(body.contract, to, id);

    let mut holder = tx.fetch::<Holder>(&holder_id)?.unwrap_or_else(|| Holder {
        id: holder_id.clone(),
        registry: ids::registry_id(body.contract),
        address: to,
        balances: Vec::new(),
    });

    let mut record = match tx.fetch::<BalanceRecord>(&balance_id)? {
        Some(record) => record,
        None => BalanceRecord {
            id: balance_id.clone(),
            holder: holder_id.clone(),
            asset: None,
            asset_id: id,
            count: BigDecimal::zero(),
        },
    };
    if record.asset.is_none() {
        let asset_id = ids::asset_id(body.contract, id);
        if tx.exists::<Asset>(&asset_id)? {
            record.asset = Some(asset_id);
        }
    }
    record.count += amount;
    tx.put(&record)?;

    // A new holder starts empty, so it is always written here.
    if policy::append(&mut holder.balances, ListField::HolderBalances, &balance_id) {
        tx.put(&holder)?;
    }

    Ok(holder_id)
}

fn debit(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    from: H160,
    id: U256,
    amount: &BigDecimal,
) -> Result<(), ProjectionError> {
    let balance_id = ids::balance_id(body.contract, from, id);
    let Some(mut record) = tx.fetch::<BalanceRecord>(&balance_id)? else {
        tracing::warn!(
            target: "rainfold_assets::handlers",
            event = %body.event.kind(),
            sender = %address_hex(from),
            asset_id = %id,
            position = %body.position,
            "Sender has no balance record, skipping the debit"
        );
        return Ok(());
    };

    record.count -= amount;
    if record.count.is_negative() {
        tracing::warn!(
            target: "rainfold_assets::handlers",
            balance = %balance_id,
            count = %record.count,
            position = %body.position,
            "Balance went negative"
        );
    }
    tx.put(&record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{addr, Harness, REGISTRY};
    use crate::entities::{BalanceRecord, EntityKind, Holder, Registry};
    use crate::events::{AssetEvent, TransferBatch, TransferSingle};
    use crate::family::ContractFamily;
    use crate::ids;
    use crate::store::{EntityStore, EntityStoreExt, MemoryStore};
    use bigdecimal::BigDecimal;
    use primitive_types::{H160, U256};

    fn single(from: H160, to: H160, id: u64, value: u64) -> AssetEvent {
        AssetEvent::TransferSingle(TransferSingle {
            operator: Some(from),
            from,
            to,
            id: U256::from(id),
            value: U256::from(value),
        })
    }

    fn count(store: &MemoryStore, holder: H160, id: u64) -> BigDecimal {
        store
            .fetch::<BalanceRecord>(&ids::balance_id(REGISTRY, holder, U256::from(id)))
            .unwrap()
            .map(|record| record.count)
            .unwrap_or_default()
    }

    fn total(store: &MemoryStore, holders: &[H160], id: u64) -> BigDecimal {
        holders.iter().map(|h| count(store, *h, id)).sum()
    }

    #[tokio::test]
    async fn test_mint_grows_supply() {
        let mut harness = Harness::new(ContractFamily::Rain1155);
        harness.init().await;
        harness
            .apply(single(H160::zero(), addr(0x0a), 1, 3))
            .await
            .unwrap();

        assert_eq!(count(&harness.store, addr(0x0a), 1), BigDecimal::from(3));
        assert_eq!(count(&harness.store, H160::zero(), 1), BigDecimal::from(0));
        let registry: Registry = harness
            .store
            .fetch(&ids::registry_id(REGISTRY))
            .unwrap()
            .unwrap();
        assert_eq!(registry.total_assets, 0);
        assert_eq!(registry.holders, vec![ids::holder_id(REGISTRY, addr(0x0a))]);
    }

    #[tokio::test]
    async fn test_transfers_conserve_balances() {
        let mut harness = Harness::new(ContractFamily::GameAssets);
        harness.init().await;
        let holders = [addr(0x0a), addr(0x0b), addr(0x0c)];
        harness
            .apply(single(H160::zero(), holders[0], 1, 10))
            .await
            .unwrap();

        let before = total(&harness.store, &holders, 1);
        for (from, to, value) in [(0, 1, 4), (1, 2, 1), (0, 2, 6), (2, 0, 2)] {
            harness
                .apply(single(holders[from], holders[to], 1, value))
                .await
                .unwrap();
            assert_eq!(total(&harness.store, &holders, 1), before);
        }

        assert_eq!(count(&harness.store, holders[0], 1), BigDecimal::from(2));
        assert_eq!(count(&harness.store, holders[1], 1), BigDecimal::from(3));
        assert_eq!(count(&harness.store, holders[2], 1), BigDecimal::from(5));
    }

    #[tokio::test]
    async fn test_holder_lists_are_sets() {
        let mut harness = Harness::new(ContractFamily::GameAssets);
        harness.init().await;
        for _ in 0..3 {
            harness
                .apply(single(H160::zero(), addr(0x0a), 1, 1))
                .await
                .unwrap();
        }

        let holder: Holder = harness
            .store
            .fetch(&ids::holder_id(REGISTRY, addr(0x0a)))
            .unwrap()
            .unwrap();
        assert_eq!(holder.balances.len(), 1);
        assert_eq!(holder.registry, ids::registry_id(REGISTRY));
        let registry: Registry = harness
            .store
            .fetch(&ids::registry_id(REGISTRY))
            .unwrap()
            .unwrap();
        assert_eq!(registry.holders.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_applies_pairs_in_order() {
        let mut harness = Harness::new(ContractFamily::Accessories);
        harness.init().await;
        harness
            .apply(AssetEvent::TransferBatch(TransferBatch {
                operator: None,
                from: H160::zero(),
                to: addr(0x0a),
                ids: vec![U256::from(1), U256::from(2), U256::from(1)],
                values: vec![U256::from(5), U256::from(7), U256::from(1)],
            }))
            .await
            .unwrap();

        assert_eq!(count(&harness.store, addr(0x0a), 1), BigDecimal::from(6));
        assert_eq!(count(&harness.store, addr(0x0a), 2), BigDecimal::from(7));

        let holder: Holder = harness
            .store
            .fetch(&ids::holder_id(REGISTRY, addr(0x0a)))
            .unwrap()
            .unwrap();
        assert_eq!(
            holder.balances,
            vec![
                ids::balance_id(REGISTRY, addr(0x0a), U256::from(1)),
                ids::balance_id(REGISTRY, addr(0x0a), U256::from(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_sender_is_not_debited() {
        let mut harness = Harness::new(ContractFamily::GameAssets);
        harness.init().await;
        harness
            .apply(single(addr(0x0b), addr(0x0a), 1, 2))
            .await
            .unwrap();

        assert_eq!(count(&harness.store, addr(0x0a), 1), BigDecimal::from(2));
        assert_eq!(harness.store.count(EntityKind::BalanceRecord).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_balance_links_to_existing_asset_only() {
        let mut harness = Harness::new(ContractFamily::Rain1155);
        harness.init().await;
        harness
            .apply(single(H160::zero(), addr(0x0a), 9, 1))
            .await
            .unwrap();

        let record: BalanceRecord = harness
            .store
            .fetch(&ids::balance_id(REGISTRY, addr(0x0a), U256::from(9)))
            .unwrap()
            .unwrap();
        assert_eq!(record.asset, None);
        assert_eq!(record.asset_id, U256::from(9));
        assert_eq!(record.holder, ids::holder_id(REGISTRY, addr(0x0a)));
    }

    #[tokio::test]
    async fn test_huge_values_keep_precision() {
        let mut harness = Harness::new(ContractFamily::Rain1155);
        harness.init().await;
        harness
            .apply(AssetEvent::TransferSingle(TransferSingle {
                operator: None,
                from: H160::zero(),
                to: addr(0x0a),
                id: U256::one(),
                value: U256::MAX,
            }))
            .await
            .unwrap();
        harness
            .apply(single(H160::zero(), addr(0x0a), 1, 1))
            .await
            .unwrap();

        let expected = U256::MAX.to_string().parse::<BigDecimal>().unwrap() + BigDecimal::from(1);
        assert_eq!(count(&harness.store, addr(0x0a), 1), expected);
    }
}
