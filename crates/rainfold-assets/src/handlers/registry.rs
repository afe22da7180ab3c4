use primitive_types::H160;
use rainfold_common::address_hex;

use super::load_registry;
use crate::entities::{Class, Creator, Registry};
use crate::error::ProjectionError;
use crate::events::{AssetEventBody, ClassCreated};
use crate::ids;
use crate::policy::{self, ListField};
use crate::store::EventTx;

/// Creates the registry root, or refreshes owner and base URI of one that a
/// factory already seeded. Counters and lists are never reset.
pub(super) fn initialize(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    owner: Option<H160>,
    base_uri: Option<&str>,
) -> Result<(), ProjectionError> {
    let id = ids::registry_id(body.contract);
    let mut registry = match tx.fetch::<Registry>(&id)? {
        Some(existing) => existing,
        None => Registry::new(id, body.family, body.block_number, body.block_timestamp),
    };

    if let Some(owner) = owner {
        registry.owner = owner;
    }
    if let Some(base_uri) = base_uri {
        registry.base_uri = base_uri.to_string();
    }

    tx.put(&registry)?;
    Ok(())
}

pub(super) fn update(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    change: impl FnOnce(&mut Registry),
) -> Result<(), ProjectionError> {
    let mut registry = load_registry(tx, body)?;
    change(&mut registry);
    tx.put(&registry)?;
    Ok(())
}

pub(super) fn class_created(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    created: &ClassCreated,
) -> Result<(), ProjectionError> {
    let id = ids::class_id(body.contract, created.class_id);

    if tx.exists::<Class>(&id)? {
        tracing::warn!(
            target: "rainfold_assets::handlers",
            class = %id,
            "Class already exists, keeping the first definition"
        );
    } else {
        tx.put(&Class {
            id: id.clone(),
            class_id: created.class_id,
            name: created.name.clone(),
            description: created.description.clone(),
            attributes: created.attributes.clone(),
        })?;
    }

    let mut registry = load_registry(tx, body)?;
    if policy::append(&mut registry.classes, ListField::RegistryClasses, &id) {
        tx.put(&registry)?;
    }
    Ok(())
}

pub(super) fn creator_added(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    address: H160,
) -> Result<(), ProjectionError> {
    let id = ids::creator_id(body.contract, address);

    // A re-added creator keeps the assets it already created.
    if !tx.exists::<Creator>(&id)? {
        tx.put(&Creator {
            id: id.clone(),
            address,
            assets_created: Vec::new(),
        })?;
    }

    let mut registry = load_registry(tx, body)?;
    if policy::append(&mut registry.creators, ListField::RegistryCreators, &id) {
        tx.put(&registry)?;
    }
    Ok(())
}

/// Filters the creator out of the registry's list by address and deletes its record.
pub(super) fn creator_removed(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    address: H160,
) -> Result<(), ProjectionError> {
    let mut registry = load_registry(tx, body)?;

    let mut kept = Vec::with_capacity(registry.creators.len());
    for creator_id in &registry.creators {
        match tx.fetch::<Creator>(creator_id)? {
            Some(creator) if creator.address != address => kept.push(creator_id.clone()),
            Some(_) => {}
            None => {
                tracing::warn!(
                    target: "rainfold_assets::handlers",
                    creator = %creator_id,
                    "Creator listed on registry has no record, dropping it from the list"
                );
            }
        }
    }
    registry.creators = kept;
    tx.put(&registry)?;

    let id = ids::creator_id(body.contract, address);
    if !tx.exists::<Creator>(&id)? {
        tracing::debug!(
            target: "rainfold_assets::handlers",
            creator = %address_hex(address),
            registry = %registry.id,
            "Removed creator was never added"
        );
    }
    tx.remove::<Creator>(&id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{addr, Harness, REGISTRY};
    use crate::entities::{Class, Creator, EntityKind, Registry};
    use crate::events::{AssetEvent, ClassCreated};
    use crate::family::ContractFamily;
    use crate::ids;
    use crate::store::{EntityStore, EntityStoreExt};
    use primitive_types::U256;

    #[tokio::test]
    async fn test_initialize_creates_empty_root() {
        let mut harness = Harness::new(ContractFamily::Rain1155);
        harness.init().await;

        let registry: Registry = harness
            .store
            .fetch(&ids::registry_id(REGISTRY))
            .unwrap()
            .unwrap();
        assert_eq!(registry.family, ContractFamily::Rain1155);
        assert_eq!(registry.total_assets, 0);
        assert_eq!(registry.deploy_block, 1);
        assert_eq!(registry.deploy_timestamp, 1_001);
        assert_eq!(registry.owner, addr(0x01));
        assert!(registry.assets.is_empty() && registry.holders.is_empty());
    }

    #[tokio::test]
    async fn test_second_initialize_keeps_lists() {
        let mut harness = Harness::new(ContractFamily::GameAssets);
        harness.init().await;
        harness
            .apply(AssetEvent::CreatorAdded { creator: addr(7) })
            .await
            .unwrap();
        harness
            .apply(AssetEvent::Initialize {
                owner: Some(addr(0x02)),
                base_uri: None,
            })
            .await
            .unwrap();

        let registry: Registry = harness
            .store
            .fetch(&ids::registry_id(REGISTRY))
            .unwrap()
            .unwrap();
        assert_eq!(registry.owner, addr(0x02));
        assert_eq!(registry.base_uri, "ipfs://base/");
        assert_eq!(registry.creators.len(), 1);
        assert_eq!(registry.deploy_block, 1);
    }

    #[tokio::test]
    async fn test_admin_base_uri_and_owner_updates() {
        let mut harness = Harness::new(ContractFamily::Accessories);
        harness.init().await;
        harness
            .apply(AssetEvent::AdminChanged { admin: addr(0x0a) })
            .await
            .unwrap();
        harness
            .apply(AssetEvent::BaseUriChanged {
                base_uri: "ipfs://new/".to_string(),
            })
            .await
            .unwrap();
        harness
            .apply(AssetEvent::OwnershipTransferred { new_owner: addr(0x0b) })
            .await
            .unwrap();

        let registry: Registry = harness
            .store
            .fetch(&ids::registry_id(REGISTRY))
            .unwrap()
            .unwrap();
        assert_eq!(registry.admin, addr(0x0a));
        assert_eq!(registry.base_uri, "ipfs://new/");
        assert_eq!(registry.owner, addr(0x0b));
    }

    #[tokio::test]
    async fn test_class_created_is_listed_once() {
        let mut harness = Harness::new(ContractFamily::GameAssets);
        harness.init().await;
        let created = ClassCreated {
            class_id: U256::from(1),
            name: "Car".to_string(),
            description: "desc".to_string(),
            attributes: vec!["speed".to_string()],
        };
        harness
            .apply(AssetEvent::ClassCreated(created.clone()))
            .await
            .unwrap();
        harness
            .apply(AssetEvent::ClassCreated(ClassCreated {
                name: "Boat".to_string(),
                ..created
            }))
            .await
            .unwrap();

        let class: Class = harness
            .store
            .fetch(&ids::class_id(REGISTRY, U256::from(1)))
            .unwrap()
            .unwrap();
        assert_eq!(class.name, "Car");
        let registry: Registry = harness
            .store
            .fetch(&ids::registry_id(REGISTRY))
            .unwrap()
            .unwrap();
        assert_eq!(registry.classes, vec![class.id]);
    }

    #[tokio::test]
    async fn test_creator_removal_is_precise() {
        let mut harness = Harness::new(ContractFamily::GameAssets);
        harness.init().await;
        for creator in [addr(0x0a), addr(0x0b), addr(0x0c)] {
            harness
                .apply(AssetEvent::CreatorAdded { creator })
                .await
                .unwrap();
        }
        harness
            .apply(AssetEvent::CreatorRemoved { creator: addr(0x0b) })
            .await
            .unwrap();

        let registry: Registry = harness
            .store
            .fetch(&ids::registry_id(REGISTRY))
            .unwrap()
            .unwrap();
        assert_eq!(
            registry.creators,
            vec![
                ids::creator_id(REGISTRY, addr(0x0a)),
                ids::creator_id(REGISTRY, addr(0x0c)),
            ]
        );
        assert!(harness
            .store
            .fetch::<Creator>(&ids::creator_id(REGISTRY, addr(0x0b)))
            .unwrap()
            .is_none());
        assert_eq!(harness.store.count(EntityKind::Creator).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_creator_add_is_deduplicated() {
        let mut harness = Harness::new(ContractFamily::GameAssets);
        harness.init().await;
        for _ in 0..2 {
            harness
                .apply(AssetEvent::CreatorAdded { creator: addr(0x0a) })
                .await
                .unwrap();
        }

        let registry: Registry = harness
            .store
            .fetch(&ids::registry_id(REGISTRY))
            .unwrap()
            .unwrap();
        assert_eq!(registry.creators.len(), 1);
    }
}
