use primitive_types::U256;

use super::{load_registry, Outcome};
use crate::currency::CurrencyClassifier;
use crate::entities::{Asset, Class, Creator, EligibilityScript, EntityKind, PriceScript};
use crate::error::ProjectionError;
use crate::events::{AssetCreated, AssetEventBody, AssetUpdated};
use crate::ids;
use crate::policy::{self, ListField, Severity};
use crate::store::EventTx;

/// Creates the asset. `class_reference` decides what an unknown class does:
/// a hard miss fails the event, a soft one drops it.
pub(super) async fn asset_created(
    tx: &mut EventTx<'_>,
    classifier: &CurrencyClassifier,
    class_reference: Severity,
    body: &AssetEventBody,
    created: &AssetCreated,
) -> Result<Outcome, ProjectionError> {
    let id = ids::asset_id(body.contract, created.asset_id);

    let class = match created.class_id {
        Some(class_id) => {
            let class = ids::class_id(body.contract, class_id);
            if !tx.exists::<Class>(&class)? {
                match class_reference {
                    Severity::Hard => {
                        return Err(ProjectionError::DanglingClass { asset: id, class });
                    }
                    Severity::Soft => {
                        tracing::debug!(
                            target: "rainfold_assets::handlers",
                            asset = %id,
                            class = %class,
                            position = %body.position,
                            "Class missing, dropping asset"
                        );
                        return Ok(Outcome::Dropped {
                            parent: EntityKind::Class,
                            id: class,
                        });
                    }
                }
            }
            Some(class)
        }
        None => None,
    };

    if tx.exists::<Asset>(&id)? {
        tracing::warn!(
            target: "rainfold_assets::handlers",
            asset = %id,
            position = %body.position,
            "Asset created twice, replacing the earlier record"
        );
    }

    let currencies = resolve_currencies(tx, classifier, body, created).await?;

    let script_id = ids::script_id(body.contract, created.asset_id);
    tx.put(&PriceScript::snapshot(script_id.clone(), &created.price_script))?;
    tx.put(&EligibilityScript::snapshot(
        script_id.clone(),
        &created.eligibility_script,
    ))?;

    tx.put(&Asset {
        id: id.clone(),
        registry: ids::registry_id(body.contract),
        asset_id: created.asset_id,
        name: created.name.clone(),
        description: created.description.clone(),
        loot_box_id: created.loot_box_id,
        creator: created.creator,
        rarity: created.rarity,
        class,
        creation_block: body.block_number,
        creation_timestamp: body.block_timestamp,
        token_uri: created.token_uri.clone(),
        currencies,
        price_script: script_id.clone(),
        eligibility_script: script_id,
    })?;

    let mut registry = load_registry(tx, body)?;
    policy::append(&mut registry.assets, ListField::RegistryAssets, &id);
    registry.total_assets = registry.assets.len() as u64;
    tx.put(&registry)?;

    let creator_id = ids::creator_id(body.contract, created.creator);
    if let Some(mut creator) = tx.fetch::<Creator>(&creator_id)? {
        if policy::append(&mut creator.assets_created, ListField::CreatorAssets, &id) {
            tx.put(&creator)?;
        }
    }

    Ok(Outcome::Applied)
}

/// Classifies every listed token and returns the currency ids in listing order.
///
/// A `tokenId` list as long as the token list is index-aligned with it. A
/// shorter list holds only the ids of token-id currencies, consumed in order.
async fn resolve_currencies(
    tx: &mut EventTx<'_>,
    classifier: &CurrencyClassifier,
    body: &AssetEventBody,
    created: &AssetCreated,
) -> Result<Vec<String>, ProjectionError> {
    let aligned = created
        .currency_token_ids
        .as_ref()
        .filter(|list| list.len() == created.currencies.len());
    let mut remaining = match aligned {
        Some(_) => None,
        None => created.currency_token_ids.as_ref().map(|list| list.iter()),
    };
    let mut currencies = Vec::with_capacity(created.currencies.len());

    for (index, token) in created.currencies.iter().enumerate() {
        let standard = classifier.classify(tx, *token).await?;

        let token_id = if !standard.standard.has_token_id() {
            U256::zero()
        } else if let Some(list) = aligned {
            list[index]
        } else if let Some(remaining) = remaining.as_mut() {
            *remaining.next().ok_or_else(|| {
                ProjectionError::malformed(
                    "AssetCreated",
                    format!("currency {index} needs a token id but the list is exhausted"),
                )
            })?
        } else {
            U256::zero()
        };

        let currency = classifier
            .currency(tx, body.contract, &standard, token_id)
            .await?;
        policy::append(&mut currencies, ListField::AssetCurrencies, &currency.id);
    }

    Ok(currencies)
}

/// Replaces the loot box and the eligibility snapshot wholesale. The snapshot
/// keeps its key, so the previous one is overwritten rather than orphaned.
pub(super) fn asset_updated(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    updated: &AssetUpdated,
) -> Result<(), ProjectionError> {
    let id = ids::asset_id(body.contract, updated.asset_id);
    let mut asset = load_asset(tx, body, &id)?;

    if let Some(loot_box_id) = updated.loot_box_id {
        asset.loot_box_id = loot_box_id;
    }
    if let Some(script) = &updated.eligibility_script {
        tx.put(&EligibilityScript::snapshot(
            asset.eligibility_script.clone(),
            script,
        ))?;
    }

    tx.put(&asset)?;
    Ok(())
}

pub(super) fn uri_changed(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    asset_id: U256,
    value: &str,
) -> Result<(), ProjectionError> {
    let id = ids::asset_id(body.contract, asset_id);
    let mut asset = load_asset(tx, body, &id)?;
    asset.token_uri = value.to_string();
    tx.put(&asset)?;
    Ok(())
}

fn load_asset(tx: &EventTx<'_>, body: &AssetEventBody, id: &str) -> Result<Asset, ProjectionError> {
    tx.fetch::<Asset>(id)?.ok_or_else(|| {
        ProjectionError::invalid(body.event.kind(), format!("asset '{id}' vanished"))
    })
}
