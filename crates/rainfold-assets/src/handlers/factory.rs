use primitive_types::H160;
use rainfold_common::address_hex;

use super::SpawnedChild;
use crate::entities::{Factory, Registry};
use crate::error::ProjectionError;
use crate::events::{AssetEventBody, EventKind};
use crate::ids;
use crate::policy::{self, ListField};
use crate::store::EventTx;

pub(super) fn implementation(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    implementation: H160,
) -> Result<(), ProjectionError> {
    let id = ids::factory_id(body.contract);
    let mut factory = tx.fetch::<Factory>(&id)?.unwrap_or_else(|| Factory {
        id: id.clone(),
        family: body.family,
        implementation,
        children: Vec::new(),
    });
    factory.implementation = implementation;
    tx.put(&factory)?;
    Ok(())
}

/// Seeds the child registry and links it to the factory.
///
/// The registry shell is written in this event's overlay, so it is committed
/// before the caller subscribes to the child's events.
pub(super) fn new_child(
    tx: &mut EventTx<'_>,
    body: &AssetEventBody,
    sender: H160,
    child: H160,
) -> Result<SpawnedChild, ProjectionError> {
    let (Some(family), Some(template)) = (body.family.child_family(), body.family.template_name())
    else {
        return Err(ProjectionError::invalid(
            EventKind::NewChild,
            format!("{} does not spawn registries", body.family),
        ));
    };

    let registry_id = ids::registry_id(child);
    if tx.exists::<Registry>(&registry_id)? {
        tracing::warn!(
            target: "rainfold_assets::handlers",
            child = %registry_id,
            "Spawned registry already exists, keeping it"
        );
    } else {
        let mut registry = Registry::new(
            registry_id.clone(),
            family,
            body.block_number,
            body.block_timestamp,
        );
        registry.owner = sender;
        tx.put(&registry)?;
    }

    let factory_id = ids::factory_id(body.contract);
    match tx.fetch::<Factory>(&factory_id)? {
        Some(mut factory) => {
            if policy::append(&mut factory.children, ListField::FactoryChildren, &registry_id) {
                tx.put(&factory)?;
            }
        }
        None => {
            tracing::warn!(
                target: "rainfold_assets::handlers",
                factory = %factory_id,
                child = %registry_id,
                "Factory has no record yet, child not linked"
            );
        }
    }

    tracing::info!(
        target: "rainfold_assets::handlers",
        factory = %address_hex(body.contract),
        child = %registry_id,
        family = %family,
        block = body.block_number,
        "Registry spawned"
    );

    Ok(SpawnedChild {
        address: child,
        family,
        template,
        block_number: body.block_number,
    })
}
