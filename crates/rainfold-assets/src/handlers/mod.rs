//! Event handlers.
//!
//! [`apply`] checks the event against the sink's [`PolicyTable`], then hands
//! it to the handler for its type. Handlers only touch the [`EventTx`] they are given;
//! the caller commits it.

mod asset;
mod factory;
mod registry;
mod transfer;

use primitive_types::H160;

use crate::currency::CurrencyClassifier;
use crate::entities::{EntityKind, Registry};
use crate::error::ProjectionError;
use crate::events::{AssetEvent, AssetEventBody};
use crate::family::ContractFamily;
use crate::ids;
use crate::policy::{Parent, PolicyTable, Severity};
use crate::store::EventTx;

/// A registry contract announced by a factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedChild {
    pub address: H160,
    pub family: ContractFamily,
    pub template: &'static str,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Dropped under a soft policy because a record it needs is missing
    Dropped { parent: EntityKind, id: String },
    /// Applied, and a new contract must be subscribed
    Spawned(SpawnedChild),
}

/// Applies one event to the overlay.
pub async fn apply(
    tx: &mut EventTx<'_>,
    classifier: &CurrencyClassifier,
    policies: &PolicyTable,
    body: &AssetEventBody,
) -> Result<Outcome, ProjectionError> {
    let kind = body.event.kind();
    let policy = policies.event(kind);

    if let Some((parent, severity)) = policy.parent {
        let id = parent_id(parent, body)
            .ok_or_else(|| ProjectionError::invalid(kind, "event names no parent record"))?;
        if !tx.exists_kind(parent.kind(), &id)? {
            match severity {
                Severity::Soft => {
                    tracing::debug!(
                        target: "rainfold_assets::handlers",
                        event = %kind,
                        parent = %parent.kind(),
                        id = %id,
                        position = %body.position,
                        "Parent record missing, dropping event"
                    );
                    return Ok(Outcome::Dropped {
                        parent: parent.kind(),
                        id,
                    });
                }
                Severity::Hard => {
                    return Err(ProjectionError::MissingParent {
                        event: kind,
                        kind: parent.kind(),
                        id,
                    });
                }
            }
        }
    }

    match &body.event {
        AssetEvent::Initialize { owner, base_uri } => {
            registry::initialize(tx, body, *owner, base_uri.as_deref())?;
        }
        AssetEvent::AdminChanged { admin } => {
            registry::update(tx, body, |registry| registry.admin = *admin)?;
        }
        AssetEvent::BaseUriChanged { base_uri } => {
            registry::update(tx, body, |registry| registry.base_uri.clone_from(base_uri))?;
        }
        AssetEvent::OwnershipTransferred { new_owner } => {
            registry::update(tx, body, |registry| registry.owner = *new_owner)?;
        }
        AssetEvent::ClassCreated(created) => registry::class_created(tx, body, created)?,
        AssetEvent::CreatorAdded { creator } => registry::creator_added(tx, body, *creator)?,
        AssetEvent::CreatorRemoved { creator } => registry::creator_removed(tx, body, *creator)?,
        AssetEvent::AssetCreated(created) => {
            let severity = policy.class_reference.unwrap_or(Severity::Hard);
            return asset::asset_created(tx, classifier, severity, body, created).await;
        }
        AssetEvent::AssetUpdated(updated) => asset::asset_updated(tx, body, updated)?,
        AssetEvent::Uri { id, value } => asset::uri_changed(tx, body, *id, value)?,
        AssetEvent::TransferSingle(transfer) => {
            transfer::apply_transfer(tx, body, transfer.from, transfer.to, transfer.id, transfer.value)?;
        }
        AssetEvent::TransferBatch(batch) => transfer::transfer_batch(tx, body, batch)?,
        AssetEvent::Implementation { implementation } => {
            factory::implementation(tx, body, *implementation)?;
        }
        AssetEvent::NewChild { sender, child } => {
            return factory::new_child(tx, body, *sender, *child).map(Outcome::Spawned);
        }
    }

    Ok(Outcome::Applied)
}

fn parent_id(parent: Parent, body: &AssetEventBody) -> Option<String> {
    match parent {
        Parent::Registry => Some(ids::registry_id(body.contract)),
        Parent::Asset => match &body.event {
            AssetEvent::AssetUpdated(updated) => Some(ids::asset_id(body.contract, updated.asset_id)),
            AssetEvent::Uri { id, .. } => Some(ids::asset_id(body.contract, *id)),
            _ => None,
        },
    }
}

/// Registry of the emitting contract, which the policy check already found.
fn load_registry(tx: &EventTx<'_>, body: &AssetEventBody) -> Result<Registry, ProjectionError> {
    let id = ids::registry_id(body.contract);
    tx.fetch::<Registry>(&id)?.ok_or_else(|| {
        ProjectionError::invalid(body.event.kind(), format!("registry '{id}' vanished"))
    })
}
