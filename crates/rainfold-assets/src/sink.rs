//! Asset projection sink.
//!
//! Folds [`AssetEventBody`] envelopes into the entity store, one event at a
//! time. Each event's writes are committed in one store transaction together
//! with the event position, and events at or before the stored checkpoint are
//! skipped, so re-delivering a batch after a crash applies nothing twice.

use anyhow::{Context, Result};
use async_trait::async_trait;
use itertools::Itertools;
use rainfold::etl::{
    DataSource, Envelope, ExtractionBatch, Sink, SinkContext, SourceRegistry, TypeId,
};
use std::sync::Arc;

use crate::currency::CurrencyClassifier;
use crate::events::{AssetEvent, AssetEventBody, EventKind, ASSET_EVENT_TYPE};
use crate::handlers::{self, Outcome, SpawnedChild};
use crate::policy::PolicyTable;
use crate::store::{EntityStore, EventTx};

pub struct AssetSink {
    store: Arc<dyn EntityStore>,
    classifier: CurrencyClassifier,
    policies: PolicyTable,
    sources: Option<Arc<SourceRegistry>>,
}

impl AssetSink {
    pub fn new(store: Arc<dyn EntityStore>, classifier: CurrencyClassifier) -> Self {
        Self {
            store,
            classifier,
            policies: PolicyTable::default(),
            sources: None,
        }
    }

    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Applies one event and commits it. Returns what the handler did, or
    /// `None` when the event was already applied.
    pub async fn apply(&self, body: &AssetEventBody) -> Result<Option<Outcome>> {
        let checkpoint = self.store.checkpoint()?;
        if checkpoint.is_some_and(|applied| body.position <= applied) {
            metrics::counter!("rainfold_events_skipped_total", "reason" => "replayed").increment(1);
            tracing::debug!(
                target: "rainfold_assets::sink",
                position = %body.position,
                "Event already applied, skipping"
            );
            return Ok(None);
        }

        let kind = body.event.kind();
        let mut tx = EventTx::new(self.store.as_ref());
        let outcome = match handlers::apply(&mut tx, &self.classifier, &self.policies, body).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    target: "rainfold_assets::sink",
                    event = %kind,
                    contract = %rainfold_common::address_hex(body.contract),
                    position = %body.position,
                    error = %e,
                    "Failed to apply event"
                );
                return Err(e.into());
            }
        };

        let writes = tx.len();
        self.store
            .commit(tx.into_change_set(Some(body.position)))
            .with_context(|| format!("Failed to commit {kind} at {}", body.position))?;

        metrics::counter!("rainfold_assets_applied_total", "event" => kind.to_string())
            .increment(1);
        tracing::trace!(
            target: "rainfold_assets::sink",
            event = %kind,
            position = %body.position,
            writes,
            "Applied event"
        );

        Ok(Some(outcome))
    }

    /// Subscribes the engine to a registry spawned by a factory.
    async fn subscribe(&self, child: &SpawnedChild) -> Result<()> {
        let Some(sources) = &self.sources else {
            tracing::warn!(
                target: "rainfold_assets::sink",
                child = %rainfold_common::address_hex(child.address),
                "No source registry attached, spawned registry will not be routed"
            );
            return Ok(());
        };

        sources
            .register(DataSource::from_template(
                child.address,
                child.template,
                child.family.decoder_name(),
                child.block_number,
            ))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for AssetSink {
    fn name(&self) -> &str {
        "assets"
    }

    fn interested_types(&self) -> Vec<TypeId> {
        vec![TypeId::new(ASSET_EVENT_TYPE)]
    }

    async fn process(&self, envelopes: &[Envelope], _batch: &ExtractionBatch) -> Result<()> {
        let mut applied: Vec<EventKind> = Vec::new();

        for envelope in envelopes {
            let Some(body) = envelope.downcast_ref::<AssetEventBody>() else {
                continue;
            };

            match self.apply(body).await? {
                Some(Outcome::Spawned(child)) => {
                    self.subscribe(&child).await?;
                    applied.push(body.event.kind());
                }
                Some(Outcome::Applied) => applied.push(body.event.kind()),
                Some(Outcome::Dropped { .. }) => {}
                None => {
                    // Replayed factory events still need their child routed.
                    if let AssetEvent::NewChild { child, .. } = &body.event {
                        if let Some(spawned) = replayed_child(body, *child) {
                            self.subscribe(&spawned).await?;
                        }
                    }
                }
            }
        }

        if !applied.is_empty() {
            tracing::debug!(
                target: "rainfold_assets::sink",
                count = applied.len(),
                events = %applied
                    .iter()
                    .counts()
                    .into_iter()
                    .map(|(kind, n)| format!("{kind}={n}"))
                    .sorted()
                    .join(","),
                "Processed asset events"
            );
        }

        Ok(())
    }

    async fn initialize(&mut self, context: &SinkContext) -> Result<()> {
        self.sources = Some(context.sources.clone());
        let checkpoint = self.store.checkpoint()?;
        tracing::info!(
            target: "rainfold_assets::sink",
            checkpoint = ?checkpoint,
            "Asset sink initialized"
        );
        Ok(())
    }
}

fn replayed_child(body: &AssetEventBody, child: primitive_types::H160) -> Option<SpawnedChild> {
    Some(SpawnedChild {
        address: child,
        family: body.family.child_family()?,
        template: body.family.template_name()?,
        block_number: body.block_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{EntityKind, Registry};
    use crate::family::ContractFamily;
    use crate::ids;
    use crate::store::{EntityStoreExt, MemoryStore};
    use primitive_types::{H160, U256};
    use rainfold::etl::EventPosition;
    use rainfold_common::NoopIntrospector;

    const REGISTRY: H160 = H160([0xaa; 20]);

    fn sink() -> AssetSink {
        AssetSink::new(
            Arc::new(MemoryStore::new()),
            CurrencyClassifier::new(Arc::new(NoopIntrospector)),
        )
    }

    fn body(block: u64, contract: H160, family: ContractFamily, event: AssetEvent) -> AssetEventBody {
        AssetEventBody {
            contract,
            family,
            block_number: block,
            block_timestamp: block * 10,
            position: EventPosition::new(block, 0, 0),
            event,
        }
    }

    fn init(block: u64) -> AssetEventBody {
        body(
            block,
            REGISTRY,
            ContractFamily::Rain1155,
            AssetEvent::Initialize {
                owner: None,
                base_uri: None,
            },
        )
    }

    #[tokio::test]
    async fn test_replayed_event_is_skipped() {
        let sink = sink();
        let creator = |block| {
            body(
                block,
                REGISTRY,
                ContractFamily::GameAssets,
                AssetEvent::CreatorAdded {
                    creator: H160::repeat_byte(7),
                },
            )
        };

        assert!(sink.apply(&init(1)).await.unwrap().is_some());
        assert!(sink.apply(&creator(2)).await.unwrap().is_some());
        assert!(sink.apply(&creator(2)).await.unwrap().is_none());
        assert!(sink.apply(&init(1)).await.unwrap().is_none());

        assert_eq!(
            sink.store().checkpoint().unwrap(),
            Some(EventPosition::new(2, 0, 0))
        );
        assert_eq!(sink.store().count(EntityKind::Creator).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_event_commits_nothing() {
        let sink = sink();
        sink.apply(&init(1)).await.unwrap();

        let bad = body(
            2,
            REGISTRY,
            ContractFamily::GameAssets,
            AssetEvent::AssetCreated(Box::new(crate::events::AssetCreated {
                asset_id: U256::one(),
                name: String::new(),
                description: String::new(),
                loot_box_id: U256::zero(),
                class_id: Some(U256::from(4u64)),
                creator: H160::repeat_byte(1),
                rarity: U256::zero(),
                token_uri: String::new(),
                currencies: Vec::new(),
                currency_token_ids: None,
                price_script: Default::default(),
                eligibility_script: Default::default(),
            })),
        );
        assert!(sink.apply(&bad).await.is_err());
        assert_eq!(
            sink.store().checkpoint().unwrap(),
            Some(EventPosition::new(1, 0, 0))
        );
        assert_eq!(sink.store().count(EntityKind::Asset).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawned_child_is_subscribed_after_commit() {
        let mut sink = sink();
        let sources = Arc::new(SourceRegistry::in_memory());
        sink.initialize(&SinkContext {
            database_root: std::env::temp_dir(),
            sources: sources.clone(),
        })
        .await
        .unwrap();

        let child = H160::repeat_byte(0xc0);
        let spawn = body(
            5,
            H160::repeat_byte(0xfa),
            ContractFamily::GameAssetsFactory,
            AssetEvent::NewChild {
                sender: H160::repeat_byte(0x5e),
                child,
            },
        );
        let Some(Outcome::Spawned(spawned)) = sink.apply(&spawn).await.unwrap() else {
            panic!("expected a spawned child");
        };
        assert_eq!(replayed_child(&spawn, child), Some(spawned.clone()));
        sink.subscribe(&spawned).await.unwrap();

        let source = sources.get(child).await.unwrap();
        assert_eq!(source.decoder, "game_assets");
        assert_eq!(source.template.as_deref(), Some("GameAssetsTemplate"));
        assert_eq!(source.start_block, 5);
        assert!(sink
            .store()
            .fetch::<Registry>(&ids::registry_id(child))
            .unwrap()
            .is_some());
    }
}
