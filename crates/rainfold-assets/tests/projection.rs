use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use primitive_types::{H160, U256};
use rainfold::etl::{DataSource, EngineDb, EngineDbConfig, EventPosition, ReplayExtractor};
use rainfold::RainfoldConfig;
use rainfold_assets::{
    ids, Asset, AssetSink, AssetsDecoder, BalanceRecord, Class, ContractFamily, Currency,
    CurrencyClassifier, EntityKind, EntityStore, EntityStoreExt, Factory, Registry, SqliteStore,
    TokenStandard,
};
use rainfold_common::{parse_address, NoopIntrospector, TokenIntrospector};
use serde_json::{json, Value};

const REGISTRY: &str = "0x00000000000000000000000000000000000000aa";
const RAIN1155: &str = "0x00000000000000000000000000000000000000bb";
const FACTORY: &str = "0x00000000000000000000000000000000000000fa";
const CHILD: &str = "0x00000000000000000000000000000000000000c0";
const USDT: &str = "0x00000000000000000000000000000000000000d7";
const ZERO: &str = "0x0000000000000000000000000000000000000000";
const X: &str = "0x0000000000000000000000000000000000000001";
const Y: &str = "0x0000000000000000000000000000000000000002";
const Z: &str = "0x0000000000000000000000000000000000000003";

/// Fungible-only introspector that counts every probe.
#[derive(Default)]
struct CountingIntrospector {
    calls: AtomicUsize,
}

impl CountingIntrospector {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn probe(&self, token: H160) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token != addr(USDT) {
            bail!("execution reverted");
        }
        Ok(())
    }
}

#[async_trait]
impl TokenIntrospector for CountingIntrospector {
    async fn supports_interface(&self, token: H160, _interface_id: [u8; 4]) -> Result<bool> {
        self.probe(token)?;
        Ok(false)
    }

    async fn name(&self, token: H160) -> Result<String> {
        self.probe(token)?;
        Ok("Tether USD".to_string())
    }

    async fn symbol(&self, token: H160) -> Result<String> {
        self.probe(token)?;
        Ok("USDT".to_string())
    }

    async fn decimals(&self, token: H160) -> Result<u8> {
        self.probe(token)?;
        Ok(6)
    }

    async fn uri(&self, token: H160, _id: U256) -> Result<String> {
        self.probe(token)?;
        bail!("no uri")
    }
}

fn addr(hex: &str) -> H160 {
    parse_address(hex).unwrap()
}

fn event(address: &str, name: &str, block: u64, log: u64, params: Value) -> Value {
    json!({
        "address": address,
        "event": name,
        "params": params,
        "blockNumber": block,
        "blockTimestamp": 1_700_000_000 + block,
        "transactionIndex": 0,
        "logIndex": log,
    })
}

fn script(constant: u64) -> Value {
    json!({ "constants": [constant.to_string()], "sources": ["0x01"], "stackLength": 1, "argumentsLength": 0 })
}

fn game_assets_setup() -> Vec<Value> {
    vec![
        event(
            REGISTRY,
            "Initialize",
            1,
            0,
            json!({ "config": { "_creator": X, "_baseURI": "ipfs://registry/" } }),
        ),
        event(
            REGISTRY,
            "ClassCreated",
            2,
            0,
            json!({ "_classId": 1, "_name": "Car", "_description": "desc", "_attributes": ["Car", "desc"] }),
        ),
        event(
            REGISTRY,
            "AssetCreated",
            3,
            0,
            json!({
                "_assetId": 1,
                "_asset": { "lootBoxId": 0, "assetClass": 1, "creator": X, "rarity": 1, "currencies": [USDT] },
                "_priceConfig": script(10),
                "_canMintConfig": script(1),
            }),
        ),
    ]
}

fn transfer(block: u64, from: &str, to: &str, id: u64, value: u64) -> Value {
    event(
        REGISTRY,
        "TransferSingle",
        block,
        0,
        json!({ "operator": X, "from": from, "to": to, "id": id, "value": value.to_string() }),
    )
}

async fn run_pipeline(
    root: &Path,
    store: Arc<SqliteStore>,
    introspector: Arc<dyn TokenIntrospector>,
    sources: Vec<DataSource>,
    events: Vec<Value>,
) -> Result<()> {
    let events_path = root.join("events.json");
    std::fs::write(&events_path, serde_json::to_string(&json!({ "events": events }))?)?;

    let sink = AssetSink::new(store, CurrencyClassifier::new(introspector));
    let mut builder = RainfoldConfig::builder()
        .database_root(root)
        .with_decoders(AssetsDecoder::all())
        .add_sink_boxed(Box::new(sink))
        .with_extractor(Box::new(ReplayExtractor::from_json_file(&events_path, 2)?))
        .cycle_interval(0);
    for source in sources {
        builder = builder.add_data_source(source);
    }

    rainfold::run(builder.build()).await
}

fn balance(store: &SqliteStore, registry: &str, holder: &str, id: u64) -> BigDecimal {
    store
        .fetch::<BalanceRecord>(&ids::balance_id(addr(registry), addr(holder), U256::from(id)))
        .unwrap()
        .map(|record| record.count)
        .unwrap_or_default()
}

fn registry(store: &SqliteStore, address: &str) -> Registry {
    store
        .fetch::<Registry>(&ids::registry_id(addr(address)))
        .unwrap()
        .unwrap()
}

fn game_assets_source() -> DataSource {
    DataSource::static_source(addr(REGISTRY), ContractFamily::GameAssets.decoder_name(), 0)
}

#[tokio::test]
async fn test_end_to_end_scenario_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("assets.db")).unwrap());

    let mut events = game_assets_setup();
    events.push(transfer(4, ZERO, Y, 1, 3));
    events.push(transfer(5, Y, Z, 1, 1));
    // Emitted by the registry without a projection, and by an unwatched contract.
    events.push(event(REGISTRY, "Snapshot", 5, 1, json!({ "id": 1 })));
    events.push(event(USDT, "Transfer", 5, 2, json!({})));

    run_pipeline(
        dir.path(),
        store.clone(),
        Arc::new(CountingIntrospector::default()),
        vec![game_assets_source()],
        events,
    )
    .await
    .unwrap();

    let root = registry(&store, REGISTRY);
    assert_eq!(root.total_assets, 1);
    assert_eq!(root.base_uri, "ipfs://registry/");
    assert_eq!(root.owner, addr(X));
    assert_eq!(balance(&store, REGISTRY, Y, 1), BigDecimal::from(2));
    assert_eq!(balance(&store, REGISTRY, Z, 1), BigDecimal::from(1));
    assert!(root.holders.contains(&ids::holder_id(addr(REGISTRY), addr(Y))));
    assert!(root.holders.contains(&ids::holder_id(addr(REGISTRY), addr(Z))));

    let asset: Asset = store
        .fetch(&ids::asset_id(addr(REGISTRY), U256::one()))
        .unwrap()
        .unwrap();
    let class: Class = store.fetch(asset.class.as_deref().unwrap()).unwrap().unwrap();
    assert_eq!(class.class_id, U256::one());
    assert_eq!(class.attributes, vec!["Car".to_string(), "desc".to_string()]);

    let record: BalanceRecord = store
        .fetch(&ids::balance_id(addr(REGISTRY), addr(Y), U256::one()))
        .unwrap()
        .unwrap();
    assert_eq!(record.asset.as_deref(), Some(asset.id.as_str()));

    assert_eq!(store.checkpoint().unwrap(), Some(EventPosition::new(5, 0, 0)));
}

#[tokio::test]
async fn test_currency_classification_is_probed_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("assets.db")).unwrap());
    let introspector = Arc::new(CountingIntrospector::default());

    let mut events = game_assets_setup();
    events.push(event(
        REGISTRY,
        "AssetCreated",
        4,
        0,
        json!({
            "_assetId": 2,
            "_asset": { "assetClass": 1, "creator": X, "currencies": [USDT] },
        }),
    ));
    events.push(event(RAIN1155, "Initialize", 5, 0, json!({ "config_": {} })));
    events.push(event(
        RAIN1155,
        "AssetCreated",
        6,
        0,
        json!({
            "assetId_": 1,
            "name_": "Sword",
            "description_": "Sharp",
            "asset_": {
                "recipient": Y,
                "tokenURI": "ipfs://sword",
                "currencies": { "token": [USDT], "tokenId": [] },
                "vmStateConfig": script(5),
            },
        }),
    ));

    run_pipeline(
        dir.path(),
        store.clone(),
        introspector.clone(),
        vec![
            game_assets_source(),
            DataSource::static_source(addr(RAIN1155), ContractFamily::Rain1155.decoder_name(), 0),
        ],
        events,
    )
    .await
    .unwrap();

    // supportsInterface, name, symbol, decimals: once for the whole run.
    assert_eq!(introspector.calls(), 4);
    assert_eq!(store.count(EntityKind::TokenStandard).unwrap(), 1);

    let first: Asset = store
        .fetch(&ids::asset_id(addr(REGISTRY), U256::one()))
        .unwrap()
        .unwrap();
    let second: Asset = store
        .fetch(&ids::asset_id(addr(REGISTRY), U256::from(2)))
        .unwrap()
        .unwrap();
    assert_eq!(first.currencies, second.currencies);

    let sword: Asset = store
        .fetch(&ids::asset_id(addr(RAIN1155), U256::one()))
        .unwrap()
        .unwrap();
    assert_eq!(sword.creator, addr(Y));
    assert_eq!(sword.class, None);
    assert_ne!(sword.currencies, first.currencies);

    let currency: Currency = store.fetch(&sword.currencies[0]).unwrap().unwrap();
    assert_eq!(currency.standard, TokenStandard::Fungible);
    assert_eq!(currency.symbol.as_deref(), Some("USDT"));
    assert_eq!(currency.registry, ids::registry_id(addr(RAIN1155)));
}

fn factory_events() -> Vec<Value> {
    vec![
        event(FACTORY, "Implementation", 1, 0, json!({ "implementation": X })),
        // Before the child exists nothing routes its events.
        event(CHILD, "ClassCreated", 2, 0, json!({ "_classId": 1, "_name": "Early" })),
        event(FACTORY, "NewChild", 3, 0, json!({ "sender": X, "child": CHILD })),
        event(
            CHILD,
            "Initialize",
            3,
            1,
            json!({ "config": { "_creator": X, "_baseURI": "ipfs://child/" } }),
        ),
        event(CHILD, "ClassCreated", 4, 0, json!({ "_classId": 2, "_name": "Hat" })),
        event(
            CHILD,
            "TransferBatch",
            5,
            0,
            json!({ "operator": X, "from": ZERO, "to": Y, "ids": [1, 2], "values": ["4", "5"] }),
        ),
    ]
}

fn factory_source() -> DataSource {
    DataSource::static_source(
        addr(FACTORY),
        ContractFamily::GameAssetsFactory.decoder_name(),
        0,
    )
}

#[tokio::test]
async fn test_factory_spawn_routes_child_events() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("assets.db")).unwrap());

    run_pipeline(
        dir.path(),
        store.clone(),
        Arc::new(NoopIntrospector),
        vec![factory_source()],
        factory_events(),
    )
    .await
    .unwrap();

    let factory: Factory = store
        .fetch(&ids::factory_id(addr(FACTORY)))
        .unwrap()
        .unwrap();
    assert_eq!(factory.implementation, addr(X));
    assert_eq!(factory.children, vec![ids::registry_id(addr(CHILD))]);

    let child = registry(&store, CHILD);
    assert_eq!(child.family, ContractFamily::GameAssets);
    assert_eq!(child.deploy_block, 3);
    assert_eq!(child.base_uri, "ipfs://child/");
    assert_eq!(child.classes, vec![ids::class_id(addr(CHILD), U256::from(2))]);

    assert_eq!(balance(&store, CHILD, Y, 1), BigDecimal::from(4));
    assert_eq!(balance(&store, CHILD, Y, 2), BigDecimal::from(5));

    let engine_db = EngineDb::new(EngineDbConfig {
        path: dir.path().join("engine.db").to_string_lossy().to_string(),
    })
    .await
    .unwrap();
    let spawned = engine_db
        .get_data_sources()
        .await
        .unwrap()
        .into_iter()
        .find(|source| source.address == addr(CHILD))
        .unwrap();
    assert_eq!(spawned.decoder, "game_assets");
    assert_eq!(spawned.template.as_deref(), Some("GameAssetsTemplate"));
    assert_eq!(spawned.start_block, 3);
}

#[tokio::test]
async fn test_redelivered_events_are_not_applied_twice() {
    let first_root = tempfile::tempdir().unwrap();
    let second_root = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(first_root.path().join("assets.db")).unwrap());

    run_pipeline(
        first_root.path(),
        store.clone(),
        Arc::new(NoopIntrospector),
        vec![factory_source()],
        factory_events(),
    )
    .await
    .unwrap();

    // A fresh engine database re-delivers everything, plus one new transfer.
    let mut events = factory_events();
    events.push(event(
        CHILD,
        "TransferSingle",
        6,
        0,
        json!({ "operator": Y, "from": Y, "to": Z, "id": 1, "value": 1 }),
    ));
    run_pipeline(
        second_root.path(),
        store.clone(),
        Arc::new(NoopIntrospector),
        vec![factory_source()],
        events,
    )
    .await
    .unwrap();

    assert_eq!(balance(&store, CHILD, Y, 1), BigDecimal::from(3));
    assert_eq!(balance(&store, CHILD, Z, 1), BigDecimal::from(1));
    assert_eq!(balance(&store, CHILD, Y, 2), BigDecimal::from(5));

    let factory: Factory = store
        .fetch(&ids::factory_id(addr(FACTORY)))
        .unwrap()
        .unwrap();
    assert_eq!(factory.children.len(), 1);
    assert_eq!(store.checkpoint().unwrap(), Some(EventPosition::new(6, 0, 0)));
}

#[tokio::test]
async fn test_dangling_class_halts_without_partial_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("assets.db")).unwrap());

    let events = vec![
        event(
            REGISTRY,
            "Initialize",
            1,
            0,
            json!({ "config": { "_creator": X } }),
        ),
        event(
            REGISTRY,
            "AssetCreated",
            2,
            0,
            json!({
                "_assetId": 1,
                "_asset": { "assetClass": 7, "creator": X, "currencies": [USDT] },
            }),
        ),
        transfer(3, ZERO, Y, 1, 1),
    ];

    let result = run_pipeline(
        dir.path(),
        store.clone(),
        Arc::new(CountingIntrospector::default()),
        vec![game_assets_source()],
        events,
    )
    .await;
    assert!(result.is_err());

    assert_eq!(store.checkpoint().unwrap(), Some(EventPosition::new(1, 0, 0)));
    assert_eq!(store.count(EntityKind::Asset).unwrap(), 0);
    assert_eq!(store.count(EntityKind::PriceScript).unwrap(), 0);
    assert_eq!(store.count(EntityKind::BalanceRecord).unwrap(), 0);
    assert_eq!(registry(&store, REGISTRY).total_assets, 0);
}

#[tokio::test]
async fn test_malformed_event_halts_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("assets.db")).unwrap());

    let events = vec![
        event(REGISTRY, "Initialize", 1, 0, json!({ "config": {} })),
        event(
            REGISTRY,
            "TransferBatch",
            2,
            0,
            json!({ "operator": X, "from": ZERO, "to": Y, "ids": [1, 2], "values": [1] }),
        ),
    ];

    let result = run_pipeline(
        dir.path(),
        store.clone(),
        Arc::new(NoopIntrospector),
        vec![game_assets_source()],
        events,
    )
    .await;
    assert!(result.is_err());
    assert_eq!(store.count(EntityKind::BalanceRecord).unwrap(), 0);
}
