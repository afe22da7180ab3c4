//! Missing-record and list-membership policies.
//!
//! Two tables drive every handler:
//!
//! * [`event_policy`]: which parent record an event needs and what happens
//!   when it is absent. A `Soft` miss drops the event; a `Hard` miss halts
//!   the projection. The same severities apply to an asset's class reference,
//!   which is hard by default. A sink reads them through a [`PolicyTable`].
//! * [`list_policy`]: whether a list-valued field is a set (no duplicates)
//!   or a multiset (append always).

use std::collections::HashMap;

use crate::entities::EntityKind;
use crate::events::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Drop the event and log at debug
    Soft,
    /// Fail the event
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// Registry rooted at the emitting contract
    Registry,
    /// Asset named by the event
    Asset,
}

impl Parent {
    pub fn kind(self) -> EntityKind {
        match self {
            Parent::Registry => EntityKind::Registry,
            Parent::Asset => EntityKind::Asset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPolicy {
    pub parent: Option<(Parent, Severity)>,
    /// Severity of an unresolved class reference, hard when unset
    pub class_reference: Option<Severity>,
}

impl EventPolicy {
    const fn root() -> Self {
        Self {
            parent: None,
            class_reference: None,
        }
    }

    const fn child_of(parent: Parent, severity: Severity) -> Self {
        Self {
            parent: Some((parent, severity)),
            class_reference: None,
        }
    }
}

pub fn event_policy(kind: EventKind) -> EventPolicy {
    match kind {
        // Creates its root when missing.
        EventKind::Initialize | EventKind::Implementation => EventPolicy::root(),
        // The spawned registry and its subscription never depend on the factory record.
        EventKind::NewChild => EventPolicy::root(),
        EventKind::AdminChanged
        | EventKind::BaseUriChanged
        | EventKind::OwnershipTransferred
        | EventKind::ClassCreated
        | EventKind::CreatorAdded
        | EventKind::CreatorRemoved
        | EventKind::TransferSingle
        | EventKind::TransferBatch => EventPolicy::child_of(Parent::Registry, Severity::Soft),
        EventKind::AssetCreated => EventPolicy {
            parent: Some((Parent::Registry, Severity::Soft)),
            class_reference: Some(Severity::Hard),
        },
        EventKind::AssetUpdated | EventKind::Uri => {
            EventPolicy::child_of(Parent::Asset, Severity::Soft)
        }
    }
}

/// Event policies in effect for one sink.
///
/// Defaults to [`event_policy`]. [`PolicyTable::strict`] turns every missing
/// parent into a hard failure, and [`PolicyTable::with_policy`] replaces the
/// policy of a single event outright.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    strict: bool,
    overrides: HashMap<EventKind, EventPolicy>,
}

impl PolicyTable {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, kind: EventKind, policy: EventPolicy) -> Self {
        self.overrides.insert(kind, policy);
        self
    }

    pub fn event(&self, kind: EventKind) -> EventPolicy {
        if let Some(policy) = self.overrides.get(&kind) {
            return *policy;
        }
        let mut policy = event_policy(kind);
        if self.strict {
            policy.parent = policy.parent.map(|(parent, _)| (parent, Severity::Hard));
        }
        policy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPolicy {
    Set,
    Multiset,
}

/// List-valued fields of the entity graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListField {
    RegistryAssets,
    RegistryHolders,
    RegistryClasses,
    RegistryCreators,
    FactoryChildren,
    CreatorAssets,
    HolderBalances,
    AssetCurrencies,
}

pub fn list_policy(field: ListField) -> ListPolicy {
    match field {
        // Payment options keep the listing order, repeats included.
        ListField::AssetCurrencies => ListPolicy::Multiset,
        ListField::RegistryAssets
        | ListField::RegistryHolders
        | ListField::RegistryClasses
        | ListField::RegistryCreators
        | ListField::FactoryChildren
        | ListField::CreatorAssets
        | ListField::HolderBalances => ListPolicy::Set,
    }
}

/// Appends `id` according to the field's policy. Returns whether it was added.
pub fn append(list: &mut Vec<String>, field: ListField, id: &str) -> bool {
    if list_policy(field) == ListPolicy::Set && list.iter().any(|existing| existing == id) {
        return false;
    }
    list.push(id.to_string());
    true
}
