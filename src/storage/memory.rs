//! In-memory node store.
//!
//! This module provides a thread-safe in-memory implementation of `NodeStore`.
//! It plays the hosting server in tests and embedded use: it knows the standard
//! condition types, type-checks field writes, emits condition events to
//! subscribers, and runs two-state transition handlers before flipping a
//! variable to true.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::dispatch::{TransitionKind, ALL_TRANSITIONS};
use crate::node_id::{NodeId, ObjectId, ObjectTypeId, QualifiedName, ReferenceTypeId};
use crate::session::SessionId;
use crate::value::{LocalizedText, Variant, VariantKind};

use super::event::{ConditionEvent, EventId};
use super::stream::EventStream;
use super::traits::{CreateConditionRequest, NodeStore, StoreError, TwoStateHandler};

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct NodeStoreConfig {
    /// Namespaces served; requested ids must use an index below this.
    pub namespace_count: u16,
    /// Namespace for server-assigned ids.
    pub default_namespace: u16,
    /// Emitted events retained for inspection.
    pub event_log_capacity: usize,
    /// Per-subscription stream buffer capacity.
    pub stream_capacity: usize,
}

impl Default for NodeStoreConfig {
    fn default() -> Self {
        Self {
            namespace_count: 2,
            default_namespace: 1,
            event_log_capacity: 1024,
            stream_capacity: 1024,
        }
    }
}

/// A directed reference between two nodes.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub from: NodeId,
    pub reference_type: NodeId,
    pub to: NodeId,
}

struct FieldSpec {
    name: &'static str,
    kind: VariantKind,
}

const CONDITION_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "SourceNode", kind: VariantKind::NodeId },
    FieldSpec { name: "SourceName", kind: VariantKind::String },
    FieldSpec { name: "ConditionName", kind: VariantKind::String },
    FieldSpec { name: "Message", kind: VariantKind::LocalizedText },
    FieldSpec { name: "Severity", kind: VariantKind::UInt16 },
    FieldSpec { name: "Time", kind: VariantKind::DateTime },
    FieldSpec { name: "Retain", kind: VariantKind::Boolean },
    FieldSpec { name: "Comment", kind: VariantKind::LocalizedText },
];

const TWO_STATE_PROPERTIES: &[FieldSpec] = &[
    FieldSpec { name: "Id", kind: VariantKind::Boolean },
    FieldSpec { name: "TransitionTime", kind: VariantKind::DateTime },
];

const KNOWN_REFERENCE_TYPES: [NodeId; 6] = [
    ReferenceTypeId::ORGANIZES,
    ReferenceTypeId::HAS_EVENT_SOURCE,
    ReferenceTypeId::HAS_PROPERTY,
    ReferenceTypeId::HAS_COMPONENT,
    ReferenceTypeId::HAS_NOTIFIER,
    ReferenceTypeId::HAS_CONDITION,
];

/// Two-state variables carried by each supported condition type.
fn transitions_for(condition_type: &NodeId) -> Option<&'static [TransitionKind]> {
    const CONDITION: &[TransitionKind] = &[TransitionKind::Enabled];
    const ACKNOWLEDGEABLE: &[TransitionKind] = &[
        TransitionKind::Enabled,
        TransitionKind::Acked,
        TransitionKind::Confirmed,
    ];

    if *condition_type == ObjectTypeId::CONDITION_TYPE {
        Some(CONDITION)
    } else if *condition_type == ObjectTypeId::ACKNOWLEDGEABLE_CONDITION_TYPE {
        Some(ACKNOWLEDGEABLE)
    } else if *condition_type == ObjectTypeId::ALARM_CONDITION_TYPE
        || *condition_type == ObjectTypeId::DISCRETE_ALARM_TYPE
        || *condition_type == ObjectTypeId::OFF_NORMAL_ALARM_TYPE
    {
        Some(&ALL_TRANSITIONS)
    } else {
        None
    }
}

fn is_reference_type(id: &NodeId) -> bool {
    KNOWN_REFERENCE_TYPES.contains(id)
}

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Backend(format!("poisoned lock: {context}"))
}

fn lookup<'a>(specs: &'a [FieldSpec], name: &QualifiedName) -> Option<&'a FieldSpec> {
    if name.namespace != 0 {
        return None;
    }
    specs.iter().find(|s| s.name == name.name)
}

fn check_kind(path: &str, expected: VariantKind, value: &Variant) -> Result<(), StoreError> {
    if value.kind() == expected {
        Ok(())
    } else {
        Err(StoreError::TypeMismatch {
            field: path.to_string(),
            expected,
            actual: value.kind(),
        })
    }
}

#[derive(Clone)]
struct HandlerRegistration {
    source: NodeId,
    remove_branch: bool,
    handler: Arc<dyn TwoStateHandler>,
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("source", &self.source)
            .field("remove_branch", &self.remove_branch)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct ConditionRecord {
    source: NodeId,
    transitions: &'static [TransitionKind],
    fields: BTreeMap<&'static str, Variant>,
    variables: BTreeMap<&'static str, BTreeMap<&'static str, Variant>>,
    handlers: HashMap<TransitionKind, HandlerRegistration>,
}

impl ConditionRecord {
    fn new(
        source: NodeId,
        source_name: String,
        browse_name: &QualifiedName,
        transitions: &'static [TransitionKind],
    ) -> Self {
        let mut fields: BTreeMap<&'static str, Variant> =
            CONDITION_FIELDS.iter().map(|s| (s.name, Variant::Null)).collect();
        fields.insert("SourceNode", Variant::NodeId(source.clone()));
        fields.insert("SourceName", Variant::String(source_name));
        fields.insert("ConditionName", Variant::String(browse_name.name.clone()));
        fields.insert("Retain", Variant::Boolean(false));

        let variables = transitions
            .iter()
            .map(|kind| {
                let mut props = BTreeMap::new();
                props.insert("Id", Variant::Boolean(false));
                props.insert("TransitionTime", Variant::Null);
                (kind.variable(), props)
            })
            .collect();

        Self {
            source,
            transitions,
            fields,
            variables,
            handlers: HashMap::new(),
        }
    }

    fn variable(&self, name: &QualifiedName) -> Option<&'static str> {
        if name.namespace != 0 {
            return None;
        }
        self.transitions
            .iter()
            .map(|k| k.variable())
            .find(|v| *v == name.name)
    }

    fn two_state_id(&self, kind: TransitionKind) -> bool {
        self.variables
            .get(kind.variable())
            .and_then(|props| props.get("Id"))
            .and_then(Variant::as_bool)
            .unwrap_or(false)
    }

    fn set_two_state_id(&mut self, kind: TransitionKind, value: bool, at: DateTime<Utc>) {
        let props = self.variables.entry(kind.variable()).or_default();
        props.insert("Id", Variant::Boolean(value));
        props.insert("TransitionTime", Variant::DateTime(at));
    }

    fn snapshot(&self) -> BTreeMap<String, Variant> {
        let mut out: BTreeMap<String, Variant> = self
            .fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        for (var, props) in &self.variables {
            for (prop, v) in props {
                out.insert(format!("{var}/{prop}"), v.clone());
            }
        }
        out
    }
}

#[derive(Debug)]
struct NodeRecord {
    browse_name: QualifiedName,
    event_notifier: bool,
    condition: Option<ConditionRecord>,
}

impl NodeRecord {
    fn object(browse_name: QualifiedName) -> Self {
        Self {
            browse_name,
            event_notifier: false,
            condition: None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    nodes: HashMap<NodeId, NodeRecord>,
    references: Vec<Reference>,
    next_numeric: u32,
    /// Transitions whose handler is currently running.
    pending: HashSet<(NodeId, TransitionKind)>,
}

impl StoreState {
    fn assign_id(&mut self, namespace: u16) -> NodeId {
        loop {
            self.next_numeric = self.next_numeric.wrapping_add(1).max(1);
            let id = NodeId::numeric(namespace, self.next_numeric);
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    fn condition(&self, id: &NodeId) -> Result<&ConditionRecord, StoreError> {
        self.nodes
            .get(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?
            .condition
            .as_ref()
            .ok_or_else(|| StoreError::NotACondition(id.clone()))
    }

    fn condition_mut(&mut self, id: &NodeId) -> Result<&mut ConditionRecord, StoreError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?
            .condition
            .as_mut()
            .ok_or_else(|| StoreError::NotACondition(id.clone()))
    }

    /// A notifier may emit for a condition if it is the condition's source or
    /// references that source via HasNotifier/HasEventSource.
    fn notifies(&self, notifier: &NodeId, condition_source: &NodeId) -> bool {
        if notifier == condition_source {
            return true;
        }
        self.references.iter().any(|r| {
            r.from == *notifier
                && r.to == *condition_source
                && (r.reference_type == ReferenceTypeId::HAS_NOTIFIER
                    || r.reference_type == ReferenceTypeId::HAS_EVENT_SOURCE)
        })
    }
}

/// Marks a transition as in progress until dropped.
struct PendingTransition<'a> {
    store: &'a InMemoryNodeStore,
    key: (NodeId, TransitionKind),
}

impl Drop for PendingTransition<'_> {
    fn drop(&mut self) {
        let mut state = self.store.state.write().unwrap_or_else(PoisonError::into_inner);
        state.pending.remove(&self.key);
    }
}

/// Thread-safe in-memory node store.
pub struct InMemoryNodeStore {
    cfg: NodeStoreConfig,
    state: RwLock<StoreState>,
    events: Mutex<VecDeque<ConditionEvent>>,
    subscribers: Mutex<Vec<Sender<ConditionEvent>>>,
    dropped_events: AtomicU64,
}

impl fmt::Debug for InMemoryNodeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryNodeStore")
            .field("cfg", &self.cfg)
            .field("dropped_events", &self.dropped_events)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNodeStore {
    /// Create a store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(NodeStoreConfig::default())
    }

    /// Create a store containing the Objects folder and the Server object.
    ///
    /// The Server object is an event notifier.
    #[must_use]
    pub fn with_config(cfg: NodeStoreConfig) -> Self {
        let mut state = StoreState::default();
        state
            .nodes
            .insert(ObjectId::OBJECTS_FOLDER, NodeRecord::object("Objects".into()));
        let mut server = NodeRecord::object("Server".into());
        server.event_notifier = true;
        state.nodes.insert(ObjectId::SERVER, server);
        state.references.push(Reference {
            from: ObjectId::OBJECTS_FOLDER,
            reference_type: ReferenceTypeId::ORGANIZES,
            to: ObjectId::SERVER,
        });

        Self {
            cfg,
            state: RwLock::new(state),
            events: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(Vec::new()),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Add a plain object below the Objects folder.
    ///
    /// # Errors
    /// `StoreError::Backend` if the store lock is poisoned.
    pub fn add_object(&self, browse_name: impl Into<QualifiedName>) -> Result<NodeId, StoreError> {
        let browse_name = browse_name.into();
        let mut state = self.state.write().map_err(|_| lock_err("add_object"))?;
        let id = state.assign_id(self.cfg.default_namespace);
        state.nodes.insert(id.clone(), NodeRecord::object(browse_name));
        state.references.push(Reference {
            from: ObjectId::OBJECTS_FOLDER,
            reference_type: ReferenceTypeId::ORGANIZES,
            to: id.clone(),
        });
        Ok(id)
    }

    /// Mark a node as able (or unable) to emit events.
    ///
    /// # Errors
    /// `StoreError::NodeNotFound` if `id` does not exist.
    pub fn set_event_notifier(&self, id: &NodeId, notifier: bool) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("set_event_notifier"))?;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        node.event_notifier = notifier;
        Ok(())
    }

    /// Add a reference between two existing nodes.
    ///
    /// # Errors
    /// `StoreError::InvalidReferenceType` for an unknown reference type, or
    /// `StoreError::NodeNotFound` if either end does not exist.
    pub fn add_reference(
        &self,
        from: &NodeId,
        reference_type: &NodeId,
        to: &NodeId,
    ) -> Result<(), StoreError> {
        if !is_reference_type(reference_type) {
            return Err(StoreError::InvalidReferenceType(reference_type.clone()));
        }
        let mut state = self.state.write().map_err(|_| lock_err("add_reference"))?;
        for id in [from, to] {
            if !state.nodes.contains_key(id) {
                return Err(StoreError::NodeNotFound(id.clone()));
            }
        }
        state.references.push(Reference {
            from: from.clone(),
            reference_type: reference_type.clone(),
            to: to.clone(),
        });
        Ok(())
    }

    /// References whose origin is `id`.
    ///
    /// # Errors
    /// `StoreError::Backend` if the store lock is poisoned.
    pub fn references_from(&self, id: &NodeId) -> Result<Vec<Reference>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("references_from"))?;
        Ok(state.references.iter().filter(|r| r.from == *id).cloned().collect())
    }

    /// References whose target is `id`.
    ///
    /// # Errors
    /// `StoreError::Backend` if the store lock is poisoned.
    pub fn references_to(&self, id: &NodeId) -> Result<Vec<Reference>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("references_to"))?;
        Ok(state.references.iter().filter(|r| r.to == *id).cloned().collect())
    }

    /// Returns true if a node with this id exists.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.state
            .read()
            .map(|state| state.nodes.contains_key(id))
            .unwrap_or(false)
    }

    /// Retained emitted events, oldest first.
    ///
    /// # Errors
    /// `StoreError::Backend` if the event log lock is poisoned.
    pub fn events(&self) -> Result<Vec<ConditionEvent>, StoreError> {
        let events = self.events.lock().map_err(|_| lock_err("events"))?;
        Ok(events.iter().cloned().collect())
    }

    /// Subscribe to events emitted after this call.
    ///
    /// # Errors
    /// `StoreError::Backend` if the subscriber list lock is poisoned.
    pub fn subscribe(&self) -> Result<EventStream, StoreError> {
        let (tx, rx) = bounded(self.cfg.stream_capacity.max(1));
        self.subscribers
            .lock()
            .map_err(|_| lock_err("subscribe"))?
            .push(tx);
        Ok(EventStream::new(rx))
    }

    /// Events dropped because a subscriber's buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Drive a two-state variable of `condition` to true, as a client method
    /// call (Enable, Acknowledge, Confirm) or a server activation would.
    ///
    /// The registered handler runs first; a non-good status aborts the
    /// transition. Otherwise `<Variable>/Id` becomes true and an event is
    /// emitted through the handler's source (or the condition source when no
    /// handler is registered).
    ///
    /// # Errors
    /// - `AlreadyInState`: the variable is already true, or another call is
    ///   already driving it; the handler is not run
    /// - `Rejected`: the handler returned a non-good status
    /// - `TransitionNotSupported`: the condition type has no such variable
    pub fn enter_two_state(
        &self,
        session: Option<&SessionId>,
        condition: &NodeId,
        kind: TransitionKind,
    ) -> Result<EventId, StoreError> {
        let (registration, condition_source, _pending) = {
            let mut state = self.state.write().map_err(|_| lock_err("enter_two_state"))?;
            let record = state.condition(condition)?;
            if !record.transitions.contains(&kind) {
                return Err(StoreError::TransitionNotSupported(kind));
            }
            if record.two_state_id(kind) {
                return Err(StoreError::AlreadyInState(kind));
            }
            let registration = record.handlers.get(&kind).cloned();
            let condition_source = record.source.clone();
            if !state.pending.insert((condition.clone(), kind)) {
                return Err(StoreError::AlreadyInState(kind));
            }
            let pending = PendingTransition {
                store: self,
                key: (condition.clone(), kind),
            };
            (registration, condition_source, pending)
        };

        // Lock released: the handler may call back into the store.
        let source = match registration {
            Some(reg) => {
                let status = reg.handler.on_entering_true(self, session, condition);
                if !status.is_good() {
                    debug!(condition = %condition, transition = kind.label(), %status, "transition rejected by handler");
                    return Err(StoreError::Rejected { kind, status });
                }
                reg.source
            }
            None => condition_source,
        };

        {
            let mut state = self.state.write().map_err(|_| lock_err("enter_two_state"))?;
            let record = state.condition_mut(condition)?;
            // Set directly while the handler ran.
            if record.two_state_id(kind) {
                return Err(StoreError::AlreadyInState(kind));
            }
            record.set_two_state_id(kind, true, Utc::now());
        }

        self.trigger_condition_event(condition, &source)
    }

    fn publish(&self, event: &ConditionEvent) -> Result<(), StoreError> {
        {
            let mut events = self.events.lock().map_err(|_| lock_err("publish.events"))?;
            events.push_back(event.clone());
            while events.len() > self.cfg.event_log_capacity {
                events.pop_front();
            }
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| lock_err("publish.subscribers"))?;
        // Never block the emitting thread: drop if a subscriber is slow.
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        Ok(())
    }
}

impl NodeStore for InMemoryNodeStore {
    fn create_condition(&self, request: &CreateConditionRequest) -> Result<NodeId, StoreError> {
        let transitions = transitions_for(&request.condition_type)
            .ok_or_else(|| StoreError::UnknownConditionType(request.condition_type.clone()))?;
        if !request.parent_reference_type.is_null() && !is_reference_type(&request.parent_reference_type) {
            return Err(StoreError::InvalidReferenceType(
                request.parent_reference_type.clone(),
            ));
        }

        let mut state = self.state.write().map_err(|_| lock_err("create_condition"))?;
        let source_name = match state.nodes.get(&request.source) {
            Some(node) => node.browse_name.name.clone(),
            None => return Err(StoreError::InvalidSource(request.source.clone())),
        };

        let id = if request.requested_id.is_null() {
            state.assign_id(self.cfg.default_namespace)
        } else {
            let id = request.requested_id.clone();
            if id.namespace >= self.cfg.namespace_count {
                return Err(StoreError::InvalidNamespace {
                    namespace: id.namespace,
                    id,
                });
            }
            if state.nodes.contains_key(&id) {
                return Err(StoreError::NodeIdExists(id));
            }
            id
        };

        let record = ConditionRecord::new(
            request.source.clone(),
            source_name,
            &request.browse_name,
            transitions,
        );
        state.nodes.insert(
            id.clone(),
            NodeRecord {
                browse_name: request.browse_name.clone(),
                event_notifier: false,
                condition: Some(record),
            },
        );
        state.references.push(Reference {
            from: request.source.clone(),
            reference_type: ReferenceTypeId::HAS_CONDITION,
            to: id.clone(),
        });
        if !request.parent_reference_type.is_null() {
            state.references.push(Reference {
                from: request.source.clone(),
                reference_type: request.parent_reference_type.clone(),
                to: id.clone(),
            });
        }

        debug!(
            condition = %id,
            condition_type = %request.condition_type,
            source = %request.source,
            "condition node created"
        );
        Ok(id)
    }

    fn delete_node(&self, id: &NodeId, delete_references: bool) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("delete_node"))?;
        if state.nodes.remove(id).is_none() {
            return Err(StoreError::NodeNotFound(id.clone()));
        }
        if delete_references {
            state.references.retain(|r| r.from != *id && r.to != *id);
        }
        debug!(node = %id, delete_references, "node deleted");
        Ok(())
    }

    fn set_condition_field(
        &self,
        condition: &NodeId,
        field: &QualifiedName,
        value: &Variant,
    ) -> Result<(), StoreError> {
        let spec = lookup(CONDITION_FIELDS, field).ok_or_else(|| StoreError::FieldNotFound {
            field: field.to_string(),
        })?;
        check_kind(spec.name, spec.kind, value)?;

        let mut state = self.state.write().map_err(|_| lock_err("set_condition_field"))?;
        let record = state.condition_mut(condition)?;
        record.fields.insert(spec.name, value.clone());
        Ok(())
    }

    fn set_condition_variable_field_property(
        &self,
        condition: &NodeId,
        variable: &QualifiedName,
        property: &QualifiedName,
        value: &Variant,
    ) -> Result<(), StoreError> {
        let path = format!("{variable}/{property}");
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("set_condition_variable_field_property"))?;
        let record = state.condition_mut(condition)?;
        let var = record
            .variable(variable)
            .ok_or_else(|| StoreError::FieldNotFound { field: path.clone() })?;
        let spec = lookup(TWO_STATE_PROPERTIES, property)
            .ok_or_else(|| StoreError::FieldNotFound { field: path.clone() })?;
        check_kind(&path, spec.kind, value)?;

        record
            .variables
            .entry(var)
            .or_default()
            .insert(spec.name, value.clone());
        Ok(())
    }

    fn read_condition_field(
        &self,
        condition: &NodeId,
        field: &QualifiedName,
    ) -> Result<Variant, StoreError> {
        let spec = lookup(CONDITION_FIELDS, field).ok_or_else(|| StoreError::FieldNotFound {
            field: field.to_string(),
        })?;
        let state = self.state.read().map_err(|_| lock_err("read_condition_field"))?;
        let record = state.condition(condition)?;
        Ok(record.fields.get(spec.name).cloned().unwrap_or_default())
    }

    fn read_condition_variable_field_property(
        &self,
        condition: &NodeId,
        variable: &QualifiedName,
        property: &QualifiedName,
    ) -> Result<Variant, StoreError> {
        let path = format!("{variable}/{property}");
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("read_condition_variable_field_property"))?;
        let record = state.condition(condition)?;
        let var = record
            .variable(variable)
            .ok_or_else(|| StoreError::FieldNotFound { field: path.clone() })?;
        let spec = lookup(TWO_STATE_PROPERTIES, property)
            .ok_or_else(|| StoreError::FieldNotFound { field: path })?;
        Ok(record
            .variables
            .get(var)
            .and_then(|props| props.get(spec.name))
            .cloned()
            .unwrap_or_default())
    }

    fn trigger_condition_event(
        &self,
        condition: &NodeId,
        source: &NodeId,
    ) -> Result<EventId, StoreError> {
        let event = {
            let state = self.state.read().map_err(|_| lock_err("trigger_condition_event"))?;
            let record = state.condition(condition)?;
            let is_notifier = state
                .nodes
                .get(source)
                .is_some_and(|node| node.event_notifier);
            if !is_notifier || !state.notifies(source, &record.source) {
                return Err(StoreError::NotANotifier(source.clone()));
            }

            ConditionEvent {
                event_id: EventId::from_bytes(Uuid::new_v4().as_bytes().to_vec()),
                condition: condition.clone(),
                source: source.clone(),
                time: Utc::now(),
                fields: record.snapshot(),
            }
        };

        self.publish(&event)?;
        debug!(condition = %condition, source = %source, event_id = %event.event_id, "condition event emitted");
        Ok(event.event_id)
    }

    fn set_two_state_callback(
        &self,
        condition: &NodeId,
        source: &NodeId,
        remove_branch: bool,
        kind: TransitionKind,
        handler: Arc<dyn TwoStateHandler>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("set_two_state_callback"))?;
        if !state.nodes.contains_key(source) {
            return Err(StoreError::InvalidSource(source.clone()));
        }
        let record = state.condition_mut(condition)?;
        if !record.transitions.contains(&kind) {
            return Err(StoreError::TransitionNotSupported(kind));
        }
        record.handlers.insert(
            kind,
            HandlerRegistration {
                source: source.clone(),
                remove_branch,
                handler,
            },
        );
        Ok(())
    }

    fn read_display_name(&self, id: &NodeId) -> Result<LocalizedText, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("read_display_name"))?;
        let node = state
            .nodes
            .get(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        Ok(LocalizedText::invariant(node.browse_name.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;
    use std::sync::atomic::AtomicUsize;

    fn store_with_source() -> (InMemoryNodeStore, NodeId) {
        let store = InMemoryNodeStore::new();
        let source = store.add_object("Boiler").unwrap();
        store.set_event_notifier(&source, true).unwrap();
        (store, source)
    }

    fn request(source: &NodeId) -> CreateConditionRequest {
        CreateConditionRequest {
            condition_type: ObjectTypeId::OFF_NORMAL_ALARM_TYPE,
            browse_name: "HighTemp".into(),
            source: source.clone(),
            parent_reference_type: ReferenceTypeId::HAS_COMPONENT,
            requested_id: NodeId::null(),
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
        status: StatusCode,
    }

    impl TwoStateHandler for CountingHandler {
        fn on_entering_true(
            &self,
            store: &dyn NodeStore,
            _session: Option<&SessionId>,
            condition: &NodeId,
        ) -> StatusCode {
            // Variable has not flipped yet when the handler runs.
            let acked = store
                .read_condition_variable_field_property(condition, &"AckedState".into(), &"Id".into())
                .unwrap();
            assert_eq!(acked, Variant::Boolean(false));
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.status
        }
    }

    #[test]
    fn test_create_condition_assigns_id_and_references() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();

        assert_eq!(id.namespace, 1);
        assert!(store.contains(&id));
        let refs = store.references_from(&source).unwrap();
        assert!(refs.iter().any(|r| r.to == id && r.reference_type == ReferenceTypeId::HAS_CONDITION));
        assert!(refs.iter().any(|r| r.to == id && r.reference_type == ReferenceTypeId::HAS_COMPONENT));
        assert_eq!(
            store.read_condition_field(&id, &"SourceName".into()).unwrap(),
            Variant::String("Boiler".to_string())
        );
    }

    #[test]
    fn test_null_parent_reference_is_not_exposed() {
        let (store, source) = store_with_source();
        let mut req = request(&source);
        req.parent_reference_type = NodeId::null();
        let id = store.create_condition(&req).unwrap();

        let refs = store.references_from(&source).unwrap();
        assert!(refs.iter().all(|r| r.to != id || r.reference_type == ReferenceTypeId::HAS_CONDITION));
    }

    #[test]
    fn test_create_condition_rejections() {
        let (store, source) = store_with_source();

        let mut req = request(&source);
        req.condition_type = NodeId::numeric(0, 9999);
        assert!(matches!(store.create_condition(&req), Err(StoreError::UnknownConditionType(_))));

        let mut req = request(&source);
        req.source = NodeId::numeric(1, 4242);
        assert!(matches!(store.create_condition(&req), Err(StoreError::InvalidSource(_))));

        let mut req = request(&source);
        req.parent_reference_type = NodeId::numeric(0, 1);
        assert!(matches!(store.create_condition(&req), Err(StoreError::InvalidReferenceType(_))));

        let mut req = request(&source);
        req.requested_id = NodeId::string(7, "X");
        assert!(matches!(
            store.create_condition(&req),
            Err(StoreError::InvalidNamespace { namespace: 7, .. })
        ));

        let mut req = request(&source);
        req.requested_id = NodeId::string(1, "HighTemp");
        store.create_condition(&req).unwrap();
        assert!(matches!(store.create_condition(&req), Err(StoreError::NodeIdExists(_))));
    }

    #[test]
    fn test_field_writes_are_type_checked() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();

        store
            .set_condition_field(&id, &"Severity".into(), &Variant::UInt16(500))
            .unwrap();
        assert_eq!(
            store.read_condition_field(&id, &"Severity".into()).unwrap(),
            Variant::UInt16(500)
        );

        let err = store
            .set_condition_field(&id, &"Severity".into(), &Variant::Boolean(true))
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));

        let err = store
            .set_condition_field(&id, &"Bogus".into(), &Variant::Boolean(true))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_NO_MATCH);

        let err = store
            .set_condition_variable_field_property(&id, &"ActiveState".into(), &"Nope".into(), &Variant::Boolean(true))
            .unwrap_err();
        assert_eq!(err, StoreError::FieldNotFound { field: "ActiveState/Nope".to_string() });
    }

    #[test]
    fn test_condition_type_limits_variables() {
        let (store, source) = store_with_source();
        let mut req = request(&source);
        req.condition_type = ObjectTypeId::CONDITION_TYPE;
        let id = store.create_condition(&req).unwrap();

        let err = store
            .set_condition_variable_field_property(&id, &"ActiveState".into(), &"Id".into(), &Variant::Boolean(true))
            .unwrap_err();
        assert!(matches!(err, StoreError::FieldNotFound { .. }));
        assert!(matches!(
            store.enter_two_state(None, &id, TransitionKind::Acked),
            Err(StoreError::TransitionNotSupported(TransitionKind::Acked))
        ));
    }

    #[test]
    fn test_trigger_requires_notifier() {
        let store = InMemoryNodeStore::new();
        let source = store.add_object("Pump").unwrap();
        let id = store.create_condition(&request(&source)).unwrap();

        let err = store.trigger_condition_event(&id, &source).unwrap_err();
        assert!(matches!(err, StoreError::NotANotifier(_)));

        // Server is a notifier but not linked to the source yet.
        assert!(store.trigger_condition_event(&id, &ObjectId::SERVER).is_err());

        store
            .add_reference(&ObjectId::SERVER, &ReferenceTypeId::HAS_NOTIFIER, &source)
            .unwrap();
        let event_id = store.trigger_condition_event(&id, &ObjectId::SERVER).unwrap();
        assert_eq!(event_id.as_bytes().len(), 16);
    }

    #[test]
    fn test_trigger_snapshots_current_fields() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();
        store
            .set_condition_field(&id, &"Message".into(), &LocalizedText::invariant("first").into())
            .unwrap();
        store.trigger_condition_event(&id, &source).unwrap();
        store
            .set_condition_field(&id, &"Message".into(), &LocalizedText::invariant("second").into())
            .unwrap();
        store.trigger_condition_event(&id, &source).unwrap();

        let events = store.events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].field("Message"),
            Some(&Variant::LocalizedText(LocalizedText::invariant("first")))
        );
        assert_eq!(
            events[1].field("Message"),
            Some(&Variant::LocalizedText(LocalizedText::invariant("second")))
        );
        assert_eq!(events[1].field("ActiveState/Id"), Some(&Variant::Boolean(false)));
    }

    #[test]
    fn test_event_log_is_bounded() {
        let store = InMemoryNodeStore::with_config(NodeStoreConfig {
            event_log_capacity: 2,
            ..NodeStoreConfig::default()
        });
        let source = store.add_object("Tank").unwrap();
        store.set_event_notifier(&source, true).unwrap();
        let id = store.create_condition(&request(&source)).unwrap();

        let ids: Vec<EventId> = (0..3)
            .map(|_| store.trigger_condition_event(&id, &source).unwrap())
            .collect();
        let events = store.events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, ids[1]);
        assert_eq!(events[1].event_id, ids[2]);
    }

    #[test]
    fn test_subscribers_receive_and_slow_ones_drop() {
        let store = InMemoryNodeStore::with_config(NodeStoreConfig {
            stream_capacity: 1,
            ..NodeStoreConfig::default()
        });
        let source = store.add_object("Valve").unwrap();
        store.set_event_notifier(&source, true).unwrap();
        let id = store.create_condition(&request(&source)).unwrap();

        let stream = store.subscribe().unwrap();
        let first = store.trigger_condition_event(&id, &source).unwrap();
        store.trigger_condition_event(&id, &source).unwrap();

        assert_eq!(store.dropped_events(), 1);
        assert_eq!(stream.try_recv().unwrap().unwrap().event_id, first);
        assert!(stream.try_recv().unwrap().is_none());

        drop(stream);
        store.trigger_condition_event(&id, &source).unwrap();
        assert!(store.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_delete_node_with_references() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();

        store.delete_node(&id, true).unwrap();
        assert!(!store.contains(&id));
        assert!(store.references_to(&id).unwrap().is_empty());
        assert!(matches!(store.delete_node(&id, true), Err(StoreError::NodeNotFound(_))));
    }

    #[test]
    fn test_enter_two_state_runs_handler_before_flip() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            status: StatusCode::GOOD,
        });
        store
            .set_two_state_callback(&id, &source, false, TransitionKind::Acked, handler.clone())
            .unwrap();

        let stream = store.subscribe().unwrap();
        store.enter_two_state(None, &id, TransitionKind::Acked).unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let event = stream.try_recv().unwrap().unwrap();
        assert_eq!(event.field("AckedState/Id"), Some(&Variant::Boolean(true)));

        // Second acknowledgement is refused without running the handler.
        let err = store.enter_two_state(None, &id, TransitionKind::Acked).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_CONDITION_BRANCH_ALREADY_ACKED);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enter_two_state_rejected_by_handler() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            status: StatusCode::BAD_USER_ACCESS_DENIED,
        });
        store
            .set_two_state_callback(&id, &source, false, TransitionKind::Acked, handler)
            .unwrap();

        let err = store.enter_two_state(None, &id, TransitionKind::Acked).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_USER_ACCESS_DENIED);
        assert_eq!(
            store
                .read_condition_variable_field_property(&id, &"AckedState".into(), &"Id".into())
                .unwrap(),
            Variant::Boolean(false)
        );
        assert!(store.events().unwrap().is_empty());
    }

    struct GatedHandler {
        calls: AtomicUsize,
        entered: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
    }

    impl TwoStateHandler for GatedHandler {
        fn on_entering_true(
            &self,
            _store: &dyn NodeStore,
            _session: Option<&SessionId>,
            _condition: &NodeId,
        ) -> StatusCode {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.entered.send(());
            let _ = self.release.recv();
            StatusCode::GOOD
        }
    }

    #[test]
    fn test_concurrent_enter_two_state_runs_handler_once() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let handler = Arc::new(GatedHandler {
            calls: AtomicUsize::new(0),
            entered: entered_tx,
            release: release_rx,
        });
        store
            .set_two_state_callback(&id, &source, false, TransitionKind::Acked, handler.clone())
            .unwrap();

        std::thread::scope(|s| {
            let first = s.spawn(|| store.enter_two_state(None, &id, TransitionKind::Acked));
            entered_rx.recv().unwrap();

            // The first call is inside its handler; a second one is refused.
            let err = store.enter_two_state(None, &id, TransitionKind::Acked).unwrap_err();
            assert_eq!(err, StoreError::AlreadyInState(TransitionKind::Acked));

            release_tx.send(()).unwrap();
            assert!(first.join().unwrap().is_ok());
        });

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.events().unwrap().len(), 1);
        assert!(store.state.read().unwrap().pending.is_empty());
    }

    struct WritingHandler;

    impl TwoStateHandler for WritingHandler {
        fn on_entering_true(
            &self,
            store: &dyn NodeStore,
            _session: Option<&SessionId>,
            condition: &NodeId,
        ) -> StatusCode {
            store
                .set_condition_variable_field_property(
                    condition,
                    &"AckedState".into(),
                    &"Id".into(),
                    &Variant::Boolean(true),
                )
                .unwrap();
            StatusCode::GOOD
        }
    }

    #[test]
    fn test_variable_set_while_handler_runs_is_not_flipped_again() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();
        store
            .set_two_state_callback(&id, &source, false, TransitionKind::Acked, Arc::new(WritingHandler))
            .unwrap();

        let err = store.enter_two_state(None, &id, TransitionKind::Acked).unwrap_err();
        assert_eq!(err, StoreError::AlreadyInState(TransitionKind::Acked));
        assert!(store.events().unwrap().is_empty());
        assert!(store.state.read().unwrap().pending.is_empty());
    }

    #[test]
    fn test_rejected_transition_can_be_retried() {
        let (store, source) = store_with_source();
        let id = store.create_condition(&request(&source)).unwrap();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            status: StatusCode::BAD_USER_ACCESS_DENIED,
        });
        store
            .set_two_state_callback(&id, &source, false, TransitionKind::Acked, handler.clone())
            .unwrap();

        for _ in 0..2 {
            let err = store.enter_two_state(None, &id, TransitionKind::Acked).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_USER_ACCESS_DENIED);
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_display_name_from_browse_name() {
        let (store, source) = store_with_source();
        assert_eq!(store.read_display_name(&source).unwrap().text, "Boiler");
        assert!(store.read_display_name(&NodeId::numeric(1, 999)).is_err());
    }
}
