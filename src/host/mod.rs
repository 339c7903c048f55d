//! Embedding façade: keyspace, reply kinds and command dispatch.
//!
//! [`Db`] owns the keyspace (typed objects and hierarchies), the per-node
//! field objects the `modify` command writes and the filter evaluator
//! reads, and the event publication queue. [`Db::dispatch`] implements the
//! external command surface; every command runs synchronously on the
//! caller's thread and queued change events are drained before the reply
//! is produced.

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;

use bytes::Bytes;
use tracing::warn;

use crate::encoding::{SnapshotReader, write_string, write_varint};
use crate::error::{Error, Result, reply_message};
use crate::events::{DEFAULT_EVENT_QUEUE_DEPTH, EventPayload, EventQueue};
use crate::hierarchy::{self, Hierarchy};
use crate::modify::{OpIncrement, OpSet};
use crate::object::{self, ObjectValue, TypedObject};
use crate::rpn::FieldSource;
use crate::subscriptions::{FilterSpec, MARKER_CH_FIELD, MARKER_CH_HIERARCHY, MarkerSpec};
use crate::types::{
    ModifyArgType, NODE_TYPE_SIZE, NodeId, SubscriptionId, TraversalDir,
};

/// Key under which `modify` maintains the hierarchy.
pub const HIERARCHY_DEFAULT_KEY: &str = "___stemma_hierarchy";

/// Magic bytes framing a whole-database snapshot.
const DB_SNAPSHOT_MAGIC: &[u8; 4] = b"STMA";

/// Current whole-database snapshot version.
pub const DB_ENCODING_VERSION: u32 = 0;

/// Reply kinds produced by [`Db::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Integer reply.
    Long(i64),
    /// Floating point reply.
    Double(f64),
    /// String reply.
    Str(String),
    /// Array reply.
    Array(Vec<Reply>),
    /// Null reply.
    Null,
    /// Error reply carrying the formatted message table entry.
    Error(String),
}

impl Reply {
    fn error(err: &Error) -> Self {
        Reply::Error(reply_message(err.code()).to_string())
    }

    /// Returns the integer value of a `Long` reply.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Reply::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string value of a `Str` reply.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements of an `Array` reply.
    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` for an `Error` reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

#[derive(Debug)]
enum DbValue {
    Object(TypedObject),
    Hierarchy(Hierarchy),
}

/// Field-source view over the per-node field objects.
struct NodeFields<'a>(&'a BTreeMap<NodeId, TypedObject>);

impl FieldSource for NodeFields<'_> {
    fn field(&self, node: &NodeId, field: &str) -> Option<String> {
        let obj = self.0.get(node)?;
        scalar_string(obj.get(field).ok()?)
    }
}

fn scalar_string(value: &ObjectValue) -> Option<String> {
    match value {
        ObjectValue::String(s) => Some(s.clone()),
        ObjectValue::Long(v) => Some(v.to_string()),
        ObjectValue::Double(v) => Some(v.to_string()),
        _ => None,
    }
}

/// The embedded database.
#[derive(Debug)]
pub struct Db {
    entries: BTreeMap<String, DbValue>,
    fields: BTreeMap<NodeId, TypedObject>,
    events: EventQueue,
    next_suffix: u64,
}

impl Db {
    /// Creates a database with a default-depth event queue, returning the
    /// receiving end for the host to drain.
    pub fn new() -> (Self, Receiver<Bytes>) {
        let (events, rx) = EventQueue::bounded(DEFAULT_EVENT_QUEUE_DEPTH);
        (Self::with_events(events), rx)
    }

    /// Creates a database publishing on the given queue.
    pub fn with_events(events: EventQueue) -> Self {
        Self {
            entries: BTreeMap::new(),
            fields: BTreeMap::new(),
            events,
            next_suffix: 0,
        }
    }

    /// Returns the typed object stored at `key`, if any.
    pub fn object(&self, key: &str) -> Option<&TypedObject> {
        match self.entries.get(key) {
            Some(DbValue::Object(obj)) => Some(obj),
            _ => None,
        }
    }

    /// Returns the hierarchy stored at `key`, if any.
    pub fn hierarchy(&self, key: &str) -> Option<&Hierarchy> {
        match self.entries.get(key) {
            Some(DbValue::Hierarchy(h)) => Some(h),
            _ => None,
        }
    }

    /// Returns the hierarchy stored at `key` for direct mutation.
    ///
    /// Callers mutating through this handle should follow up with
    /// [`Db::drain_events`].
    pub fn hierarchy_mut(&mut self, key: &str) -> Option<&mut Hierarchy> {
        match self.entries.get_mut(key) {
            Some(DbValue::Hierarchy(h)) => Some(h),
            _ => None,
        }
    }

    /// Returns the field object of a node, if any.
    pub fn node_fields(&self, node: &NodeId) -> Option<&TypedObject> {
        self.fields.get(node)
    }

    /// Evaluates queued change records of the hierarchy at `key` and
    /// publishes the matching events.
    pub fn drain_events(&mut self, key: &str) {
        if let Some(DbValue::Hierarchy(h)) = self.entries.get_mut(key) {
            let fields = NodeFields(&self.fields);
            h.drain_changes(&fields, &self.events);
        }
    }

    /// Dispatches one command. The first operand is the command name.
    pub fn dispatch(&mut self, argv: &[Bytes]) -> Reply {
        let Some(Ok(cmd)) = argv.first().map(|raw| std::str::from_utf8(raw)) else {
            return Reply::error(&Error::Invalid);
        };

        match cmd {
            "object.del" => self.cmd_object_del(argv),
            "object.exists" => self.cmd_object_exists(argv),
            "object.get" => self.cmd_object_get(argv),
            "object.set" => self.cmd_object_set(argv),
            "object.type" => self.cmd_object_type(argv),
            "object.len" => self.cmd_object_len(argv),
            "subscriptions.add" => self.cmd_subscriptions_add(argv),
            "subscriptions.refresh" => self.cmd_subscriptions_refresh(argv),
            "subscriptions.list" => self.cmd_subscriptions_list(argv),
            "subscriptions.debug" => self.cmd_subscriptions_debug(argv),
            "subscriptions.del" => self.cmd_subscriptions_del(argv),
            "modify" => self.cmd_modify(argv),
            _ => Reply::error(&Error::NotSupported),
        }
    }

    fn open_object(&self, key: &str) -> Result<&TypedObject> {
        match self.entries.get(key) {
            Some(DbValue::Object(obj)) => Ok(obj),
            Some(_) => Err(Error::WrongType),
            None => Err(Error::NotFound),
        }
    }

    fn open_object_mut(&mut self, key: &str, create: bool) -> Result<&mut TypedObject> {
        if create && !self.entries.contains_key(key) {
            self.entries
                .insert(key.to_string(), DbValue::Object(TypedObject::new()));
        }
        match self.entries.get_mut(key) {
            Some(DbValue::Object(obj)) => Ok(obj),
            Some(_) => Err(Error::WrongType),
            None => Err(Error::NotFound),
        }
    }

    fn open_hierarchy(&self, key: &str) -> Result<&Hierarchy> {
        match self.entries.get(key) {
            Some(DbValue::Hierarchy(h)) => Ok(h),
            Some(_) => Err(Error::WrongType),
            None => Err(Error::HierarchyNotFound),
        }
    }

    fn open_hierarchy_mut(&mut self, key: &str, create: bool) -> Result<&mut Hierarchy> {
        if create && !self.entries.contains_key(key) {
            self.entries
                .insert(key.to_string(), DbValue::Hierarchy(Hierarchy::new()));
        }
        match self.entries.get_mut(key) {
            Some(DbValue::Hierarchy(h)) => Ok(h),
            Some(_) => Err(Error::WrongType),
            None => Err(Error::HierarchyNotFound),
        }
    }

    fn cmd_object_del(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() != 3 {
            return Reply::error(&Error::Invalid);
        }
        let (key, path) = match (arg_str(argv, 1), arg_str(argv, 2)) {
            (Ok(key), Ok(path)) => (key.to_string(), path.to_string()),
            _ => return Reply::error(&Error::Invalid),
        };

        let obj = match self.open_object_mut(&key, false) {
            Ok(obj) => obj,
            Err(err) => return Reply::error(&err),
        };
        match obj.del(&path) {
            Ok(()) => Reply::Long(1),
            Err(Error::NotFound) => Reply::Long(0),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_object_exists(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() < 3 {
            return Reply::error(&Error::Invalid);
        }
        let (key, path) = match (arg_str(argv, 1), arg_str(argv, 2)) {
            (Ok(key), Ok(path)) => (key, path),
            _ => return Reply::error(&Error::Invalid),
        };

        let obj = match self.open_object(key) {
            Ok(obj) => obj,
            Err(err) => return Reply::error(&err),
        };
        match obj.exists(path) {
            Ok(()) => Reply::Long(1),
            Err(Error::NotFound) => Reply::Long(0),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_object_get(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() < 2 {
            return Reply::error(&Error::Invalid);
        }
        let key = match arg_str(argv, 1) {
            Ok(key) => key,
            Err(err) => return Reply::error(&err),
        };

        let obj = match self.open_object(key) {
            Ok(obj) => obj,
            Err(err) => return Reply::error(&err),
        };

        if argv.len() == 2 {
            return reply_object(obj);
        }

        for raw in &argv[2..] {
            let Ok(path) = std::str::from_utf8(raw) else {
                return Reply::error(&Error::Invalid);
            };
            match obj.get(path) {
                Ok(value) => return reply_value(value),
                Err(Error::NotFound) => continue,
                Err(err) => return Reply::error(&err),
            }
        }
        Reply::Null
    }

    fn cmd_object_set(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() <= 3 {
            return Reply::error(&Error::Invalid);
        }
        let (key, path, type_arg) = match (arg_str(argv, 1), arg_str(argv, 2), arg_str(argv, 3)) {
            (Ok(key), Ok(path), Ok(type_arg)) => (key.to_string(), path.to_string(), type_arg),
            _ => return Reply::error(&Error::Invalid),
        };
        if type_arg.len() != 1 {
            return Reply::error(&Error::Invalid);
        }
        let type_tag = type_arg.as_bytes()[0];
        if !(argv.len() == 5 || (type_tag == b'S' && argv.len() >= 5)) {
            return Reply::error(&Error::Invalid);
        }

        let obj = match self.open_object_mut(&key, true) {
            Ok(obj) => obj,
            Err(err) => return Reply::error(&err),
        };

        let mut values_set: i64 = 0;
        let result = match type_tag {
            b'f' => {
                let value = arg_str(argv, 4)
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0);
                values_set += 1;
                obj.set_double(&path, value)
            }
            b'i' => {
                let value = arg_str(argv, 4)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or(0);
                values_set += 1;
                obj.set_long(&path, value)
            }
            b's' => match arg_str(argv, 4) {
                Ok(value) => {
                    values_set += 1;
                    obj.set_str(&path, value)
                }
                Err(err) => Err(err),
            },
            b'S' => {
                for raw in &argv[4..] {
                    let Ok(value) = std::str::from_utf8(raw) else {
                        continue;
                    };
                    if obj.add_set(&path, value).is_ok() {
                        values_set += 1;
                    }
                }
                Ok(())
            }
            _ => Err(Error::WrongType),
        };

        match result {
            Ok(()) => Reply::Long(values_set),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_object_type(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() != 3 {
            return Reply::error(&Error::Invalid);
        }
        let (key, path) = match (arg_str(argv, 1), arg_str(argv, 2)) {
            (Ok(key), Ok(path)) => (key, path),
            _ => return Reply::error(&Error::Invalid),
        };

        match self.open_object(key) {
            Ok(obj) => Reply::Str(obj.get_type(path).name().to_string()),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_object_len(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() != 2 && argv.len() != 3 {
            return Reply::error(&Error::Invalid);
        }
        let key = match arg_str(argv, 1) {
            Ok(key) => key,
            Err(err) => return Reply::error(&err),
        };
        let path = if argv.len() == 3 {
            match arg_str(argv, 2) {
                Ok(path) => Some(path),
                Err(err) => return Reply::error(&err),
            }
        } else {
            None
        };

        let obj = match self.open_object(key) {
            Ok(obj) => obj,
            Err(err) => return Reply::error(&err),
        };
        match obj.len(path) {
            Ok(len) => Reply::Long(len as i64),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_subscriptions_add(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() < 5 {
            return Reply::error(&Error::SubscriptionsInvalid);
        }
        let key = match arg_str(argv, 1) {
            Ok(key) => key.to_string(),
            Err(err) => return Reply::error(&err.into_subscriptions()),
        };

        let sub_id = match arg_str(argv, 2).and_then(|s| SubscriptionId::parse(s)) {
            Ok(id) => id,
            Err(err) => return Reply::error(&err),
        };

        let dir = match arg_str(argv, 3) {
            Ok("node") => TraversalDir::Node,
            Ok("ancestors") => TraversalDir::DfsAncestors,
            Ok("descendants") => TraversalDir::DfsDescendants,
            _ => return Reply::error(&Error::SubscriptionsInvalid),
        };

        let Some(origin_raw) = argv.get(4) else {
            return Reply::error(&Error::SubscriptionsInvalid);
        };
        let origin = NodeId::from_bytes(origin_raw);

        let mut next = 5;
        let mut fields = None;
        if argv.len() > next && arg_str(argv, next) == Ok("fields") {
            let Ok(list) = arg_str(argv, next + 1) else {
                return Reply::error(&Error::SubscriptionsInvalid);
            };
            fields = Some(list.to_string());
            next += 2;
        }

        let mut filter = None;
        if argv.len() > next {
            let Ok(expression) = arg_str(argv, next) else {
                return Reply::error(&Error::SubscriptionsInvalid);
            };
            let mut args = Vec::new();
            for raw in &argv[next + 1..] {
                let Ok(arg) = std::str::from_utf8(raw) else {
                    return Reply::error(&Error::SubscriptionsInvalid);
                };
                args.push(arg.to_string());
            }
            filter = Some(FilterSpec {
                expression: expression.to_string(),
                args,
            });
        }

        let mut flags = MARKER_CH_HIERARCHY;
        if fields.is_some() {
            flags |= MARKER_CH_FIELD;
        }

        let hierarchy = match self.open_hierarchy_mut(&key, true) {
            Ok(h) => h,
            Err(err) => return Reply::error(&err),
        };
        match hierarchy.add_marker(
            sub_id,
            flags,
            MarkerSpec {
                origin,
                dir,
                fields,
                filter,
            },
        ) {
            Ok(_) => Reply::Long(1),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_subscriptions_refresh(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() != 3 {
            return Reply::error(&Error::SubscriptionsInvalid);
        }
        let key = match arg_str(argv, 1) {
            Ok(key) => key.to_string(),
            Err(err) => return Reply::error(&err.into_subscriptions()),
        };
        let sub_id = match arg_str(argv, 2).and_then(|s| SubscriptionId::parse(s)) {
            Ok(id) => id,
            Err(err) => return Reply::error(&err),
        };

        let hierarchy = match self.open_hierarchy_mut(&key, true) {
            Ok(h) => h,
            Err(err) => return Reply::error(&err),
        };
        match hierarchy.refresh_subscription(&sub_id) {
            Ok(()) => Reply::Long(1),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_subscriptions_list(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() != 2 {
            return Reply::error(&Error::SubscriptionsInvalid);
        }
        let key = match arg_str(argv, 1) {
            Ok(key) => key,
            Err(err) => return Reply::error(&err.into_subscriptions()),
        };

        match self.open_hierarchy(key) {
            Ok(hierarchy) => Reply::Array(
                hierarchy
                    .subscription_ids()
                    .into_iter()
                    .map(|id| Reply::Str(id.to_string()))
                    .collect(),
            ),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_subscriptions_debug(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() != 3 {
            return Reply::error(&Error::SubscriptionsInvalid);
        }
        let key = match arg_str(argv, 1) {
            Ok(key) => key,
            Err(err) => return Reply::error(&err.into_subscriptions()),
        };
        let sub_id = match arg_str(argv, 2).and_then(|s| SubscriptionId::parse(s)) {
            Ok(id) => id,
            Err(err) => return Reply::error(&err),
        };

        let hierarchy = match self.open_hierarchy(key) {
            Ok(h) => h,
            Err(err) => return Reply::error(&err),
        };
        match hierarchy.marker_dumps(&sub_id) {
            Ok(dumps) => Reply::Array(dumps.into_iter().map(Reply::Str).collect()),
            Err(err) => Reply::error(&err),
        }
    }

    fn cmd_subscriptions_del(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() != 3 {
            return Reply::error(&Error::SubscriptionsInvalid);
        }
        let key = match arg_str(argv, 1) {
            Ok(key) => key.to_string(),
            Err(err) => return Reply::error(&err.into_subscriptions()),
        };
        let sub_id = match arg_str(argv, 2).and_then(|s| SubscriptionId::parse(s)) {
            Ok(id) => id,
            Err(err) => return Reply::error(&err),
        };

        let hierarchy = match self.open_hierarchy_mut(&key, true) {
            Ok(h) => h,
            Err(err) => return Reply::error(&err),
        };
        Reply::Long(hierarchy.delete_subscription(&sub_id) as i64)
    }

    fn cmd_modify(&mut self, argv: &[Bytes]) -> Reply {
        if argv.len() < 5 || (argv.len() - 2) % 3 != 0 {
            return Reply::error(&Error::Invalid);
        }
        let id_arg = match arg_str(argv, 1) {
            Ok(id) => id,
            Err(err) => return Reply::error(&err),
        };

        let id_str = if id_arg.len() == NODE_TYPE_SIZE {
            self.next_suffix += 1;
            format!("{id_arg}{:08x}", self.next_suffix)
        } else {
            id_arg.to_string()
        };
        let node_id = NodeId::from_bytes(id_str.as_bytes());

        for triple in argv[2..].chunks(3) {
            let type_raw = &triple[0];
            let Ok(field) = std::str::from_utf8(&triple[1]) else {
                return Reply::error(&Error::Invalid);
            };
            let value_raw = &triple[2];

            let arg_type = match type_raw
                .first()
                .copied()
                .filter(|_| type_raw.len() == 1)
                .and_then(|raw| ModifyArgType::try_from(raw).ok())
            {
                Some(arg_type) => arg_type,
                None => return Reply::error(&Error::Invalid),
            };

            if let Err(err) = self.apply_modify(&node_id, arg_type, field, value_raw) {
                return Reply::error(&err);
            }
        }

        self.drain_events(HIERARCHY_DEFAULT_KEY);
        Reply::Str(id_str)
    }

    fn apply_modify(
        &mut self,
        node_id: &NodeId,
        arg_type: ModifyArgType,
        field: &str,
        value_raw: &[u8],
    ) -> Result<()> {
        match arg_type {
            ModifyArgType::Value
            | ModifyArgType::IndexedValue
            | ModifyArgType::Default
            | ModifyArgType::DefaultIndexed => {
                let value = std::str::from_utf8(value_raw).map_err(|_| Error::Invalid)?;
                self.modify_plain(node_id, arg_type, field, value)
            }
            ModifyArgType::OpIncrement => {
                let opts = OpIncrement::parse(value_raw)?;
                self.modify_increment(node_id, field, &opts)
            }
            ModifyArgType::OpSet => {
                let opts = OpSet::parse(value_raw)?;
                self.modify_set(node_id, field, &opts)
            }
        }
    }

    fn modify_plain(
        &mut self,
        node_id: &NodeId,
        arg_type: ModifyArgType,
        field: &str,
        value: &str,
    ) -> Result<()> {
        let current = self
            .fields
            .get(node_id)
            .and_then(|obj| obj.get(field).ok())
            .and_then(scalar_string);

        if current.as_deref() == Some(value) {
            return Ok(());
        }

        let indexed = matches!(
            arg_type,
            ModifyArgType::IndexedValue | ModifyArgType::DefaultIndexed
        );
        if indexed {
            self.events.publish(
                EventPayload::Index {
                    node: *node_id,
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .encode(),
            );
        }

        // Defaults still overwrite; an existing value only suppresses the
        // change notification.
        let is_default = matches!(
            arg_type,
            ModifyArgType::Default | ModifyArgType::DefaultIndexed
        );
        let notify = !(is_default && current.is_some());

        self.fields
            .entry(*node_id)
            .or_default()
            .set_str(field, value)?;
        if notify {
            self.record_field_change(node_id, field);
        }
        Ok(())
    }

    fn modify_increment(
        &mut self,
        node_id: &NodeId,
        field: &str,
        opts: &OpIncrement,
    ) -> Result<()> {
        let current = self
            .fields
            .get(node_id)
            .and_then(|obj| match obj.get(field) {
                Ok(ObjectValue::Long(v)) => Some(*v),
                Ok(ObjectValue::String(s)) => s.parse().ok(),
                _ => None,
            });

        let value = current.unwrap_or(opts.default).wrapping_add(opts.increment);
        self.fields
            .entry(*node_id)
            .or_default()
            .set_long(field, value)?;

        if opts.index {
            self.events.publish(
                EventPayload::Index {
                    node: *node_id,
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .encode(),
            );
        }

        self.record_field_change(node_id, field);
        Ok(())
    }

    fn modify_set(&mut self, node_id: &NodeId, field: &str, opts: &OpSet) -> Result<()> {
        if opts.is_reference {
            return self.modify_set_reference(node_id, field, opts);
        }

        let obj = self.fields.entry(*node_id).or_default();
        if !opts.value.is_empty() {
            match obj.del(field) {
                Ok(()) | Err(Error::NotFound) => {}
                Err(err) => return Err(err),
            }
            for entry in &opts.value {
                add_set_entry(obj, field, entry)?;
            }
        } else {
            for entry in &opts.add {
                add_set_entry(obj, field, entry)?;
            }
            for entry in &opts.delete {
                let value = String::from_utf8_lossy(entry);
                match obj.rem_set(field, &value) {
                    Ok(()) | Err(Error::NotFound) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        self.record_field_change(node_id, field);
        Ok(())
    }

    /// `parents`/`children` reference sets modify the hierarchy instead of
    /// the node's fields.
    fn modify_set_reference(
        &mut self,
        node_id: &NodeId,
        field: &str,
        opts: &OpSet,
    ) -> Result<()> {
        let is_parents = field.starts_with('p');

        let to_ids = |entries: &[Vec<u8>]| -> Vec<NodeId> {
            entries.iter().map(|raw| NodeId::from_bytes(raw)).collect()
        };
        let value_ids = to_ids(&opts.value);
        let add_ids = to_ids(&opts.add);
        let delete_ids = to_ids(&opts.delete);

        let hierarchy = self.open_hierarchy_mut(HIERARCHY_DEFAULT_KEY, true)?;
        hierarchy.add_hierarchy(node_id, &[], &[])?;

        if !value_ids.is_empty() {
            if is_parents {
                hierarchy.set_parents(node_id, &value_ids)?;
            } else {
                hierarchy.set_children(node_id, &value_ids)?;
            }
        } else {
            if !add_ids.is_empty() {
                if is_parents {
                    hierarchy.add_hierarchy(node_id, &add_ids, &[])?;
                } else {
                    hierarchy.add_hierarchy(node_id, &[], &add_ids)?;
                }
            }
            if !delete_ids.is_empty() {
                if is_parents {
                    hierarchy.del_hierarchy(node_id, &delete_ids, &[])?;
                } else {
                    hierarchy.del_hierarchy(node_id, &[], &delete_ids)?;
                }
            }
        }

        Ok(())
    }

    fn record_field_change(&mut self, node_id: &NodeId, field: &str) {
        if let Some(DbValue::Hierarchy(h)) = self.entries.get_mut(HIERARCHY_DEFAULT_KEY) {
            h.record_field_change(*node_id, field);
        }
    }

    /// Serializes the whole keyspace, the node field objects and the id
    /// counter.
    pub fn save_snapshot(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(DB_SNAPSHOT_MAGIC);
        write_varint(DB_ENCODING_VERSION as u64, &mut out);

        write_varint(self.entries.len() as u64, &mut out);
        for (key, value) in &self.entries {
            write_string(key, &mut out);
            let mut payload = Vec::new();
            match value {
                DbValue::Object(obj) => {
                    out.push(0);
                    object::snapshot_save(obj, &mut payload);
                }
                DbValue::Hierarchy(h) => {
                    out.push(1);
                    hierarchy::snapshot_save(h, &mut payload);
                }
            }
            write_varint(payload.len() as u64, &mut out);
            out.extend_from_slice(&payload);
        }

        write_varint(self.fields.len() as u64, &mut out);
        for (node, obj) in &self.fields {
            out.extend_from_slice(node.as_bytes());
            let mut payload = Vec::new();
            object::snapshot_save(obj, &mut payload);
            write_varint(payload.len() as u64, &mut out);
            out.extend_from_slice(&payload);
        }

        write_varint(self.next_suffix, &mut out);
        out
    }

    /// Loads a snapshot produced by [`Db::save_snapshot`].
    ///
    /// A key whose payload cannot be decoded is logged and skipped; the
    /// rest of the snapshot still loads.
    pub fn load_snapshot(bytes: &[u8], events: EventQueue) -> Result<Self> {
        let mut reader = SnapshotReader::new(bytes);
        if reader.take(DB_SNAPSHOT_MAGIC.len())? != DB_SNAPSHOT_MAGIC {
            return Err(Error::corrupt("bad snapshot magic"));
        }
        let version = u32::try_from(reader.read_varint()?)
            .map_err(|_| Error::corrupt("snapshot version out of range"))?;
        if version != DB_ENCODING_VERSION {
            return Err(Error::VersionMismatch);
        }

        let mut db = Self::with_events(events);

        let entry_count = reader.read_varint()?;
        for _ in 0..entry_count {
            let key = reader.read_string()?;
            let kind = reader.take(1)?[0];
            let payload_len = reader.read_varint()? as usize;
            let payload = reader.take(payload_len)?;
            let mut inner = SnapshotReader::new(payload);

            match kind {
                0 => match object::snapshot_load(&mut inner, version) {
                    Ok(obj) => {
                        db.entries.insert(key, DbValue::Object(obj));
                    }
                    Err(err) => warn!(%key, %err, "skipping undecodable object key"),
                },
                1 => match hierarchy::snapshot_load(&mut inner, version) {
                    Ok(h) => {
                        db.entries.insert(key, DbValue::Hierarchy(h));
                    }
                    Err(err) => warn!(%key, %err, "skipping undecodable hierarchy key"),
                },
                _ => warn!(%key, kind, "skipping key of unknown kind"),
            }
        }

        let field_count = reader.read_varint()?;
        for _ in 0..field_count {
            let node = NodeId::from_exact(reader.take(crate::types::NODE_ID_SIZE)?)?;
            let payload_len = reader.read_varint()? as usize;
            let payload = reader.take(payload_len)?;
            let mut inner = SnapshotReader::new(payload);
            match object::snapshot_load(&mut inner, version) {
                Ok(obj) => {
                    db.fields.insert(node, obj);
                }
                Err(err) => warn!(node = %node, %err, "skipping undecodable field object"),
            }
        }

        db.next_suffix = reader.read_varint()?;
        Ok(db)
    }
}

fn arg_str<'a>(argv: &'a [Bytes], index: usize) -> Result<&'a str> {
    let raw = argv.get(index).ok_or(Error::Invalid)?;
    std::str::from_utf8(raw).map_err(|_| Error::Invalid)
}

fn add_set_entry(obj: &mut TypedObject, field: &str, entry: &[u8]) -> Result<()> {
    let value = String::from_utf8_lossy(entry);
    match obj.add_set(field, value.as_ref()) {
        Ok(()) | Err(Error::Exists) => Ok(()),
        Err(err) => Err(err),
    }
}

fn reply_value(value: &ObjectValue) -> Reply {
    match value {
        ObjectValue::Null => Reply::Null,
        ObjectValue::Double(v) => Reply::Double(*v),
        ObjectValue::Long(v) => Reply::Long(*v),
        ObjectValue::String(s) => Reply::Str(s.clone()),
        ObjectValue::Object(obj) => reply_object(obj),
        ObjectValue::Set(set) => {
            Reply::Array(set.iter().map(|el| Reply::Str(el.clone())).collect())
        }
        ObjectValue::Array { .. } => Reply::error(&Error::WrongType),
    }
}

fn reply_object(obj: &TypedObject) -> Reply {
    let mut items = Vec::with_capacity(obj.key_count() * 2);
    for (name, value) in obj.iter() {
        items.push(Reply::Str(name.to_string()));
        items.push(reply_value(value));
    }
    Reply::Array(items)
}
