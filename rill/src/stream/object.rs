use crate::dispatch::{DispatchList, Subscription};
use crate::error::StreamError;
use crate::stream::core::StreamCore;
use crate::stream::{Element, Message, Reactive, Writable};

use itertools::Itertools;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// One field-level difference between two object snapshots.  Paths are
/// dotted (`"position.x"`); a removed field carries `Value::Null` as its new
/// value, an added one carries `previous: None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub path: String,
    pub previous: Option<Value>,
    pub value: Value,
}

/// A stream of whole typed objects that also reports what changed between
/// consecutive snapshots.
///
/// The stream keeps a JSON tree of the last snapshot.  Wholesale [set]s and
/// partial [update]s are diffed against that tree; a write that changes
/// nothing is a silent no-op.  Value subscribers always see the full object,
/// diff subscribers see the change list, and field subscribers see individual
/// changes for the path they watch.
///
/// [set]: Writable::set
/// [update]: ObjectStream::update
pub struct ObjectStream<T: Element> {
    me: Weak<ObjectStream<T>>,
    core: Rc<StreamCore<T>>,
    tree: RefCell<Value>,
    diffs: DispatchList<Vec<Change>>,
    fields: DispatchList<Change>,
    eq: Box<dyn Fn(&Value, &Value) -> bool>,
}

/// Creates an [ObjectStream] seeded with `initial`, gated by structural
/// equality of the JSON trees.
pub fn object<T>(initial: T) -> Result<Rc<ObjectStream<T>>, StreamError>
where
    T: Element + Serialize + DeserializeOwned,
{
    ObjectStream::with_equality(initial, |a: &Value, b: &Value| a == b)
}

impl<T> ObjectStream<T>
where
    T: Element + Serialize + DeserializeOwned,
{
    /// Creates a stream gated by a caller-supplied equivalence over the JSON
    /// snapshots, for objects where structural equality is too strict (a
    /// timestamp that always moves, a reading inside tolerance).  A write
    /// the equivalence deems equal to the current snapshot is a silent
    /// no-op and leaves the snapshot untouched.
    pub fn with_equality(
        initial: T,
        eq: impl Fn(&Value, &Value) -> bool + 'static,
    ) -> Result<Rc<Self>, StreamError> {
        let tree = to_tree(&initial)?;
        let stream = Rc::new_cyclic(|me| ObjectStream {
            me: me.clone(),
            core: StreamCore::new(),
            tree: RefCell::new(tree),
            diffs: DispatchList::new(),
            fields: DispatchList::new(),
            eq: Box::new(eq),
        });
        stream.core.set(initial)?;
        Ok(stream)
    }

    /// Merges a partial JSON tree into the current snapshot.  Objects merge
    /// recursively, everything else replaces.  Field subscribers are
    /// notified per change.
    pub fn update(&self, partial: &Value) -> Result<(), StreamError> {
        let mut next = self.tree.borrow().clone();
        merge(&mut next, partial);
        self.commit(next, true)
    }

    /// Writes one field by dotted path.  Unlike [update](Self::update), the
    /// path must already exist in the snapshot.
    pub fn update_field(&self, path: &str, value: Value) -> Result<(), StreamError> {
        let mut next = self.tree.borrow().clone();
        let slot = lookup_mut(&mut next, path)
            .ok_or_else(|| StreamError::UnknownField(path.to_string()))?;
        *slot = value;
        self.commit(next, true)
    }

    /// Subscribes to per-write change lists.
    pub fn on_diff(&self, handler: Box<dyn FnMut(&Vec<Change>)>) -> Subscription {
        if self.core.is_disposed() {
            return Subscription::noop();
        }
        let id = self.diffs.add(handler);
        let me = self.me.clone();
        Subscription::new(move || {
            if let Some(stream) = me.upgrade() {
                stream.diffs.remove(id);
            }
        })
    }

    /// Subscribes to changes of one dotted path, or every path with `"*"`.
    /// Only field-level writes ([update](Self::update) and
    /// [update_field](Self::update_field)) reach field subscribers;
    /// wholesale [set](Writable::set)s do not.
    pub fn on_field(&self, path: &str, mut handler: Box<dyn FnMut(&Change)>) -> Subscription {
        if self.core.is_disposed() {
            return Subscription::noop();
        }
        let path = path.to_string();
        let id = self.fields.add(Box::new(move |change: &Change| {
            if path == "*" || change.path == path {
                handler(change);
            }
        }));
        let me = self.me.clone();
        Subscription::new(move || {
            if let Some(stream) = me.upgrade() {
                stream.fields.remove(id);
            }
        })
    }

    /// Derives a stream of one field's values.  It starts with the field's
    /// current value and disposes when this stream does.  Built on the diff
    /// feed, so wholesale [set](Writable::set)s reach it too.
    pub fn field(&self, path: &str) -> Result<Rc<dyn Reactive<Value>>, StreamError> {
        let current = lookup(&self.tree.borrow(), path)
            .ok_or_else(|| StreamError::UnknownField(path.to_string()))?;
        let out = StreamCore::<Value>::new();
        out.set(current)?;
        let sink = out.clone();
        let watched = path.to_string();
        let me = self.me.clone();
        let sub = self.on_diff(Box::new(move |changes| {
            let touched = changes
                .iter()
                .any(|c| c.path == watched || c.path.starts_with(&format!("{watched}.")));
            if !touched {
                return;
            }
            // re-read through the tree: the watched path may be an object
            // node while the diff reports leaf-level changes beneath it
            if let Some(stream) = me.upgrade() {
                if let Some(value) = lookup(&stream.tree.borrow(), &watched) {
                    let _ = sink.set(value);
                }
            }
        }));
        out.add_disposer(move |_| sub.unsubscribe());
        let downstream = Rc::downgrade(&out);
        self.core.add_disposer(move |reason| {
            if let Some(out) = downstream.upgrade() {
                out.dispose(reason);
            }
        });
        Ok(out)
    }

    /// The current snapshot as a JSON tree.
    pub fn snapshot(&self) -> Value {
        self.tree.borrow().clone()
    }

    fn commit(&self, next: Value, notify_fields: bool) -> Result<(), StreamError> {
        let changes = {
            let tree = self.tree.borrow();
            if (self.eq)(&tree, &next) {
                return Ok(());
            }
            let mut changes = Vec::new();
            diff("", &tree, &next, &mut changes);
            changes
        };
        let object = from_tree(&next)?;
        *self.tree.borrow_mut() = next;
        self.core.set(object)?;
        self.diffs.notify(&changes);
        if notify_fields {
            for change in &changes {
                self.fields.notify(change);
            }
        }
        Ok(())
    }
}

impl<T> Reactive<T> for ObjectStream<T>
where
    T: Element + Serialize + DeserializeOwned,
{
    fn on(&self, handler: Box<dyn FnMut(&Message<T>)>) -> Subscription {
        self.core.on(handler)
    }

    fn on_value(&self, handler: Box<dyn FnMut(&T)>) -> Subscription {
        self.core.on_value(handler)
    }

    fn last(&self) -> Option<T> {
        self.core.last()
    }

    fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    fn dispose(&self, reason: &str) {
        self.core.dispose(reason);
        self.diffs.clear();
        self.fields.clear();
    }
}

impl<T> Writable<T> for ObjectStream<T>
where
    T: Element + Serialize + DeserializeOwned,
{
    /// Replaces the whole snapshot.  Diff subscribers still learn what
    /// changed; field subscribers stay quiet on wholesale replacement.
    fn set(&self, value: T) -> Result<(), StreamError> {
        if self.core.is_disposed() {
            return self.core.set(value);
        }
        let next = to_tree(&value)?;
        self.commit(next, false)
    }
}

fn to_tree<T: Serialize>(value: &T) -> Result<Value, StreamError> {
    serde_json::to_value(value).map_err(|err| StreamError::Serialize(err.to_string()))
}

fn from_tree<T: DeserializeOwned>(tree: &Value) -> Result<T, StreamError> {
    serde_json::from_value(tree.clone()).map_err(|err| StreamError::Serialize(err.to_string()))
}

/// Walks two trees and records every leaf-level difference with its dotted
/// path.  Object nodes recurse over the union of their keys; any other node
/// pair that differs is one change.
fn diff(prefix: &str, old: &Value, new: &Value, out: &mut Vec<Change>) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(before), Value::Object(after)) => {
            for key in before.keys().chain(after.keys()).unique() {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match (before.get(key), after.get(key)) {
                    (Some(old), Some(new)) => diff(&path, old, new, out),
                    (Some(old), None) => out.push(Change {
                        path,
                        previous: Some(old.clone()),
                        value: Value::Null,
                    }),
                    (None, Some(new)) => out.push(Change {
                        path,
                        previous: None,
                        value: new.clone(),
                    }),
                    (None, None) => {}
                }
            }
        }
        _ => out.push(Change {
            path: prefix.to_string(),
            previous: Some(old.clone()),
            value: new.clone(),
        }),
    }
}

fn merge(tree: &mut Value, patch: &Value) {
    match (tree, patch) {
        (Value::Object(tree), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(tree.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (tree, patch) => *tree = patch.clone(),
    }
}

fn lookup(tree: &Value, path: &str) -> Option<Value> {
    let mut node = tree;
    for segment in path.split('.') {
        node = node.get(segment)?;
    }
    Some(node.clone())
}

fn lookup_mut<'a>(tree: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut node = tree;
    for segment in path.split('.') {
        node = node.get_mut(segment)?;
    }
    Some(node)
}
