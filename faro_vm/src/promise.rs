//! Promise state machine (C10, §4.10): pending/fulfilled/rejected with
//! reaction lists drained exclusively through the microtask queue (§5).
//! Settlement of a promise with another same-realm promise chains their
//! reactions instead of running the full generic "thenable" adoption
//! protocol a hosted engine needs for cross-realm interop — §1 scopes
//! module/realm isolation out, so one promise class per `Agent` is enough.

use crate::execution::Agent;
use crate::object::{ClassId, Exotic, ObjectData, ObjectId};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled,
    Rejected,
}

type ReactionJob = Box<dyn FnOnce(&mut Agent, Value)>;

struct Reaction {
    job: ReactionJob,
}

pub struct PromiseData {
    pub state: PromiseStatus,
    pub result: Value,
    fulfill_reactions: Vec<Reaction>,
    reject_reactions: Vec<Reaction>,
}

impl std::fmt::Debug for PromiseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseData")
            .field("state", &self.state)
            .field("result", &self.result)
            .field("pending_fulfill", &self.fulfill_reactions.len())
            .field("pending_reject", &self.reject_reactions.len())
            .finish()
    }
}

pub fn new_promise(agent: &mut Agent) -> ObjectId {
    let mut data = ObjectData::new(ClassId::Promise, Some(agent.realm.intrinsics.promise_prototype));
    data.exotic = Exotic::Promise(Rc::new(RefCell::new(PromiseData {
        state: PromiseStatus::Pending,
        result: Value::Undefined,
        fulfill_reactions: Vec::new(),
        reject_reactions: Vec::new(),
    })));
    agent.heap.allocate(data)
}

fn cell(agent: &Agent, id: ObjectId) -> Rc<RefCell<PromiseData>> {
    match &agent.heap.get(id).exotic {
        Exotic::Promise(c) => c.clone(),
        _ => panic!("object is not a promise"),
    }
}

pub fn status(agent: &Agent, id: ObjectId) -> PromiseStatus {
    cell(agent, id).borrow().state
}

/// `FulfillPromise`/`RejectPromise`, merged: `Ok` fulfills, `Err` rejects.
/// Settling an already-settled promise is a no-op (§4.10 "settles exactly
/// once").
fn settle(agent: &mut Agent, id: ObjectId, outcome: Result<Value, Value>) {
    let c = cell(agent, id);
    let already_settled = c.borrow().state != PromiseStatus::Pending;
    if already_settled {
        return;
    }
    let value = match &outcome {
        Ok(v) | Err(v) => v.clone(),
    };
    {
        let mut data = c.borrow_mut();
        data.state = if outcome.is_ok() { PromiseStatus::Fulfilled } else { PromiseStatus::Rejected };
        data.result = value.clone();
    }
    let reactions = {
        let mut data = c.borrow_mut();
        if outcome.is_ok() {
            let r = std::mem::take(&mut data.fulfill_reactions);
            data.reject_reactions.clear();
            r
        } else {
            let r = std::mem::take(&mut data.reject_reactions);
            data.fulfill_reactions.clear();
            r
        }
    };
    for reaction in reactions {
        let v = value.clone();
        agent.enqueue_microtask(Box::new(move |agent| (reaction.job)(agent, v)));
    }
}

/// `ResolvePromise`: adopts another same-realm promise's eventual state
/// instead of fulfilling with the promise object itself.
pub fn resolve(agent: &mut Agent, id: ObjectId, value: Value) {
    if let Value::Object(obj) = value {
        if obj != id && agent.heap.get(obj).class_id == ClassId::Promise {
            let target = id;
            on_settle(
                agent,
                obj,
                Box::new(move |agent, outcome| settle(agent, target, outcome)),
            );
            return;
        }
    }
    settle(agent, id, Ok(value));
}

pub fn reject(agent: &mut Agent, id: ObjectId, reason: Value) {
    settle(agent, id, Err(reason));
}

/// Registers `callback` to run (as a microtask) once `id` settles, or
/// immediately enqueues it if `id` has already settled.
pub fn on_settle(
    agent: &mut Agent,
    id: ObjectId,
    callback: Box<dyn FnOnce(&mut Agent, Result<Value, Value>)>,
) {
    let c = cell(agent, id);
    let state = c.borrow().state;
    match state {
        PromiseStatus::Pending => {
            let shared = Rc::new(RefCell::new(Some(callback)));
            let fulfill_cb = shared.clone();
            let reject_cb = shared;
            c.borrow_mut().fulfill_reactions.push(Reaction {
                job: Box::new(move |agent, v| {
                    if let Some(cb) = fulfill_cb.borrow_mut().take() {
                        cb(agent, Ok(v));
                    }
                }),
            });
            c.borrow_mut().reject_reactions.push(Reaction {
                job: Box::new(move |agent, v| {
                    if let Some(cb) = reject_cb.borrow_mut().take() {
                        cb(agent, Err(v));
                    }
                }),
            });
        }
        PromiseStatus::Fulfilled => {
            let v = c.borrow().result.clone();
            agent.enqueue_microtask(Box::new(move |agent| callback(agent, Ok(v))));
        }
        PromiseStatus::Rejected => {
            let v = c.borrow().result.clone();
            agent.enqueue_microtask(Box::new(move |agent| callback(agent, Err(v))));
        }
    }
}

/// `Promise.prototype.then`: runs `on_fulfilled`/`on_rejected` as a
/// reaction job once `id` settles, resolving the returned promise with
/// whatever that handler returns (or propagating if the matching handler
/// isn't callable, per the spec's "passthrough" behavior).
pub fn then(agent: &mut Agent, id: ObjectId, on_fulfilled: Value, on_rejected: Value) -> ObjectId {
    let result = new_promise(agent);
    on_settle(
        agent,
        id,
        Box::new(move |agent, outcome| {
            let (handler, value, is_fulfill) = match outcome {
                Ok(v) => (on_fulfilled, v, true),
                Err(v) => (on_rejected, v, false),
            };
            if agent.is_callable(&handler) {
                match agent.call(handler, Value::Undefined, &[value]) {
                    Ok(v) => resolve(agent, result, v),
                    Err(e) => reject(agent, result, e.into_value()),
                }
            } else if is_fulfill {
                resolve(agent, result, value);
            } else {
                reject(agent, result, value);
            }
        }),
    );
    result
}

pub fn resolved_with(agent: &mut Agent, value: Value) -> ObjectId {
    let id = new_promise(agent);
    resolve(agent, id, value);
    id
}

pub fn rejected_with(agent: &mut Agent, reason: Value) -> ObjectId {
    let id = new_promise(agent);
    reject(agent, id, reason);
    id
}
