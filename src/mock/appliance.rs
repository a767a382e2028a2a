use crate::model::{Cidr, Vendor};
use crate::vendor::avi::{self, obj_ref};
use crate::vendor::netscaler as ns;
use crate::vendor::rpc::{Authenticator, Credentials, RpcError, VendorSession};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

const NITRO: &str = "/nitro/v1/config/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

struct Injected {
    method: Method,
    path_fragment: String,
    error: RpcError,
    /// `None` fails every matching call.
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Vec<Value>>,
    calls: Vec<String>,
    injected: Vec<Injected>,
    mutations: usize,
    latency: Option<Duration>,
}

/// NITRO binding resources: parent kind and field, and the bound child's kind and field.
struct BindingSpec {
    kind: &'static str,
    parent: (&'static str, &'static str),
    child: Option<(&'static str, &'static str)>,
}

const NITRO_BINDINGS: &[BindingSpec] = &[
    BindingSpec {
        kind: ns::SG_MEMBER_BINDING,
        parent: (ns::SERVICE_GROUP, "servicegroupname"),
        child: None,
    },
    BindingSpec {
        kind: ns::SG_MONITOR_BINDING,
        parent: (ns::SERVICE_GROUP, "servicegroupname"),
        child: Some((ns::LB_MONITOR, "monitor_name")),
    },
    BindingSpec {
        kind: ns::SG_CERT_BINDING,
        parent: (ns::SERVICE_GROUP, "servicegroupname"),
        child: Some((ns::SSL_CERT_KEY, "certkeyname")),
    },
    BindingSpec {
        kind: ns::VSERVER_SG_BINDING,
        parent: (ns::LB_VSERVER, "name"),
        child: Some((ns::SERVICE_GROUP, "servicegroupname")),
    },
    BindingSpec {
        kind: ns::VSERVER_CERT_BINDING,
        parent: (ns::LB_VSERVER, "vservername"),
        child: Some((ns::SSL_CERT_KEY, "certkeyname")),
    },
];

fn nitro_key(kind: &str) -> &'static str {
    match kind {
        k if k == ns::LB_MONITOR => "monitorname",
        k if k == ns::SSL_CERT_KEY => "certkey",
        k if k == ns::SERVICE_GROUP => "servicegroupname",
        k if k == ns::NS_IP => "ipaddress",
        k if k == ns::ROUTE => "network",
        _ => "name",
    }
}

fn binding_spec(kind: &str) -> Option<&'static BindingSpec> {
    NITRO_BINDINGS.iter().find(|b| b.kind == kind)
}

fn field(row: &Value, name: &str) -> String {
    match row.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn not_found(what: impl Into<String>) -> RpcError {
    RpcError::NotFound(what.into())
}

fn bad_request(message: impl Into<String>) -> RpcError {
    RpcError::Rejected {
        status: 400,
        message: message.into(),
    }
}

/// An in-memory appliance speaking either the Avi object API or NITRO.
///
/// Names are unique per kind, deleting an object something still refers to is a
/// conflict, and NITRO parents take their binding rows with them when removed.
pub struct MockAppliance {
    vendor: Vendor,
    address: String,
    state: Mutex<State>,
    next_id: AtomicU64,
    generation: AtomicU64,
}

impl MockAppliance {
    pub fn new(vendor: Vendor, address: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            vendor,
            address: address.into(),
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1),
            generation: AtomicU64::new(0),
        })
    }

    pub fn avi(address: impl Into<String>) -> Arc<Self> {
        Self::new(Vendor::Avi, address)
    }

    pub fn netscaler(address: impl Into<String>) -> Arc<Self> {
        Self::new(Vendor::Netscaler, address)
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// A session bound to the current login generation.
    pub fn session(self: &Arc<Self>) -> Arc<dyn VendorSession> {
        Arc::new(MockSession {
            appliance: self.clone(),
            generation: self.generation.load(Ordering::SeqCst),
        })
    }

    /// Invalidates every session handed out so far.
    pub fn expire_sessions(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Makes the next `times` calls whose path contains `path_fragment` fail.
    pub fn fail_next(&self, method: Method, path_fragment: &str, error: RpcError, times: usize) {
        self.inject(method, path_fragment, error, Some(times));
    }

    pub fn fail_always(&self, method: Method, path_fragment: &str, error: RpcError) {
        self.inject(method, path_fragment, error, None);
    }

    pub fn clear_failures(&self) {
        self.lock().injected.clear();
    }

    /// Adds an object directly, bypassing name checks. Returns its identity.
    pub fn seed(&self, kind: &str, mut object: Value) -> String {
        let mut state = self.lock();
        let id = match self.vendor {
            Vendor::Avi => {
                let uuid = match object.get("uuid").and_then(Value::as_str) {
                    Some(uuid) => uuid.to_string(),
                    None => self.next_uuid(kind),
                };
                object["uuid"] = json!(uuid);
                object["url"] = json!(obj_ref(kind, &uuid));
                uuid
            }
            Vendor::Netscaler => field(&object, nitro_key(kind)),
        };
        state.objects.entry(kind.to_string()).or_default().push(object);
        id
    }

    /// Makes `network` reachable: an Avi network object, or a NITRO route in traffic
    /// domain 0.
    pub fn add_network(&self, name: &str, network: Cidr) -> String {
        match self.vendor {
            Vendor::Avi => self.seed(
                avi::NETWORK,
                json!({
                    "name": name,
                    "configured_subnets": [{
                        "prefix": {
                            "ip_addr": { "addr": network.network().to_string(), "type": "V4" },
                            "mask": network.prefix(),
                        }
                    }]
                }),
            ),
            Vendor::Netscaler => self.seed(
                ns::ROUTE,
                json!({
                    "network": network.network().to_string(),
                    "netmask": network.netmask().to_string(),
                    "gateway": "0.0.0.0",
                    "td": 0,
                }),
            ),
        }
    }

    pub fn objects(&self, kind: &str) -> Vec<Value> {
        self.lock().objects.get(kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.lock().objects.get(kind).map_or(0, Vec::len)
    }

    /// An object by identity: uuid on Avi, key field on NITRO.
    pub fn object(&self, kind: &str, id: &str) -> Option<Value> {
        let key = self.key_field(kind);
        self.lock()
            .objects
            .get(kind)?
            .iter()
            .find(|row| field(row, key) == id)
            .cloned()
    }

    /// An object by its `name` field on Avi, or key field on NITRO.
    pub fn object_named(&self, kind: &str, name: &str) -> Option<Value> {
        let key = match self.vendor {
            Vendor::Avi => "name",
            Vendor::Netscaler => nitro_key(kind),
        };
        self.lock()
            .objects
            .get(kind)?
            .iter()
            .find(|row| field(row, key) == name)
            .cloned()
    }

    /// Overwrites fields of an object behind the control plane's back.
    pub fn patch(&self, kind: &str, id: &str, fields: Value) -> bool {
        let key = self.key_field(kind);
        let mut state = self.lock();
        let Some(row) = state
            .objects
            .get_mut(kind)
            .and_then(|rows| rows.iter_mut().find(|row| field(row, key) == id))
        else {
            return false;
        };
        if let (Some(target), Value::Object(fields)) = (row.as_object_mut(), fields) {
            target.extend(fields);
        }
        true
    }

    /// `METHOD path` of every call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Successful writes so far.
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    fn key_field(&self, kind: &str) -> &'static str {
        match self.vendor {
            Vendor::Avi => "uuid",
            Vendor::Netscaler => nitro_key(kind),
        }
    }

    fn next_uuid(&self, kind: &str) -> String {
        format!("{kind}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn inject(
        &self,
        method: Method,
        path_fragment: &str,
        error: RpcError,
        remaining: Option<usize>,
    ) {
        self.lock().injected.push(Injected {
            method,
            path_fragment: path_fragment.to_string(),
            error,
            remaining,
        });
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every later call.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn call(
        &self,
        generation: u64,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RpcError> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        state.calls.push(format!("{} {path}", method.as_str()));
        trace!(appliance = %self.address, method = method.as_str(), %path, "mock call");

        if generation != self.generation.load(Ordering::SeqCst) {
            return Err(RpcError::SessionExpired);
        }
        if let Some(error) = take_injected(&mut state, method, path) {
            debug!(appliance = %self.address, %path, %error, "Injected failure");
            return Err(error);
        }

        let result = match self.vendor {
            Vendor::Avi => self.serve_avi(&mut state, method, path, body),
            Vendor::Netscaler => self.serve_nitro(&mut state, method, path, body),
        };
        if result.is_ok() && method != Method::Get {
            state.mutations += 1;
        }
        result
    }

    fn serve_avi(
        &self,
        state: &mut State,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RpcError> {
        let (path, query) = path.split_once('?').unwrap_or((path, ""));
        let rest = path
            .strip_prefix("/api/")
            .ok_or_else(|| not_found(path))?
            .trim_end_matches('/');
        let (kind, id) = match rest.split_once('/') {
            Some((kind, id)) => (kind, Some(id)),
            None => (rest, None),
        };
        let name_filter = query.strip_prefix("name=");

        match (method, id) {
            (Method::Get, None) => {
                let rows: Vec<Value> = state
                    .objects
                    .get(kind)
                    .into_iter()
                    .flatten()
                    .filter(|row| name_filter.map_or(true, |name| field(row, "name") == name))
                    .cloned()
                    .collect();
                Ok(json!({ "count": rows.len(), "results": rows }))
            }
            (Method::Get, Some(uuid)) => state
                .objects
                .get(kind)
                .and_then(|rows| rows.iter().find(|row| field(row, "uuid") == uuid))
                .cloned()
                .ok_or_else(|| not_found(format!("{kind} {uuid}"))),
            (Method::Post, None) => {
                let mut object = body.ok_or_else(|| bad_request("missing body"))?;
                let name = field(&object, "name");
                if name.is_empty() {
                    return Err(bad_request("name is required"));
                }
                let rows = state.objects.entry(kind.to_string()).or_default();
                if rows.iter().any(|row| field(row, "name") == name) {
                    return Err(RpcError::Conflict(format!("{kind} named '{name}' already exists")));
                }
                let uuid = self.next_uuid(kind);
                object["uuid"] = json!(uuid);
                object["url"] = json!(obj_ref(kind, &uuid));
                rows.push(object.clone());
                Ok(object)
            }
            (Method::Put, Some(uuid)) => {
                let mut object = body.ok_or_else(|| bad_request("missing body"))?;
                let name = field(&object, "name");
                let rows = state
                    .objects
                    .get_mut(kind)
                    .ok_or_else(|| not_found(format!("{kind} {uuid}")))?;
                if rows
                    .iter()
                    .any(|row| field(row, "name") == name && field(row, "uuid") != uuid)
                {
                    return Err(RpcError::Conflict(format!("{kind} named '{name}' already exists")));
                }
                let slot = rows
                    .iter_mut()
                    .find(|row| field(row, "uuid") == uuid)
                    .ok_or_else(|| not_found(format!("{kind} {uuid}")))?;
                object["uuid"] = json!(uuid);
                object["url"] = json!(obj_ref(kind, uuid));
                *slot = object.clone();
                Ok(object)
            }
            (Method::Delete, Some(uuid)) => {
                let exists = state
                    .objects
                    .get(kind)
                    .is_some_and(|rows| rows.iter().any(|row| field(row, "uuid") == uuid));
                if !exists {
                    return Err(not_found(format!("{kind} {uuid}")));
                }
                let target = obj_ref(kind, uuid);
                if let Some(holder) = avi_holder(state, &target) {
                    return Err(RpcError::Conflict(format!(
                        "{kind} {uuid} is referred to by {holder}"
                    )));
                }
                if let Some(rows) = state.objects.get_mut(kind) {
                    rows.retain(|row| field(row, "uuid") != uuid);
                }
                Ok(json!({}))
            }
            _ => Err(bad_request(format!("unsupported {} {path}", method.as_str()))),
        }
    }

    fn serve_nitro(
        &self,
        state: &mut State,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RpcError> {
        let (path, query) = path.split_once('?').unwrap_or((path, ""));
        let rest = path.strip_prefix(NITRO).ok_or_else(|| not_found(path))?;
        let (kind, name) = match rest.split_once('/') {
            Some((kind, name)) => (kind, Some(name)),
            None => (rest, None),
        };
        let binding = binding_spec(kind);
        let key = nitro_key(kind);

        match (method, name) {
            (Method::Get, None) => {
                let rows = state.objects.get(kind).cloned().unwrap_or_default();
                Ok(json!({ kind: rows }))
            }
            (Method::Get, Some(name)) => {
                let rows = state.objects.get(kind).map(Vec::as_slice).unwrap_or_default();
                match binding {
                    Some(spec) => {
                        let rows: Vec<&Value> = rows
                            .iter()
                            .filter(|r| field(r, spec.parent.1) == name)
                            .collect();
                        if rows.is_empty() {
                            Ok(json!({}))
                        } else {
                            Ok(json!({ kind: rows }))
                        }
                    }
                    None => rows
                        .iter()
                        .find(|r| field(r, key) == name)
                        .map(|row| json!({ kind: [row] }))
                        .ok_or_else(|| not_found(format!("{kind} {name}"))),
                }
            }
            (Method::Post, None) => {
                let row = unwrap_envelope(kind, body)?;
                if let Some(action) = query.strip_prefix("action=") {
                    return nitro_action(state, kind, action, &row);
                }
                match binding {
                    Some(spec) => nitro_bind(state, spec, row),
                    None => {
                        let id = field(&row, key);
                        if id.is_empty() {
                            return Err(bad_request(format!("{key} is required")));
                        }
                        let rows = state.objects.entry(kind.to_string()).or_default();
                        if rows.iter().any(|r| field(r, key) == id) {
                            return Err(RpcError::Conflict(format!(
                                "Resource already exists [{id}]"
                            )));
                        }
                        let mut row = row;
                        if kind == ns::LB_VSERVER && row.get("curstate").is_none() {
                            row["curstate"] = json!("UP");
                        }
                        rows.push(row);
                        Ok(json!({}))
                    }
                }
            }
            (Method::Put, None) => {
                let row = unwrap_envelope(kind, body)?;
                let id = field(&row, key);
                let slot = state
                    .objects
                    .get_mut(kind)
                    .and_then(|rows| rows.iter_mut().find(|r| field(r, key) == id))
                    .ok_or_else(|| not_found(format!("{kind} {id}")))?;
                if let (Some(slot), Value::Object(fields)) = (slot.as_object_mut(), row) {
                    slot.extend(fields);
                }
                Ok(json!({}))
            }
            (Method::Delete, Some(name)) => match binding {
                Some(spec) => nitro_unbind(state, spec, name, query),
                None => nitro_remove(state, kind, name),
            },
            _ => Err(bad_request(format!("unsupported {} {path}", method.as_str()))),
        }
    }
}

fn take_injected(state: &mut State, method: Method, path: &str) -> Option<RpcError> {
    let index = state
        .injected
        .iter()
        .position(|i| i.method == method && path.contains(&i.path_fragment))?;
    let injected = &mut state.injected[index];
    let error = injected.error.clone();
    if let Some(remaining) = injected.remaining.as_mut() {
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            state.injected.remove(index);
        }
    }
    Some(error)
}

/// Name of the first Avi object holding a reference to `target`.
fn avi_holder(state: &State, target: &str) -> Option<String> {
    fn refers(value: &Value, target: &str) -> bool {
        match value {
            Value::String(s) => {
                s == target || s.strip_prefix(target).is_some_and(|tail| tail.starts_with('#'))
            }
            Value::Array(items) => items.iter().any(|v| refers(v, target)),
            Value::Object(map) => map.iter().any(|(k, v)| k != "url" && refers(v, target)),
            _ => false,
        }
    }
    state.objects.iter().find_map(|(kind, rows)| {
        rows.iter()
            .find(|row| refers(row, target))
            .map(|row| format!("{kind} '{}'", field(row, "name")))
    })
}

fn unwrap_envelope(kind: &str, body: Option<Value>) -> Result<Value, RpcError> {
    let mut body = body.ok_or_else(|| bad_request("missing body"))?;
    body.get_mut(kind)
        .map(Value::take)
        .filter(Value::is_object)
        .ok_or_else(|| bad_request(format!("body is not wrapped in '{kind}'")))
}

fn nitro_action(
    state: &mut State,
    kind: &str,
    action: &str,
    row: &Value,
) -> Result<Value, RpcError> {
    let name = field(row, nitro_key(kind));
    let slot = state
        .objects
        .get_mut(kind)
        .and_then(|rows| rows.iter_mut().find(|r| field(r, nitro_key(kind)) == name))
        .ok_or_else(|| not_found(format!("{kind} {name}")))?;
    let state_value = match action {
        "enable" => "UP",
        "disable" => crate::vendor::netscaler::schema::OUT_OF_SERVICE,
        other => return Err(bad_request(format!("unknown action {other}"))),
    };
    slot["curstate"] = json!(state_value);
    Ok(json!({}))
}

fn nitro_bind(state: &mut State, spec: &BindingSpec, row: Value) -> Result<Value, RpcError> {
    let parent = field(&row, spec.parent.1);
    let exists = |state: &State, kind: &str, id: &str| {
        state
            .objects
            .get(kind)
            .is_some_and(|rows| rows.iter().any(|r| field(r, nitro_key(kind)) == id))
    };
    if !exists(state, spec.parent.0, &parent) {
        return Err(not_found(format!("{} {parent}", spec.parent.0)));
    }
    if let Some((child_kind, child_field)) = spec.child {
        let child = field(&row, child_field);
        if !exists(state, child_kind, &child) {
            return Err(not_found(format!("{child_kind} {child}")));
        }
    }
    let rows = state.objects.entry(spec.kind.to_string()).or_default();
    if rows.contains(&row) {
        return Err(RpcError::Conflict("Resource already exists".into()));
    }
    rows.push(row);
    Ok(json!({}))
}

fn nitro_unbind(
    state: &mut State,
    spec: &BindingSpec,
    name: &str,
    query: &str,
) -> Result<Value, RpcError> {
    let args: HashMap<&str, &str> = query
        .strip_prefix("args=")
        .unwrap_or_default()
        .split(',')
        .filter_map(|pair| pair.split_once(':'))
        .collect();
    let rows = state
        .objects
        .get_mut(spec.kind)
        .ok_or_else(|| not_found(format!("{} {name}", spec.kind)))?;
    let before = rows.len();
    rows.retain(|row| {
        let matches = field(row, spec.parent.1) == name
            && args.iter().all(|(k, v)| field(row, k) == *v);
        !matches
    });
    if rows.len() == before {
        return Err(not_found(format!("{} {name} {query}", spec.kind)));
    }
    Ok(json!({}))
}

fn nitro_remove(state: &mut State, kind: &str, name: &str) -> Result<Value, RpcError> {
    let key = nitro_key(kind);
    let exists = state
        .objects
        .get(kind)
        .is_some_and(|rows| rows.iter().any(|r| field(r, key) == name));
    if !exists {
        return Err(not_found(format!("{kind} {name}")));
    }
    for spec in NITRO_BINDINGS.iter() {
        let Some((child_kind, child_field)) = spec.child else {
            continue;
        };
        if child_kind != kind {
            continue;
        }
        let holder = state
            .objects
            .get(spec.kind)
            .and_then(|rows| rows.iter().find(|r| field(r, child_field) == name))
            .map(|r| field(r, spec.parent.1));
        if let Some(holder) = holder {
            return Err(RpcError::Conflict(format!(
                "{kind} {name} is bound to {} {holder}",
                spec.parent.0
            )));
        }
    }
    for spec in NITRO_BINDINGS.iter().filter(|s| s.parent.0 == kind) {
        if let Some(rows) = state.objects.get_mut(spec.kind) {
            rows.retain(|r| field(r, spec.parent.1) != name);
        }
    }
    if let Some(rows) = state.objects.get_mut(kind) {
        rows.retain(|r| field(r, key) != name);
    }
    Ok(json!({}))
}

struct MockSession {
    appliance: Arc<MockAppliance>,
    generation: u64,
}

#[async_trait]
impl VendorSession for MockSession {
    async fn get(&self, path: &str) -> Result<Value, RpcError> {
        self.appliance.call(self.generation, Method::Get, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, RpcError> {
        self.appliance.call(self.generation, Method::Post, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, RpcError> {
        self.appliance.call(self.generation, Method::Put, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, RpcError> {
        self.appliance.call(self.generation, Method::Delete, path, None).await
    }
}

/// Logs into the mock appliances it knows by address.
#[derive(Default)]
pub struct MockFabric {
    appliances: Mutex<HashMap<String, Arc<MockAppliance>>>,
    logins: AtomicU64,
    refusals: AtomicU64,
}

impl MockFabric {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, appliance: Arc<MockAppliance>) {
        self.appliances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(appliance.address().to_string(), appliance);
    }

    /// Refuses the next `count` logins with a transport error.
    pub fn refuse_logins(&self, count: u64) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for MockFabric {
    async fn authenticate(
        &self,
        address: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn VendorSession>, RpcError> {
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(RpcError::Transport(format!("{address} refused the connection")));
        }
        if credentials.username.is_empty() {
            return Err(RpcError::Rejected {
                status: 401,
                message: "username is required".into(),
            });
        }
        let appliance = self
            .appliances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(address)
            .cloned()
            .ok_or_else(|| RpcError::Transport(format!("no route to {address}")))?;
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(appliance.session())
    }
}
