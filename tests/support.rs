//! Fake host collaborators for integration tests, in the style of `DemoFS`:
//! a minimal in-memory struct backing the trait, good enough to drive a
//! handful of concrete scenarios rather than a full reference port graph.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use remote_port_protocol::error::ConnectError;
use remote_port_protocol::host::{PortGraph, PortInfo, StructureGuard, StructureLock};
use remote_port_protocol::subscription::Connector;
use remote_port_protocol::types::{Handle, PortFlags, PortPath, Strategy};

#[derive(Clone)]
pub struct FakePort {
    pub info: PortInfo,
    pub last_value: Option<Vec<u8>>,
}

/// An in-memory port graph: a handful of pre-registered ports plus whatever
/// server/conversion ports CONNECT_PORTS creates during the test.
pub struct FakeGraph {
    ports: Mutex<HashMap<Handle, FakePort>>,
    by_path: Mutex<HashMap<String, Handle>>,
    next_handle: AtomicU32,
    /// Set to force `write_value` to fail once, for error-path tests.
    pub reject_writes: AtomicBool,
    connectors: Mutex<HashMap<Handle, Vec<Connector>>>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(HashMap::new()),
            by_path: Mutex::new(HashMap::new()),
            next_handle: AtomicU32::new(1000),
            reject_writes: AtomicBool::new(false),
            connectors: Mutex::new(HashMap::new()),
        }
    }

    /// Installs the connector set a test wants `connectors_for_remote_port`
    /// to report for `remote_port`.
    pub fn set_connectors(&self, remote_port: Handle, connectors: Vec<Connector>) {
        self.connectors.lock().unwrap().insert(remote_port, connectors);
    }

    pub fn register(&self, handle: Handle, path: PortPath, flags: PortFlags, type_index: u32, strategy: Strategy) {
        let key = path.to_string();
        self.ports.lock().unwrap().insert(handle, FakePort {
            info: PortInfo { handle, path, flags, type_index, strategy },
            last_value: None,
        });
        self.by_path.lock().unwrap().insert(key, handle);
    }

    pub fn last_value(&self, handle: Handle) -> Option<Vec<u8>> {
        self.ports.lock().unwrap().get(&handle).and_then(|p| p.last_value.clone())
    }

    pub fn port_count(&self) -> usize {
        self.ports.lock().unwrap().len()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.ports.lock().unwrap().contains_key(&handle)
    }
}

impl Default for FakeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortGraph for FakeGraph {
    async fn resolve(&self, path: &PortPath) -> Option<Handle> {
        self.by_path.lock().unwrap().get(&path.to_string()).copied()
    }

    async fn port_info(&self, handle: Handle) -> Option<PortInfo> {
        self.ports.lock().unwrap().get(&handle).map(|p| p.info.clone())
    }

    async fn shared_ports(&self) -> Vec<PortInfo> {
        self.ports
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.info.flags.has(PortFlags::SHARED))
            .map(|p| p.info.clone())
            .collect()
    }

    async fn write_value(&self, handle: Handle, raw_value: &[u8]) -> Result<(), ConnectError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(ConnectError::HostRejected);
        }
        let mut ports = self.ports.lock().unwrap();
        match ports.get_mut(&handle) {
            Some(p) => {
                p.last_value = Some(raw_value.to_vec());
                Ok(())
            }
            None => Err(ConnectError::PortNotFound),
        }
    }

    async fn pull_value(&self, handle: Handle) -> Option<Vec<u8>> {
        self.ports.lock().unwrap().get(&handle).and_then(|p| p.last_value.clone())
    }

    async fn create_server_port(&self, served_port: Handle, flags: PortFlags, type_index: u32) -> Result<Handle, ConnectError> {
        let handle = Handle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let path = PortPath::local(vec!["__server".into(), served_port.to_string()]);
        self.register(handle, path, flags, type_index, Strategy::NONE);
        Ok(handle)
    }

    async fn create_conversion_port(
        &self,
        source_port: Handle,
        destination_type_index: u32,
        _operations: &[(String, String)],
    ) -> Result<Handle, ConnectError> {
        let handle = Handle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let path = PortPath::local(vec!["__conversion".into(), source_port.to_string()]);
        self.register(handle, path, PortFlags::default(), destination_type_index, Strategy::NONE);
        Ok(handle)
    }

    async fn remove_port(&self, handle: Handle) {
        let path = self.ports.lock().unwrap().remove(&handle).map(|p| p.info.path.to_string());
        if let Some(path) = path {
            self.by_path.lock().unwrap().remove(&path);
        }
    }

    async fn update_dynamic_parameters(&self, handle: Handle, strategy: Strategy, _min_interval_ms: i32, _high_priority: bool) {
        if let Some(p) = self.ports.lock().unwrap().get_mut(&handle) {
            p.info.strategy = strategy;
        }
    }

    async fn connectors_for_remote_port(&self, remote_port: Handle) -> Vec<Connector> {
        self.connectors.lock().unwrap().get(&remote_port).cloned().unwrap_or_default()
    }
}

struct FakeGuard;
impl StructureGuard for FakeGuard {}

/// Always succeeds, unless `locked` is held — lets tests exercise the defer
/// path deterministically.
#[derive(Default)]
pub struct FakeStructureLock {
    pub locked: AtomicBool,
}

impl StructureLock for FakeStructureLock {
    fn try_lock(&self) -> Option<Box<dyn StructureGuard + '_>> {
        if self.locked.load(Ordering::SeqCst) {
            None
        } else {
            Some(Box::new(FakeGuard))
        }
    }
}
