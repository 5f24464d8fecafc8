//! In-memory control plane
//!
//! Records every verb call in order and keeps just enough host state to
//! answer queries and check idempotence. Failures can be injected per verb.

use super::{ControlPlane, InterfaceStatus};
use crate::error::ControlPlaneError;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// The verbs a control plane exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    SetStaticAddress,
    SetGateway,
    ListInterfaces,
    SetPrimaryDns,
    AddSecondaryDns,
    AccountExists,
    CreateAccount,
    SetPassword,
    AccountHome,
    EnsureDirectory,
    WriteFile,
    SetOwner,
}

/// One recorded verb invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetStaticAddress {
        interface: String,
        address: String,
        netmask: String,
    },
    SetGateway {
        interface: String,
        gateway: String,
        metric: u32,
    },
    ListInterfaces,
    SetPrimaryDns {
        interface: String,
        server: String,
    },
    AddSecondaryDns {
        interface: String,
        server: String,
    },
    AccountExists(String),
    CreateAccount {
        name: String,
        password: String,
    },
    SetPassword {
        name: String,
        password: String,
    },
    AccountHome(String),
    EnsureDirectory {
        path: PathBuf,
        mode: u32,
    },
    WriteFile {
        path: PathBuf,
        contents: Vec<u8>,
        mode: u32,
    },
    SetOwner {
        path: PathBuf,
        account: String,
    },
}

impl Call {
    pub fn verb(&self) -> Verb {
        match self {
            Call::SetStaticAddress { .. } => Verb::SetStaticAddress,
            Call::SetGateway { .. } => Verb::SetGateway,
            Call::ListInterfaces => Verb::ListInterfaces,
            Call::SetPrimaryDns { .. } => Verb::SetPrimaryDns,
            Call::AddSecondaryDns { .. } => Verb::AddSecondaryDns,
            Call::AccountExists(_) => Verb::AccountExists,
            Call::CreateAccount { .. } => Verb::CreateAccount,
            Call::SetPassword { .. } => Verb::SetPassword,
            Call::AccountHome(_) => Verb::AccountHome,
            Call::EnsureDirectory { .. } => Verb::EnsureDirectory,
            Call::WriteFile { .. } => Verb::WriteFile,
            Call::SetOwner { .. } => Verb::SetOwner,
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    addresses: BTreeMap<String, (String, String)>,
    gateways: BTreeMap<String, (String, u32)>,
    dns: BTreeMap<String, Vec<String>>,
    /// Account name to password
    accounts: BTreeMap<String, String>,
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    owners: BTreeMap<PathBuf, String>,
}

/// Control plane that mutates nothing but itself
#[derive(Debug)]
pub struct RecordingControlPlane {
    interfaces: Vec<InterfaceStatus>,
    home_root: PathBuf,
    failures: HashMap<Verb, String>,
    calls: RefCell<Vec<Call>>,
    state: RefCell<HostState>,
}

impl Default for RecordingControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self {
            interfaces: Vec::new(),
            home_root: PathBuf::from("/home"),
            failures: HashMap::new(),
            calls: RefCell::new(Vec::new()),
            state: RefCell::new(HostState::default()),
        }
    }

    /// Report an interface from `list_interfaces`, in insertion order
    pub fn with_interface(mut self, name: impl Into<String>, connected: bool) -> Self {
        self.interfaces.push(InterfaceStatus::new(name, connected));
        self
    }

    /// Start with an existing account
    pub fn with_account(self, name: impl Into<String>) -> Self {
        self.state
            .borrow_mut()
            .accounts
            .insert(name.into(), String::new());
        self
    }

    /// Directory under which account homes live
    pub fn with_home_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.home_root = root.into();
        self
    }

    /// Make every call of `verb` fail with `message`
    pub fn fail_on(mut self, verb: Verb, message: impl Into<String>) -> Self {
        self.failures.insert(verb, message.into());
        self
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Calls so far of a single verb
    pub fn calls_of(&self, verb: Verb) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.verb() == verb)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn address(&self, interface: &str) -> Option<(String, String)> {
        self.state.borrow().addresses.get(interface).cloned()
    }

    pub fn gateway(&self, interface: &str) -> Option<(String, u32)> {
        self.state.borrow().gateways.get(interface).cloned()
    }

    pub fn dns_servers(&self, interface: &str) -> Vec<String> {
        self.state
            .borrow()
            .dns
            .get(interface)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_account(&self, name: &str) -> bool {
        self.state.borrow().accounts.contains_key(name)
    }

    pub fn password(&self, name: &str) -> Option<String> {
        self.state.borrow().accounts.get(name).cloned()
    }

    pub fn has_directory(&self, path: &Path) -> bool {
        self.state.borrow().dirs.contains(path)
    }

    pub fn file(&self, path: &Path) -> Option<Vec<u8>> {
        self.state.borrow().files.get(path).cloned()
    }

    pub fn owner(&self, path: &Path) -> Option<String> {
        self.state.borrow().owners.get(path).cloned()
    }

    /// Record `call`, then fail if its verb is rigged to
    fn record(&self, call: Call) -> Result<(), ControlPlaneError> {
        let verb = call.verb();
        self.calls.borrow_mut().push(call);
        match self.failures.get(&verb) {
            Some(message) => Err(ControlPlaneError::Rejected(message.clone())),
            None => Ok(()),
        }
    }
}

impl ControlPlane for RecordingControlPlane {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn set_static_address(
        &self,
        interface: &str,
        address: &str,
        netmask: &str,
    ) -> Result<(), ControlPlaneError> {
        self.record(Call::SetStaticAddress {
            interface: interface.to_string(),
            address: address.to_string(),
            netmask: netmask.to_string(),
        })?;
        self.state.borrow_mut().addresses.insert(
            interface.to_string(),
            (address.to_string(), netmask.to_string()),
        );
        Ok(())
    }

    fn set_gateway(
        &self,
        interface: &str,
        gateway: &str,
        metric: u32,
    ) -> Result<(), ControlPlaneError> {
        self.record(Call::SetGateway {
            interface: interface.to_string(),
            gateway: gateway.to_string(),
            metric,
        })?;
        self.state
            .borrow_mut()
            .gateways
            .insert(interface.to_string(), (gateway.to_string(), metric));
        Ok(())
    }

    fn list_interfaces(&self) -> Result<Vec<InterfaceStatus>, ControlPlaneError> {
        self.record(Call::ListInterfaces)?;
        Ok(self.interfaces.clone())
    }

    fn set_primary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError> {
        self.record(Call::SetPrimaryDns {
            interface: interface.to_string(),
            server: server.to_string(),
        })?;
        self.state
            .borrow_mut()
            .dns
            .insert(interface.to_string(), vec![server.to_string()]);
        Ok(())
    }

    fn add_secondary_dns(&self, interface: &str, server: &str) -> Result<(), ControlPlaneError> {
        self.record(Call::AddSecondaryDns {
            interface: interface.to_string(),
            server: server.to_string(),
        })?;
        let mut state = self.state.borrow_mut();
        let servers = state.dns.entry(interface.to_string()).or_default();
        // Duplicate entries are refused, as netsh does
        if servers.iter().any(|s| s == server) {
            return Err(ControlPlaneError::Rejected(format!(
                "{} already has DNS server {}",
                interface, server
            )));
        }
        servers.push(server.to_string());
        Ok(())
    }

    fn account_exists(&self, name: &str) -> Result<bool, ControlPlaneError> {
        self.record(Call::AccountExists(name.to_string()))?;
        Ok(self.has_account(name))
    }

    fn create_account(&self, name: &str, password: &str) -> Result<(), ControlPlaneError> {
        self.record(Call::CreateAccount {
            name: name.to_string(),
            password: password.to_string(),
        })?;
        let mut state = self.state.borrow_mut();
        if state.accounts.contains_key(name) {
            return Err(ControlPlaneError::Rejected(format!(
                "account {} already exists",
                name
            )));
        }
        state.accounts.insert(name.to_string(), password.to_string());
        Ok(())
    }

    fn set_password(&self, name: &str, password: &str) -> Result<(), ControlPlaneError> {
        self.record(Call::SetPassword {
            name: name.to_string(),
            password: password.to_string(),
        })?;
        match self.state.borrow_mut().accounts.get_mut(name) {
            Some(current) => {
                *current = password.to_string();
                Ok(())
            }
            None => Err(ControlPlaneError::Rejected(format!(
                "no such account: {}",
                name
            ))),
        }
    }

    fn account_home(&self, name: &str) -> Result<PathBuf, ControlPlaneError> {
        self.record(Call::AccountHome(name.to_string()))?;
        Ok(self.home_root.join(name))
    }

    fn ensure_directory(&self, path: &Path, mode: u32) -> Result<(), ControlPlaneError> {
        self.record(Call::EnsureDirectory {
            path: path.to_path_buf(),
            mode,
        })?;
        self.state.borrow_mut().dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), ControlPlaneError> {
        self.record(Call::WriteFile {
            path: path.to_path_buf(),
            contents: contents.to_vec(),
            mode,
        })?;
        self.state
            .borrow_mut()
            .files
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn set_owner(&self, path: &Path, account: &str) -> Result<(), ControlPlaneError> {
        self.record(Call::SetOwner {
            path: path.to_path_buf(),
            account: account.to_string(),
        })?;
        self.state
            .borrow_mut()
            .owners
            .insert(path.to_path_buf(), account.to_string());
        Ok(())
    }
}
