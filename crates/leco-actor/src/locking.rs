//! # Locking Actor
//!
//! A [`Component`] driving a [`Device`] whose parts can be locked by individual callers.
//!
//! Locks form a hierarchy along the [`ResourcePath`]: a lock on `channel` covers
//! `channel.trace` and `channel.trace.level` as well, and a lock on the root covers the
//! whole device. A caller may access a path only if every lock on the path or one of its
//! ancestors is its own.
//!
//! Per path there are only two states, unlocked and locked by one owner:
//!
//! * `lock` moves an accessible path to "locked by the caller"; on a path the caller
//!   cannot access it changes nothing and reports `false`,
//! * `unlock` releases the caller's own lock,
//! * `force_unlock` releases any lock on exactly that path, whoever holds it.
//!
//! Locks never expire.

use crate::component::Component;
use crate::device::Device;
use crate::resource::ResourcePath;
use crate::rpc::{MethodInfo, Params, RpcError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct LockingActor<D: Device> {
    device: D,
    locks: HashMap<ResourcePath, Vec<u8>>,
}

impl<D: Device> LockingActor<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            locks: HashMap::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The owner of a lock on exactly `resource`.
    pub fn owner(&self, resource: &ResourcePath) -> Option<&[u8]> {
        self.locks.get(resource).map(Vec::as_slice)
    }

    /// Locks `resource` for `requester`; `true` also if it already holds the lock.
    pub fn lock(&mut self, resource: &ResourcePath, requester: &[u8]) -> bool {
        if !self.check_access_rights(resource, requester) {
            debug!(%resource, "Lock refused");
            return false;
        }
        self.locks.insert(resource.clone(), requester.to_vec());
        info!(%resource, owner = %String::from_utf8_lossy(requester), "Locked");
        true
    }

    /// Releases the lock of `requester` on `resource`.
    ///
    /// Returns `false` if somebody else holds that lock.
    pub fn unlock(&mut self, resource: &ResourcePath, requester: &[u8]) -> bool {
        match self.locks.get(resource) {
            Some(owner) if owner.as_slice() != requester => false,
            Some(_) => {
                self.locks.remove(resource);
                info!(%resource, "Unlocked");
                true
            }
            None => true,
        }
    }

    /// Removes the lock on exactly `resource`, regardless of its owner.
    pub fn force_unlock(&mut self, resource: &ResourcePath) {
        if let Some(owner) = self.locks.remove(resource) {
            warn!(%resource, owner = %String::from_utf8_lossy(&owner), "Lock removed by force");
        }
    }

    pub fn check_access_rights(&self, resource: &ResourcePath, requester: &[u8]) -> bool {
        resource.ancestors().all(|path| match self.locks.get(&path) {
            Some(owner) => owner.as_slice() == requester,
            None => true,
        })
    }

    fn check_access_rights_raising(
        &self,
        resource: &ResourcePath,
        requester: &[u8],
    ) -> Result<(), RpcError> {
        if self.check_access_rights(resource, requester) {
            Ok(())
        } else {
            warn!(%resource, requester = %String::from_utf8_lossy(requester), "Access denied");
            Err(RpcError::access_denied(&resource.to_string()))
        }
    }

    pub fn get_parameters(
        &self,
        parameters: &[String],
        requester: &[u8],
    ) -> Result<Map<String, Value>, RpcError> {
        let paths: Vec<ResourcePath> = parameters.iter().map(|p| ResourcePath::parse(p)).collect();
        for path in &paths {
            self.check_access_rights_raising(path, requester)?;
        }
        let mut values = Map::new();
        for (name, path) in parameters.iter().zip(&paths) {
            values.insert(name.clone(), self.device.get_parameter(path)?);
        }
        Ok(values)
    }

    /// Sets all `parameters`, after checking access to each of them.
    pub fn set_parameters(
        &mut self,
        parameters: Map<String, Value>,
        requester: &[u8],
    ) -> Result<(), RpcError> {
        for name in parameters.keys() {
            self.check_access_rights_raising(&ResourcePath::parse(name), requester)?;
        }
        for (name, value) in parameters {
            self.device.set_parameter(&ResourcePath::parse(&name), value)?;
        }
        Ok(())
    }

    pub fn call_action(
        &mut self,
        action: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        requester: &[u8],
    ) -> Result<Value, RpcError> {
        let path = ResourcePath::parse(action);
        self.check_access_rights_raising(&path, requester)?;
        Ok(self.device.call_action(&path, args, kwargs)?)
    }
}

impl<D: Device> Component for LockingActor<D> {
    fn rpc_methods(&self) -> Vec<MethodInfo> {
        vec![
            MethodInfo::new("lock", "Lock the device or one of its resources."),
            MethodInfo::new("unlock", "Unlock the device or one of its resources."),
            MethodInfo::new("force_unlock", "Unlock a resource, even if someone else locked it."),
            MethodInfo::new("get_parameters", "Get device parameters."),
            MethodInfo::new("set_parameters", "Set device parameters."),
            MethodInfo::new("call_action", "Call a device action."),
        ]
    }

    fn call(&mut self, method: &str, params: &Params, requester: &[u8]) -> Result<Value, RpcError> {
        match method {
            "lock" => {
                let resource = params.get::<String>(0, "resource")?;
                let path = ResourcePath::from_wire(resource.as_deref());
                Ok(Value::Bool(self.lock(&path, requester)))
            }
            "unlock" => {
                let resource = params.get::<String>(0, "resource")?;
                let path = ResourcePath::from_wire(resource.as_deref());
                Ok(Value::Bool(self.unlock(&path, requester)))
            }
            "force_unlock" => {
                let resource = params.get::<String>(0, "resource")?;
                self.force_unlock(&ResourcePath::from_wire(resource.as_deref()));
                Ok(Value::Null)
            }
            "get_parameters" => {
                let parameters = params.require::<Vec<String>>(0, "parameters")?;
                Ok(Value::Object(self.get_parameters(&parameters, requester)?))
            }
            "set_parameters" => {
                let parameters = params.require::<Map<String, Value>>(0, "parameters")?;
                self.set_parameters(parameters, requester)?;
                Ok(Value::Null)
            }
            "call_action" => {
                let action = params.require::<String>(0, "action")?;
                let args = params.get::<Vec<Value>>(1, "args")?.unwrap_or_default();
                let kwargs = params.get::<Map<String, Value>>(2, "kwargs")?.unwrap_or_default();
                self.call_action(&action, args, kwargs, requester)
            }
            _ => Err(RpcError::method_not_found(method)),
        }
    }
}
