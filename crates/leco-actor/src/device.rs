//! # Device Seam
//!
//! The instrument behind a [`LockingActor`](crate::LockingActor). Parts of the device are
//! addressed by [`ResourcePath`]; the adapter decides what a path means (a property, a
//! method, a property of a channel, ...).

use crate::resource::ResourcePath;
use crate::rpc::{self, RpcError};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("The requested name is not known: {0}")]
    UnknownResource(String),
    #[error("Execution failed: {0}")]
    Execution(String),
}

impl From<DeviceError> for RpcError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::UnknownResource(name) => {
                RpcError::new(rpc::NAME_NOT_FOUND, "The requested name is not known.")
                    .with_data(name)
            }
            DeviceError::Execution(detail) => {
                RpcError::new(rpc::EXECUTION_FAILED, "Execution of the action failed.")
                    .with_data(detail)
            }
        }
    }
}

pub trait Device: Send + 'static {
    fn get_parameter(&self, path: &ResourcePath) -> Result<Value, DeviceError>;

    fn set_parameter(&mut self, path: &ResourcePath, value: Value) -> Result<(), DeviceError>;

    fn call_action(
        &mut self,
        path: &ResourcePath,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, DeviceError>;
}
