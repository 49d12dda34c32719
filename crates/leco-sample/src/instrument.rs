//! A simulated instrument with plain properties, methods and nested channels.
//!
//! | Path                               | Kind     |
//! |------------------------------------|----------|
//! | `prop`, `prop2`                    | property |
//! | `silent_method`, `returning_method`| method   |
//! | `channel.channel_property`         | property |
//! | `channel.channel_method`           | method   |
//! | `channel.trace.*`                  | as above |

use leco_actor::{Device, DeviceError, ResourcePath};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct FantasyChannel {
    pub channel_property: i64,
}

impl Default for FantasyChannel {
    fn default() -> Self {
        Self {
            channel_property: -1,
        }
    }
}

impl FantasyChannel {
    pub fn channel_method(&self, value: i64) -> i64 {
        2 * value
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FantasyInstrument {
    pub name: String,
    pub prop: i64,
    pub prop2: i64,
    pub channel: FantasyChannel,
    pub trace: FantasyChannel,
    /// Last value passed to `silent_method`.
    pub method_value: Option<Value>,
}

impl Default for FantasyInstrument {
    fn default() -> Self {
        Self::new("FantasyInstrument")
    }
}

impl FantasyInstrument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prop: 5,
            prop2: 7,
            channel: FantasyChannel::default(),
            trace: FantasyChannel::default(),
            method_value: None,
        }
    }

    fn channel(&self, path: &[&str]) -> Option<&FantasyChannel> {
        match path {
            ["channel"] => Some(&self.channel),
            ["channel", "trace"] => Some(&self.trace),
            _ => None,
        }
    }

    fn channel_mut(&mut self, path: &[&str]) -> Option<&mut FantasyChannel> {
        match path {
            ["channel"] => Some(&mut self.channel),
            ["channel", "trace"] => Some(&mut self.trace),
            _ => None,
        }
    }
}

fn segments(path: &ResourcePath) -> Vec<&str> {
    path.segments().iter().map(String::as_str).collect()
}

fn unknown(path: &ResourcePath) -> DeviceError {
    DeviceError::UnknownResource(path.to_string())
}

fn integer(value: &Value) -> Result<i64, DeviceError> {
    value
        .as_i64()
        .ok_or_else(|| DeviceError::Execution(format!("expected an integer, got {value}")))
}

/// The single argument of a method, given by position or as `value`.
fn argument(args: &[Value], kwargs: &Map<String, Value>) -> Result<Value, DeviceError> {
    args.first()
        .or_else(|| kwargs.get("value"))
        .cloned()
        .ok_or_else(|| DeviceError::Execution("missing argument 'value'".to_string()))
}

impl Device for FantasyInstrument {
    fn get_parameter(&self, path: &ResourcePath) -> Result<Value, DeviceError> {
        let segments = segments(path);
        match segments.as_slice() {
            ["prop"] => Ok(Value::from(self.prop)),
            ["prop2"] => Ok(Value::from(self.prop2)),
            [channel @ .., "channel_property"] => self
                .channel(channel)
                .map(|c| Value::from(c.channel_property))
                .ok_or_else(|| unknown(path)),
            _ => Err(unknown(path)),
        }
    }

    fn set_parameter(&mut self, path: &ResourcePath, value: Value) -> Result<(), DeviceError> {
        let segments = segments(path);
        let value = integer(&value)?;
        match segments.as_slice() {
            ["prop"] => self.prop = value,
            ["prop2"] => self.prop2 = value,
            [channel @ .., "channel_property"] => {
                self.channel_mut(channel)
                    .ok_or_else(|| unknown(path))?
                    .channel_property = value
            }
            _ => return Err(unknown(path)),
        }
        Ok(())
    }

    fn call_action(
        &mut self,
        path: &ResourcePath,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, DeviceError> {
        let segments = segments(path);
        match segments.as_slice() {
            ["silent_method"] => {
                self.method_value = Some(argument(&args, &kwargs)?);
                Ok(Value::Null)
            }
            ["returning_method"] => {
                let value = integer(&argument(&args, &kwargs)?)?;
                Ok(Value::from(value * value))
            }
            [channel @ .., "channel_method"] => {
                let value = integer(&argument(&args, &kwargs)?)?;
                let channel = self.channel(channel).ok_or_else(|| unknown(path))?;
                Ok(Value::from(channel.channel_method(value)))
            }
            _ => Err(unknown(path)),
        }
    }
}
