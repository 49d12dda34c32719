//! Resource paths: dot separated names of a device's parts.
//!
//! The empty path is the root and stands for the whole device. On the wire the root is
//! `null`, every other path its dotted string (`"channel.trace"`).

use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourcePath(Vec<String>);

impl ResourcePath {
    /// The whole device.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::root();
        }
        Self(path.split('.').map(str::to_string).collect())
    }

    /// `None` is the root.
    pub fn from_wire(path: Option<&str>) -> Self {
        path.map(Self::parse).unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The root, every intermediate prefix, and finally the path itself.
    pub fn ancestors(&self) -> impl Iterator<Item = ResourcePath> + '_ {
        (0..=self.0.len()).map(|depth| ResourcePath(self.0[..depth].to_vec()))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for ResourcePath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<Option<&str>> for ResourcePath {
    fn from(path: Option<&str>) -> Self {
        Self::from_wire(path)
    }
}
