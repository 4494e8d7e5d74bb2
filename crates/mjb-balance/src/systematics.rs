//! Named uncertainty components read from the uncertainty provider's
//! configuration text.
//!
//! Only lines of the form `<Prefix>.<N>.Name: <ComponentName>` are used; the
//! component ordinal handed to the provider is `N - 1`.

use std::path::Path;

use mjb_core::Result;
use serde::Serialize;

/// One named uncertainty component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystematicComponent {
    /// 0-based component ordinal.
    pub ordinal: usize,
    /// Component name, e.g. `EtaIntercalibration_Modelling`.
    pub name: String,
}

/// Components in configuration-file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystematicsCatalog {
    components: Vec<SystematicComponent>,
}

impl SystematicsCatalog {
    /// Build a catalog from already known components.
    pub fn new(components: Vec<SystematicComponent>) -> Self {
        Self { components }
    }

    /// Parse the uncertainty configuration text.
    pub fn parse(text: &str) -> Self {
        let mut components = Vec::new();
        for line in text.lines().filter(|l| l.contains(".Name:")) {
            let mut fields = line.split_whitespace();
            let (Some(key), Some(name)) = (fields.next(), fields.next()) else {
                log::warn!("ignoring uncertainty component line without a name: '{line}'");
                continue;
            };
            match component_number(key) {
                Some(n) if n > 0 => {
                    components.push(SystematicComponent { ordinal: n - 1, name: name.to_string() })
                }
                _ => log::warn!("ignoring uncertainty component with bad number: '{key}'"),
            }
        }
        Self { components }
    }

    /// Read and parse an uncertainty configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// All components.
    pub fn components(&self) -> &[SystematicComponent] {
        &self.components
    }

    /// Components whose name satisfies `pred`, in file order.
    pub fn matching<'a, F>(&'a self, pred: F) -> impl Iterator<Item = &'a SystematicComponent>
    where
        F: Fn(&str) -> bool + 'a,
    {
        self.components.iter().filter(move |c| pred(&c.name))
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True when no components were found.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// `JESComponent.12.Name:` -> 12
fn component_number(key: &str) -> Option<usize> {
    let first = key.find('.')?;
    let last = key.rfind('.')?;
    if last <= first {
        return None;
    }
    key[first + 1..last].parse().ok()
}
