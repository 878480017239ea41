//! Optional driver extensions for legacy vendor types.
//!
//! Some source databases store values (external file locators, structured XML)
//! that only a vendor driver can bind. A target dialect registers the
//! extensions its driver supports; formats resolve them on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::param::Param;

/// Converts between a backup's textual encoding of a vendor value and the
/// driver's native parameter.
pub trait VendorExtension: Send + Sync {
    fn name(&self) -> &str;

    fn to_param(&self, value: &str) -> Result<Param, String>;

    fn from_param(&self, param: &Param) -> Result<String, String>;
}

/// Extensions available on the active driver, keyed by upper-case name
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    extensions: HashMap<String, Arc<dyn VendorExtension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Arc<dyn VendorExtension>) {
        self.extensions
            .insert(extension.name().to_ascii_uppercase(), extension);
    }

    pub fn with(mut self, extension: Arc<dyn VendorExtension>) -> Self {
        self.register(extension);
        self
    }

    /// Looks up an extension, reporting why it cannot be used when missing
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn VendorExtension>, String> {
        self.extensions
            .get(&name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| format!("{} is not supported on this driver", name))
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.extensions.keys().collect();
        names.sort();
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &names)
            .finish()
    }
}

/// Structured XML bound as plain text, which drivers without a dedicated XML
/// object accept for XML columns.
#[derive(Debug, Default)]
pub struct XmlTextExtension;

impl VendorExtension for XmlTextExtension {
    fn name(&self) -> &str {
        "XMLTYPE"
    }

    fn to_param(&self, value: &str) -> Result<Param, String> {
        let trimmed = value.trim_start();
        if !trimmed.is_empty() && !trimmed.starts_with('<') {
            return Err("XML document must start with '<'".to_string());
        }
        Ok(Param::Text(value.to_string()))
    }

    fn from_param(&self, param: &Param) -> Result<String, String> {
        match param {
            Param::Text(text) => Ok(text.clone()),
            Param::Bytes(bytes) => String::from_utf8(bytes.clone()).map_err(|e| e.to_string()),
            other => Err(format!("cannot read XML from a {} parameter", other.kind())),
        }
    }
}
