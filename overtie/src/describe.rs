//! Class hierarchies described in TOML
//!
//! ```toml
//! [[class]]
//! name = "Point"
//! parents = ["Shape"]
//! fallback = true
//!
//! [class.methods]
//! describe = "a point"
//!
//! [class.overload]
//! '""' = "describe"
//! ```
//!
//! Methods return their constant; operator entries name a method resolved on
//! the invocant's class.

use crate::error::{MagicError, MagicResult};
use crate::overload::OverloadHandler;
use crate::runtime::Runtime;
use crate::value::{Code, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HierarchyFile {
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDescription {
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub fallback: Option<bool>,
    #[serde(default)]
    pub methods: BTreeMap<String, Constant>,
    #[serde(default)]
    pub overload: BTreeMap<String, String>,
}

/// Result of a described method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Int(n) => Value::Int(*n),
            Constant::Float(x) => Value::Float(*x),
            Constant::Text(s) => Value::str(s),
        }
    }
}

impl HierarchyFile {
    pub fn from_toml_str(source: &str) -> MagicResult<Self> {
        toml::from_str(source).map_err(|e| MagicError::config(e.to_string()))
    }

    pub fn load(path: &Path) -> MagicResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| MagicError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Define every described class in `rt`
    pub fn install(&self, rt: &Runtime) -> MagicResult<()> {
        let classes = rt.classes();
        for desc in &self.classes {
            let class = classes.define_class(desc.name.as_str());
            classes.set_parents(class.clone(), desc.parents.iter().map(String::as_str))?;
            if desc.fallback.is_some() {
                classes.set_fallback(class.clone(), desc.fallback);
            }
            for (name, constant) in &desc.methods {
                let value = Value::from(constant);
                classes.define_method(class.clone(), name, Code::new(name, move |_, _| Ok(value.clone())));
            }
            for (op, method) in &desc.overload {
                classes.overload(class.clone(), op, OverloadHandler::method(method));
            }
            debug!(class = %class, methods = desc.methods.len(), operators = desc.overload.len(), "class installed");
        }
        Ok(())
    }
}
