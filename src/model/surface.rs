//! Surface filter: restricts a model to a subset of its classes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::Model;
use crate::error::ConfigError;

/// Classes (and optionally associations) a run is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    pub classes: BTreeSet<String>,
    /// When set, only these associations survive (both ends must survive too).
    #[serde(default)]
    pub associations: Option<BTreeSet<String>>,
}

impl Surface {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
            associations: None,
        }
    }
}

impl Model {
    /// Returns a copy of the model restricted to `surface`.
    ///
    /// Associations lose their place when either end is filtered out, and
    /// model invariants that mention a filtered-out class are dropped.
    pub fn restrict(&self, surface: &Surface) -> Result<Self, ConfigError> {
        for class in &surface.classes {
            if !self.classes.contains_key(class) {
                return Err(ConfigError::InvalidConfig {
                    reason: format!("surface names unknown class {class}"),
                });
            }
        }
        if let Some(assocs) = &surface.associations {
            for assoc in assocs {
                if !self.associations.contains_key(assoc) {
                    return Err(ConfigError::InvalidConfig {
                        reason: format!("surface names unknown association {assoc}"),
                    });
                }
            }
        }

        let classes = self
            .classes
            .iter()
            .filter(|(key, _)| surface.classes.contains(*key))
            .map(|(key, class)| (key.clone(), class.clone()))
            .collect();

        let associations = self
            .associations
            .iter()
            .filter(|(key, a)| {
                surface.classes.contains(&a.from_class)
                    && surface.classes.contains(&a.to_class)
                    && surface.associations.as_ref().map_or(true, |only| only.contains(*key))
            })
            .map(|(key, a)| (key.clone(), a.clone()))
            .collect();

        let excluded: BTreeSet<&str> = self
            .classes
            .keys()
            .filter(|key| !surface.classes.contains(*key))
            .map(String::as_str)
            .collect();
        let invariants = self
            .invariants
            .iter()
            .filter(|inv| inv.expr.identifiers().is_disjoint(&excluded))
            .cloned()
            .collect();

        Ok(Self {
            key: self.key.clone(),
            classes,
            associations,
            invariants,
        })
    }
}
