//! Static entity metadata
//!
//! The registry maps entity tags to descriptors and is built once at startup.
//! Every ObjectId carries its tag, so resolving the descriptor of an object is
//! a table index, never a reflective lookup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = EntityRegistry::builder()
//!     .register(
//!         EntityDescriptor::new(EntityTag(7), "Order")
//!             .property("number", PropertyKind::Text)
//!             .owns("lines", EntityTag(8))
//!             .policy(HistorizationPolicy::All),
//!     )
//!     .register(EntityDescriptor::new(EntityTag(8), "OrderLine").property("qty", PropertyKind::Int))
//!     .build()?;
//!
//! let order = registry.descriptor(EntityTag(7))?;
//! ```

use crate::error::{Error, Result};
use crate::types::{EntityTag, ObjectId};
use crate::value::PropertyKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the valid-from date of a root entity evolves on commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HistorizationPolicy {
    /// Caller-supplied, never changed by commit
    None,
    /// Always stamped with the as-of date of the committing unit of work
    All,
    /// New objects keep the caller value; persisted objects are stamped
    #[default]
    Default,
}

/// One declared property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Declared type
    pub kind: PropertyKind,
}

/// Parent-owns-child edge
///
/// Only these edges are traversed when building an aggregate; plain
/// references (`PropertyKind::Reference`) never are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipEdge {
    /// Edge name (the owned collection)
    pub name: String,
    /// Entity type of the owned children
    pub child: EntityTag,
}

/// Metadata for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Entity tag, embedded in every ObjectId of this type
    pub tag: EntityTag,
    /// Entity name
    pub name: String,
    /// Declared properties, in codec order
    pub properties: Vec<PropertyDescriptor>,
    /// Owned collections
    pub ownership: Vec<OwnershipEdge>,
    /// Valid-from policy when this type is an aggregate root
    pub policy: HistorizationPolicy,
    /// Type predates bitemporal support: valid-from passes through unchanged
    pub old_style: bool,
    /// Schema version written into every delta of this type
    pub schema_version: u8,
}

impl EntityDescriptor {
    /// Create a descriptor with no properties and the default policy
    pub fn new(tag: EntityTag, name: impl Into<String>) -> Self {
        EntityDescriptor {
            tag,
            name: name.into(),
            properties: Vec::new(),
            ownership: Vec::new(),
            policy: HistorizationPolicy::Default,
            old_style: false,
            schema_version: 1,
        }
    }

    /// Declare a property
    pub fn property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    /// Declare an owned collection of `child` entities
    pub fn owns(mut self, name: impl Into<String>, child: EntityTag) -> Self {
        self.ownership.push(OwnershipEdge {
            name: name.into(),
            child,
        });
        self
    }

    /// Set the historization policy
    pub fn policy(mut self, policy: HistorizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Mark the type as predating bitemporal support
    pub fn old_style(mut self, old_style: bool) -> Self {
        self.old_style = old_style;
        self
    }

    /// Set the schema version
    pub fn schema_version(mut self, version: u8) -> Self {
        self.schema_version = version;
        self
    }

    /// Index of a property by name
    pub fn property_index(&self, name: &str) -> Result<usize> {
        self.properties
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::UnknownProperty {
                entity: self.name.clone(),
                property: name.to_string(),
            })
    }

    /// Index of an ownership edge by name
    pub fn edge_index(&self, name: &str) -> Result<usize> {
        self.ownership
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| Error::UnknownProperty {
                entity: self.name.clone(),
                property: name.to_string(),
            })
    }
}

/// Registry of entity descriptors, built once
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    descriptors: Vec<EntityDescriptor>,
    /// Tag value -> index into `descriptors`
    slots: Vec<Option<usize>>,
    by_name: HashMap<String, EntityTag>,
}

impl EntityRegistry {
    /// Start building a registry
    pub fn builder() -> EntityRegistryBuilder {
        EntityRegistryBuilder {
            descriptors: Vec::new(),
        }
    }

    /// Descriptor for a tag
    pub fn descriptor(&self, tag: EntityTag) -> Result<&EntityDescriptor> {
        self.slots
            .get(tag.0 as usize)
            .copied()
            .flatten()
            .map(|idx| &self.descriptors[idx])
            .ok_or(Error::UnknownEntity { tag })
    }

    /// Descriptor for the entity type embedded in an ObjectId
    pub fn descriptor_for(&self, id: ObjectId) -> Result<&EntityDescriptor> {
        self.descriptor(id.entity_tag())
    }

    /// Tag of an entity by name
    pub fn tag_of(&self, name: &str) -> Result<EntityTag> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::Configuration(format!("unknown entity name '{}'", name)))
    }

    /// Check if a tag is registered
    pub fn contains(&self, tag: EntityTag) -> bool {
        self.descriptor(tag).is_ok()
    }

    /// Entity name for a tag, or a placeholder for unregistered tags
    ///
    /// Used when formatting errors, where a missing descriptor must not hide
    /// the original failure.
    pub fn name_of(&self, tag: EntityTag) -> String {
        self.descriptor(tag)
            .map(|d| d.name.clone())
            .unwrap_or_else(|_| format!("<tag {}>", tag))
    }

    /// All descriptors, ordered by tag
    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.descriptors.iter()
    }

    /// Number of registered entity types
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if no entity types are registered
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Builder for [`EntityRegistry`]
#[derive(Debug, Default)]
pub struct EntityRegistryBuilder {
    descriptors: Vec<EntityDescriptor>,
}

impl EntityRegistryBuilder {
    /// Add a descriptor
    pub fn register(mut self, descriptor: EntityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validate and freeze the registry
    ///
    /// # Errors
    /// Returns `Error::Configuration` on duplicate tags or names, duplicate
    /// property or edge names, or an ownership edge to an unregistered type.
    pub fn build(mut self) -> Result<EntityRegistry> {
        self.descriptors.sort_by_key(|d| d.tag);

        let max_tag = self.descriptors.last().map(|d| d.tag.0 as usize).unwrap_or(0);
        let mut slots = vec![None; max_tag + 1];
        let mut by_name = HashMap::new();

        for (idx, d) in self.descriptors.iter().enumerate() {
            if slots[d.tag.0 as usize].replace(idx).is_some() {
                return Err(Error::Configuration(format!("duplicate entity tag {}", d.tag)));
            }
            if by_name.insert(d.name.clone(), d.tag).is_some() {
                return Err(Error::Configuration(format!("duplicate entity name '{}'", d.name)));
            }
            if d.properties.len() > u16::MAX as usize || d.ownership.len() > u16::MAX as usize {
                return Err(Error::Configuration(format!(
                    "entity '{}' declares {} properties and {} edges, at most {} of each are allowed",
                    d.name,
                    d.properties.len(),
                    d.ownership.len(),
                    u16::MAX
                )));
            }
            let mut seen = std::collections::HashSet::new();
            for name in d.properties.iter().map(|p| &p.name).chain(d.ownership.iter().map(|e| &e.name)) {
                if !seen.insert(name) {
                    return Err(Error::Configuration(format!(
                        "entity '{}' declares '{}' twice",
                        d.name, name
                    )));
                }
            }
        }

        for d in &self.descriptors {
            for edge in &d.ownership {
                let known = slots.get(edge.child.0 as usize).copied().flatten().is_some();
                if !known {
                    return Err(Error::Configuration(format!(
                        "entity '{}' owns '{}' of unregistered tag {}",
                        d.name, edge.name, edge.child
                    )));
                }
            }
        }

        Ok(EntityRegistry {
            descriptors: self.descriptors,
            slots,
            by_name,
        })
    }
}
