//! In-memory shape of one persistent object
//!
//! A `PersistentObject` holds one value per declared property and one id list
//! per ownership edge, both in descriptor order. The same shape is used as the
//! prior and new images carried by a delta.

use crate::entity::EntityDescriptor;
use crate::error::{Error, Result};
use crate::types::{EntityTag, ObjectId};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of one persistent object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentObject {
    /// Object identity
    pub id: ObjectId,
    /// Property values, indexed like `EntityDescriptor::properties`
    pub values: Vec<Value>,
    /// Owned children, indexed like `EntityDescriptor::ownership`
    pub owned: Vec<Vec<ObjectId>>,
    /// Owning parent, if this object is part of an aggregate
    pub parent: Option<ObjectId>,
    /// Business-effective date of this version
    pub valid_from: DateTime<Utc>,
}

impl PersistentObject {
    /// Create an object with every property `Null` and no children
    pub fn new(id: ObjectId, descriptor: &EntityDescriptor, valid_from: DateTime<Utc>) -> Self {
        PersistentObject {
            id,
            values: vec![Value::Null; descriptor.properties.len()],
            owned: vec![Vec::new(); descriptor.ownership.len()],
            parent: None,
            valid_from,
        }
    }

    /// Entity tag embedded in the id
    pub fn entity_tag(&self) -> EntityTag {
        self.id.entity_tag()
    }

    /// Get a property by name
    pub fn get(&self, descriptor: &EntityDescriptor, name: &str) -> Result<&Value> {
        let idx = descriptor.property_index(name)?;
        Ok(&self.values[idx])
    }

    /// Set a property by name, checking the declared kind
    pub fn set(&mut self, descriptor: &EntityDescriptor, name: &str, value: Value) -> Result<()> {
        let idx = descriptor.property_index(name)?;
        let kind = descriptor.properties[idx].kind;
        if !value.conforms_to(kind) {
            return Err(Error::TypeMismatch {
                entity: descriptor.name.clone(),
                property: name.to_string(),
                reason: format!("expected {:?}, got {:?}", kind, value.kind()),
            });
        }
        self.values[idx] = value;
        Ok(())
    }

    /// Children owned through the named edge
    pub fn children(&self, descriptor: &EntityDescriptor, edge: &str) -> Result<&[ObjectId]> {
        let idx = descriptor.edge_index(edge)?;
        Ok(&self.owned[idx])
    }

    /// All owned children across every edge
    pub fn all_children(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.owned.iter().flatten().copied()
    }

    /// Check that the shape matches a descriptor
    pub fn check_shape(&self, descriptor: &EntityDescriptor) -> Result<()> {
        if self.values.len() != descriptor.properties.len() || self.owned.len() != descriptor.ownership.len() {
            return Err(Error::InvalidOperation(format!(
                "object {} does not match the shape of entity '{}'",
                self.id, descriptor.name
            )));
        }
        for (value, prop) in self.values.iter().zip(&descriptor.properties) {
            if !value.conforms_to(prop.kind) {
                return Err(Error::TypeMismatch {
                    entity: descriptor.name.clone(),
                    property: prop.name.clone(),
                    reason: format!("expected {:?}, got {:?}", prop.kind, value.kind()),
                });
            }
        }
        Ok(())
    }

    /// Check whether persisted state differs, ignoring valid-from
    ///
    /// Valid-from is owned by the bitemporal policy, so a changed valid-from
    /// alone does not make an object dirty.
    pub fn differs_from(&self, other: &PersistentObject) -> bool {
        self.values != other.values || self.owned != other.owned || self.parent != other.parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyKind;
    use chrono::TimeZone;

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(EntityTag(7), "Order")
            .property("number", PropertyKind::Text)
            .property("total", PropertyKind::Int)
            .owns("lines", EntityTag(8))
    }

    fn object() -> PersistentObject {
        let id = ObjectId::from_parts(EntityTag(7), 0, 1).unwrap();
        PersistentObject::new(id, &descriptor(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_new_object_is_all_null() {
        let obj = object();
        assert_eq!(obj.values, vec![Value::Null, Value::Null]);
        assert_eq!(obj.owned.len(), 1);
        assert!(obj.check_shape(&descriptor()).is_ok());
    }

    #[test]
    fn test_set_checks_kind() {
        let d = descriptor();
        let mut obj = object();
        obj.set(&d, "total", Value::Int(10)).unwrap();
        assert_eq!(obj.get(&d, "total").unwrap(), &Value::Int(10));

        let err = obj.set(&d, "total", Value::Text("ten".into())).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(matches!(obj.set(&d, "nope", Value::Null), Err(Error::UnknownProperty { .. })));
    }

    #[test]
    fn test_valid_from_change_is_not_dirty() {
        let d = descriptor();
        let before = object();
        let mut after = before.clone();
        after.valid_from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(!after.differs_from(&before));

        after.set(&d, "number", Value::from("A-1")).unwrap();
        assert!(after.differs_from(&before));
    }
}
