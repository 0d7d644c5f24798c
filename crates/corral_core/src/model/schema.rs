//! Programmatic schema description consumed at store open time.
//!
//! # Responsibility
//! - Describe the entities and typed attributes the wrapper manages.
//! - Validate the description before any store is opened, so schema problems
//!   fail fast at construction instead of deep inside an operation.
//!
//! # Invariants
//! - Entity and attribute names are valid identifiers and unique.
//! - `record_id` is reserved for the store-level identifier column.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is a valid regex")
});

/// Column name reserved for record identifiers in every store kind.
pub const RECORD_ID_ATTRIBUTE: &str = "record_id";

/// Scalar type of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Integer,
    Real,
    Text,
    Boolean,
}

/// One named, typed attribute of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
}

/// One entity (record type) managed by the wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub attributes: Vec<AttributeDescriptor>,
}

impl EntityDescriptor {
    /// Creates an entity descriptor with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Adds one attribute, builder style.
    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    /// Looks up an attribute descriptor by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|attr| attr.name == name)
    }
}

/// The full schema description for one wrapper session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub entities: Vec<EntityDescriptor>,
}

impl Model {
    /// Creates a model from entity descriptors.
    pub fn new(entities: Vec<EntityDescriptor>) -> Self {
        Self { entities }
    }

    /// Looks up an entity descriptor by name.
    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    /// Validates the model for use as a store schema.
    ///
    /// # Errors
    /// - Returns the first structural problem found: empty model, invalid or
    ///   duplicate entity names, invalid/duplicate/reserved attribute names.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.entities.is_empty() {
            return Err(ModelValidationError::EmptyModel);
        }
        for (index, entity) in self.entities.iter().enumerate() {
            if !IDENTIFIER.is_match(&entity.name) {
                return Err(ModelValidationError::InvalidEntityName(entity.name.clone()));
            }
            if self.entities[..index]
                .iter()
                .any(|other| other.name == entity.name)
            {
                return Err(ModelValidationError::DuplicateEntity(entity.name.clone()));
            }
            for (attr_index, attr) in entity.attributes.iter().enumerate() {
                if !IDENTIFIER.is_match(&attr.name) {
                    return Err(ModelValidationError::InvalidAttributeName {
                        entity: entity.name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
                if attr.name == RECORD_ID_ATTRIBUTE {
                    return Err(ModelValidationError::ReservedAttributeName {
                        entity: entity.name.clone(),
                    });
                }
                if entity.attributes[..attr_index]
                    .iter()
                    .any(|other| other.name == attr.name)
                {
                    return Err(ModelValidationError::DuplicateAttribute {
                        entity: entity.name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Structural problems detected in a [`Model`] at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    EmptyModel,
    InvalidEntityName(String),
    DuplicateEntity(String),
    InvalidAttributeName { entity: String, attribute: String },
    DuplicateAttribute { entity: String, attribute: String },
    ReservedAttributeName { entity: String },
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyModel => write!(f, "model declares no entities"),
            Self::InvalidEntityName(name) => write!(f, "invalid entity name `{name}`"),
            Self::DuplicateEntity(name) => write!(f, "duplicate entity `{name}`"),
            Self::InvalidAttributeName { entity, attribute } => {
                write!(f, "invalid attribute name `{attribute}` in entity `{entity}`")
            }
            Self::DuplicateAttribute { entity, attribute } => {
                write!(f, "duplicate attribute `{attribute}` in entity `{entity}`")
            }
            Self::ReservedAttributeName { entity } => write!(
                f,
                "attribute name `{RECORD_ID_ATTRIBUTE}` in entity `{entity}` is reserved"
            ),
        }
    }
}

impl Error for ModelValidationError {}

#[cfg(test)]
mod tests {
    use super::{AttributeKind, EntityDescriptor, Model, ModelValidationError};

    fn person() -> EntityDescriptor {
        EntityDescriptor::new("Person")
            .with_attribute("name", AttributeKind::Text)
            .with_attribute("reg_no", AttributeKind::Integer)
    }

    #[test]
    fn valid_model_passes_validation() {
        let model = Model::new(vec![person()]);
        assert!(model.validate().is_ok());
        assert!(model.entity("Person").is_some());
        assert!(model.entity("Missing").is_none());
    }

    #[test]
    fn empty_model_is_rejected() {
        assert_eq!(
            Model::default().validate(),
            Err(ModelValidationError::EmptyModel)
        );
    }

    #[test]
    fn duplicate_entity_is_rejected() {
        let model = Model::new(vec![person(), person()]);
        assert!(matches!(
            model.validate(),
            Err(ModelValidationError::DuplicateEntity(name)) if name == "Person"
        ));
    }

    #[test]
    fn reserved_and_invalid_names_are_rejected() {
        let reserved = Model::new(vec![
            EntityDescriptor::new("Person").with_attribute("record_id", AttributeKind::Text),
        ]);
        assert!(matches!(
            reserved.validate(),
            Err(ModelValidationError::ReservedAttributeName { .. })
        ));

        let invalid = Model::new(vec![
            EntityDescriptor::new("Person").with_attribute("bad name", AttributeKind::Text),
        ]);
        assert!(matches!(
            invalid.validate(),
            Err(ModelValidationError::InvalidAttributeName { .. })
        ));
    }
}
