pub mod choice_group;
pub mod element;
pub mod primitive;
pub mod schema;

pub use choice_group::{ChoiceVariant, PolymorphicGroup, choice_suffix};
pub use element::{BindingDefinition, BindingStrength, Cardinality, FieldDescriptor, Max};
pub use primitive::{PrimitiveKind, PrimitiveType, TypeRef};
pub use schema::{RecordKind, RecordSchema, SchemaEntry};
