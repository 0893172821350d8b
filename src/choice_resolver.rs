//! Choice type resolution.
//!
//! Determines which concrete variant of a polymorphic group is populated.
//! Matching is exact and case-sensitive on `logicalName + Suffix`; a
//! property that extends the logical name with an undeclared suffix is
//! rejected, as is more than one populated variant.

use crate::error::{FhirRecordError, Result};
use crate::instance::{Instance, Value};
use crate::types::{ChoiceVariant, PolymorphicGroup, RecordSchema, choice_suffix};

/// A resolved choice: the active variant and where its content came from
#[derive(Debug)]
pub struct ChoiceBinding<'g, 'v, V> {
    pub variant: &'g ChoiceVariant,
    /// Key the content was found under
    pub property: &'v str,
    pub value: &'v V,
}

impl<V> ChoiceBinding<'_, '_, V> {
    pub fn suffix(&self) -> &str {
        &self.variant.suffix
    }
}

/// Bind a group against candidate properties.
///
/// `candidates` must not contain properties that belong to plain fields
/// of the same record (a plain `valueSet` field is not a `value[x]` variant).
/// Returns `Ok(None)` when no variant is populated.
pub fn bind<'g, 'v, V, I>(
    group: &'g PolymorphicGroup,
    path: &str,
    candidates: I,
) -> Result<Option<ChoiceBinding<'g, 'v, V>>>
where
    I: IntoIterator<Item = (&'v str, &'v V)>,
    V: 'v,
{
    let mut matches: Vec<(usize, ChoiceBinding<'g, 'v, V>)> = Vec::new();

    for (property, value) in candidates {
        if !group.claims_property(property) {
            continue;
        }
        let position = group
            .variants
            .iter()
            .position(|variant| variant.property_name() == property)
            .ok_or_else(|| FhirRecordError::unknown_choice_variant(path, property))?;
        matches.push((
            position,
            ChoiceBinding {
                variant: &group.variants[position],
                property,
                value,
            },
        ));
    }

    select(group, path, matches)
}

/// Resolve the active variant of `group` on an instance, accepting both the
/// tagged form (logical name -> [`crate::instance::ChoiceValue`]) and
/// concrete variant properties.
pub fn resolve_instance<'g, 'v>(
    group: &'g PolymorphicGroup,
    schema: &RecordSchema,
    instance: &'v Instance,
    path: &str,
) -> Result<Option<ChoiceBinding<'g, 'v, Value>>> {
    let mut matches = Vec::new();

    if let Some((property, value)) = instance.properties().get_key_value(group.logical_name.as_str()) {
        let Value::Choice(choice) = value else {
            return Err(FhirRecordError::unknown_choice_variant(path, property.as_str()));
        };
        let position = group
            .variants
            .iter()
            .position(|variant| variant.type_code() == choice.type_code)
            .ok_or_else(|| {
                FhirRecordError::unknown_choice_variant(
                    path,
                    format!("{}{}", group.logical_name, choice_suffix(&choice.type_code)),
                )
            })?;
        matches.push((
            position,
            ChoiceBinding {
                variant: &group.variants[position],
                property: property.as_str(),
                value: choice.value.as_ref(),
            },
        ));
    }

    let concrete = instance
        .iter()
        .filter(|(property, _)| !schema.has_field(property));
    if let Some(binding) = bind(group, path, concrete)? {
        let position = group
            .variants
            .iter()
            .position(|variant| std::ptr::eq(variant, binding.variant))
            .unwrap_or_default();
        matches.push((position, binding));
    }

    select(group, path, matches)
}

fn select<'g, 'v, V>(
    group: &'g PolymorphicGroup,
    path: &str,
    mut matches: Vec<(usize, ChoiceBinding<'g, 'v, V>)>,
) -> Result<Option<ChoiceBinding<'g, 'v, V>>> {
    matches.sort_by_key(|(position, _)| *position);
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop().map(|(_, binding)| binding)),
        _ => {
            let properties = matches
                .iter()
                .map(|(_, binding)| binding.property.to_string())
                .collect();
            tracing::debug!(
                "Choice group '{}' at {} has {} populated variants",
                group.logical_name,
                path,
                matches.len()
            );
            Err(FhirRecordError::ambiguous_choice(path, properties))
        }
    }
}
