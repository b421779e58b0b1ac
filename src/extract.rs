//! Materializes the data instances a rule is evaluated against from a navigated value.

use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::adapter::{Shape, TypeAdapterRegistry};
use crate::{ExtractedInstance, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// A value of an iterable shape had no adapter. Registry misconfiguration.
    #[error("no iterable adapter registered for {shape} value of type {type_name}")]
    MissingIterableAdapter { shape: Shape, type_name: String },

    #[error("evaluation root must be a single entity, found {type_name}")]
    CollectionRoot { type_name: String },

    #[error("evaluation root is absent")]
    AbsentRoot,
}

/// Walks navigated values, unwrapping wrappers and flattening nested
/// collections into a flat list of instances.
#[derive(Debug, Clone, Default)]
pub struct ContextExtractor {
    adapters: Arc<TypeAdapterRegistry>,
}

impl ContextExtractor {
    #[must_use]
    pub fn new(adapters: Arc<TypeAdapterRegistry>) -> Self {
        Self { adapters }
    }

    #[must_use]
    pub fn adapters(&self) -> &TypeAdapterRegistry {
        &self.adapters
    }

    /// Extract the instances held by `raw`, a value navigated to from a parent
    /// context. `origin` labels the navigation (e.g. `Policy.coverages`) and
    /// seeds instance identities.
    ///
    /// `null`, empty wrappers, and `null` elements at any nesting depth yield
    /// nothing. Nested collections are flattened fully, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::MissingIterableAdapter`] if the registry
    /// cannot iterate a collection it encounters.
    pub fn extract<'a>(
        &self,
        raw: &'a Value,
        origin: &str,
    ) -> Result<Vec<ExtractedInstance<'a>>, ExtractionError> {
        let mut out = Vec::new();
        if let Some(value) = self.adapters.unwrap(raw) {
            if self.adapters.is_iterable(value) {
                self.flatten(value, origin, &mut out)?;
            } else {
                out.push(ExtractedInstance::new(value, origin, None));
            }
        }
        trace!(origin, instances = out.len(), "extracted context instances");
        Ok(out)
    }

    fn flatten<'a>(
        &self,
        collection: &'a Value,
        origin: &str,
        out: &mut Vec<ExtractedInstance<'a>>,
    ) -> Result<(), ExtractionError> {
        for (key, element) in self.adapters.iterate(collection)? {
            if element.is_null() {
                continue;
            }
            let element_origin = format!("{origin}{key}");
            if self.adapters.is_iterable(element) {
                self.flatten(element, &element_origin, out)?;
                continue;
            }
            let Some(unwrapped) = self.adapters.unwrap(element) else {
                continue;
            };
            if self.adapters.is_iterable(unwrapped) {
                self.flatten(unwrapped, &element_origin, out)?;
            } else {
                out.push(ExtractedInstance::new(unwrapped, &element_origin, Some(key)));
            }
        }
        Ok(())
    }

    /// Seed the first data context from the entity an evaluation starts at.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::CollectionRoot`] for a list or map root and
    /// [`ExtractionError::AbsentRoot`] when the root is `null` or an empty wrapper.
    pub fn root_instance<'a>(&self, root: &'a Value) -> Result<ExtractedInstance<'a>, ExtractionError> {
        if Shape::of(root).is_iterable() {
            return Err(ExtractionError::CollectionRoot {
                type_name: root.type_name().to_owned(),
            });
        }
        let value = self.adapters.unwrap(root).ok_or(ExtractionError::AbsentRoot)?;
        if Shape::of(value).is_iterable() {
            return Err(ExtractionError::CollectionRoot {
                type_name: value.type_name().to_owned(),
            });
        }
        Ok(ExtractedInstance::new(value, value.type_name(), None))
    }
}
