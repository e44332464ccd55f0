//! Adapter signature collection and name disambiguation
//!
//! Multiple columns can produce adapters with the same canonical name. The
//! registry takes candidates in discovery order and returns a stable name
//! for each: exact duplicates merge, same-named candidates with different
//! signatures get a discriminator suffix, and irreconcilable collisions are
//! an emission error.

use crate::error::GeneratorError;
use crate::resolver::IrType;
use crate::util::pascal_case;

use super::ir::{AdapterDirection, AdapterSignature};

/// One adapter request before name resolution.
#[derive(Debug, Clone)]
pub struct AdapterCandidate {
    /// Canonical name, e.g. `birthDateAdapter`.
    pub name: String,
    /// Discriminator used on collision, e.g. the owning record name.
    pub discriminator: String,
    pub input_type: IrType,
    pub output_type: IrType,
    pub direction: AdapterDirection,
}

/// Ordered adapter registry for one namespace.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: Vec<AdapterSignature>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, name: &str, direction: AdapterDirection) -> Option<&AdapterSignature> {
        self.adapters
            .iter()
            .find(|a| a.name == name && a.direction == direction)
    }

    /// Register a candidate, returning the resolved adapter name.
    pub fn register(
        &mut self,
        namespace: &str,
        candidate: AdapterCandidate,
    ) -> Result<String, GeneratorError> {
        let mut name = candidate.name.clone();
        if let Some(existing) = self.find(&name, candidate.direction) {
            if existing.input_type == candidate.input_type
                && existing.output_type == candidate.output_type
            {
                return Ok(name);
            }
            name = format!("{}{}", candidate.name, pascal_case(&candidate.discriminator));
            if let Some(existing) = self.find(&name, candidate.direction) {
                if existing.input_type == candidate.input_type
                    && existing.output_type == candidate.output_type
                {
                    return Ok(name);
                }
                return Err(GeneratorError::EmissionError {
                    namespace: namespace.to_string(),
                    message: format!(
                        "adapter '{}' is required with incompatible signatures ({} -> {} vs {} -> {})",
                        candidate.name,
                        existing.input_type,
                        existing.output_type,
                        candidate.input_type,
                        candidate.output_type
                    ),
                });
            }
        }
        self.adapters.push(AdapterSignature {
            name: name.clone(),
            input_type: candidate.input_type,
            output_type: candidate.output_type,
            direction: candidate.direction,
        });
        Ok(name)
    }

    pub fn into_adapters(self) -> Vec<AdapterSignature> {
        self.adapters
    }
}
