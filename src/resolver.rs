use crate::constants::{STATE_UNAVAILABLE, STATE_UNKNOWN};
use crate::error::ResolveError;
use tracing::debug;

/// Static value used when a quantity has no usable live source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallback {
    pub value: f64,
    pub unit: &'static str,
}

impl Fallback {
    pub fn new(value: f64, unit: &'static str) -> Self {
        Self { value, unit }
    }

    /// Provenance label, e.g. `fallback: 25.00 °C`.
    pub fn describe(&self) -> String {
        format!("fallback: {:.2} {}", self.value, self.unit)
    }
}

/// A value together with where it came from: the source entity id, or the
/// fallback description.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuantity {
    pub value: f64,
    pub source: String,
}

impl ResolvedQuantity {
    pub fn live(value: f64, entity_id: &str) -> Self {
        Self {
            value,
            source: entity_id.to_string(),
        }
    }

    pub fn from_fallback(fallback: &Fallback) -> Self {
        Self {
            value: fallback.value,
            source: fallback.describe(),
        }
    }
}

/// Resolves one quantity.
///
/// `state` is the raw state of `binding`, as taken from a change notification
/// or from a state lookup. It is ignored when there is no binding.
pub fn resolve(
    binding: Option<&str>,
    fallback: &Fallback,
    state: Option<&str>,
) -> ResolvedQuantity {
    let Some(entity_id) = binding else {
        return ResolvedQuantity::from_fallback(fallback);
    };

    match parse_state(entity_id, state) {
        Ok(value) => ResolvedQuantity::live(value, entity_id),
        Err(e) => {
            debug!("{e}, using {}", fallback.describe());
            ResolvedQuantity::from_fallback(fallback)
        }
    }
}

/// Parses the raw state of a source entity into a finite number.
pub fn parse_state(entity_id: &str, state: Option<&str>) -> Result<f64, ResolveError> {
    let raw = match state.map(str::trim) {
        None | Some(STATE_UNKNOWN) | Some(STATE_UNAVAILABLE) => {
            return Err(ResolveError::SourceUnavailable {
                entity_id: entity_id.to_string(),
            })
        }
        Some(raw) => raw,
    };

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ResolveError::SourceUnparseable {
            entity_id: entity_id.to_string(),
            raw: raw.to_string(),
        }),
    }
}
