use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::core::Overwrites;
use crate::size::Size;

/// Body of `POST /api/v1/generate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Template api name.
    #[serde(default)]
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<Size>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Overwrites>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variations: Option<Vec<Variation>>,
}

/// One entry of a batch-mode request; missing fields fall back to the top level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Variation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<Size>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Overwrites>,
}

/// A variation with its fallbacks already applied.
#[derive(Debug, Clone)]
pub struct ResolvedVariation {
    pub sizes: Vec<Size>,
    pub elements: Arc<Overwrites>,
}

/// Generation mode, decided once from the request shape.
#[derive(Debug, Clone)]
pub enum RequestShape {
    /// Every size shares one elements map; all jobs carry variation 0.
    Single {
        sizes: Vec<Size>,
        elements: Arc<Overwrites>,
    },
    /// Each variation expands to its own sizes, tagged with its index.
    Batch { variations: Vec<ResolvedVariation> },
}

impl RequestShape {
    pub fn from_request(request: &GenerateRequest) -> Self {
        let default_sizes = request
            .sizes
            .clone()
            .unwrap_or_else(|| vec![Size::default()]);
        let default_elements = Arc::new(request.elements.clone().unwrap_or_default());

        match &request.variations {
            Some(variations) => RequestShape::Batch {
                variations: variations
                    .iter()
                    .map(|variation| ResolvedVariation {
                        sizes: variation
                            .sizes
                            .clone()
                            .unwrap_or_else(|| default_sizes.clone()),
                        elements: variation
                            .elements
                            .clone()
                            .map(Arc::new)
                            .unwrap_or_else(|| Arc::clone(&default_elements)),
                    })
                    .collect(),
            },
            None => RequestShape::Single {
                sizes: default_sizes,
                elements: default_elements,
            },
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            RequestShape::Single { .. } => "single",
            RequestShape::Batch { .. } => "batch",
        }
    }

    /// All sizes the request will render, in construction order.
    pub fn sizes(&self) -> Vec<Size> {
        match self {
            RequestShape::Single { sizes, .. } => sizes.clone(),
            RequestShape::Batch { variations } => variations
                .iter()
                .flat_map(|variation| variation.sizes.iter().copied())
                .collect(),
        }
    }
}
