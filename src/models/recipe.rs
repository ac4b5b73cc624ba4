//! Recipe content as captured by a snapshot.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// An image referenced by a recipe or one of its steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeImage {
    #[serde(default)]
    pub url: String,
}

/// One ingredient line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub amount: f64,
}

/// One preparation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub images: Vec<RecipeImage>,
}

/// The full recipe payload at one revision.
///
/// `Default` is the zero-valued content used as the "old" side of the
/// very first commit in a lineage: no serving size and empty lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_size: Option<i64>,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub images: Vec<RecipeImage>,
}

impl RecipeDetails {
    /// Check the content before anything is written.
    pub fn validate(&self) -> Result<(), AppError> {
        match self.serving_size {
            None => return Err(invalid("Serving size is required")),
            Some(size) if size < 1 => return Err(invalid("Serving size must be at least 1")),
            Some(_) => {}
        }

        if self.ingredients.is_empty() {
            return Err(invalid("Recipe must contain at least 1 ingredient"));
        }
        for (index, ingredient) in self.ingredients.iter().enumerate() {
            if ingredient.name.trim().is_empty() {
                return Err(invalid(format!("Ingredient {} name must not be empty", index)));
            }
            if ingredient.unit.trim().is_empty() {
                return Err(invalid(format!("Ingredient {} unit must not be empty", index)));
            }
            if !(ingredient.amount > 0.0) || !ingredient.amount.is_finite() {
                return Err(invalid(format!(
                    "Ingredient {} amount must be greater than 0",
                    index
                )));
            }
        }

        if self.steps.is_empty() {
            return Err(invalid("Recipe must contain at least 1 step"));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.order < 1 {
                return Err(invalid(format!("Step {} order must be at least 1", index)));
            }
            if step.details.trim().is_empty() {
                return Err(invalid(format!("Step {} details must not be empty", index)));
            }
            validate_images(&step.images)?;
        }

        validate_images(&self.images)
    }
}

fn validate_images(images: &[RecipeImage]) -> Result<(), AppError> {
    if images.iter().any(|image| image.url.trim().is_empty()) {
        return Err(invalid("Recipe image url must not be empty"));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Validation(message.into())
}
