//! Error types for the localization filter
//!
//! Two failure kinds exist. Configuration errors are fatal and occur only at construction;
//! input errors reject a single call and leave the filter exactly as it was. Weight degeneracy
//! is deliberately absent: it is recovered inside [`crate::particle::ParticleFilter::update`]
//! and reported through [`crate::particle::WeightUpdate`] instead.

use std::fmt;

/// Errors that can occur when building or driving a filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// The configuration cannot describe a usable filter
    InvalidConfiguration {
        /// Which field was rejected and why
        description: String,
    },

    /// A control or observation was rejected before touching the particle population
    InvalidInput {
        /// Which value was rejected and why
        description: String,
    },
}

impl FilterError {
    pub(crate) fn configuration(description: impl Into<String>) -> Self {
        FilterError::InvalidConfiguration {
            description: description.into(),
        }
    }

    pub(crate) fn input(description: impl Into<String>) -> Self {
        FilterError::InvalidInput {
            description: description.into(),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::InvalidConfiguration { description } => {
                write!(f, "Invalid configuration: {}", description)
            }
            FilterError::InvalidInput { description } => {
                write!(f, "Invalid input: {}", description)
            }
        }
    }
}

impl std::error::Error for FilterError {}
