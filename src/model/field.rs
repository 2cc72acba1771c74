//! Indicator fields.
//!
//! Each variant is mapped through a static table to its wire name and a typed
//! accessor, so no code path reads a record property by string key.

use crate::model::Measurement;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Accessor returning a field's value, or `None` when the record lacks it.
pub type Accessor = fn(&Measurement) -> Option<f64>;

/// A numeric indicator carried by every measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Population = 0,
    Gdp = 1,
    LifeExpectancy = 2,
}

/// Error returned when a string names no known field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field '{0}'")]
pub struct UnknownField(pub String);

struct FieldEntry {
    field: Field,
    name: &'static str,
    accessor: Accessor,
}

// Indexed by discriminant.
static FIELDS: [FieldEntry; 3] = [
    FieldEntry {
        field: Field::Population,
        name: "population",
        accessor: |m| Some(m.population),
    },
    FieldEntry {
        field: Field::Gdp,
        name: "GDP",
        accessor: |m| Some(m.gdp),
    },
    FieldEntry {
        field: Field::LifeExpectancy,
        name: "lifeExpectancy",
        accessor: |m| Some(m.life_expectancy),
    },
];

impl Field {
    /// Every field, in declaration order.
    pub const ALL: [Field; 3] = [Field::Population, Field::Gdp, Field::LifeExpectancy];

    fn entry(self) -> &'static FieldEntry {
        &FIELDS[self as usize]
    }

    /// Wire name used in query parameters, JSON keys and store columns.
    pub fn as_str(self) -> &'static str {
        self.entry().name
    }

    /// The typed accessor for this field.
    pub fn accessor(self) -> Accessor {
        self.entry().accessor
    }

    /// Read this field from a measurement.
    pub fn value_of(self, measurement: &Measurement) -> Option<f64> {
        (self.accessor())(measurement)
    }
}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FIELDS
            .iter()
            .find(|entry| entry.name == s)
            .map(|entry| entry.field)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
