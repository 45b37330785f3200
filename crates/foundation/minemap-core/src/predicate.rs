//! Predicate builder
//!
//! Turns a [`ListingFilter`] into one SQL boolean expression plus the value
//! list it references by position.
//!
//! Placeholders are never pre-numbered. Each bind pushes its value first and
//! takes `$n` from the new length of the value list, so fragment order and
//! value order can't drift apart when filters are added or reordered.
//!
//! ```text
//! filter { near(-79.37, 43.71, 1000), power = "Hydro" }
//!
//! values:   [ -79.37, 43.71, 1000.0, "Hydro" ]
//!               $1     $2      $3      $4
//! sql:      ST_DWithin(location, ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography, $3)
//!           AND power_source = $4
//! ```

use crate::filter::{ListingFilter, Proximity};
use crate::location::SRID;

/// A bound parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(*v),
            SqlValue::Text(_) => None,
        }
    }
}

/// Filterable scalar columns of `listings`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    PowerSource,
    CoolingType,
    ElectricityRate,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::PowerSource => "power_source",
            Column::CoolingType => "cooling_type",
            Column::ElectricityRate => "electricity_rate",
        }
    }
}

/// One clause of the predicate. Every `usize` is a 1-based placeholder
/// position into the value list.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// `location` within `radius` meters of (`longitude`, `latitude`)
    Within {
        longitude: usize,
        latitude: usize,
        radius: usize,
    },
    Equals {
        column: Column,
        param: usize,
    },
    AtMost {
        column: Column,
        param: usize,
    },
}

impl Fragment {
    pub fn to_sql(&self) -> String {
        match self {
            Fragment::Within {
                longitude,
                latitude,
                radius,
            } => format!(
                "ST_DWithin(location, ST_SetSRID(ST_MakePoint(${longitude}, ${latitude}), {SRID})::geography, ${radius})"
            ),
            Fragment::Equals { column, param } => format!("{} = ${param}", column.name()),
            Fragment::AtMost { column, param } => format!("{} <= ${param}", column.name()),
        }
    }

    /// Placeholder positions in the order they appear in `to_sql`
    pub fn params(&self) -> Vec<usize> {
        match self {
            Fragment::Within {
                longitude,
                latitude,
                radius,
            } => vec![*longitude, *latitude, *radius],
            Fragment::Equals { param, .. } | Fragment::AtMost { param, .. } => vec![*param],
        }
    }
}

/// Accumulates fragments and values in lockstep
#[derive(Debug, Default)]
pub struct PredicateBuilder {
    values: Vec<SqlValue>,
    fragments: Vec<Fragment>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value and return its placeholder position
    fn bind(&mut self, value: SqlValue) -> usize {
        self.values.push(value);
        self.values.len()
    }

    /// Proximity clause. Binds longitude, latitude, radius in that order.
    pub fn within(&mut self, proximity: &Proximity) -> &mut Self {
        let longitude = self.bind(SqlValue::Float(proximity.longitude));
        let latitude = self.bind(SqlValue::Float(proximity.latitude));
        let radius = self.bind(SqlValue::Float(proximity.radius_meters));
        self.fragments.push(Fragment::Within {
            longitude,
            latitude,
            radius,
        });
        self
    }

    pub fn equals(&mut self, column: Column, value: impl Into<String>) -> &mut Self {
        let param = self.bind(SqlValue::Text(value.into()));
        self.fragments.push(Fragment::Equals { column, param });
        self
    }

    pub fn at_most(&mut self, column: Column, value: f64) -> &mut Self {
        let param = self.bind(SqlValue::Float(value));
        self.fragments.push(Fragment::AtMost { column, param });
        self
    }

    pub fn finish(self) -> Predicate {
        Predicate {
            fragments: self.fragments,
            values: self.values,
        }
    }
}

/// A finished predicate: fragments joined with AND, plus the values they bind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    fragments: Vec<Fragment>,
    values: Vec<SqlValue>,
}

impl Predicate {
    /// Build the predicate for a filter set.
    ///
    /// Order: proximity, power source, cooling type, max rate.
    pub fn from_filter(filter: &ListingFilter) -> Self {
        let mut builder = PredicateBuilder::new();

        if let Some(proximity) = &filter.proximity {
            builder.within(proximity);
        }
        if let Some(power_source) = &filter.power_source {
            builder.equals(Column::PowerSource, power_source.as_str());
        }
        if let Some(cooling_type) = &filter.cooling_type {
            builder.equals(Column::CoolingType, cooling_type.as_str());
        }
        if let Some(max_rate) = filter.max_rate {
            builder.at_most(Column::ElectricityRate, max_rate);
        }

        builder.finish()
    }

    /// SQL boolean expression; `TRUE` when there are no fragments
    pub fn to_sql(&self) -> String {
        if self.fragments.is_empty() {
            return "TRUE".to_string();
        }
        self.fragments
            .iter()
            .map(Fragment::to_sql)
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Value bound at a 1-based placeholder position
    pub fn value(&self, param: usize) -> Option<&SqlValue> {
        param.checked_sub(1).and_then(|i| self.values.get(i))
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
