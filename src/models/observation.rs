use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::timestamps::timestamp_serde;

/// Numeric variables carried by every record, in canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variable {
    T,
    Prate,
    Sde,
    Tp,
    Sdswrf,
    Suswrf,
    Sdlwrf,
    Sulwrf,
    T2m,
    R2,
    Si10,
    Wdir10,
    Max10si,
}

impl Variable {
    pub const ALL: [Variable; 13] = [
        Variable::T,
        Variable::Prate,
        Variable::Sde,
        Variable::Tp,
        Variable::Sdswrf,
        Variable::Suswrf,
        Variable::Sdlwrf,
        Variable::Sulwrf,
        Variable::T2m,
        Variable::R2,
        Variable::Si10,
        Variable::Wdir10,
        Variable::Max10si,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            Variable::T => "t",
            Variable::Prate => "prate",
            Variable::Sde => "sde",
            Variable::Tp => "tp",
            Variable::Sdswrf => "sdswrf",
            Variable::Suswrf => "suswrf",
            Variable::Sdlwrf => "sdlwrf",
            Variable::Sulwrf => "sulwrf",
            Variable::T2m => "t2m",
            Variable::R2 => "r2",
            Variable::Si10 => "si10",
            Variable::Wdir10 => "wdir10",
            Variable::Max10si => "max_10si",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.column_name() == name)
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column_name())
    }
}

/// Unique identity of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub time: NaiveDateTime,
    pub valid_time: NaiveDateTime,
    pub fxx: u32,
    pub point_id: u32,
}

/// One row of the store. Field order is the canonical column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    #[serde(with = "timestamp_serde")]
    pub time: NaiveDateTime,
    #[serde(with = "timestamp_serde")]
    pub valid_time: NaiveDateTime,
    pub fxx: u32,
    pub t: Option<f64>,
    pub prate: Option<f64>,
    pub sde: Option<f64>,
    pub tp: Option<f64>,
    pub sdswrf: Option<f64>,
    pub suswrf: Option<f64>,
    pub sdlwrf: Option<f64>,
    pub sulwrf: Option<f64>,
    pub point_id: u32,
    pub t2m: Option<f64>,
    pub r2: Option<f64>,
    pub si10: Option<f64>,
    pub wdir10: Option<f64>,
    pub max_10si: Option<f64>,

    /// Source-specific columns outside the canonical schema; never persisted.
    #[serde(skip)]
    pub extras: BTreeMap<String, f64>,
}

impl ObservationRecord {
    /// An empty record for `(point_id, time, fxx)` with `valid_time = time + fxx`.
    pub fn new(point_id: u32, time: NaiveDateTime, fxx: u32) -> Self {
        Self {
            time,
            valid_time: time + Duration::hours(i64::from(fxx)),
            fxx,
            t: None,
            prate: None,
            sde: None,
            tp: None,
            sdswrf: None,
            suswrf: None,
            sdlwrf: None,
            sulwrf: None,
            point_id,
            t2m: None,
            r2: None,
            si10: None,
            wdir10: None,
            max_10si: None,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_valid_time(mut self, valid_time: NaiveDateTime) -> Self {
        self.valid_time = valid_time;
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            time: self.time,
            valid_time: self.valid_time,
            fxx: self.fxx,
            point_id: self.point_id,
        }
    }

    pub fn get(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::T => self.t,
            Variable::Prate => self.prate,
            Variable::Sde => self.sde,
            Variable::Tp => self.tp,
            Variable::Sdswrf => self.sdswrf,
            Variable::Suswrf => self.suswrf,
            Variable::Sdlwrf => self.sdlwrf,
            Variable::Sulwrf => self.sulwrf,
            Variable::T2m => self.t2m,
            Variable::R2 => self.r2,
            Variable::Si10 => self.si10,
            Variable::Wdir10 => self.wdir10,
            Variable::Max10si => self.max_10si,
        }
    }

    pub fn set(&mut self, variable: Variable, value: Option<f64>) {
        let slot = match variable {
            Variable::T => &mut self.t,
            Variable::Prate => &mut self.prate,
            Variable::Sde => &mut self.sde,
            Variable::Tp => &mut self.tp,
            Variable::Sdswrf => &mut self.sdswrf,
            Variable::Suswrf => &mut self.suswrf,
            Variable::Sdlwrf => &mut self.sdlwrf,
            Variable::Sulwrf => &mut self.sulwrf,
            Variable::T2m => &mut self.t2m,
            Variable::R2 => &mut self.r2,
            Variable::Si10 => &mut self.si10,
            Variable::Wdir10 => &mut self.wdir10,
            Variable::Max10si => &mut self.max_10si,
        };
        *slot = value;
    }

    pub fn missing_variables(&self) -> Vec<Variable> {
        Variable::ALL
            .into_iter()
            .filter(|v| self.get(*v).is_none())
            .collect()
    }

    pub fn present_count(&self) -> usize {
        Variable::ALL
            .iter()
            .filter(|v| self.get(**v).is_some())
            .count()
    }

    /// Complete records have a value in every canonical column.
    pub fn is_complete(&self) -> bool {
        self.present_count() == Variable::ALL.len()
    }
}
