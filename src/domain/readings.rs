//! Reading aggregator
//!
//! Collects measurement and context notifications of one RACP operation and
//! pairs them by sequence number when a snapshot is taken.

use crate::domain::glucose::{GlucoseReading, GlucoseReadingContext};
use serde::Serialize;
use std::collections::HashMap;

/// A reading together with its context, if one arrived
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadingRecord {
    pub reading: GlucoseReading,
    pub context: Option<GlucoseReadingContext>,
}

#[derive(Debug, Default)]
pub struct ReadingAggregator {
    readings: Vec<GlucoseReading>,
    /// Sequence number to position in `readings`
    positions: HashMap<u16, usize>,
    contexts: HashMap<u16, GlucoseReadingContext>,
}

impl ReadingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading, or replace the one with the same sequence number
    pub fn add_reading(&mut self, reading: GlucoseReading) {
        match self.positions.get(&reading.sequence_number) {
            Some(&index) => self.readings[index] = reading,
            None => {
                self.positions
                    .insert(reading.sequence_number, self.readings.len());
                self.readings.push(reading);
            }
        }
    }

    pub fn add_context(&mut self, context: GlucoseReadingContext) {
        self.contexts.insert(context.sequence_number, context);
    }

    pub fn clear(&mut self) {
        self.readings.clear();
        self.positions.clear();
        self.contexts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty() && self.contexts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Readings in arrival order, each with its matching context.
    /// Contexts without a reading are retained but not listed.
    pub fn snapshot(&self) -> Vec<ReadingRecord> {
        self.readings
            .iter()
            .map(|reading| ReadingRecord {
                reading: reading.clone(),
                context: self.contexts.get(&reading.sequence_number).cloned(),
            })
            .collect()
    }
}
