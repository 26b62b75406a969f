use crate::contracts::{InstrumentId, InstrumentKind, LabelSet, Reading, ReadingValue};

/// Static metadata shared by every series of an instrument.
#[derive(Debug, Clone)]
pub struct InstrumentDescriptor {
    pub name: String,
    pub kind: InstrumentKind,
    pub description: String,
    pub unit: Option<String>,
}

impl InstrumentDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: InstrumentKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn id(&self) -> InstrumentId {
        InstrumentId {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    pub(crate) fn reading(
        &self,
        labels: LabelSet,
        value: ReadingValue,
        timestamp_ms: u64,
    ) -> Reading {
        Reading {
            instrument: self.id(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            labels,
            value,
            timestamp_ms,
        }
    }
}
