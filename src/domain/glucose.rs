//! Glucose measurement and measurement-context records
//!
//! Typed views of the Glucose Measurement (0x2A18) and Glucose Measurement
//! Context (0x2A34) characteristic values. Parsing lives in
//! [`crate::infrastructure::bluetooth::protocol`].

use serde::Serialize;

/// Defines a one-byte (or one-nibble) coded field. Values the record format
/// reserves decode to `Reserved(raw)` instead of failing.
macro_rules! coded_field {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
        pub enum $name {
            $($variant,)+
            Reserved(u8),
        }

        impl $name {
            pub fn from_raw(raw: u8) -> Self {
                match raw {
                    $($value => Self::$variant,)+
                    other => Self::Reserved(other),
                }
            }

            pub fn raw(&self) -> u8 {
                match self {
                    $(Self::$variant => $value,)+
                    Self::Reserved(other) => *other,
                }
            }
        }
    };
}

coded_field!(
    /// Sample type (low nibble of the type/location byte)
    SampleType {
        CapillaryWholeBlood = 1,
        CapillaryPlasma = 2,
        VenousWholeBlood = 3,
        VenousPlasma = 4,
        ArterialWholeBlood = 5,
        ArterialPlasma = 6,
        UndeterminedWholeBlood = 7,
        UndeterminedPlasma = 8,
        InterstitialFluid = 9,
        ControlSolution = 10,
    }
);

coded_field!(
    /// Sample location (high nibble of the type/location byte)
    SampleLocation {
        Finger = 1,
        AlternateSiteTest = 2,
        Earlobe = 3,
        ControlSolution = 4,
        NotAvailable = 15,
    }
);

coded_field!(CarbohydrateId {
    Breakfast = 1,
    Lunch = 2,
    Dinner = 3,
    Snack = 4,
    Drink = 5,
    Supper = 6,
    Brunch = 7,
});

coded_field!(Meal {
    Preprandial = 1,
    Postprandial = 2,
    Fasting = 3,
    Casual = 4,
    Bedtime = 5,
});

coded_field!(Tester {
    SelfTest = 1,
    HealthCareProfessional = 2,
    LabTest = 3,
    NotAvailable = 15,
});

coded_field!(Health {
    MinorIssues = 1,
    MajorIssues = 2,
    DuringMenses = 3,
    UnderStress = 4,
    NoIssues = 5,
    NotAvailable = 15,
});

coded_field!(MedicationId {
    RapidActingInsulin = 1,
    ShortActingInsulin = 2,
    IntermediateActingInsulin = 3,
    LongActingInsulin = 4,
    PreMixedInsulin = 5,
});

/// IEEE 11073 16-bit short float.
///
/// Numeric values are kept as `mantissa * 10^exponent` so equality is exact.
/// The reserved mantissas decode to their own variants and never to a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SFloat {
    Value { mantissa: i16, exponent: i8 },
    NaN,
    /// Not at this resolution
    NRes,
    PositiveInfinity,
    NegativeInfinity,
    Reserved,
}

impl SFloat {
    const MANTISSA_NAN: i16 = 0x07FF;
    const MANTISSA_NRES: i16 = 0x0800;
    const MANTISSA_POS_INF: i16 = 0x07FE;
    const MANTISSA_NEG_INF: i16 = 0x0802;
    const MANTISSA_RESERVED: i16 = 0x0801;

    /// Split a raw little-endian SFLOAT into exponent and mantissa.
    pub fn from_raw(raw: u16) -> Self {
        let raw_mantissa = (raw & 0x0FFF) as i16;
        match raw_mantissa {
            Self::MANTISSA_NAN => return Self::NaN,
            Self::MANTISSA_NRES => return Self::NRes,
            Self::MANTISSA_POS_INF => return Self::PositiveInfinity,
            Self::MANTISSA_NEG_INF => return Self::NegativeInfinity,
            Self::MANTISSA_RESERVED => return Self::Reserved,
            _ => {}
        }

        // Sign-extend the 12-bit mantissa and the 4-bit exponent
        let mantissa = (raw_mantissa << 4) >> 4;
        let exponent = ((raw >> 12) as i8) << 4 >> 4;
        Self::Value { mantissa, exponent }
    }

    pub fn to_raw(&self) -> u16 {
        let mantissa = match self {
            Self::Value { mantissa, exponent } => {
                return ((*exponent as u16 & 0x0F) << 12) | (*mantissa as u16 & 0x0FFF);
            }
            Self::NaN => Self::MANTISSA_NAN,
            Self::NRes => Self::MANTISSA_NRES,
            Self::PositiveInfinity => Self::MANTISSA_POS_INF,
            Self::NegativeInfinity => Self::MANTISSA_NEG_INF,
            Self::Reserved => Self::MANTISSA_RESERVED,
        };
        mantissa as u16
    }

    /// Numeric value, or `None` for the special values
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value { mantissa, exponent } => {
                Some(*mantissa as f64 * 10f64.powi(*exponent as i32))
            }
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Value { .. })
    }
}

/// Base time of a measurement. A zero year/month/day means "not known".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BaseTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConcentrationUnit {
    KilogramsPerLitre,
    MolesPerLitre,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlucoseConcentration {
    pub value: SFloat,
    pub unit: ConcentrationUnit,
    pub sample_type: SampleType,
    pub location: SampleLocation,
}

impl GlucoseConcentration {
    /// Value in the unit meters display: mg/dL for kg/L, mmol/L for mol/L
    pub fn display_value(&self) -> Option<(f64, &'static str)> {
        let value = self.value.value()?;
        Some(match self.unit {
            ConcentrationUnit::KilogramsPerLitre => (value * 100_000.0, "mg/dL"),
            ConcentrationUnit::MolesPerLitre => (value * 1_000.0, "mmol/L"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorAnnotation {
    BatteryLow,
    SensorMalfunction,
    SampleSizeInsufficient,
    StripInsertionError,
    StripTypeIncorrect,
    ResultTooHigh,
    ResultTooLow,
    TemperatureTooHigh,
    TemperatureTooLow,
    ReadInterrupted,
    GeneralDeviceFault,
    TimeFault,
}

impl SensorAnnotation {
    const ALL: [SensorAnnotation; 12] = [
        Self::BatteryLow,
        Self::SensorMalfunction,
        Self::SampleSizeInsufficient,
        Self::StripInsertionError,
        Self::StripTypeIncorrect,
        Self::ResultTooHigh,
        Self::ResultTooLow,
        Self::TemperatureTooHigh,
        Self::TemperatureTooLow,
        Self::ReadInterrupted,
        Self::GeneralDeviceFault,
        Self::TimeFault,
    ];

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

/// Sensor status annotation bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SensorStatus(pub u16);

impl SensorStatus {
    pub fn contains(&self, annotation: SensorAnnotation) -> bool {
        self.0 & annotation.bit() != 0
    }

    pub fn annotations(&self) -> Vec<SensorAnnotation> {
        SensorAnnotation::ALL
            .into_iter()
            .filter(|a| self.contains(*a))
            .collect()
    }
}

/// One Glucose Measurement record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlucoseReading {
    pub sequence_number: u16,
    pub base_time: BaseTime,
    /// Minutes relative to `base_time`
    pub time_offset: Option<i16>,
    pub concentration: Option<GlucoseConcentration>,
    pub sensor_status: Option<SensorStatus>,
    /// A context record with the same sequence number will follow
    pub context_follows: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Carbohydrate {
    pub id: CarbohydrateId,
    pub kilograms: SFloat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Exercise {
    pub duration_secs: u16,
    pub intensity_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MedicationUnit {
    Kilograms,
    Litres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Medication {
    pub id: MedicationId,
    pub amount: SFloat,
    pub unit: MedicationUnit,
}

/// One Glucose Measurement Context record, paired with a reading by
/// `sequence_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlucoseReadingContext {
    pub sequence_number: u16,
    pub extended_flags: Option<u8>,
    pub carbohydrate: Option<Carbohydrate>,
    pub meal: Option<Meal>,
    pub tester: Option<Tester>,
    pub health: Option<Health>,
    pub exercise: Option<Exercise>,
    pub medication: Option<Medication>,
    /// HbA1c in percent
    pub hba1c: Option<SFloat>,
}
