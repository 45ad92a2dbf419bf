use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Category {
    Profile => "profile",
    Labs => "labs",
    Medications => "medications",
    Conditions => "conditions",
    Procedures => "procedures",
    Allergies => "allergies",
    Immunizations => "immunizations",
    Vitals => "vitals",
    Imaging => "imaging",
    Timeline => "timeline",
    Notes => "notes",
});

impl Category {
    /// Every category, in canonical artifact order.
    pub const ALL: [Category; 11] = [
        Category::Profile,
        Category::Labs,
        Category::Medications,
        Category::Conditions,
        Category::Procedures,
        Category::Allergies,
        Category::Immunizations,
        Category::Vitals,
        Category::Imaging,
        Category::Timeline,
        Category::Notes,
    ];
}

str_enum!(AbnormalFlag {
    Normal => "normal",
    Low => "low",
    High => "high",
    CriticalLow => "critical_low",
    CriticalHigh => "critical_high",
});

str_enum!(MedicationStatus {
    Active => "active",
    Stopped => "stopped",
    Paused => "paused",
});

str_enum!(ConditionStatus {
    Active => "active",
    Resolved => "resolved",
    Monitoring => "monitoring",
});

str_enum!(AllergySeverity {
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
    LifeThreatening => "life_threatening",
});

str_enum!(VitalType {
    Temperature => "temperature",
    BloodPressure => "blood_pressure",
    Weight => "weight",
    Height => "height",
    HeartRate => "heart_rate",
    BloodGlucose => "blood_glucose",
    OxygenSaturation => "oxygen_saturation",
});

impl VitalType {
    /// Default unit for this vital type.
    pub fn default_unit(self) -> &'static str {
        match self {
            VitalType::Temperature => "°C",
            VitalType::BloodPressure => "mmHg",
            VitalType::Weight => "kg",
            VitalType::Height => "cm",
            VitalType::HeartRate => "bpm",
            VitalType::BloodGlucose => "mg/dL",
            VitalType::OxygenSaturation => "%",
        }
    }
}

str_enum!(ImagingModality {
    Xray => "xray",
    Ct => "ct",
    Mri => "mri",
    Ultrasound => "ultrasound",
    Pet => "pet",
    Other => "other",
});
