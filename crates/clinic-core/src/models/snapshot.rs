//! Per-term patient profile snapshots.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::calendar::Semester;
use super::identity::Campus;
use crate::error::ValidationError;

/// Self-reported gender on the profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Sex as recorded on consultation forms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Forms only accept male/female; anything else takes the configured default.
    pub fn from_gender(gender: Option<Gender>, default: Sex) -> Sex {
        match gender {
            Some(Gender::Male) => Sex::Male,
            Some(Gender::Female) => Sex::Female,
            Some(Gender::Other) | None => default,
        }
    }
}

/// Completion state of a snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Incomplete,
    Complete,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Incomplete => "incomplete",
            CompletionStatus::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incomplete" => Some(CompletionStatus::Incomplete),
            "complete" => Some(CompletionStatus::Complete),
            _ => None,
        }
    }
}

/// Demographic block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Demographics {
    pub student_id: Option<String>,
    pub surname: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub suffix: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub civil_status: Option<String>,
    pub nationality: Option<String>,
    pub religion: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub course: Option<String>,
    pub year_level: Option<String>,
    pub campus: Option<Campus>,
}

impl Demographics {
    /// Age on `on`, from date of birth when known, otherwise the stored age.
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        match self.date_of_birth {
            Some(dob) => {
                let mut years = on.year() - dob.year();
                if (on.month(), on.day()) < (dob.month(), dob.day()) {
                    years -= 1;
                }
                u32::try_from(years).ok()
            }
            None => self.age,
        }
    }
}

/// Home address; `full` is derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Address {
    pub street: Option<String>,
    pub barangay: Option<String>,
    pub city: Option<String>,
    pub full: Option<String>,
}

/// Emergency contact; `full_address` is derived and always ends with the home city.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmergencyContact {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub barangay: Option<String>,
    pub full_address: Option<String>,
}

/// A selection that is either a plain tag or `{"tag": "Other", "specify": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Choice {
    Other(OtherChoice),
    Plain(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtherChoice {
    pub tag: String,
    #[serde(default)]
    pub specify: String,
}

impl Choice {
    pub fn plain(tag: impl Into<String>) -> Self {
        Choice::Plain(tag.into())
    }

    pub fn other(specify: impl Into<String>) -> Self {
        Choice::Other(OtherChoice {
            tag: "Other".into(),
            specify: specify.into(),
        })
    }

    /// True when the choice selects "Other" but carries no specification.
    pub fn is_unspecified_other(&self) -> bool {
        match self {
            Choice::Plain(tag) => tag.trim().eq_ignore_ascii_case("other"),
            Choice::Other(other) => {
                other.tag.trim().eq_ignore_ascii_case("other") && other.specify.trim().is_empty()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Medication {
    pub name: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vaccination {
    pub vaccine: Choice,
    #[serde(default)]
    pub doses: Option<u32>,
    #[serde(default)]
    pub last_dose: Option<NaiveDate>,
}

/// Health history stored as JSON on the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthHistory {
    pub comorbidities: Vec<Choice>,
    pub maintenance_medications: Vec<Medication>,
    pub vaccinations: Vec<Vaccination>,
    pub allergies: Vec<Choice>,
    pub past_medical_history: Vec<Choice>,
    pub family_medical_history: Vec<Choice>,
    pub hospital_admission_or_surgery: bool,
    pub hospital_admission_details: Option<String>,
    pub hospital_admission_year: Option<i32>,
}

impl HealthHistory {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let lists: [(&str, &[Choice]); 4] = [
            ("health_history.comorbidities", self.comorbidities.as_slice()),
            ("health_history.allergies", self.allergies.as_slice()),
            ("health_history.past_medical_history", self.past_medical_history.as_slice()),
            ("health_history.family_medical_history", self.family_medical_history.as_slice()),
        ];
        for (field, choices) in lists {
            if choices.iter().any(Choice::is_unspecified_other) {
                return Err(ValidationError::UnspecifiedOther {
                    field: field.to_string(),
                });
            }
        }
        if self
            .vaccinations
            .iter()
            .any(|v| v.vaccine.is_unspecified_other())
        {
            return Err(ValidationError::UnspecifiedOther {
                field: "health_history.vaccinations".into(),
            });
        }
        if self
            .maintenance_medications
            .iter()
            .any(|m| m.name.trim().is_empty())
        {
            return Err(ValidationError::MissingField {
                field: "health_history.maintenance_medications.name".into(),
            });
        }

        if self.hospital_admission_or_surgery {
            if is_blank(&self.hospital_admission_details) {
                return Err(ValidationError::MissingField {
                    field: "health_history.hospital_admission_details".into(),
                });
            }
            if self.hospital_admission_year.is_none() {
                return Err(ValidationError::MissingField {
                    field: "health_history.hospital_admission_year".into(),
                });
            }
        }
        Ok(())
    }
}

/// Which prior `(year, semester)` supplied the autofill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotOrigin {
    pub academic_year_id: i64,
    pub semester: Semester,
}

/// A patient's profile as of one `(year, semester)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientSnapshot {
    pub id: i64,
    pub user_id: i64,
    pub academic_year_id: i64,
    pub semester: Semester,
    pub demographics: Demographics,
    pub address: Address,
    pub emergency_contact: EmergencyContact,
    pub health_history: HealthHistory,
    pub completion_status: CompletionStatus,
    pub autofilled_from: Option<SnapshotOrigin>,
    pub created_at: String,
    pub updated_at: String,
}

impl PatientSnapshot {
    /// Blank snapshot for a first-ever term.
    pub fn blank(user_id: i64, academic_year_id: i64, semester: Semester) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: 0,
            user_id,
            academic_year_id,
            semester,
            demographics: Demographics::default(),
            address: Address::default(),
            emergency_contact: EmergencyContact::default(),
            health_history: HealthHistory::default(),
            completion_status: CompletionStatus::Incomplete,
            autofilled_from: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// "First Middle Surname", skipping empty parts.
    pub fn display_name(&self) -> String {
        let d = &self.demographics;
        [&d.first_name, &d.middle_name, &d.surname]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Rebuild the derived address strings.
    pub fn recompute_addresses(&mut self, home_city: &str) {
        self.address.full = join_address(&[
            &self.address.street,
            &self.address.barangay,
            &self.address.city,
        ]);
        let emergency = join_address(&[
            &self.emergency_contact.street,
            &self.emergency_contact.barangay,
        ]);
        self.emergency_contact.full_address = Some(match emergency {
            Some(prefix) => format!("{}, {}", prefix, home_city),
            None => home_city.to_string(),
        });
    }

    /// Required-field check used to derive `completion_status`.
    pub fn required_fields_present(&self) -> bool {
        let d = &self.demographics;
        !is_blank(&d.surname)
            && !is_blank(&d.first_name)
            && d.date_of_birth.is_some()
            && d.gender.is_some()
            && !is_blank(&d.phone)
            && !is_blank(&self.address.street)
            && !is_blank(&self.address.barangay)
            && !is_blank(&self.address.city)
            && !is_blank(&self.emergency_contact.name)
            && !is_blank(&self.emergency_contact.phone)
    }
}

/// Block-level merge patch for a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapshotPatch {
    pub demographics: Option<Demographics>,
    pub address: Option<Address>,
    pub emergency_contact: Option<EmergencyContact>,
    pub health_history: Option<HealthHistory>,
}

impl SnapshotPatch {
    pub fn apply_to(self, snapshot: &mut PatientSnapshot) {
        if let Some(demographics) = self.demographics {
            snapshot.demographics = demographics;
        }
        if let Some(address) = self.address {
            snapshot.address = address;
        }
        if let Some(contact) = self.emergency_contact {
            snapshot.emergency_contact = contact;
        }
        if let Some(history) = self.health_history {
            snapshot.health_history = history;
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn join_address(parts: &[&Option<String>]) -> Option<String> {
    let present: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(", "))
    }
}
