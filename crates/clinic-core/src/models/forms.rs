//! Medical and dental consultation forms.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::identity::StaffSnapshot;
use super::snapshot::Sex;

/// Patient identity block printed on a form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatientIdentity {
    pub surname: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
}

/// Vital signs captured during a medical consultation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Vitals {
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<u32>,
    pub respiratory_rate: Option<u32>,
    pub temperature_c: Option<f32>,
    pub weight_kg: Option<f32>,
    pub height_cm: Option<f32>,
}

impl Vitals {
    pub fn bmi(&self) -> Option<f32> {
        let weight = self.weight_kg?;
        let height_m = self.height_cm? / 100.0;
        if height_m <= 0.0 {
            return None;
        }
        Some(weight / (height_m * height_m))
    }
}

/// Findings from a dental examination.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DentalFindings {
    pub oral_hygiene: Option<String>,
    /// FDI tooth numbers
    pub decayed_teeth: Vec<u8>,
    pub missing_teeth: Vec<u8>,
    pub filled_teeth: Vec<u8>,
    pub gingivitis: bool,
    pub periodontal_disease: bool,
    pub malocclusion: bool,
    pub treatment_rendered: Option<String>,
    pub recommendations: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MedicalFormPayload {
    pub identity: PatientIdentity,
    pub vitals: Vitals,
    pub general_survey: Option<String>,
    pub findings: Option<String>,
    pub diagnosis: Option<String>,
    pub recommendations: Option<String>,
    pub exam_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DentalFormPayload {
    pub identity: PatientIdentity,
    pub findings: DentalFindings,
    pub exam_date: Option<NaiveDate>,
    pub next_appointment_date: Option<NaiveDate>,
    pub next_appointment_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicalForm {
    pub id: i64,
    pub patient_snapshot_id: i64,
    pub appointment_id: i64,
    pub academic_year_id: i64,
    pub file_no: String,
    pub identity: PatientIdentity,
    pub vitals: Vitals,
    pub general_survey: Option<String>,
    pub findings: Option<String>,
    pub diagnosis: Option<String>,
    pub recommendations: Option<String>,
    pub examiner: StaffSnapshot,
    pub exam_date: NaiveDate,
    pub created_by: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DentalForm {
    pub id: i64,
    pub patient_snapshot_id: i64,
    pub appointment_id: i64,
    pub academic_year_id: i64,
    pub file_no: String,
    pub identity: PatientIdentity,
    pub findings: DentalFindings,
    pub examiner: StaffSnapshot,
    pub exam_date: NaiveDate,
    pub next_appointment_date: Option<NaiveDate>,
    pub next_appointment_time: Option<NaiveTime>,
    pub follow_up_appointment_id: Option<i64>,
    pub created_by: i64,
    pub created_at: String,
}
