//! Identity models supplied by the external auth provider.

use serde::{Deserialize, Serialize};

/// User role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "staff" => Some(Role::Staff),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Staff and admins may act on resources they do not own.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

/// Campus identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Campus {
    A,
    B,
    C,
}

impl Campus {
    pub const ALL: [Campus; 3] = [Campus::A, Campus::B, Campus::C];

    pub fn as_str(&self) -> &'static str {
        match self {
            Campus::A => "a",
            Campus::B => "b",
            Campus::C => "c",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Some(Campus::A),
            "b" => Some(Campus::B),
            "c" => Some(Campus::C),
            _ => None,
        }
    }
}

/// Ordered campus multi-assignment. The first element is the primary campus.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampusSet(Vec<Campus>);

impl CampusSet {
    pub fn new(campuses: Vec<Campus>) -> Self {
        let mut deduped = Vec::with_capacity(campuses.len());
        for campus in campuses {
            if !deduped.contains(&campus) {
                deduped.push(campus);
            }
        }
        Self(deduped)
    }

    /// Parse the comma-separated form used on staff records (`"a,b"`).
    /// Unknown entries are skipped.
    pub fn parse(s: &str) -> Self {
        Self::new(s.split(',').filter_map(Campus::parse).collect())
    }

    pub fn primary(&self) -> Option<Campus> {
        self.0.first().copied()
    }

    pub fn contains(&self, campus: Campus) -> bool {
        self.0.contains(&campus)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Campus> {
        self.0.iter()
    }

    pub fn to_csv(&self) -> String {
        self.0
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Authenticated caller as returned by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub role: Role,
    pub email_verified: bool,
    pub blocked: bool,
    pub block_reason: Option<String>,
    /// Campus assignment (staff only; ignored for admins)
    pub campuses: CampusSet,
}

impl User {
    pub fn student(id: i64) -> Self {
        Self {
            id,
            role: Role::Student,
            email_verified: true,
            blocked: false,
            block_reason: None,
            campuses: CampusSet::default(),
        }
    }

    pub fn staff(id: i64, campuses: CampusSet) -> Self {
        Self {
            id,
            role: Role::Staff,
            email_verified: true,
            blocked: false,
            block_reason: None,
            campuses,
        }
    }

    pub fn admin(id: i64) -> Self {
        Self {
            id,
            role: Role::Admin,
            email_verified: true,
            blocked: false,
            block_reason: None,
            campuses: CampusSet::new(Campus::ALL.to_vec()),
        }
    }

    pub fn primary_campus(&self) -> Option<Campus> {
        self.campuses.primary()
    }
}

/// Clinician profile used for examiner and issuer attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffProfile {
    pub user_id: i64,
    pub full_name: String,
    pub position: String,
    pub license_no: Option<String>,
    pub ptr_no: Option<String>,
    pub phone: Option<String>,
    pub campuses: CampusSet,
    pub updated_at: String,
}

impl StaffProfile {
    pub fn new(user_id: i64, full_name: String, position: String) -> Self {
        Self {
            user_id,
            full_name,
            position,
            license_no: None,
            ptr_no: None,
            phone: None,
            campuses: CampusSet::default(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Immutable copy of the identity fields, frozen at the time of use.
    pub fn snapshot(&self) -> StaffSnapshot {
        StaffSnapshot {
            user_id: self.user_id,
            name: self.full_name.clone(),
            position: self.position.clone(),
            license_no: self.license_no.clone(),
            ptr_no: self.ptr_no.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Frozen clinician identity attached to forms and certificates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StaffSnapshot {
    pub user_id: i64,
    pub name: String,
    pub position: String,
    pub license_no: Option<String>,
    pub ptr_no: Option<String>,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campus_set_parse() {
        let set = CampusSet::parse("b, a,b,zz");
        assert_eq!(set.primary(), Some(Campus::B));
        assert!(set.contains(Campus::A));
        assert!(!set.contains(Campus::C));
        assert_eq!(set.to_csv(), "b,a");
    }

    #[test]
    fn test_empty_campus_set() {
        let set = CampusSet::parse("");
        assert!(set.is_empty());
        assert_eq!(set.primary(), None);
    }

    #[test]
    fn test_role_is_staff() {
        assert!(!Role::Student.is_staff());
        assert!(Role::Staff.is_staff());
        assert!(Role::Admin.is_staff());
    }
}
