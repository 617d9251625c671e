use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn generate() -> Self {
        Self(format!("EMP-{}", &Uuid::new_v4().simple().to_string()[..12]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRole {
    Admin,
    Dispatcher,
    Technician,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Dispatcher => "dispatcher",
            Self::Technician => "technician",
        }
    }
}

impl std::str::FromStr for EmployeeRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "dispatcher" => Ok(Self::Dispatcher),
            "technician" => Ok(Self::Technician),
            other => Err(DomainError::InvalidEmployee(format!(
                "unsupported role `{other}` (expected admin|dispatcher|technician)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: EmployeeRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or editing an employee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDraft {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: EmployeeRole,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl EmployeeDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidEmployee("name is required".to_string()));
        }

        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'))
            .unwrap_or(false);
        if !well_formed {
            return Err(DomainError::InvalidEmployee(format!("`{email}` is not a valid email")));
        }

        Ok(())
    }

    pub fn into_employee(self) -> Result<Employee, DomainError> {
        self.validate()?;
        let now = Utc::now();
        Ok(Employee {
            id: EmployeeId::generate(),
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: normalize_phone(self.phone),
            role: self.role,
            active: self.active,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Employee {
    /// Applies an edit, keeping identity and creation time.
    pub fn update(&mut self, draft: EmployeeDraft) -> Result<(), DomainError> {
        draft.validate()?;
        self.name = draft.name.trim().to_string();
        self.email = draft.email.trim().to_string();
        self.phone = normalize_phone(draft.phone);
        self.role = draft.role;
        self.active = draft.active;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn normalize_phone(phone: Option<String>) -> Option<String> {
    phone.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeFilter {
    pub search: Option<String>,
    pub role: Option<EmployeeRole>,
}

impl EmployeeFilter {
    /// Builds a filter from raw query values; blank values and `all` mean unconstrained.
    pub fn from_query(search: Option<&str>, role: Option<&str>) -> Result<Self, DomainError> {
        let search = search.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string);
        let role = match role.map(str::trim) {
            None | Some("") => None,
            Some(value) if value.eq_ignore_ascii_case("all") => None,
            Some(value) => Some(value.parse()?),
        };
        Ok(Self { search, role })
    }

    pub fn matches(&self, employee: &Employee) -> bool {
        if let Some(role) = self.role {
            if employee.role != role {
                return false;
            }
        }

        match &self.search {
            Some(needle) => {
                let needle = needle.to_lowercase();
                employee.name.to_lowercase().contains(&needle)
                    || employee.email.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }

    pub fn apply(&self, employees: impl IntoIterator<Item = Employee>) -> Vec<Employee> {
        let mut matched: Vec<Employee> =
            employees.into_iter().filter(|employee| self.matches(employee)).collect();
        sort_employees(&mut matched);
        matched
    }
}

fn sort_employees(employees: &mut [Employee]) {
    employees.sort_by(|left, right| {
        left.name
            .to_lowercase()
            .cmp(&right.name.to_lowercase())
            .then_with(|| left.id.0.cmp(&right.id.0))
    });
}
