use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Seeded roster: id, name, role, active.
const SEED_EMPLOYEES: &[SeedEmployee] = &[
    SeedEmployee { id: "EMP-seed-admin-01", name: "Alex Morgan", role: "admin", active: true },
    SeedEmployee { id: "EMP-seed-disp-01", name: "Priya Nair", role: "dispatcher", active: true },
    SeedEmployee { id: "EMP-seed-disp-02", name: "Tom Becker", role: "dispatcher", active: true },
    SeedEmployee { id: "EMP-seed-tech-01", name: "Jo Alvarez", role: "technician", active: true },
    SeedEmployee {
        id: "EMP-seed-tech-02",
        name: "Kai Lindqvist",
        role: "technician",
        active: true,
    },
    SeedEmployee {
        id: "EMP-seed-tech-03",
        name: "Rosa Delgado",
        role: "technician",
        active: false,
    },
];

/// Deterministic employee roster used by `roadside seed` and the smoke run.
pub struct EmployeeRosterSeed;

impl EmployeeRosterSeed {
    pub const SQL: &str = include_str!("../../../config/fixtures/employee_roster.sql");

    /// Loads the roster. Existing rows with the same ids are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            employees_seeded: SEED_EMPLOYEES
                .iter()
                .map(|employee| SeededEmployee {
                    id: employee.id,
                    name: employee.name,
                    role: employee.role,
                })
                .collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_EMPLOYEES.len());

        for employee in SEED_EMPLOYEES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM employee
                     WHERE id = ?1 AND name = ?2 AND role = ?3 AND active = ?4
                 )",
            )
            .bind(employee.id)
            .bind(employee.name)
            .bind(employee.role)
            .bind(employee.active)
            .fetch_one(pool)
            .await?;
            checks.push((employee.id, present == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for employee in SEED_EMPLOYEES {
            sqlx::query("DELETE FROM employee WHERE id = ?1")
                .bind(employee.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedEmployee {
    id: &'static str,
    name: &'static str,
    role: &'static str,
    active: bool,
}

#[derive(Debug)]
pub struct SeedResult {
    pub employees_seeded: Vec<SeededEmployee>,
}

#[derive(Debug)]
pub struct SeededEmployee {
    pub id: &'static str,
    pub name: &'static str,
    pub role: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
