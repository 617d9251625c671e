use crate::commands::{current_thread_runtime, CommandError, CommandResult};
use roadside_core::config::{AppConfig, LoadOptions};
use roadside_db::{connect_with_config, migrations, EmployeeRosterSeed, SeededEmployee};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let run_result: Result<Vec<SeededEmployee>, CommandError> = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            let seeded = EmployeeRosterSeed::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

            let verification = EmployeeRosterSeed::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

            if verification.all_present {
                Ok(seeded.employees_seeded)
            } else {
                let failed_checks = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                Err(("seed_verification", verification_failure_message(&failed_checks), 6u8))
            }
        }
        .await;

        pool.close().await;
        run_result
    });

    match result {
        Ok(employees) => CommandResult::success("seed", summary_message(&employees)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary_message(employees: &[SeededEmployee]) -> String {
    let lines: Vec<String> = employees
        .iter()
        .map(|employee| format!("  - {}: {} ({})", employee.id, employee.name, employee.role))
        .collect();
    format!("employee roster loaded ({} employees):\n{}", employees.len(), lines.join("\n"))
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for employees: {}", failed_checks.join(", "))
    }
}
