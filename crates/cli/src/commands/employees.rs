use serde_json::Value;

use crate::commands::{current_thread_runtime, CommandError, CommandResult};
use roadside_core::config::{AppConfig, LoadOptions};
use roadside_core::domain::employee::{Employee, EmployeeFilter};
use roadside_db::repositories::{EmployeeRepository, SqlEmployeeRepository};
use roadside_db::{connect_with_config, migrations};

/// Lists employees matching `--search` / `--role`, ordered by name.
pub fn run(search: Option<&str>, role: Option<&str>) -> CommandResult {
    let filter = match EmployeeFilter::from_query(search, role) {
        Ok(filter) => filter,
        Err(error) => {
            return CommandResult::failure("employees", "invalid_filter", error.to_string(), 2);
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "employees",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime("employees") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let listed: Result<Vec<Employee>, CommandError> = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;
            SqlEmployeeRepository::new(pool.clone())
                .list(&filter)
                .await
                .map_err(|error| ("employee_query", error.to_string(), 3u8))
        }
        .await;

        pool.close().await;
        listed
    });

    match result {
        Ok(employees) => {
            let data = serde_json::to_value(&employees).unwrap_or(Value::Null);
            CommandResult::success_with_data(
                "employees",
                format!("{} employee(s) matched", employees.len()),
                data,
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("employees", error_class, message, exit_code)
        }
    }
}
