use crate::commands::{current_thread_runtime, CommandError, CommandResult};
use roadside_core::config::{AppConfig, LoadOptions};
use roadside_core::domain::employee::EmployeeFilter;
use roadside_db::repositories::{EmployeeRepository, SqlEmployeeRepository};
use roadside_db::{connect_with_config, migrations};

/// Startup preflight: the same checks the server runs before binding.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "start",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime("start") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let checked: Result<usize, CommandError> = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;
            let roster = SqlEmployeeRepository::new(pool.clone())
                .list(&EmployeeFilter::default())
                .await
                .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
            Ok(roster.len())
        }
        .await;

        pool.close().await;
        checked
    });

    match result {
        Ok(employee_count) => CommandResult::success(
            "start",
            format!(
                "preflight passed: database ready ({employee_count} employees), \
                 server will bind {}:{}, backend ack timeout {}s",
                config.server.bind_address, config.server.port, config.dispatch.ack_timeout_secs
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
