pub mod employee;
pub mod service_request;
