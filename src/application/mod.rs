pub mod auth_service;
pub mod task_service;
pub mod todo_service;

#[cfg(test)]
mod task_service_tests;
#[cfg(test)]
mod test_support;
