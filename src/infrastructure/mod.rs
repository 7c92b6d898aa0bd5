pub mod auth_client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod event_mapper;
pub mod functions_client;
pub mod google_calendar_client;
pub mod logging;
pub mod oauth_client;
pub mod session_storage;
pub mod storage;
pub mod store;
