pub mod backup_run;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod history;
pub mod remote_entry;
