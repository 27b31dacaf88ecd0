//! Core library for echoctl: the backend client, the account-linking
//! controller, and the services behind each console section.

pub mod api;
pub mod config;
pub mod linking;
pub mod services;
pub mod state;
