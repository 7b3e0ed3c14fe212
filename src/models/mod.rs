// Data models for the authentication API

pub mod auth;
