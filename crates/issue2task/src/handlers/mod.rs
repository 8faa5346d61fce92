//! HTTP handlers for OAuth onboarding and account settings.

pub mod oauth;
pub mod settings;
