use std::collections::HashMap;

use serde::Serialize;

pub(crate) mod auth;
pub(crate) mod custom_test;
pub(crate) mod judge;
pub(crate) mod plagiarism;
pub(crate) mod submission;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
}
