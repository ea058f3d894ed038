use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub username: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub username: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetRequested {
    pub email_sent: bool,
    pub expires_in_minutes: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ResetStatus {
    pub success: bool,
}
