//! Request/response types for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::UserBody;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendOtpResponse {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    /// Anonymous handle; required on the first verification of an account.
    #[serde(rename = "anonymousName", default)]
    pub anonymous_name: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyLoginOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserBody,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct MeResponse {
    pub user: UserBody,
}
