use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{models::User, routes::params::Pagination};

#[derive(Debug, Deserialize, ToSchema, Validate, Default)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(min = 5, max = 20))]
    pub contact_number: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    #[validate(url)]
    pub profile_picture: Option<String>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.contact_number.is_none()
            && self.street.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.zip_code.is_none()
            && self.country.is_none()
            && self.profile_picture.is_none()
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    /// Matches name or email, case-insensitive.
    pub q: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminUpdateUserRequest {
    pub role: Option<String>,
    pub is_verified: Option<bool>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub items: Vec<User>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedUser {
    pub user_id: Uuid,
    pub business_id: Option<Uuid>,
}
