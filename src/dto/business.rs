use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Product, PublicBusiness};

#[derive(Debug, Deserialize, ToSchema, Validate, Default)]
pub struct CreateBusinessRequest {
    #[validate(length(min = 1, max = 200, message = "Business name is required"))]
    pub business_name: String,
    #[validate(length(min = 1, max = 200, message = "Legal entity name is required"))]
    pub legal_entity_name: String,
    #[validate(length(min = 1, max = 64, message = "Tax ID is required"))]
    pub tax_id: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub account_holder_name: Option<String>,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
    pub bank_name: Option<String>,
    #[validate(url)]
    pub logo_url: Option<String>,
}

/// Every field is optional; only the ones provided are changed.
#[derive(Debug, Deserialize, ToSchema, Validate, Default)]
pub struct UpdateBusinessRequest {
    #[validate(length(min = 1, max = 200))]
    pub business_name: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub legal_entity_name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub tax_id: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub account_holder_name: Option<String>,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
    pub bank_name: Option<String>,
    #[validate(url)]
    pub logo_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBusinessStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BusinessProfile {
    pub profile: PublicBusiness,
    pub products: Vec<Product>,
}
